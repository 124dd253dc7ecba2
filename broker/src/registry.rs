//! Method Registry: method name → handler tag, method name → exporting
//! server set, and task id → origin cid correlation.

use dashmap::DashMap;

use crate::cid::ConnectionId;
use crate::instruction::InstructionType;

/// Seeds `instructionOf` with the built-in wire method names (§6), plus
/// `result`, the method an RPC server uses to deliver a task's outcome
/// back through the broker.
fn builtin_methods() -> [(&'static str, InstructionType); 7] {
    [
        ("auth", InstructionType::Auth),
        ("registration", InstructionType::Registration),
        ("statusupdate", InstructionType::Status),
        ("ping", InstructionType::Ping),
        ("quit", InstructionType::Exit),
        ("exit", InstructionType::Exit),
        ("result", InstructionType::Result),
    ]
}

/// Process-wide method/server/task tables. Constructed once at startup and
/// shared behind an `Arc` with the worker pool and connection server.
pub struct MethodRegistry {
    instruction_of: DashMap<String, InstructionType>,
    servers_of: DashMap<String, Vec<ConnectionId>>,
    origin_of: DashMap<String, ConnectionId>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        let instruction_of = DashMap::new();
        for (method, tag) in builtin_methods() {
            instruction_of.insert(method.to_string(), tag);
        }

        Self {
            instruction_of,
            servers_of: DashMap::new(),
            origin_of: DashMap::new(),
        }
    }

    /// Tag for a wire method name, or `Skip` if unrecognized.
    pub fn instruction_for(&self, method: &str) -> InstructionType {
        self.instruction_of
            .get(method)
            .map(|tag| *tag)
            .unwrap_or(InstructionType::Skip)
    }

    /// Registers `methods` as RPC-routable if not already known. Returns
    /// the count of names actually newly added; idempotent on repeats.
    pub fn register_client_methods(&self, methods: &[String]) -> usize {
        let mut added = 0;
        for method in methods {
            if self
                .instruction_of
                .insert(method.clone(), InstructionType::External)
                .is_none()
            {
                added += 1;
            }
            self.servers_of.entry(method.clone()).or_default();
        }
        added
    }

    /// Adds `cid` as an exporter of each method in `methods`. No-op for a
    /// cid already present for a given method.
    pub fn append(&self, cid: ConnectionId, methods: &[String]) {
        for method in methods {
            let mut entry = self.servers_of.entry(method.clone()).or_default();
            if !entry.contains(&cid) {
                entry.push(cid);
            }
        }
    }

    /// Snapshot of the cids currently exporting `method`.
    pub fn cid_variants(&self, method: &str) -> Vec<ConnectionId> {
        self.servers_of
            .get(method)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Removes a disconnected server from every method's candidate list.
    /// Method entries (and their `instructionOf` tag) survive with an
    /// emptied server set. MR entries persist for the process lifetime.
    pub fn remove_server(&self, cid: &ConnectionId) {
        for mut entry in self.servers_of.iter_mut() {
            entry.retain(|c| c != cid);
        }
    }

    pub fn set_task_origin(&self, task_id: impl Into<String>, cid: ConnectionId) {
        self.origin_of.insert(task_id.into(), cid);
    }

    /// Consume-once lookup: removes the entry if present.
    pub fn take_task_origin(&self, task_id: &str) -> Option<ConnectionId> {
        self.origin_of.remove(task_id).map(|(_, cid)| cid)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(seq: u64) -> ConnectionId {
        ConnectionId::new(seq, 1)
    }

    #[test]
    fn builtins_resolve_to_expected_tags() {
        let mr = MethodRegistry::new();
        assert_eq!(mr.instruction_for("ping"), InstructionType::Ping);
        assert_eq!(mr.instruction_for("auth"), InstructionType::Auth);
        assert_eq!(mr.instruction_for("registration"), InstructionType::Registration);
        assert_eq!(mr.instruction_for("statusupdate"), InstructionType::Status);
        assert_eq!(mr.instruction_for("quit"), InstructionType::Exit);
        assert_eq!(mr.instruction_for("exit"), InstructionType::Exit);
        assert_eq!(mr.instruction_for("result"), InstructionType::Result);
        assert_eq!(mr.instruction_for("unknown_method"), InstructionType::Skip);
    }

    #[test]
    fn registering_methods_is_idempotent() {
        let mr = MethodRegistry::new();
        let methods = vec!["work".to_string(), "compute".to_string()];
        assert_eq!(mr.register_client_methods(&methods), 2);
        assert_eq!(mr.register_client_methods(&methods), 0);
        assert_eq!(mr.instruction_for("work"), InstructionType::External);
    }

    #[test]
    fn append_and_variants_roundtrip() {
        let mr = MethodRegistry::new();
        mr.register_client_methods(&["work".to_string()]);
        let a = cid(1);
        let b = cid(2);
        mr.append(a, &["work".to_string()]);
        mr.append(b, &["work".to_string()]);
        mr.append(a, &["work".to_string()]); // duplicate, no-op

        let variants = mr.cid_variants("work");
        assert_eq!(variants.len(), 2);
        assert!(variants.contains(&a));
        assert!(variants.contains(&b));
    }

    #[test]
    fn remove_server_clears_from_every_method_but_keeps_entry() {
        let mr = MethodRegistry::new();
        mr.register_client_methods(&["work".to_string(), "other".to_string()]);
        let a = cid(1);
        mr.append(a, &["work".to_string(), "other".to_string()]);

        mr.remove_server(&a);

        assert!(mr.cid_variants("work").is_empty());
        assert!(mr.cid_variants("other").is_empty());
        // the method names themselves are still routable tags, just empty
        assert_eq!(mr.instruction_for("work"), InstructionType::External);
    }

    #[test]
    fn task_origin_is_consumed_on_take() {
        let mr = MethodRegistry::new();
        let caller = cid(5);
        mr.set_task_origin("task-1", caller);
        assert_eq!(mr.take_task_origin("task-1"), Some(caller));
        assert_eq!(mr.take_task_origin("task-1"), None);
    }
}
