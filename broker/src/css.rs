//! Connection State Store: a shardable map from connection id to mutable
//! per-connection state, sized for a hard per-node client cap.

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::cid::ConnectionId;
use crate::instruction::{ClientGroup, ConnectionStatus, StateChanges};

/// Entries per shard. The original's `ResourcesGroupSize`.
pub const DEFAULT_SHARD_SIZE: u64 = 100;

/// Mutable per-connection record.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub auth: bool,
    pub group: ClientGroup,
    pub status: ConnectionStatus,
    pub temp_data: Vec<u8>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            auth: false,
            group: ClientGroup::Unset,
            status: ConnectionStatus::Active,
            temp_data: Vec::new(),
        }
    }
}

/// The cid plus its parsed coordinates, returned by [`Css::new_connection`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionData {
    pub cid: ConnectionId,
    pub sequence: u64,
    pub shard: u32,
}

struct Shard {
    entries: RwLock<HashMap<u64, ConnectionState>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

struct Top {
    next_sequence: u64,
    live_count: u64,
}

/// Shardable connection state store. `shard_count` shards of `shard_size`
/// entries each bound the live connection population to
/// `shard_count * shard_size`.
pub struct Css {
    shards: Vec<Shard>,
    shard_size: u64,
    top: RwLock<Top>,
}

impl Css {
    pub fn new(shard_count: usize, shard_size: u64) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count).map(|_| Shard::new()).collect();

        Self {
            shards,
            shard_size: shard_size.max(1),
            top: RwLock::new(Top {
                next_sequence: 0,
                live_count: 0,
            }),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn check_shard_exists(&self, index: u32) -> bool {
        index >= 1 && (index as usize) <= self.shards.len()
    }

    /// Allocates a new connection id and inserts an empty state record.
    /// Shard is chosen by current occupancy (`ceil(live_count / shard_size)`,
    /// clamped to the shard array), not by sequence, this keeps active
    /// connections packed into few shards at low load.
    pub fn new_connection(&self) -> ConnectionData {
        let (sequence, shard_index) = {
            let mut top = self.top.write();
            top.next_sequence += 1;
            top.live_count += 1;
            let sequence = top.next_sequence;

            let shard_index = shard_index_for_occupancy(top.live_count, self.shard_size, self.shards.len());
            if shard_index + 1 == self.shards.len()
                && top.live_count > self.shard_size * self.shards.len() as u64
            {
                tracing::warn!(
                    live_count = top.live_count,
                    shard_count = self.shards.len(),
                    shard_size = self.shard_size,
                    "connection count exceeds nominal capacity, clamping into last shard"
                );
            }
            (sequence, shard_index)
        };

        let cid = ConnectionId::new(sequence, shard_index as u32 + 1);

        self.shards[shard_index]
            .entries
            .write()
            .insert(sequence, ConnectionState::default());

        ConnectionData {
            cid,
            sequence,
            shard: shard_index as u32 + 1,
        }
    }

    pub fn live_count(&self) -> u64 {
        self.top.read().live_count
    }

    /// Tolerates a non-existent cid: removal is a no-op, not an error.
    pub fn remove_connection(&self, cid: &ConnectionId) {
        if let Some(shard) = self.shard_for(cid) {
            let removed = shard.entries.write().remove(&cid.sequence).is_some();
            if removed {
                let mut top = self.top.write();
                top.live_count = top.live_count.saturating_sub(1);
            }
        }
    }

    pub fn update_state(&self, cid: &ConnectionId, changes: StateChanges) {
        let Some(shard) = self.shard_for(cid) else {
            return;
        };
        let mut entries = shard.entries.write();
        let Some(state) = entries.get_mut(&cid.sequence) else {
            return;
        };

        match changes {
            StateChanges::Skip => {}
            StateChanges::Auth(auth) => state.auth = auth,
            StateChanges::Group(group) => state.group = group,
            StateChanges::Status(status) => state.status = status,
            StateChanges::All {
                auth,
                group,
                status,
            } => {
                state.auth = auth;
                state.group = group;
                state.status = status;
            }
        }
    }

    pub fn is_auth(&self, cid: &ConnectionId) -> bool {
        self.read_state(cid, |s| s.auth).unwrap_or(false)
    }

    pub fn client_busy(&self, cid: &ConnectionId) -> bool {
        self.read_state(cid, |s| matches!(s.status, ConnectionStatus::Busy))
            .unwrap_or(false)
    }

    pub fn client_in_group(&self, cid: &ConnectionId, group: ClientGroup) -> bool {
        self.read_state(cid, |s| s.group == group).unwrap_or(false)
    }

    fn read_state<T>(&self, cid: &ConnectionId, f: impl FnOnce(&ConnectionState) -> T) -> Option<T> {
        let shard = self.shard_for(cid)?;
        let entries = shard.entries.read();
        entries.get(&cid.sequence).map(f)
    }

    fn shard_for(&self, cid: &ConnectionId) -> Option<&Shard> {
        if cid.shard == 0 {
            return None;
        }
        self.shards.get(cid.shard as usize - 1)
    }
}

fn shard_index_for_occupancy(live_count: u64, shard_size: u64, shard_total: usize) -> usize {
    let wanted = live_count.div_ceil(shard_size).max(1);
    (wanted as usize - 1).min(shard_total.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn new_connections_get_distinct_monotonic_sequences() {
        let css = Css::new(10, DEFAULT_SHARD_SIZE);
        let mut prev = 0;
        let mut cids = std::collections::HashSet::new();
        for _ in 0..500 {
            let data = css.new_connection();
            assert!(data.sequence > prev);
            prev = data.sequence;
            assert!(data.shard >= 1 && data.shard as usize <= css.shard_count());
            assert!(cids.insert(data.cid));
        }
        assert_eq!(css.live_count(), 500);
    }

    #[test]
    fn live_count_matches_occupied_shard_spread() {
        let css = Css::new(1000, DEFAULT_SHARD_SIZE);
        let mut shards_seen = std::collections::HashSet::new();
        for _ in 0..250 {
            let data = css.new_connection();
            shards_seen.insert(data.shard);
        }
        assert_eq!(css.live_count(), 250);
        // ceil(250/100) == 3 distinct shard indices covered: 1, 2, 3
        assert_eq!(shards_seen.len(), 3);
    }

    #[test]
    fn remove_connection_tolerates_unknown_cid() {
        let css = Css::new(4, DEFAULT_SHARD_SIZE);
        let data = css.new_connection();
        css.remove_connection(&data.cid);
        assert_eq!(css.live_count(), 0);
        // second removal of the same (now gone) cid must not panic or
        // underflow live_count
        css.remove_connection(&data.cid);
        assert_eq!(css.live_count(), 0);
    }

    #[test]
    fn missing_cid_reads_return_zero_value() {
        let css = Css::new(4, DEFAULT_SHARD_SIZE);
        let ghost = crate::cid::ConnectionId::new(999, 1);
        assert!(!css.is_auth(&ghost));
        assert!(!css.client_busy(&ghost));
        assert!(!css.client_in_group(&ghost, ClientGroup::RpcServer));
    }

    #[test]
    fn status_update_reflects_in_client_busy() {
        let css = Css::new(4, DEFAULT_SHARD_SIZE);
        let data = css.new_connection();
        css.update_state(&data.cid, StateChanges::Status(ConnectionStatus::Busy));
        assert!(css.client_busy(&data.cid));
        css.update_state(&data.cid, StateChanges::Status(ConnectionStatus::Active));
        assert!(!css.client_busy(&data.cid));
    }

    #[test]
    fn concurrent_new_connection_yields_unique_sequences() {
        let css = Arc::new(Css::new(200, DEFAULT_SHARD_SIZE));
        let workers = 10;
        let per_worker = 1000;
        let mut handles = Vec::new();
        for _ in 0..workers {
            let css = css.clone();
            handles.push(thread::spawn(move || {
                let mut sequences = Vec::with_capacity(per_worker);
                for _ in 0..per_worker {
                    sequences.push(css.new_connection().sequence);
                }
                sequences
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), workers * per_worker);
        assert_eq!(css.live_count(), (workers * per_worker) as u64);
    }
}
