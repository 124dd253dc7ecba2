//! `registration`: assigns a connection's role group and, for RPC servers,
//! registers their exported methods.

use serde::Deserialize;

use crate::errors::BrokerError;
use crate::instruction::{ClientGroup, Instruction, InstructionType, StateChanges};
use crate::jsonrpc::Answer;

use super::HandlerContext;

#[derive(Deserialize)]
struct RegistrationParams {
    group: i64,
    #[serde(default)]
    methods: Vec<String>,
}

pub fn pre(ctx: &HandlerContext, ins: &Instruction) -> Instruction {
    let out = Instruction::new(InstructionType::Registration, ins.cid);
    let Some(cmd) = &ins.command else {
        return out.with_answer(Answer::from_broker_error(
            0,
            &BrokerError::Internal("registration without command".into()),
        ));
    };

    if !ctx.css.is_auth(&ins.cid) {
        return out.with_answer(Answer::from_broker_error(
            cmd.id,
            &BrokerError::AccessDenied("registration requires auth".into()),
        ));
    }

    let params: RegistrationParams = match serde_json::from_str(&cmd.params.json) {
        Ok(p) => p,
        Err(e) => {
            return out.with_answer(Answer::from_broker_error(
                cmd.id,
                &BrokerError::ParamsFormat(e.to_string()),
            ));
        }
    };

    match ClientGroup::from_wire(params.group) {
        Some(ClientGroup::ApplicationClient) => out
            .with_state_changes(StateChanges::Group(ClientGroup::ApplicationClient))
            .with_answer(Answer::ok(cmd.id, "{\"ok\":true}")),
        Some(ClientGroup::RpcServer) => {
            let added = ctx.registry.register_client_methods(&params.methods);
            ctx.registry.append(ins.cid, &params.methods);
            out.with_state_changes(StateChanges::Group(ClientGroup::RpcServer))
                .with_answer(Answer::ok(
                    cmd.id,
                    format!("{{\"methods_count\":{added},\"ok\":true}}"),
                ))
        }
        Some(ClientGroup::WebSocketClient) => out.with_answer(Answer::from_broker_error(
            cmd.id,
            &BrokerError::AccessDenied(
                "web-socket group cannot be self-assigned over TCP registration".into(),
            ),
        )),
        Some(ClientGroup::Unset) | None => out.with_answer(Answer::from_broker_error(
            cmd.id,
            &BrokerError::UnexpectedValue(format!("unknown group {}", params.group)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::ConnectionId;
    use crate::css::Css;
    use crate::jsonrpc::{Command, CommandParams};
    use crate::registry::MethodRegistry;
    use crate::stats::Stats;
    use std::sync::Arc;

    fn test_ctx() -> HandlerContext {
        HandlerContext {
            css: Arc::new(Css::new(4, crate::css::DEFAULT_SHARD_SIZE)),
            registry: Arc::new(MethodRegistry::new()),
            task_ids: Arc::new(crate::cid::TaskIdGenerator::new()),
            stats: Arc::new(Stats::new()),
            key_dir: Arc::new(std::path::PathBuf::from("/nonexistent")),
        }
    }

    fn registration_command(id: i64, cid: ConnectionId, json: &str) -> Command {
        Command::new(
            id,
            "registration",
            CommandParams {
                cid: cid.to_string(),
                data: String::new(),
                json: json.to_string(),
                task: None,
            },
        )
    }

    #[test]
    fn requires_auth_first() {
        let ctx = test_ctx();
        let cid = ctx.css.new_connection().cid;
        let cmd = registration_command(1, cid, "{\"group\":2,\"methods\":[]}");
        let ins = Instruction::new(InstructionType::Registration, cid).with_command(cmd);
        let out = pre(&ctx, &ins);
        assert_eq!(out.answer.unwrap().error.unwrap().code, 5);
    }

    #[test]
    fn unknown_group_is_unexpected_value() {
        let ctx = test_ctx();
        let cid = ctx.css.new_connection().cid;
        ctx.css
            .update_state(&cid, StateChanges::Auth(true));
        let cmd = registration_command(1, cid, "{\"group\":4,\"methods\":[]}");
        let ins = Instruction::new(InstructionType::Registration, cid).with_command(cmd);
        let out = pre(&ctx, &ins);
        let err = out.answer.unwrap().error.unwrap();
        assert_eq!(err.code, 6);
        assert!(err.message.contains("group"));
    }

    #[test]
    fn rpc_server_registration_populates_registry() {
        let ctx = test_ctx();
        let cid = ctx.css.new_connection().cid;
        ctx.css.update_state(&cid, StateChanges::Auth(true));
        let cmd = registration_command(1, cid, "{\"group\":1,\"methods\":[\"work\"]}");
        let ins = Instruction::new(InstructionType::Registration, cid).with_command(cmd);
        let out = pre(&ctx, &ins);
        assert!(!out.answer.unwrap().is_error());
        assert_eq!(ctx.registry.cid_variants("work"), vec![cid]);
    }

    #[test]
    fn websocket_group_over_tcp_registration_is_denied() {
        let ctx = test_ctx();
        let cid = ctx.css.new_connection().cid;
        ctx.css.update_state(&cid, StateChanges::Auth(true));
        let cmd = registration_command(1, cid, "{\"group\":3,\"methods\":[]}");
        let ins = Instruction::new(InstructionType::Registration, cid).with_command(cmd);
        let out = pre(&ctx, &ins);
        assert_eq!(out.answer.unwrap().error.unwrap().code, 5);
    }
}
