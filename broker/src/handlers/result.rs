//! Result route: an RPC server delivering a task's outcome. The pre-handler
//! just validates and acknowledges the server; the post-handler looks up
//! the task's origin and produces the secondary instruction carrying the
//! result back to it.

use crate::errors::BrokerError;
use crate::instruction::{Instruction, InstructionType};
use crate::jsonrpc::Answer;

use super::HandlerContext;

pub fn pre(_ctx: &HandlerContext, ins: &Instruction) -> Instruction {
    let out = Instruction::new(InstructionType::Result, ins.cid);
    let Some(cmd) = &ins.command else {
        return out.with_answer(Answer::from_broker_error(
            0,
            &BrokerError::Internal("result without command".into()),
        ));
    };

    match &cmd.params.task {
        Some(task) if !task.is_empty() => out.with_answer(Answer::ok(cmd.id, "{\"ok\":true}")),
        _ => out.with_answer(Answer::from_broker_error(
            cmd.id,
            &BrokerError::ParamsFormat("missing params.task".into()),
        )),
    }
}

pub fn post(ctx: &HandlerContext, ins: &Instruction, out: &Instruction) -> Vec<Instruction> {
    if !out.succeeded() {
        return Vec::new();
    }
    let Some(cmd) = &ins.command else {
        return Vec::new();
    };
    let Some(task_id) = &cmd.params.task else {
        return Vec::new();
    };

    let Some(origin_cid) = ctx.registry.take_task_origin(task_id) else {
        ctx.stats.record_task_orphaned();
        tracing::debug!(task_id = %task_id, "result delivered for unknown or already-consumed task");
        return Vec::new();
    };

    let payload = if !cmd.params.json.is_empty() {
        &cmd.params.json
    } else {
        &cmd.params.data
    };

    let delivery = Instruction::new(InstructionType::Result, origin_cid)
        .with_answer(Answer::ok(cmd.id, payload.clone()));
    vec![delivery]
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

    fn result_command(id: i64, task: &str, json: &str) -> Command {
        Command::new(
            id,
            "result",
            CommandParams {
                cid: String::new(),
                data: String::new(),
                json: json.to_string(),
                task: Some(task.to_string()),
            },
        )
    }

    #[test]
    fn missing_task_is_params_format_error() {
        let ctx = test_ctx();
        let server = ConnectionId::new(1, 1);
        let cmd = Command::new(
            1,
            "result",
            CommandParams {
                cid: String::new(),
                data: String::new(),
                json: String::new(),
                task: None,
            },
        );
        let ins = Instruction::new(InstructionType::Result, server).with_command(cmd);
        let out = pre(&ctx, &ins);
        assert_eq!(out.answer.unwrap().error.unwrap().code, 3);
    }

    #[test]
    fn delivers_to_origin_and_consumes_task() {
        let ctx = test_ctx();
        let caller = ConnectionId::new(1, 1);
        ctx.registry.set_task_origin("task-1", caller);

        let server = ConnectionId::new(2, 1);
        let cmd = result_command(9, "task-1", "{\"answer\":42}");
        let ins = Instruction::new(InstructionType::Result, server).with_command(cmd);
        let pre_out = pre(&ctx, &ins);
        assert!(!pre_out.answer.as_ref().unwrap().is_error());

        let secondary = post(&ctx, &ins, &pre_out);
        assert_eq!(secondary.len(), 1);
        assert_eq!(secondary[0].cid, caller);
        assert_eq!(
            secondary[0].answer.as_ref().unwrap().result.as_deref(),
            Some("{\"answer\":42}")
        );
        assert!(ctx.registry.take_task_origin("task-1").is_none());
    }

    #[test]
    fn orphaned_task_produces_no_secondary() {
        let ctx = test_ctx();
        let server = ConnectionId::new(2, 1);
        let cmd = result_command(9, "ghost-task", "{}");
        let ins = Instruction::new(InstructionType::Result, server).with_command(cmd);
        let pre_out = pre(&ctx, &ins);
        let secondary = post(&ctx, &ins, &pre_out);
        assert!(secondary.is_empty());
    }
}
