//! RPC route: picks a non-busy server exporting the requested method,
//! replies to the caller with the chosen server and task id, and produces
//! a secondary `Execute` instruction forwarding the call to that server.

use crate::errors::BrokerError;
use crate::instruction::{Instruction, InstructionType};
use crate::jsonrpc::Answer;

use super::HandlerContext;

pub fn pre(ctx: &HandlerContext, ins: &Instruction) -> Instruction {
    let out = Instruction::new(InstructionType::External, ins.cid);
    let Some(cmd) = &ins.command else {
        return out.with_answer(Answer::from_broker_error(
            0,
            &BrokerError::Internal("external call without command".into()),
        ));
    };

    let variants = ctx.registry.cid_variants(&cmd.method);
    if variants.is_empty() {
        return out.with_answer(Answer::from_broker_error(
            cmd.id,
            &BrokerError::RemoteMethodNotExists(cmd.method.clone()),
        ));
    }

    let chosen = variants
        .into_iter()
        .find(|candidate| !ctx.css.client_busy(candidate));

    let Some(server_cid) = chosen else {
        return out.with_answer(Answer::from_broker_error(
            cmd.id,
            &BrokerError::AllServerBusy(cmd.method.clone()),
        ));
    };

    let task_id = ctx.task_ids.next_task_id();
    ctx.registry.set_task_origin(task_id.clone(), ins.cid);
    ctx.stats.record_task_dispatched();

    out.with_answer(Answer::ok(
        cmd.id,
        format!("{{\"cid\":\"{server_cid}\",\"task\":\"{task_id}\"}}"),
    ))
}

pub fn post(_ctx: &HandlerContext, ins: &Instruction, out: &Instruction) -> Vec<Instruction> {
    if !out.succeeded() {
        return Vec::new();
    }
    let Some(cmd) = &ins.command else {
        return Vec::new();
    };
    let Some(answer) = &out.answer else {
        return Vec::new();
    };
    let Some(result) = &answer.result else {
        return Vec::new();
    };

    // The pre-handler's result carries {"cid":"<server>","task":"<id>"};
    // pull both back out to build the forwarded command.
    let parsed: serde_json::Value = match serde_json::from_str(result) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let (Some(server_cid_str), Some(task_id)) = (
        parsed.get("cid").and_then(|v| v.as_str()),
        parsed.get("task").and_then(|v| v.as_str()),
    ) else {
        return Vec::new();
    };

    let server_cid: crate::cid::ConnectionId = match server_cid_str.parse() {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let forwarded = cmd.retargeted(server_cid_str, task_id);
    let secondary = Instruction::new(InstructionType::Execute, server_cid).with_command(forwarded);
    vec![secondary]
}
