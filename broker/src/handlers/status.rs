//! `statusupdate`: sets a connection's busy/active flag.

use crate::errors::BrokerError;
use crate::instruction::{ConnectionStatus, Instruction, InstructionType, StateChanges};
use crate::jsonrpc::Answer;

use super::HandlerContext;

pub fn pre(_ctx: &HandlerContext, ins: &Instruction) -> Instruction {
    let out = Instruction::new(InstructionType::Status, ins.cid);
    let Some(cmd) = &ins.command else {
        return out.with_answer(Answer::from_broker_error(
            0,
            &BrokerError::Internal("statusupdate without command".into()),
        ));
    };

    let value: u64 = match cmd.params.data.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            return out.with_answer(Answer::from_broker_error(
                cmd.id,
                &BrokerError::ParamsFormat(format!(
                    "not an unsigned integer: {}",
                    cmd.params.data
                )),
            ));
        }
    };

    if value >= 65536 {
        return out.with_answer(Answer::from_broker_error(
            cmd.id,
            &BrokerError::ParamsFormat(format!("status {value} out of u16 range")),
        ));
    }

    let status = ConnectionStatus::from_wire(value as u16);
    out.with_state_changes(StateChanges::Status(status))
        .with_answer(Answer::ok(
            cmd.id,
            format!("{{\"ok\":true,\"status\":{value}}}"),
        ))
}
