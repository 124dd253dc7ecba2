//! `quit`/`exit`: acknowledges then marks the instruction for connection
//! teardown. No post-handler, exit never produces secondaries.

use crate::instruction::{Instruction, InstructionType};
use crate::jsonrpc::Answer;

use super::HandlerContext;

pub fn pre(_ctx: &HandlerContext, ins: &Instruction) -> Instruction {
    let id = ins.command.as_ref().map(|c| c.id).unwrap_or(0);
    Instruction::new(InstructionType::Exit, ins.cid)
        .with_answer(Answer::ok(id, "{\"ok\":true}"))
        .with_exit()
}
