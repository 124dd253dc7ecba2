//! `ping`: replies with the decimal length of `data + json`.

use crate::errors::BrokerError;
use crate::instruction::{Instruction, InstructionType};
use crate::jsonrpc::Answer;

use super::HandlerContext;

pub fn pre(_ctx: &HandlerContext, ins: &Instruction) -> Instruction {
    let out = Instruction::new(InstructionType::Ping, ins.cid);
    let Some(cmd) = &ins.command else {
        return out.with_answer(Answer::from_broker_error(
            0,
            &BrokerError::Internal("ping without command".into()),
        ));
    };

    let length = cmd.params.data.len() + cmd.params.json.len();
    out.with_answer(Answer::ok(cmd.id, length.to_string()))
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

    #[test]
    fn ping_returns_combined_length() {
        let ctx = HandlerContext {
            css: Arc::new(Css::new(1, crate::css::DEFAULT_SHARD_SIZE)),
            registry: Arc::new(MethodRegistry::new()),
            task_ids: Arc::new(crate::cid::TaskIdGenerator::new()),
            stats: Arc::new(Stats::new()),
            key_dir: Arc::new(std::path::PathBuf::from("/nonexistent")),
        };
        let cid = ConnectionId::new(1, 1);
        let cmd = Command::new(
            7,
            "ping",
            CommandParams {
                cid: cid.to_string(),
                data: "hello".into(),
                json: "{}".into(),
                task: None,
            },
        );
        let ins = Instruction::new(InstructionType::Ping, cid).with_command(cmd);
        let out = pre(&ctx, &ins);
        let answer = out.answer.expect("ping answer");
        assert_eq!(answer.result.as_deref(), Some("7"));
        assert_eq!(answer.id, 7);
    }
}
