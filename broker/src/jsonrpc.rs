//! Wire types: newline-delimited JSON-RPC 2.0 frames.

use serde::{Deserialize, Serialize};

use crate::errors::{BrokerError, BrokerResult};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandParams {
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub json: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

/// An ingress (or forwarded) JSON-RPC request frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: CommandParams,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

impl Command {
    pub fn new(id: i64, method: impl Into<String>, params: CommandParams) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Parse one line of input (without its trailing newline) as a Command.
    pub fn parse(line: &str) -> BrokerResult<Self> {
        serde_json::from_str(line).map_err(|e| BrokerError::CommandFormat(e.to_string()))
    }

    /// Serialize to a single newline-terminated wire frame.
    pub fn dump(&self) -> BrokerResult<String> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }

    /// Clone this command but addressed at a different server cid and
    /// carrying the generated task id, as done when forwarding an RPC
    /// call from an application client to the chosen RPC server.
    pub fn retargeted(&self, server_cid: impl Into<String>, task_id: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.params.cid = server_cid.into();
        cloned.params.task = Some(task_id.into());
        cloned
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDescription {
    pub code: i64,
    pub message: String,
}

/// An egress JSON-RPC response frame. `result` and `error` are mutually
/// exclusive; exactly one is populated depending on [`Answer::ok`] /
/// [`Answer::err`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescription>,
}

impl Answer {
    pub fn ok(id: i64, result: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn err(id: i64, error: ErrorDescription) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_broker_error(id: i64, err: &BrokerError) -> Self {
        Self::err(id, err.to_error_description())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn dump(&self) -> BrokerResult<String> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips() {
        let cmd = Command::new(
            1,
            "ping",
            CommandParams {
                cid: "abcdefgh-0000000000000001-1".into(),
                data: "hello".into(),
                json: "{}".into(),
                task: None,
            },
        );
        let dumped = cmd.dump().unwrap();
        let parsed = Command::parse(dumped.trim_end()).unwrap();
        assert_eq!(cmd, parsed);
    }

    #[test]
    fn answer_success_omits_error_field() {
        let answer = Answer::ok(1, "pong");
        let dumped = answer.dump().unwrap();
        assert!(!dumped.contains("error"));
        let parsed: Answer = serde_json::from_str(dumped.trim_end()).unwrap();
        assert_eq!(answer, parsed);
    }

    #[test]
    fn answer_error_omits_result_field() {
        let answer = Answer::err(
            1,
            ErrorDescription {
                code: 7,
                message: "no such method".into(),
            },
        );
        let dumped = answer.dump().unwrap();
        assert!(!dumped.contains("\"result\""));
        assert!(answer.is_error());
    }

    #[test]
    fn command_parse_rejects_garbage() {
        assert!(Command::parse("not json").is_err());
    }
}
