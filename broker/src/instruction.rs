//! Internal envelope routed through the worker pool, and the state-change
//! descriptor applied to CSS after a frame is written.

use crate::cid::ConnectionId;
use crate::jsonrpc::{Answer, Command};

/// Connection role, assigned once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientGroup {
    Unset,
    RpcServer,
    ApplicationClient,
    WebSocketClient,
}

impl ClientGroup {
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            1 => Some(ClientGroup::RpcServer),
            2 => Some(ClientGroup::ApplicationClient),
            3 => Some(ClientGroup::WebSocketClient),
            _ => None,
        }
    }
}

/// `Active` accepts new routed work; `Busy` is skipped by the RPC router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Active,
    Busy,
}

/// Wire encoding of the original's `ClientProcStatusBusy` (2); any other
/// value, including the original's `ClientProcStatusFree` (1), is Active.
const WIRE_BUSY: u16 = 2;

impl ConnectionStatus {
    pub fn from_wire(value: u16) -> Self {
        if value == WIRE_BUSY {
            ConnectionStatus::Busy
        } else {
            ConnectionStatus::Active
        }
    }
}

/// What subset of [`crate::css::ConnectionState`] an instruction's
/// `StateChanges` should overwrite. Consumed once, after the carrying
/// frame is successfully written to the socket.
#[derive(Debug, Clone)]
pub enum StateChanges {
    Skip,
    Auth(bool),
    Group(ClientGroup),
    Status(ConnectionStatus),
    All {
        auth: bool,
        group: ClientGroup,
        status: ConnectionStatus,
    },
}

/// The small-integer tag used to look up a handler in the handler table.
/// Mirrors the original's `TypeInstruction*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionType {
    Skip,
    Exit,
    Ping,
    Auth,
    Registration,
    Status,
    /// Any method a registered RPC server has exported.
    External,
    /// A server delivering a task's result back to the broker.
    Result,
    /// A forwarded call from the broker to the chosen RPC server,
    /// produced by the External pre-handler's post-handler, never looked
    /// up directly from a wire method name.
    Execute,
}

/// The envelope a worker both consumes from ingress and produces onto
/// reply channels.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub kind: InstructionType,
    pub cid: ConnectionId,
    pub command: Option<Command>,
    pub answer: Option<Answer>,
    pub state_changes: Option<StateChanges>,
    pub need_exit: bool,
}

impl Instruction {
    pub fn new(kind: InstructionType, cid: ConnectionId) -> Self {
        Self {
            kind,
            cid,
            command: None,
            answer: None,
            state_changes: None,
            need_exit: false,
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_answer(mut self, answer: Answer) -> Self {
        self.answer = Some(answer);
        self
    }

    pub fn with_state_changes(mut self, changes: StateChanges) -> Self {
        self.state_changes = Some(changes);
        self
    }

    pub fn with_exit(mut self) -> Self {
        self.need_exit = true;
        self
    }

    /// Whether the pre-handler's answer signals success (no error),
    /// required before a post-handler is allowed to run.
    pub fn succeeded(&self) -> bool {
        self.answer.as_ref().map(|a| !a.is_error()).unwrap_or(true)
    }
}
