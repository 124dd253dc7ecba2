//! Handler Table: tag → (pre-handler, optional post-handler) dispatch.
//!
//! Built once at startup and shared as `Arc<HandlerTable>` so the worker
//! pool never introspects instruction types beyond the tag lookup.

mod auth;
mod external;
mod exit;
mod ping;
mod registration;
mod result;
mod status;

use std::collections::HashMap;
use std::sync::Arc;

use crate::cid::TaskIdGenerator;
use crate::css::Css;
use crate::instruction::{Instruction, InstructionType};
use crate::registry::MethodRegistry;
use crate::stats::Stats;

/// Everything a handler needs besides the instruction it is given.
/// Cloned cheaply (all fields are `Arc`s) and handed to every worker.
#[derive(Clone)]
pub struct HandlerContext {
    pub css: Arc<Css>,
    pub registry: Arc<MethodRegistry>,
    pub task_ids: Arc<TaskIdGenerator>,
    pub stats: Arc<Stats>,
    pub key_dir: Arc<std::path::PathBuf>,
}

pub type PreHandler = fn(&HandlerContext, &Instruction) -> Instruction;
pub type PostHandler = fn(&HandlerContext, &Instruction, &Instruction) -> Vec<Instruction>;

struct HandlerEntry {
    pre: PreHandler,
    post: Option<PostHandler>,
}

/// Read-only after construction; handed around as `Arc<HandlerTable>`.
pub struct HandlerTable {
    entries: HashMap<InstructionType, HandlerEntry>,
}

impl HandlerTable {
    /// Builds the table with every built-in handler installed (§4.3).
    pub fn with_builtins() -> Self {
        let mut table = HandlerTable {
            entries: HashMap::new(),
        };
        table.setup(InstructionType::Ping, ping::pre, None);
        table.setup(InstructionType::Auth, auth::pre, None);
        table.setup(InstructionType::Registration, registration::pre, None);
        table.setup(InstructionType::Status, status::pre, None);
        table.setup(InstructionType::External, external::pre, Some(external::post));
        table.setup(InstructionType::Result, result::pre, Some(result::post));
        table.setup(InstructionType::Exit, exit::pre, None);
        table
    }

    pub fn setup(&mut self, tag: InstructionType, pre: PreHandler, post: Option<PostHandler>) {
        self.entries.insert(tag, HandlerEntry { pre, post });
    }

    pub fn pre(&self, tag: InstructionType) -> Option<PreHandler> {
        self.entries.get(&tag).map(|entry| entry.pre)
    }

    pub fn post(&self, tag: InstructionType) -> Option<PostHandler> {
        self.entries.get(&tag).and_then(|entry| entry.post)
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}
