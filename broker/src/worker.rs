//! Worker Pool: drains the ingress instruction channel, dispatches through
//! the Handler Table, and fans outbound instructions out to per-connection
//! reply channels.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cid::ConnectionId;
use crate::errors::BrokerError;
use crate::handlers::{HandlerContext, HandlerTable};
use crate::instruction::{Instruction, InstructionType};
use crate::jsonrpc::Answer;

pub type ReplySender = flume::Sender<Instruction>;
pub type ReplyReceiver = flume::Receiver<Instruction>;

struct ReplyShard {
    channels: std::collections::HashMap<u64, ReplySender>,
}

/// Reply-channel registry, sharded the same way CSS is so shard locks for
/// the two structures never need to interleave in a surprising order.
pub struct ReplyRegistry {
    shards: Vec<RwLock<ReplyShard>>,
}

impl ReplyRegistry {
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| {
                RwLock::new(ReplyShard {
                    channels: std::collections::HashMap::new(),
                })
            })
            .collect();
        Self { shards }
    }

    pub fn append(&self, cid: ConnectionId, sender: ReplySender) {
        if let Some(shard) = self.shard_for(&cid) {
            shard.write().channels.insert(cid.sequence, sender);
        }
    }

    pub fn remove(&self, cid: &ConnectionId) {
        if let Some(shard) = self.shard_for(cid) {
            shard.write().channels.remove(&cid.sequence);
        }
    }

    /// Clones the sender handle under a shard read lock, then releases
    /// before the caller sends, a shard lock is never held across a send.
    fn sender_for(&self, cid: &ConnectionId) -> Option<ReplySender> {
        let shard = self.shard_for(cid)?;
        shard.read().channels.get(&cid.sequence).cloned()
    }

    fn shard_for(&self, cid: &ConnectionId) -> Option<&RwLock<ReplyShard>> {
        if cid.shard == 0 {
            return None;
        }
        self.shards.get(cid.shard as usize - 1)
    }
}

/// Shared pool state: ingress queue, reply registry, handler table, and the
/// handler context threaded into every dispatch.
pub struct WorkerPool {
    ingress_tx: flume::Sender<Instruction>,
    ingress_rx: flume::Receiver<Instruction>,
    pub replies: Arc<ReplyRegistry>,
    table: Arc<HandlerTable>,
    ctx: HandlerContext,
}

impl WorkerPool {
    pub fn new(buffer_size: usize, shard_count: usize, table: Arc<HandlerTable>, ctx: HandlerContext) -> Self {
        let (ingress_tx, ingress_rx) = flume::bounded(buffer_size.max(1));
        Self {
            ingress_tx,
            ingress_rx,
            replies: Arc::new(ReplyRegistry::new(shard_count)),
            table,
            ctx,
        }
    }

    pub fn ingress(&self) -> flume::Sender<Instruction> {
        self.ingress_tx.clone()
    }

    pub fn append_back_channel(&self, cid: ConnectionId, sender: ReplySender) {
        self.replies.append(cid, sender);
    }

    pub fn remove_back_channel(&self, cid: &ConnectionId) {
        self.replies.remove(cid);
    }

    /// Spawns `count` worker tasks, each looping until `stop` fires.
    pub fn spawn_workers(self: &Arc<Self>, count: usize, stop: tokio::sync::broadcast::Sender<()>) {
        for index in 0..count.max(1) {
            let pool = Arc::clone(self);
            let mut stop_rx = stop.subscribe();
            tokio::spawn(async move {
                tracing::debug!(worker = index, "worker started");
                loop {
                    tokio::select! {
                        biased;
                        _ = stop_rx.recv() => {
                            tracing::debug!(worker = index, "worker stopping");
                            break;
                        }
                        received = pool.ingress_rx.recv_async() => {
                            match received {
                                Ok(instruction) => pool.dispatch(instruction).await,
                                Err(_) => break,
                            }
                        }
                    }
                }
            });
        }
    }

    async fn dispatch(&self, instruction: Instruction) {
        let outbound = self.run_handlers(&instruction);
        for out in outbound {
            self.deliver(out).await;
        }
    }

    fn run_handlers(&self, instruction: &Instruction) -> Vec<Instruction> {
        let Some(pre) = self.table.pre(instruction.kind) else {
            let answer = Answer::from_broker_error(
                0,
                &BrokerError::Internal(format!("no handler for {:?}", instruction.kind)),
            );
            return vec![Instruction::new(InstructionType::Skip, instruction.cid).with_answer(answer)];
        };

        let mut out = pre(&self.ctx, instruction);
        out.cid = instruction.cid;

        let mut outbound = Vec::with_capacity(1);
        let secondaries = if out.succeeded() {
            self.table
                .post(instruction.kind)
                .map(|post| post(&self.ctx, instruction, &out))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        outbound.push(out);
        outbound.extend(secondaries);
        outbound
    }

    async fn deliver(&self, instruction: Instruction) {
        let cid = instruction.cid;
        match self.replies.sender_for(&cid) {
            Some(sender) => {
                if sender.send_async(instruction).await.is_err() {
                    tracing::debug!(%cid, "reply channel closed before delivery");
                }
            }
            None => {
                tracing::debug!(%cid, "no reply channel registered, dropping instruction");
            }
        }
    }
}
