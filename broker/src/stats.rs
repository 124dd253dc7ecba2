//! Lightweight statistics sink: atomic counters drained on a periodic
//! `tracing::info!` tick, replacing the original's standalone `statistic`
//! package with something small enough to live inline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-lifetime counters. All fields are independently atomic; no
/// cross-field consistency is promised between a `tick()` read and the
/// next increment.
#[derive(Debug, Default)]
pub struct Stats {
    incoming_bytes: AtomicU64,
    bad_command_count: AtomicU64,
    lost_connection_count: AtomicU64,
    connections_by_group: [AtomicU64; 4],
    tasks_dispatched: AtomicU64,
    tasks_orphaned: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_incoming_bytes(&self, len: usize) {
        self.incoming_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_bad_command(&self) {
        self.bad_command_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost_connection(&self) {
        self.lost_connection_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group(&self, group: crate::instruction::ClientGroup) {
        let index = match group {
            crate::instruction::ClientGroup::Unset => 0,
            crate::instruction::ClientGroup::RpcServer => 1,
            crate::instruction::ClientGroup::ApplicationClient => 2,
            crate::instruction::ClientGroup::WebSocketClient => 3,
        };
        self.connections_by_group[index].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_dispatched(&self) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_orphaned(&self) {
        self.tasks_orphaned.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            incoming_bytes: self.incoming_bytes.load(Ordering::Relaxed),
            bad_command_count: self.bad_command_count.load(Ordering::Relaxed),
            lost_connection_count: self.lost_connection_count.load(Ordering::Relaxed),
            rpc_servers: self.connections_by_group[1].load(Ordering::Relaxed),
            app_clients: self.connections_by_group[2].load(Ordering::Relaxed),
            ws_clients: self.connections_by_group[3].load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_orphaned: self.tasks_orphaned.load(Ordering::Relaxed),
        }
    }

    /// Runs until `shutdown` fires, logging a snapshot every `period`.
    pub async fn run_periodic_log(
        self: std::sync::Arc<Self>,
        period: Duration,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snap = self.snapshot();
                    tracing::info!(
                        incoming_bytes = snap.incoming_bytes,
                        bad_command_count = snap.bad_command_count,
                        lost_connection_count = snap.lost_connection_count,
                        rpc_servers = snap.rpc_servers,
                        app_clients = snap.app_clients,
                        ws_clients = snap.ws_clients,
                        tasks_dispatched = snap.tasks_dispatched,
                        tasks_orphaned = snap.tasks_orphaned,
                        "status tick"
                    );
                }
                _ = shutdown.recv() => {
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StatsSnapshot {
    incoming_bytes: u64,
    bad_command_count: u64,
    lost_connection_count: u64,
    rpc_servers: u64,
    app_clients: u64,
    ws_clients: u64,
    tasks_dispatched: u64,
    tasks_orphaned: u64,
}
