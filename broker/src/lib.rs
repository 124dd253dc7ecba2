//! A line-oriented JSON-RPC broker multiplexing application clients, RPC
//! servers, and web-socket clients over long-lived TCP (and web-socket)
//! connections. See `SPEC_FULL.md` at the repo root for the full design.

pub mod cid;
pub mod config;
pub mod css;
pub mod errors;
pub mod handlers;
pub mod instruction;
pub mod jsonrpc;
pub mod registry;
pub mod server;
pub mod stats;
pub mod worker;
pub mod ws;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use config::Config;
use css::Css;
use errors::BrokerResult;
use handlers::{HandlerContext, HandlerTable};
use registry::MethodRegistry;
use server::ConnectionServer;
use stats::Stats;
use worker::WorkerPool;

/// Everything constructed once at startup and wired together: the pieces
/// the original's `coresupport.CoreWorkerManager` held.
pub struct Broker {
    pub css: Arc<Css>,
    pub registry: Arc<MethodRegistry>,
    pub stats: Arc<Stats>,
    pub pool: Arc<WorkerPool>,
    pub connection_server: Arc<ConnectionServer>,
    pub config: Config,
}

impl Broker {
    pub fn new(config: Config) -> Self {
        let css = Arc::new(Css::new(config.shard_count(), config.shard_size));
        let registry = Arc::new(MethodRegistry::new());
        let stats = Arc::new(Stats::new());
        let task_ids = Arc::new(cid::TaskIdGenerator::new());
        let key_dir = Arc::new(config.key_dir_path());

        let ctx = HandlerContext {
            css: Arc::clone(&css),
            registry: Arc::clone(&registry),
            task_ids,
            stats: Arc::clone(&stats),
            key_dir,
        };
        let table = Arc::new(HandlerTable::with_builtins());
        let pool = Arc::new(WorkerPool::new(
            config.buffer_size,
            config.shard_count(),
            table,
            ctx,
        ));

        let active = Arc::new(AtomicBool::new(true));
        let connection_server = Arc::new(ConnectionServer {
            css: Arc::clone(&css),
            registry: Arc::clone(&registry),
            pool: Arc::clone(&pool),
            stats: Arc::clone(&stats),
            buffer_size: config.buffer_size,
            status_check_period: config.status_check_period_duration(),
            active,
            node: config.node.clone(),
        });

        Self {
            css,
            registry,
            stats,
            pool,
            connection_server,
            config,
        }
    }

    /// Spawns the worker pool, TCP acceptor, optional web-socket acceptor,
    /// and the stats tick; runs until `stop` fires (or a fatal accept-loop
    /// error occurs), then returns.
    pub async fn run(
        self: Arc<Self>,
        stop_tx: tokio::sync::broadcast::Sender<()>,
    ) -> BrokerResult<()> {
        self.pool
            .spawn_workers(self.config.workers, stop_tx.clone());

        if self.config.statistic {
            let stats = Arc::clone(&self.stats);
            let period = self.config.status_check_period_duration();
            tokio::spawn(stats.run_periodic_log(period, stop_tx.subscribe()));
        }

        if self.config.ws_enabled {
            let ws_server = Arc::clone(&self.connection_server);
            let ws_addr = self.config.ws_addr.clone();
            let ws_port = self.config.ws_port;
            let mut ws_stop = stop_tx.subscribe();
            tokio::spawn(async move {
                let router = ws::router(ws_server);
                let socket_addr: std::net::SocketAddr = match format!("{ws_addr}:{ws_port}").parse()
                {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::error!(error = %e, ws_addr, ws_port, "invalid websocket address");
                        return;
                    }
                };
                tracing::info!(addr = %ws_addr, port = ws_port, "websocket listening");
                let serve = axum::Server::bind(&socket_addr).serve(router.into_make_service());
                tokio::select! {
                    result = serve => {
                        if let Err(e) = result {
                            tracing::error!(error = %e, "websocket server error");
                        }
                    }
                    _ = ws_stop.recv() => {
                        tracing::info!("websocket server stopping");
                    }
                }
            });
        }

        self.connection_server
            .clone()
            .run(&self.config.addr, self.config.port, stop_tx.subscribe())
            .await
            .map_err(errors::BrokerError::Io)
    }
}
