//! Connection Server: TCP accept loop, per-connection read/write loops,
//! and CSS/registry lifecycle hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::cid::ConnectionId;
use crate::css::Css;
use crate::instruction::{ClientGroup, Instruction, InstructionType, StateChanges};
use crate::jsonrpc::Command;
use crate::registry::MethodRegistry;
use crate::stats::Stats;
use crate::worker::WorkerPool;

pub struct ConnectionServer {
    pub css: Arc<Css>,
    pub registry: Arc<MethodRegistry>,
    pub pool: Arc<WorkerPool>,
    pub stats: Arc<Stats>,
    pub buffer_size: usize,
    pub status_check_period: Duration,
    pub active: Arc<AtomicBool>,
    /// The configured node label, folded into connection-level logging
    /// context only, it plays no part in the CID string itself (§6).
    pub node: String,
}

impl ConnectionServer {
    pub async fn run(
        self: Arc<Self>,
        addr: &str,
        port: u16,
        stop: tokio::sync::broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind((addr, port)).await?;
        tracing::info!(addr, port, "listening");
        self.serve(listener, stop).await
    }

    /// Runs the accept loop against an already-bound listener, split out
    /// from `run` so tests can bind an ephemeral port and discover it via
    /// `local_addr()` before connecting.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut stop: tokio::sync::broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        loop {
            tokio::select! {
                _ = stop.recv() => {
                    tracing::info!("accept loop stopping");
                    break;
                }
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    if !self.active.load(Ordering::SeqCst) {
                        break;
                    }
                    self.clone().spawn_connection(socket, peer.to_string(), stop.resubscribe());
                }
            }
        }
        Ok(())
    }

    fn spawn_connection(
        self: Arc<Self>,
        socket: TcpStream,
        peer: String,
        stop: tokio::sync::broadcast::Receiver<()>,
    ) {
        if let Err(e) = configure_keepalive(&socket, self.status_check_period) {
            tracing::warn!(error = %e, peer, "failed to configure keepalive");
        }

        let data = self.css.new_connection();
        let cid = data.cid;
        tracing::debug!(%cid, peer, node = %self.node, "connection accepted");

        tokio::spawn(async move {
            self.read_loop(socket, cid, stop).await;
        });
    }

    async fn read_loop(
        self: Arc<Self>,
        socket: TcpStream,
        cid: ConnectionId,
        mut stop: tokio::sync::broadcast::Receiver<()>,
    ) {
        let (read_half, write_half) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        let (reply_tx, reply_rx) = flume::bounded::<Instruction>(self.buffer_size.max(1));
        self.pool.append_back_channel(cid, reply_tx);
        let write_server = Arc::clone(&self);
        let write_task = tokio::spawn(async move { write_server.write_loop(write_half, reply_rx).await });

        let mut line = String::new();
        let mut broken = false;
        loop {
            line.clear();
            tokio::select! {
                _ = stop.recv() => { break; }
                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => {
                            broken = true;
                            break;
                        }
                        Ok(n) => {
                            self.stats.record_incoming_bytes(n);
                            let trimmed = line.trim_end();
                            if trimmed.is_empty() {
                                continue;
                            }
                            match Command::parse(trimmed) {
                                Ok(cmd) => {
                                    let kind = self.registry.instruction_for(&cmd.method);
                                    let ins = Instruction::new(kind, cid).with_command(cmd);
                                    if self.pool.ingress().send_async(ins).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => {
                                    self.stats.record_bad_command();
                                }
                            }
                        }
                        Err(_) => {
                            break;
                        }
                    }
                }
            }
        }

        self.pool.remove_back_channel(&cid);
        if broken && self.css.client_in_group(&cid, ClientGroup::RpcServer) {
            self.registry.remove_server(&cid);
        }
        self.css.remove_connection(&cid);
        let _ = write_task.await;
        tracing::debug!(%cid, "connection closed");
    }

    /// Drains one connection's reply channel, serializing each instruction's
    /// answer and/or forwarded command back to the socket. A `StateChanges`
    /// riding along is only applied to CSS once its carrying frame has been
    /// written successfully (§5 ordering guarantee).
    async fn write_loop(
        self: Arc<Self>,
        mut write_half: tokio::net::tcp::OwnedWriteHalf,
        reply_rx: flume::Receiver<Instruction>,
    ) {
        while let Ok(instruction) = reply_rx.recv_async().await {
            let mut write_ok = true;

            if let Some(answer) = &instruction.answer {
                match answer.dump() {
                    Ok(frame) => {
                        if write_half.write_all(frame.as_bytes()).await.is_err() {
                            write_ok = false;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize answer");
                        write_ok = false;
                    }
                }
            }

            if write_ok {
                if let Some(cmd) = &instruction.command {
                    if instruction.kind == InstructionType::Execute {
                        match cmd.dump() {
                            Ok(frame) => {
                                if write_half.write_all(frame.as_bytes()).await.is_err() {
                                    write_ok = false;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize forwarded command");
                                write_ok = false;
                            }
                        }
                    }
                }
            }

            if !write_ok {
                self.stats.record_lost_connection();
                break;
            }

            if let Some(changes) = instruction.state_changes {
                if let StateChanges::Group(group) = changes {
                    self.stats.record_group(group);
                }
                self.css.update_state(&instruction.cid, changes);
            }

            if instruction.need_exit {
                let _ = write_half.shutdown().await;
                break;
            }
        }
    }
}

fn configure_keepalive(socket: &TcpStream, status_check_period: Duration) -> std::io::Result<()> {
    let keepalive = socket2::TcpKeepalive::new().with_time(status_check_period + Duration::from_secs(1));
    let sock_ref = socket2::SockRef::from(socket);
    sock_ref.set_tcp_keepalive(&keepalive)
}
