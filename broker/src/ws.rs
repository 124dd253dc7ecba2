//! Web-socket surface: a thin `axum` accept-and-register path that feeds the
//! same worker pipeline as TCP connections. Matching the original's own
//! unfinished `runWsServer`, this is the full extent of it, no distinct
//! routing, no subscription push model.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};

use crate::instruction::{ClientGroup, Instruction, InstructionType, StateChanges};
use crate::jsonrpc::Command;
use crate::server::ConnectionServer;

pub fn router(server: Arc<ConnectionServer>) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .with_state(server)
}

async fn upgrade(
    State(server): State<Arc<ConnectionServer>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(server, socket))
}

/// A web-socket connection is assigned a CID exactly like a TCP accept, but
/// lands in the `WebSocketClient` group immediately, its transport already
/// establishes its role, so it bypasses the TCP registration handshake.
async fn handle_socket(server: Arc<ConnectionServer>, socket: WebSocket) {
    let data = server.css.new_connection();
    let cid = data.cid;
    server
        .css
        .update_state(&cid, StateChanges::Group(ClientGroup::WebSocketClient));
    server.stats.record_group(ClientGroup::WebSocketClient);
    tracing::debug!(%cid, "websocket connection accepted");

    let (mut sink, mut stream) = socket.split();
    let (reply_tx, reply_rx) = flume::bounded::<Instruction>(server.buffer_size.max(1));
    server.pool.append_back_channel(cid, reply_tx);

    let write_server = Arc::clone(&server);
    let write_task = tokio::spawn(async move {
        while let Ok(instruction) = reply_rx.recv_async().await {
            let mut ok = true;

            if let Some(answer) = &instruction.answer {
                match answer.dump() {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            ok = false;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize ws answer");
                        ok = false;
                    }
                }
            }

            if ok {
                if let Some(cmd) = &instruction.command {
                    if instruction.kind == InstructionType::Execute {
                        match cmd.dump() {
                            Ok(frame) => {
                                if sink.send(Message::Text(frame)).await.is_err() {
                                    ok = false;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize forwarded ws command");
                                ok = false;
                            }
                        }
                    }
                }
            }

            if !ok {
                write_server.stats.record_lost_connection();
                break;
            }

            if let Some(changes) = instruction.state_changes {
                if let StateChanges::Group(group) = changes {
                    write_server.stats.record_group(group);
                }
                write_server.css.update_state(&instruction.cid, changes);
            }

            if instruction.need_exit {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    });

    while let Some(received) = stream.next().await {
        let msg = match received {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        server.stats.record_incoming_bytes(trimmed.len());
        match Command::parse(trimmed) {
            Ok(cmd) => {
                let kind = server.registry.instruction_for(&cmd.method);
                let ins = Instruction::new(kind, cid).with_command(cmd);
                if server.pool.ingress().send_async(ins).await.is_err() {
                    break;
                }
            }
            Err(_) => {
                server.stats.record_bad_command();
            }
        }
    }

    server.pool.remove_back_channel(&cid);
    if server.css.client_in_group(&cid, ClientGroup::RpcServer) {
        server.registry.remove_server(&cid);
    }
    server.css.remove_connection(&cid);
    let _ = write_task.await;
    tracing::debug!(%cid, "websocket connection closed");
}
