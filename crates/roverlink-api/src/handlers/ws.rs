//! GET /ws: browser clients.
//!
//! Each outbound part goes out as one binary message. The sink's pending
//! counter drops back once a whole `Outbound` has been flushed, which is
//! what makes the client ready again.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use roverlink_services::{ClientId, GatewayEvent, MessageSink, Outbound, PendingBytes};

use super::ApiState;

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let id = state.ids.next();
    ws.on_upgrade(move |socket| serve_socket(id, socket, peer, state.events))
}

async fn serve_socket(
    id: ClientId,
    socket: WebSocket,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<GatewayEvent>,
) {
    let (sink, outgoing, pending) = MessageSink::new();
    tracing::info!(id, %peer, "websocket client connected");
    if events
        .send(GatewayEvent::ClientConnected {
            id,
            peer: peer.to_string(),
            sink: Box::new(sink),
        })
        .is_err()
    {
        return;
    }

    let (writer, mut reader) = socket.split();
    let mut write_task = tokio::spawn(write_loop(id, writer, outgoing, pending));

    loop {
        tokio::select! {
            msg = reader.next() => match msg {
                Some(Ok(Message::Binary(bytes))) => {
                    if events.send(GatewayEvent::Inbound { id, bytes }).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(id, error = %e, "websocket read failed");
                    break;
                }
            },
            _ = &mut write_task => break,
        }
    }

    write_task.abort();
    tracing::info!(id, %peer, "websocket client disconnected");
    let _ = events.send(GatewayEvent::ClientDisconnected { id });
}

async fn write_loop<W>(
    id: ClientId,
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<Outbound>,
    pending: PendingBytes,
) where
    W: futures::Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    while let Some(out) = outgoing.recv().await {
        let n = out.len();
        for part in out.into_parts() {
            if let Err(e) = writer.send(Message::Binary(part)).await {
                tracing::debug!(id, error = %e, "websocket write failed");
                return;
            }
        }
        pending.sent(n);
    }
    let _ = writer.close().await;
}
