//! Raw TCP client transport.
//!
//! One reader and one writer task per connection. Packets the gateway
//! queues for a client are written in order; each completed write is
//! reported back so the client becomes ready again. Connections are
//! tracked by the listener and closed when it shuts down.

use std::net::SocketAddr;

use anyhow::Result;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use roverlink_services::{ClientId, ClientIdGen, GatewayEvent, Outbound, StreamSink};

const READ_CHUNK: usize = 4096;

pub struct StreamListener {
    listener: TcpListener,
    events: mpsc::UnboundedSender<GatewayEvent>,
    ids: ClientIdGen,
    shutdown: broadcast::Receiver<()>,
    connections: TaskTracker,
    close: CancellationToken,
}

impl StreamListener {
    pub fn new(
        listener: TcpListener,
        events: mpsc::UnboundedSender<GatewayEvent>,
        ids: ClientIdGen,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            events,
            ids,
            shutdown,
            connections: TaskTracker::new(),
            close: CancellationToken::new(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "stream listener ready");
        }
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!(open = self.connections.len(), "stream listener shutting down");
                    self.close.cancel();
                    self.connections.close();
                    self.connections.wait().await;
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let id = self.ids.next();
                    self.connections.spawn(serve_connection(
                        id,
                        stream,
                        peer,
                        self.events.clone(),
                        self.close.child_token(),
                    ));
                }
            }
        }
    }
}

async fn serve_connection(
    id: ClientId,
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<GatewayEvent>,
    close: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(id, error = %e, "set_nodelay failed");
    }
    let (mut reader, writer) = stream.into_split();
    let (sink, outgoing) = StreamSink::new();

    tracing::info!(id, %peer, "stream client connected");
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

    let mut write_task = tokio::spawn(write_loop(id, writer, outgoing, events.clone()));

    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        tokio::select! {
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    let bytes = buf.split().freeze();
                    if events.send(GatewayEvent::Inbound { id, bytes }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(id, error = %e, "read failed");
                    break;
                }
            },
            _ = &mut write_task => break,
            _ = close.cancelled() => break,
        }
    }

    write_task.abort();
    tracing::info!(id, %peer, "stream client disconnected");
    let _ = events.send(GatewayEvent::ClientDisconnected { id });
}

/// Ends when the gateway drops the client's sink or a write fails.
async fn write_loop(
    id: ClientId,
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<GatewayEvent>,
) {
    while let Some(out) = outgoing.recv().await {
        let bytes = out.len();
        for part in out.into_parts() {
            if let Err(e) = writer.write_all(&part).await {
                tracing::debug!(id, error = %e, "write failed");
                return;
            }
        }
        if events.send(GatewayEvent::WriteComplete { id, bytes }).is_err() {
            return;
        }
    }
    let _ = writer.shutdown().await;
}
