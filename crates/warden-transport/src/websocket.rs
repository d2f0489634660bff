//! WebSocket listener using `tokio-tungstenite`.
//!
//! Each accepted socket is split in two. The read half becomes an
//! [`Inbound`] that the server's connection task polls. The write half
//! is owned by a spawned writer task that drains the attendant's
//! [`Outbox`], encoding each message with the listener's codec.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use warden_wire::Codec;

use crate::{Attendant, ConnectionId, Outbound, Outbox, ServerId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Accepts WebSocket connections for one server instance.
pub struct WebSocketListener<C> {
    listener: TcpListener,
    server: ServerId,
    codec: C,
}

impl<C: Codec + Clone> WebSocketListener<C> {
    /// Binds a listener to `addr`. Connections it accepts belong to `server`.
    pub async fn bind(
        addr: &str,
        server: ServerId,
        codec: C,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, %server, "WebSocket listener bound");
        Ok(Self {
            listener,
            server,
            codec,
        })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next connection and completes the WebSocket upgrade.
    ///
    /// Spawns the connection's writer task before returning.
    pub async fn accept(&self) -> Result<(Arc<Attendant>, Inbound), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, server = %self.server, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        let (attendant, outbox) = Attendant::channel(self.server, id);
        tokio::spawn(write_loop(id, sink, outbox, self.codec.clone()));

        Ok((attendant, Inbound { id, stream }))
    }
}

/// Read half of an accepted connection.
pub struct Inbound {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl Inbound {
    /// Returns the connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receives the next data frame.
    ///
    /// Returns `Ok(None)` when the peer closes the connection cleanly.
    /// Ping/pong frames are skipped.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(WsMessage::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(WsMessage::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }
}

/// Drains the outbox into the socket until the attendant asks to close,
/// every attendant handle is dropped, or the socket fails.
async fn write_loop<C: Codec>(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outbox: Outbox,
    codec: C,
) {
    while let Some(item) = outbox.recv().await {
        let msg = match item {
            Outbound::Message(msg) => msg,
            Outbound::Close => break,
        };
        let bytes = match codec.encode(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%id, event = %msg.event, error = %e, "dropping unencodable message");
                continue;
            }
        };
        if let Err(e) = sink.send(WsMessage::Binary(bytes.into())).await {
            tracing::debug!(%id, error = %e, "send failed, stopping writer");
            break;
        }
    }
    let _ = sink.close().await;
    tracing::debug!(%id, "writer stopped");
}
