//! `WardenServer` builder and server loop.
//!
//! This is the entry point for running a Warden server. It ties the
//! layers together: transport → wire → protocols (auth and whatever
//! depends on it).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use warden_transport::{ServerId, TransportError, WebSocketListener};
use warden_wire::JsonCodec;

use crate::WardenError;
use crate::handler::handle_connection;
use crate::protocol::{Protocol, ProtocolStack};

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,
    /// A connection that sends nothing for this long is dropped.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) id: ServerId,
    pub(crate) stack: ProtocolStack,
    pub(crate) codec: JsonCodec,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Warden server.
///
/// # Example
///
/// ```rust,ignore
/// use warden::prelude::*;
///
/// let auth = Arc::new(AuthProtocol::builder().realm("main", realm).build());
/// let server = WardenServer::builder()
///     .bind("0.0.0.0:8080")
///     .protocol(auth)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct WardenServerBuilder {
    config: ServerConfig,
    protocols: Vec<Arc<dyn Protocol>>,
}

impl WardenServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            protocols: Vec::new(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a protocol. Its dependencies are pulled in automatically.
    pub fn protocol(mut self, protocol: Arc<dyn Protocol>) -> Self {
        self.protocols.push(protocol);
        self
    }

    /// Resolves the protocol stack and binds the listener.
    ///
    /// Uses `JsonCodec` over WebSocket.
    ///
    /// # Errors
    /// [`WardenError::DuplicateHandler`] if two protocols claim the same
    /// command; [`WardenError::Transport`] if binding fails.
    pub async fn build(self) -> Result<WardenServer, WardenError> {
        let stack = ProtocolStack::new(self.protocols)?;
        let id = ServerId::next();
        let listener = WebSocketListener::bind(&self.config.bind_addr, id, JsonCodec).await?;

        let state = Arc::new(ServerState {
            id,
            stack,
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(WardenServer { listener, state })
    }
}

impl Default for WardenServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Warden server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct WardenServer {
    listener: WebSocketListener<JsonCodec>,
    state: Arc<ServerState>,
}

impl WardenServer {
    /// Creates a new builder.
    pub fn builder() -> WardenServerBuilder {
        WardenServerBuilder::new()
    }

    pub fn id(&self) -> ServerId {
        self.state.id
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), WardenError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then fires every
    /// protocol's `stopped` hook.
    ///
    /// Connections already accepted keep their tasks; they end on their
    /// own when the peer disconnects or goes idle.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), WardenError>
    where
        F: Future<Output = ()>,
    {
        let server = self.state.id;
        let addr = self
            .listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;
        self.state.stack.started(server, addr);
        tracing::info!(%server, %addr, protocols = self.state.stack.len(), "Warden server running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((attendant, inbound)) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(handle_connection(attendant, inbound, state));
                    }
                    Err(e) => {
                        tracing::error!(%server, error = %e, "accept failed");
                    }
                },
            }
        }

        self.state.stack.stopped(server);
        tracing::info!(%server, "Warden server stopped");
        Ok(())
    }
}
