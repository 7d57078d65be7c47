//! `SlipstreamServer` builder and accept loop.
//!
//! This is the entry point for running a Slipstream session server. It
//! ties together all the layers: transport → protocol → lobby/race.

use std::sync::Arc;

use slipstream_lobby::{Lobby, LobbyConfig};
use slipstream_race::{RaceConfig, RaceSession};
use slipstream_transport::{TcpTransport, Transport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::registry::Registry;
use crate::ServerError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks, interior
/// mutability via `Mutex` per concern. Lock order where more than one is
/// held: lobby → race → registry, and never across a socket write.
pub(crate) struct ServerState {
    pub(crate) registry: Mutex<Registry>,
    pub(crate) lobby: Mutex<Lobby>,
    pub(crate) race: Mutex<RaceSession>,
}

/// Builder for configuring and starting a Slipstream server.
///
/// # Example
///
/// ```rust,ignore
/// use slipstream::SlipstreamServer;
///
/// let server = SlipstreamServer::builder()
///     .bind("0.0.0.0:5000")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct SlipstreamServerBuilder {
    bind_addr: String,
    lobby_config: LobbyConfig,
    race_config: RaceConfig,
}

impl SlipstreamServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            lobby_config: LobbyConfig::default(),
            race_config: RaceConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the lobby configuration.
    pub fn lobby_config(mut self, config: LobbyConfig) -> Self {
        self.lobby_config = config;
        self
    }

    /// Sets the race configuration.
    pub fn race_config(mut self, config: RaceConfig) -> Self {
        self.race_config = config;
        self
    }

    /// Binds the listener and builds the server.
    pub async fn build(self) -> Result<SlipstreamServer, ServerError> {
        let transport = TcpTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Mutex::new(Registry::new()),
            lobby: Mutex::new(Lobby::new(self.lobby_config)),
            race: Mutex::new(RaceSession::new(self.race_config)),
        });

        Ok(SlipstreamServer { transport, state })
    }
}

impl Default for SlipstreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Slipstream session server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SlipstreamServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
}

impl SlipstreamServer {
    /// Creates a new builder.
    pub fn builder() -> SlipstreamServerBuilder {
        SlipstreamServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("Slipstream server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
