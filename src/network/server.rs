//! WebSocket Game Server
//!
//! Async WebSocket server for two-player rooms.
//! Accepts connections, feeds their frames to the session manager one at a
//! time, and runs the timers for deferred broadcasts.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::game::room::{GameConfig, InvalidGameConfig};
use crate::network::handler;
use crate::network::protocol::ServerMessage;
use crate::network::session::{DeferredBroadcast, SessionManager};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Master seed for room codes and collapse draws; random when unset.
    pub rng_seed: Option<u64>,
    /// Rules for new rooms.
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            rng_seed: None,
            game: GameConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// The resulting game rules are unplayable.
    #[error(transparent)]
    Game(#[from] InvalidGameConfig),
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup, falling back to defaults
    /// for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let host: IpAddr = parse_var(&lookup, "TOWER_BIND_HOST")?.unwrap_or(config.bind_addr.ip());
        let port: u16 = parse_var(&lookup, "PORT")?.unwrap_or(config.bind_addr.port());
        config.bind_addr = SocketAddr::new(host, port);

        if let Some(max) = parse_var(&lookup, "TOWER_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        config.rng_seed = parse_var(&lookup, "TOWER_RNG_SEED")?;
        if let Some(layers) = parse_var(&lookup, "TOWER_LAYERS")? {
            config.game.layers = layers;
        }
        if let Some(ms) = parse_var(&lookup, "TOWER_COLLAPSE_DELAY_MS")? {
            config.game.collapse_broadcast_delay = Duration::from_millis(ms);
        }

        config.game.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session manager; every event is handled under this lock.
    sessions: Arc<Mutex<SessionManager>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sessions = match config.rng_seed {
            Some(seed) => SessionManager::with_seed(config.game.clone(), seed),
            None => SessionManager::new(config.game.clone()),
        };

        Self {
            config,
            sessions: Arc::new(Mutex::new(sessions)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.sessions.lock().await.connection_count();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let sessions = self.sessions.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<ServerMessage>();

            let conn = sessions.lock().await.connect(msg_tx);
            info!("{} opened from {}", conn, addr);

            // Writer: drains the outbound channel in order.
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let deferred = {
                                    let mut sessions = sessions.lock().await;
                                    handler::handle_text(&mut sessions, conn, &text)
                                };
                                for item in deferred {
                                    Self::schedule_deferred(sessions.clone(), item);
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                debug!("Dropped binary frame from {}", conn);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", conn);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", conn, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Dropping the session's sender lets the writer finish what is queued.
            sessions.lock().await.disconnect(conn);
            if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
                debug!("Writer for {} did not finish in time", conn);
            }

            info!("Client {} cleaned up", conn);
        });
    }

    /// Deliver `deferred` once its delay has elapsed.
    ///
    /// Not cancellable; the session manager ignores it if the room is gone.
    fn schedule_deferred(sessions: Arc<Mutex<SessionManager>>, deferred: DeferredBroadcast) {
        tokio::spawn(async move {
            tokio::time::sleep(deferred.delay).await;
            sessions.lock().await.deliver_deferred(deferred);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Shared handle to the session manager.
    pub fn sessions(&self) -> Arc<Mutex<SessionManager>> {
        self.sessions.clone()
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.sessions.lock().await.connection_count()
    }

    /// Get active room count.
    pub async fn room_count(&self) -> usize {
        self.sessions.lock().await.room_count()
    }
}
