//! Network Layer
//!
//! WebSocket server for two-player rooms.
//! All game rules live in `game/`; this layer routes requests and fans out
//! the resulting events.

pub mod protocol;
pub mod broadcast;
pub mod session;
pub mod handler;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ErrorCode, RoomStateInfo};
pub use broadcast::{ClientRegistry, ConnectionId};
pub use session::{DeferredBroadcast, SessionError, SessionManager};
pub use server::{GameServer, ServerConfig, GameServerError, ConfigError};
