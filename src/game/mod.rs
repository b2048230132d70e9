//! Game Logic Module
//!
//! Tower rules and room state. No I/O; randomness is injected.
//!
//! ## Module Structure
//!
//! - `tower`: Block layout, removal rules, scoring values
//! - `collapse`: Collapse checks after each removal
//! - `room_code`: Room code alphabet and generation
//! - `room`: Seats, turn order, scores, game lifecycle

pub mod tower;
pub mod collapse;
pub mod room_code;
pub mod room;

// Re-export key types
pub use tower::{Block, BlockId, InvalidMove, Tower, TowerError};
pub use collapse::{resolve_collapse, CollapseConfig, CollapseOutcome};
pub use room_code::RoomCode;
pub use room::{GameConfig, Player, Removal, Room, RoomError, RoomPhase, Seat};
