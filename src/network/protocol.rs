//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object with a `type` discriminator; field names
//! are camelCase to match the browser clients.

use serde::{Serialize, Deserialize};

use crate::game::room::{Player, Room, Seat};
use crate::game::room_code::RoomCode;
use crate::game::tower::{Block, BlockId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Open a new room and take seat 1.
    CreateRoom(CreateRoomRequest),

    /// Take the free seat of an existing room.
    JoinRoom(JoinRoomRequest),

    /// Pull a block out of the tower.
    RemoveBlock(RemoveBlockRequest),

    /// Start a fresh game in the current room.
    Restart,
}

/// Create-room request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Requested display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Join-room request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Requested display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Code as typed by the player (any case, may carry whitespace).
    #[serde(default)]
    pub room_code: String,
}

/// Remove-block request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBlockRequest {
    /// Block to remove.
    pub block_id: BlockId,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Room opened; sent to its creator.
    RoomCreated(SeatAssignment),

    /// Seat taken; sent to the joiner.
    RoomJoined(SeatAssignment),

    /// A request was refused; sent to the requester only.
    Error(ServerError),

    /// Both seats filled and play begins.
    GameStart(Notice),

    /// Full room snapshot.
    RoomState(RoomStateInfo),

    /// A block was pulled out.
    BlockRemoved(BlockRemovedInfo),

    /// The tower fell; sent after the presentation delay.
    TowerCollapsed(CollapseInfo),

    /// A fresh game is starting.
    GameRestart,

    /// The opponent disconnected.
    PlayerLeft(Notice),
}

/// Room code and seat handed to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAssignment {
    /// Room code.
    pub room_code: RoomCode,
    /// Seat number.
    pub player_number: Seat,
}

/// Free-form notice text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    /// Text for display.
    pub message: String,
}

impl Notice {
    /// Create a notice.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Player entry in state and score lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Display name.
    pub name: String,
    /// Current score.
    pub score: u32,
    /// Seat number.
    pub number: Seat,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            score: player.score,
            number: player.seat,
        }
    }
}

/// Full room snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateInfo {
    /// Room code.
    pub room_code: RoomCode,
    /// Seated players.
    pub players: Vec<PlayerSummary>,
    /// Every block, removed or not.
    pub blocks: Vec<Block>,
    /// Seat to move.
    pub current_turn: Seat,
    /// Game running or finished (false once abandoned).
    pub game_started: bool,
    /// Game ended.
    pub game_over: bool,
    /// Winner, once decided.
    pub winner: Option<Seat>,
}

impl From<&Room> for RoomStateInfo {
    fn from(room: &Room) -> Self {
        Self {
            room_code: room.code().clone(),
            players: room.players().iter().map(PlayerSummary::from).collect(),
            blocks: room.tower().blocks().to_vec(),
            current_turn: room.current_turn(),
            game_started: room.game_started(),
            game_over: room.game_over(),
            winner: room.winner(),
        }
    }
}

/// Block removal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRemovedInfo {
    /// Removed block.
    pub block_id: BlockId,
    /// Mover's seat.
    pub removed_by: Seat,
    /// Mover's name.
    pub player_name: String,
}

/// Tower collapse result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapseInfo {
    /// Seat whose move toppled the tower.
    pub collapsed_by: Seat,
    /// Winning seat, if an opponent was seated.
    pub winner: Option<Seat>,
    /// Winner's name, or `Nobody`.
    pub winner_name: String,
    /// Final scores.
    pub scores: Vec<PlayerSummary>,
}

/// Error event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No room has the given code.
    RoomNotFound,
    /// Room already has two players.
    RoomFull,
    /// Move attempted out of turn.
    NotYourTurn,
    /// Move breaks the tower rules.
    InvalidMove,
    /// Move attempted with no game running.
    GameNotActive,
    /// Restart attempted without an opponent.
    WaitingForOpponent,
    /// Request needs a room but the connection has none.
    NotInRoom,
    /// Create/join attempted while already seated.
    AlreadyInRoom,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }
}
