//! Room State Machine
//!
//! A room holds at most two seated players and one tower. All rules about
//! who may do what, and when, live here; the session layer only routes
//! messages and fans out results.
//!
//! ```text
//! Lobby ──join──▶ Active ──collapse──▶ Finished ──restart──▶ Active
//!                   │                      ▲
//!                   └──opponent leaves─────┘  (last seat leaves: destroyed)
//! ```
//!
//! Every operation validates fully before mutating, so a rejected request
//! leaves the room exactly as it was.

use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::collapse::{resolve_collapse, CollapseConfig, CollapseOutcome};
use crate::game::room_code::RoomCode;
use crate::game::tower::{BlockId, Tower, TowerError};
use crate::{BLOCKS_PER_LAYER, DEFAULT_LAYERS};

/// Maximum seated players per room.
pub const MAX_PLAYERS: usize = 2;

/// Largest tower a room may be configured with, in blocks.
pub const MAX_TOWER_BLOCKS: u32 = 4096;

// =============================================================================
// SEAT
// =============================================================================

/// Player number, fixed for the lifetime of a connection's seat.
///
/// Serialized as the integer `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    /// Player 1, the room creator's seat. Moves first.
    One,
    /// Player 2.
    Two,
}

impl Seat {
    /// The opposing seat.
    pub fn other(self) -> Self {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// Numeric player number.
    pub fn number(self) -> u8 {
        match self {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        seat.number()
    }
}

/// A player number outside `1..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid player number {0}")]
pub struct InvalidSeat(pub u8);

impl TryFrom<u8> for Seat {
    type Error = InvalidSeat;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Seat::One),
            2 => Ok(Seat::Two),
            other => Err(InvalidSeat(other)),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Per-room game rules.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Tower height.
    pub layers: u32,
    /// Blocks in each layer.
    pub blocks_per_layer: u32,
    /// Collapse tuning.
    pub collapse: CollapseConfig,
    /// Delay between `block-removed` and `tower-collapsed`, giving clients
    /// time to animate the falling block.
    pub collapse_broadcast_delay: Duration,
    /// Longest accepted player name, in characters.
    pub max_name_len: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            layers: DEFAULT_LAYERS,
            blocks_per_layer: BLOCKS_PER_LAYER,
            collapse: CollapseConfig::default(),
            collapse_broadcast_delay: Duration::from_millis(500),
            max_name_len: 24,
        }
    }
}

/// Game configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidGameConfig {
    /// Tower too short to ever allow a move.
    #[error("tower needs at least 2 layers, got {0}")]
    TooFewLayers(u32),

    /// Layers too narrow to ever allow a move.
    #[error("layers need at least 2 blocks, got {0}")]
    TooFewBlocksPerLayer(u32),

    /// More blocks than a room is allowed to hold.
    #[error("tower of {layers} x {blocks_per_layer} blocks exceeds {MAX_TOWER_BLOCKS}")]
    TowerTooLarge {
        /// Configured layers.
        layers: u32,
        /// Configured blocks per layer.
        blocks_per_layer: u32,
    },

    /// A probability or rate outside `[0, 1]`.
    #[error("{name} must be within [0, 1], got {value}")]
    ProbabilityOutOfRange {
        /// Offending field.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
}

impl GameConfig {
    /// Check the configuration describes a playable game.
    pub fn validate(&self) -> Result<(), InvalidGameConfig> {
        if self.layers < 2 {
            return Err(InvalidGameConfig::TooFewLayers(self.layers));
        }
        if self.blocks_per_layer < 2 {
            return Err(InvalidGameConfig::TooFewBlocksPerLayer(self.blocks_per_layer));
        }
        let total = self.layers.checked_mul(self.blocks_per_layer);
        if !matches!(total, Some(n) if n <= MAX_TOWER_BLOCKS) {
            return Err(InvalidGameConfig::TowerTooLarge {
                layers: self.layers,
                blocks_per_layer: self.blocks_per_layer,
            });
        }

        let probabilities = [
            ("structural_probability", self.collapse.structural_probability),
            ("hazard_slope", self.collapse.hazard_slope),
            ("layer_danger_bonus", self.collapse.layer_danger_bonus),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(InvalidGameConfig::ProbabilityOutOfRange { name, value });
            }
        }
        Ok(())
    }

    fn build_tower(&self) -> Tower {
        Tower::build(self.layers, self.blocks_per_layer)
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// A seated player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Seat number.
    pub seat: Seat,
    /// Display name.
    pub name: String,
    /// Points earned this game.
    pub score: u32,
}

/// Trim and truncate a requested name, falling back to `Player N`.
pub fn sanitize_name(requested: Option<&str>, seat: Seat, max_len: usize) -> String {
    let trimmed = requested.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return format!("Player {}", seat.number());
    }
    trimmed.chars().take(max_len).collect()
}

// =============================================================================
// ROOM
// =============================================================================

/// Coarse room state, derived from the start/over flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// One player waiting for an opponent.
    Lobby,
    /// Both seats filled, moves accepted.
    Active,
    /// Tower fell, or the opponent left.
    Finished,
}

/// Room errors. None of them change room state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    /// Both seats are taken.
    #[error("Room is full!")]
    Full,

    /// The requester does not hold the current turn.
    #[error("Not your turn!")]
    NotYourTurn,

    /// No game is running.
    #[error("Game is over or has not started!")]
    GameNotActive,

    /// Only one seat is filled.
    #[error("Waiting for an opponent!")]
    WaitingForOpponent,

    /// The tower rejected the move.
    #[error(transparent)]
    Tower(#[from] TowerError),
}

/// Result of a successful removal.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// Removed block.
    pub block_id: BlockId,
    /// Its layer.
    pub layer: u32,
    /// Who removed it.
    pub seat: Seat,
    /// Mover's display name.
    pub player_name: String,
    /// Points awarded.
    pub points: u32,
    /// Collapse trial results.
    pub collapse: CollapseOutcome,
    /// Winner, when the removal toppled the tower.
    pub winner: Option<Seat>,
}

impl Removal {
    /// Did this removal end the game?
    pub fn collapsed(&self) -> bool {
        self.collapse.collapsed()
    }
}

/// What is left after a player leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The seat was not occupied.
    NotSeated,
    /// Nobody is left; the room should be destroyed.
    Empty,
    /// The given seat is still occupied; the game is abandoned.
    Remaining(Seat),
}

/// A two-seat game room.
#[derive(Debug, Clone)]
pub struct Room {
    code: RoomCode,
    players: Vec<Player>,
    tower: Tower,
    current_turn: Seat,
    game_started: bool,
    game_over: bool,
    winner: Option<Seat>,
    config: GameConfig,
    rng: DeterministicRng,
}

impl Room {
    /// Create a room with its creator seated as player 1.
    pub fn new(
        code: RoomCode,
        host_name: Option<&str>,
        config: GameConfig,
        rng: DeterministicRng,
    ) -> Self {
        let host = Player {
            seat: Seat::One,
            name: sanitize_name(host_name, Seat::One, config.max_name_len),
            score: 0,
        };

        Self {
            code,
            players: vec![host],
            tower: config.build_tower(),
            current_turn: Seat::One,
            game_started: false,
            game_over: false,
            winner: None,
            config,
            rng,
        }
    }

    /// Room code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Seated players, ordered by seat.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Player in `seat`, if seated.
    pub fn player(&self, seat: Seat) -> Option<&Player> {
        self.players.iter().find(|p| p.seat == seat)
    }

    /// The tower.
    pub fn tower(&self) -> &Tower {
        &self.tower
    }

    /// Seat to move. Only meaningful while [`RoomPhase::Active`].
    pub fn current_turn(&self) -> Seat {
        self.current_turn
    }

    /// Whether a game has been started and not abandoned.
    pub fn game_started(&self) -> bool {
        self.game_started
    }

    /// Whether the current game has ended.
    pub fn game_over(&self) -> bool {
        self.game_over
    }

    /// Winner of the last game, if decided.
    pub fn winner(&self) -> Option<Seat> {
        self.winner
    }

    /// Current phase.
    pub fn phase(&self) -> RoomPhase {
        if self.game_over {
            RoomPhase::Finished
        } else if self.game_started {
            RoomPhase::Active
        } else {
            RoomPhase::Lobby
        }
    }

    /// Both seats filled?
    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// Seat a second player and start the game.
    ///
    /// The joiner takes whichever seat is free. If the previous game was
    /// abandoned, a fresh one starts.
    pub fn join(&mut self, name: Option<&str>) -> Result<Seat, RoomError> {
        if self.is_full() {
            return Err(RoomError::Full);
        }

        let seat = if self.player(Seat::One).is_some() { Seat::Two } else { Seat::One };
        self.players.push(Player {
            seat,
            name: sanitize_name(name, seat, self.config.max_name_len),
            score: 0,
        });
        self.players.sort_by_key(|p| p.seat);

        self.reset_game();
        Ok(seat)
    }

    /// Remove a block for `seat`, score it and resolve collapse.
    pub fn remove_block(&mut self, seat: Seat, block_id: BlockId) -> Result<Removal, RoomError> {
        if self.phase() != RoomPhase::Active {
            return Err(RoomError::GameNotActive);
        }
        if self.current_turn != seat {
            return Err(RoomError::NotYourTurn);
        }

        let block = self.tower.remove(block_id, seat)?.clone();
        let points = block.points();

        let player_name = match self.players.iter_mut().find(|p| p.seat == seat) {
            Some(player) => {
                player.score += points;
                player.name.clone()
            }
            None => String::from("Unknown"),
        };

        let collapse = resolve_collapse(&self.tower, &block, &self.config.collapse, &mut self.rng);

        let winner = if collapse.collapsed() {
            self.game_over = true;
            self.winner = self.player(seat.other()).map(|p| p.seat);
            self.winner
        } else {
            self.current_turn = seat.other();
            None
        };

        Ok(Removal {
            block_id,
            layer: block.layer,
            seat,
            player_name,
            points,
            collapse,
            winner,
        })
    }

    /// Start over with a fresh tower. Allowed whenever both seats are filled.
    pub fn restart(&mut self) -> Result<(), RoomError> {
        if !self.is_full() {
            return Err(RoomError::WaitingForOpponent);
        }
        self.reset_game();
        Ok(())
    }

    /// Vacate `seat`.
    pub fn leave(&mut self, seat: Seat) -> LeaveOutcome {
        let before = self.players.len();
        self.players.retain(|p| p.seat != seat);
        if self.players.len() == before {
            return LeaveOutcome::NotSeated;
        }

        match self.players.first() {
            None => LeaveOutcome::Empty,
            Some(remaining) => {
                self.game_started = false;
                self.game_over = true;
                LeaveOutcome::Remaining(remaining.seat)
            }
        }
    }

    fn reset_game(&mut self) {
        self.tower = self.config.build_tower();
        self.current_turn = Seat::One;
        self.game_started = true;
        self.game_over = false;
        self.winner = None;
        for player in &mut self.players {
            player.score = 0;
        }
    }
}
