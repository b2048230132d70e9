//! # Tower Duel Server
//!
//! Authoritative room server for Tower Duel, a two-player block-stacking game.
//! Players take turns pulling blocks from a shared tower until one pull
//! brings it down; the other player wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TOWER DUEL SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  └── rng.rs       - Seedable Xorshift128+ PRNG               │
//! │                                                              │
//! │  game/            - Game rules (no I/O)                      │
//! │  ├── tower.rs     - Block layout and removal legality        │
//! │  ├── collapse.rs  - Structural and stochastic collapse       │
//! │  ├── room_code.rs - Short human-typable room codes           │
//! │  └── room.rs      - Seats, turns, scoring, restart           │
//! │                                                              │
//! │  network/         - Networking                               │
//! │  ├── protocol.rs  - JSON message types                       │
//! │  ├── broadcast.rs - Per-connection outbound channels         │
//! │  ├── session.rs   - Room registry and request handling       │
//! │  ├── handler.rs   - Frame parsing and error replies          │
//! │  └── server.rs    - WebSocket server                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `game/` modules draw all randomness through [`core::rng::RandomSource`].
//! With a fixed master seed, a sequence of requests always produces the
//! same room codes, collapses and winners.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::{DeterministicRng, RandomSource};
pub use game::room::{GameConfig, Room, Seat};
pub use game::room_code::RoomCode;
pub use game::tower::{Block, BlockId, Tower};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tower height in layers
pub const DEFAULT_LAYERS: u32 = 18;

/// Blocks in every layer
pub const BLOCKS_PER_LAYER: u32 = 3;
