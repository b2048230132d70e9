//! Core deterministic primitives.
//!
//! Everything random in the game layer goes through these types so a
//! seeded server replays identically.

pub mod rng;

// Re-export core types
pub use rng::{derive_room_seed, entropy_seed, DeterministicRng, RandomSource};
