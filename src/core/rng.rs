//! Seedable Random Number Generator
//!
//! Uses the Xorshift128+ algorithm for fast, good-quality randomness.
//! Every random decision the server makes (room codes, collapse draws)
//! goes through the [`RandomSource`] trait so tests can substitute a
//! scripted source and force outcomes.

use sha2::{Sha256, Digest};

/// A source of uniformly distributed random bits.
///
/// Only [`RandomSource::next_u64`] is required; the derived helpers are
/// what game code actually calls.
pub trait RandomSource {
    /// Generate the next 64-bit random value.
    fn next_u64(&mut self) -> u64;

    /// Generate a float uniformly distributed in `[0, 1)`.
    ///
    /// Uses the upper 53 bits so every representable value is reachable.
    fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Generate an index in range `[0, len)`. Returns 0 when `len` is 0.
    fn next_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        // Simple modulo - negligible bias for the small ranges used here
        (self.next_u64() % len as u64) as usize
    }

    /// Bernoulli trial: true with the given probability.
    ///
    /// Probabilities `<= 0` never fire and `>= 1` always fire, but one
    /// value is consumed either way.
    fn chance(&mut self, probability: f64) -> bool {
        self.next_unit() < probability
    }
}

/// PRNG using the Xorshift128+ algorithm.
///
/// Given the same seed, produces the same sequence on every platform.
///
/// # Example
///
/// ```
/// use tower_duel::core::rng::{DeterministicRng, RandomSource};
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

impl RandomSource for DeterministicRng {
    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// A 64-bit seed drawn from a v4 UUID (OS randomness).
pub fn entropy_seed() -> u64 {
    let (hi, lo) = uuid::Uuid::new_v4().as_u64_pair();
    hi ^ lo.rotate_left(32)
}

/// Derive the seed of a room's private generator.
///
/// - `master_seed`: the server-wide seed
/// - `room_code`: the room's code
/// - `nonce`: how many rooms the server had created before this one
///
/// Codes are reused once a room is destroyed; the nonce keeps two rooms
/// that shared a code from sharing a collapse sequence.
pub fn derive_room_seed(master_seed: u64, room_code: &str, nonce: u64) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"TOWER_DUEL_ROOM_SEED_V1");
    hasher.update(master_seed.to_le_bytes());
    hasher.update(room_code.as_bytes());
    hasher.update(nonce.to_le_bytes());

    let hash = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================
