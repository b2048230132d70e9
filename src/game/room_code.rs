//! Room codes: four characters from an alphabet without look-alike glyphs.

use std::fmt;

use serde::{Serialize, Deserialize};

use crate::core::rng::RandomSource;

/// Characters a code may contain. No `0/O` or `1/I`.
pub const ROOM_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of every room code.
pub const ROOM_CODE_LEN: usize = 4;

/// A short, shareable room identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw a random code.
    pub fn random<R: RandomSource + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.next_index(ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Draw codes until one is not `taken`.
    pub fn generate<R, F>(rng: &mut R, taken: F) -> Self
    where
        R: RandomSource + ?Sized,
        F: Fn(&RoomCode) -> bool,
    {
        loop {
            let code = Self::random(rng);
            if !taken(&code) {
                return code;
            }
        }
    }

    /// Normalize user input: trim and upper-case.
    ///
    /// The result is only used as a lookup key, so it is not checked
    /// against the alphabet; an unknown key simply finds no room.
    pub fn normalize(input: &str) -> Self {
        Self(input.trim().to_uppercase())
    }

    /// True if this is a well-formed code.
    pub fn is_valid(&self) -> bool {
        self.0.len() == ROOM_CODE_LEN
            && self.0.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
