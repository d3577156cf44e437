use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte source for one overwrite step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "byte", rename_all = "lowercase")]
pub enum PassPattern {
    /// Every byte set to the same value
    Fixed(u8),
    /// Output of a ChaCha-based CSPRNG seeded from the OS
    Random,
}

impl PassPattern {
    /// Secure mode device pass: all ones
    pub const SECURE: PassPattern = PassPattern::Fixed(0xFF);
    /// Paranoid rounds 1, 4, 7, 10
    pub const PARANOID_A: PassPattern = PassPattern::Fixed(0x55);
    /// Paranoid rounds 3, 6, 9
    pub const PARANOID_B: PassPattern = PassPattern::Fixed(0xAA);
    /// LegacyFast metadata window
    pub const ZERO: PassPattern = PassPattern::Fixed(0x00);

    /// Paranoid round `round` (1-based): A, random, B, repeating.
    pub fn for_paranoid_round(round: u32) -> PassPattern {
        match round % 3 {
            1 => Self::PARANOID_A,
            2 => PassPattern::Random,
            _ => Self::PARANOID_B,
        }
    }
}

impl fmt::Display for PassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassPattern::Fixed(byte) => write!(f, "0x{:02X} pattern", byte),
            PassPattern::Random => f.write_str("pseudorandom data"),
        }
    }
}

/// Produces exactly `length` bytes of a pattern, one caller-provided chunk at a time.
///
/// Memory use is bounded by the caller's buffer; nothing is generated ahead.
pub struct PatternGenerator {
    pattern: PassPattern,
    remaining: u64,
    source: Source,
}

enum Source {
    Fixed(u8),
    Random(Box<StdRng>),
}

impl PatternGenerator {
    pub fn new(pattern: PassPattern, length: u64) -> Self {
        let source = match pattern {
            PassPattern::Fixed(byte) => Source::Fixed(byte),
            PassPattern::Random => Source::Random(Box::new(StdRng::from_entropy())),
        };
        Self {
            pattern,
            remaining: length,
            source,
        }
    }

    pub fn pattern(&self) -> PassPattern {
        self.pattern
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Fill the front of `buf` with the next bytes. Returns how many were produced,
    /// which is `buf.len()` unless fewer bytes remain.
    pub fn fill(&mut self, buf: &mut [u8]) -> usize {
        let n = (buf.len() as u64).min(self.remaining) as usize;
        let out = &mut buf[..n];

        match &mut self.source {
            Source::Fixed(byte) => out.fill(*byte),
            Source::Random(rng) => rng.fill_bytes(out),
        }

        self.remaining -= n as u64;
        n
    }
}
