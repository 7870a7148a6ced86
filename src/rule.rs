//! Extended-neighborhood rules
//!
//! A rule is a 512-entry lookup table of single bits, stored as 64 bytes.
//! Entry `code` lives in byte `code / 8`, bit `code % 8` (bit 0 = LSB).
//!
//! The canonical 512-bit identity packs the table into 8 words, with word `i`
//! holding bytes `i*8 .. i*8+8` in big-endian order. Decoding caller-supplied
//! words uses the same order, so `Rule::from_words(&r.id().0) == r`.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{try_reserve, CtmError, Result};

/// Bytes per rule table.
pub const RULE_BYTES: usize = 64;
/// 64-bit words per rule identity.
pub const RULE_WORDS: usize = 8;
/// Number of distinct 9-bit neighborhood codes.
pub const NEIGHBORHOOD_STATES: usize = 512;

/// 512-bit rule identity as 8 × u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub [u64; RULE_WORDS]);

impl fmt::Display for RuleId {
    /// Hex digits, highest-indexed word first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in self.0.iter().rev() {
            write!(f, "{:016x}", word)?;
        }
        Ok(())
    }
}

/// A neighborhood → next-state lookup table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rule {
    table: [u8; RULE_BYTES],
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({})", self.id())
    }
}

impl Rule {
    pub const fn from_bytes(table: [u8; RULE_BYTES]) -> Self {
        Self { table }
    }

    pub fn bytes(&self) -> &[u8; RULE_BYTES] {
        &self.table
    }

    /// Rule whose every entry is `bit`.
    pub const fn constant(bit: bool) -> Self {
        Self {
            table: [if bit { 0xFF } else { 0x00 }; RULE_BYTES],
        }
    }

    /// Build a rule by evaluating `f` on every neighborhood code.
    pub fn from_fn(mut f: impl FnMut(u16) -> bool) -> Self {
        let mut table = [0u8; RULE_BYTES];
        for code in 0..NEIGHBORHOOD_STATES as u16 {
            if f(code) {
                table[code as usize / 8] |= 1 << (code % 8);
            }
        }
        Self { table }
    }

    /// Draw 64 bytes from the generator, one low byte per 64-bit draw.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut table = [0u8; RULE_BYTES];
        for byte in table.iter_mut() {
            *byte = (rng.next_u64() & 0xFF) as u8;
        }
        Self { table }
    }

    /// Decode from 8 words; word `i` big-endian byte `j` is table byte `i*8 + j`.
    pub fn from_words(words: &[u64; RULE_WORDS]) -> Self {
        let mut table = [0u8; RULE_BYTES];
        for (chunk, word) in table.chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Self { table }
    }

    /// Canonical 512-bit identity.
    pub fn id(&self) -> RuleId {
        let mut words = [0u64; RULE_WORDS];
        for (word, chunk) in words.iter_mut().zip(self.table.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_be_bytes(buf);
        }
        RuleId(words)
    }

    /// Next cell state for a 9-bit neighborhood code.
    #[inline]
    pub fn output(&self, code: u16) -> u8 {
        debug_assert!((code as usize) < NEIGHBORHOOD_STATES);
        (self.table[code as usize / 8] >> (code % 8)) & 1
    }
}

impl From<RuleId> for Rule {
    fn from(id: RuleId) -> Self {
        Rule::from_words(&id.0)
    }
}

/// Decode a flat run of rule words (8 per rule).
pub fn decode_rules(words: &[u64]) -> Result<Vec<Rule>> {
    if words.len() % RULE_WORDS != 0 {
        return Err(CtmError::RuleLength {
            expected: RULE_WORDS,
            got: words.len(),
        });
    }
    let mut rules = Vec::new();
    try_reserve(&mut rules, words.len() / RULE_WORDS, "rule table")?;
    for chunk in words.chunks_exact(RULE_WORDS) {
        let mut buf = [0u64; RULE_WORDS];
        buf.copy_from_slice(chunk);
        rules.push(Rule::from_words(&buf));
    }
    Ok(rules)
}
