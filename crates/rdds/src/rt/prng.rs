// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rdds developers

//! Small deterministic PRNG (xoshiro256**) with OS seeding.
//!
//! Participants hold one instance each, seeded either from the configured
//! entity-naming seed (reproducible names for tests and tooling) or from
//! `/dev/urandom`. Not cryptographic.

use crate::retcode::{ReturnCode, Result};

/// Seed material for [`Prng`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrngSeed {
    pub key: [u64; 4],
}

impl PrngSeed {
    /// Derive a seed from eight bytes of user-provided material.
    ///
    /// The seed is run through splitmix64 so that small integers (the common
    /// case for configured seeds) still produce well-mixed state.
    #[must_use]
    pub fn from_u64(mut x: u64) -> Self {
        let mut key = [0u64; 4];
        for slot in &mut key {
            // splitmix64 step
            x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = x;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            *slot = z ^ (z >> 31);
        }
        PrngSeed { key }
    }

    /// Read seed material from the host entropy source.
    pub fn make() -> Result<Self> {
        use std::io::Read;
        let mut buf = [0u8; 32];
        let mut f = std::fs::File::open("/dev/urandom").map_err(|_| ReturnCode::Error)?;
        f.read_exact(&mut buf).map_err(|_| ReturnCode::Error)?;
        let mut key = [0u64; 4];
        for (i, slot) in key.iter_mut().enumerate() {
            let mut word = [0u8; 8];
            word.copy_from_slice(&buf[i * 8..i * 8 + 8]);
            *slot = u64::from_le_bytes(word);
        }
        Ok(PrngSeed { key })
    }
}

/// xoshiro256** generator.
#[derive(Debug, Clone)]
pub struct Prng {
    s: [u64; 4],
}

impl Prng {
    #[must_use]
    pub fn new(seed: PrngSeed) -> Self {
        // An all-zero state is a fixed point; nudge it out.
        let mut s = seed.key;
        if s == [0; 4] {
            s = PrngSeed::from_u64(1).key;
        }
        Prng { s }
    }

    /// Next 64 random bits.
    pub fn next_u64(&mut self) -> u64 {
        let result = self.s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    /// Next 32 random bits.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform value in `0..bound` (bound > 0).
    pub fn next_below(&mut self, bound: u32) -> u32 {
        debug_assert!(bound > 0);
        (self.next_u32() as u64 * bound as u64 >> 32) as u32
    }
}

const FANCY_ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "dapper", "eager", "fleet", "gentle", "hardy", "ivory", "jolly",
    "keen", "lucid", "mellow", "nimble", "opal", "prime", "quiet", "rapid", "sturdy", "tidy",
];

const FANCY_NOUNS: &[&str] = &[
    "falcon", "heron", "ibex", "jackal", "kestrel", "lynx", "marten", "newt", "otter", "pike",
    "quail", "raven", "stoat", "tern", "urchin", "vole", "wren", "yak", "zebu", "badger",
];

/// Generate a "fancy" default entity name, e.g. `brisk_otter_17`.
///
/// Deterministic for a given PRNG state: participants configured with the
/// same naming seed name their children identically across runs.
pub fn fancy_name(prng: &mut Prng) -> String {
    let adjective = FANCY_ADJECTIVES[prng.next_below(FANCY_ADJECTIVES.len() as u32) as usize];
    let noun = FANCY_NOUNS[prng.next_below(FANCY_NOUNS.len() as u32) as usize];
    let tag = prng.next_below(100);
    format!("{}_{}_{}", adjective, noun, tag)
}
