//! RNG providers.
//!
//! Two implementations of the domain's [`DieRoller`]: a cryptographic
//! provider for play and a seedable deterministic provider for tests and
//! replays. The provider is per-session state, never globally mutable.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ttasolo_domain::DieRoller;

/// Default provider: OS-backed thread RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptoRoller;

impl CryptoRoller {
    pub fn new() -> Self {
        Self
    }
}

impl DieRoller for CryptoRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        rand::thread_rng().gen_range(1..=sides.max(1))
    }
}

/// Deterministic provider seeded per session.
#[derive(Debug, Clone)]
pub struct SeededRoller {
    rng: StdRng,
}

impl SeededRoller {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DieRoller for SeededRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides.max(1))
    }
}

/// Test roller that replays a fixed script of faces, cycling at the end.
#[derive(Debug, Clone)]
pub struct ScriptedRoller {
    faces: Vec<u32>,
    cursor: usize,
}

impl ScriptedRoller {
    pub fn new(faces: Vec<u32>) -> Self {
        Self { faces, cursor: 0 }
    }
}

impl DieRoller for ScriptedRoller {
    fn roll_die(&mut self, _sides: u32) -> u32 {
        let face = self.faces[self.cursor % self.faces.len()];
        self.cursor += 1;
        face
    }
}
