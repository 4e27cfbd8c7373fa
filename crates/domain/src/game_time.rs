//! In-game clock
//!
//! Events carry both a wall timestamp and an in-game timestamp. The in-game
//! clock counts minutes since the campaign epoch plus a combat-round cursor,
//! and is strictly monotonic per universe: every append advances it.

use serde::{Deserialize, Serialize};

/// One combat round is six seconds of in-game time.
pub const SECONDS_PER_ROUND: u64 = 6;

/// A point on the in-game timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameTime {
    /// Seconds since the campaign epoch.
    pub seconds: u64,
}

impl GameTime {
    pub fn zero() -> Self {
        Self { seconds: 0 }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    /// Advance by whole combat rounds.
    pub fn advance_rounds(self, rounds: u64) -> Self {
        Self {
            seconds: self.seconds + rounds * SECONDS_PER_ROUND,
        }
    }

    /// Advance by minutes (travel, rests, GM time moves).
    pub fn advance_minutes(self, minutes: u64) -> Self {
        Self {
            seconds: self.seconds + minutes * 60,
        }
    }

    /// Smallest possible advance, used to keep per-universe timestamps
    /// strictly monotonic when two events land in the same instant.
    pub fn tick(self) -> Self {
        Self {
            seconds: self.seconds + 1,
        }
    }
}

impl Default for GameTime {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_advance() {
        let t = GameTime::zero().advance_rounds(10);
        assert_eq!(t.seconds, 60);
    }

    #[test]
    fn test_tick_is_strictly_monotonic() {
        let t = GameTime::from_seconds(41);
        assert!(t.tick() > t);
    }
}
