//! PbtA outcome overlay
//!
//! Every skill outcome passes through the outcome classifier, which maps a
//! d20 total against a DC onto Powered-by-the-Apocalypse bands. A miss hands
//! control to the GM move machinery: a deterministic pick from a closed move
//! set, soft moves below danger 10, hard moves at or above.

use serde::{Deserialize, Serialize};
use std::fmt;

/// PbtA outcome band for a resolved check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeBand {
    /// Total at least DC + 5: clean success with extra effect
    StrongHit,
    /// Total within [DC, DC + 4]: ordinary success
    Success,
    /// Total within [DC - 5, DC): success at a cost
    WeakHit,
    /// Total below DC - 5: failure, the GM makes a move
    Miss,
}

impl OutcomeBand {
    /// Classify a check total against a DC using PbtA bands.
    pub fn from_check(total: i32, dc: i32) -> Self {
        if total >= dc + 5 {
            OutcomeBand::StrongHit
        } else if total >= dc {
            OutcomeBand::Success
        } else if total >= dc - 5 {
            OutcomeBand::WeakHit
        } else {
            OutcomeBand::Miss
        }
    }

    /// Map an attack result onto bands: critical hits are strong hits,
    /// ordinary hits are successes, misses are misses.
    pub fn from_attack(hit: bool, critical: bool) -> Self {
        if critical {
            OutcomeBand::StrongHit
        } else if hit {
            OutcomeBand::Success
        } else {
            OutcomeBand::Miss
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, OutcomeBand::Miss)
    }

    /// A miss invokes the move executor.
    pub fn triggers_gm_move(&self) -> bool {
        matches!(self, OutcomeBand::Miss)
    }
}

/// The closed set of GM moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GmMoveType {
    ShowDanger,
    OfferOpportunity,
    RevealUnwelcomeTruth,
    DealDamage,
    UseMonsterMove,
    SeparateThem,
    TakeAway,
    Capture,
    AdvanceTime,
    IntroduceNpc,
    ChangeEnvironment,
}

impl GmMoveType {
    /// Soft moves telegraph trouble without immediate cost.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            GmMoveType::ShowDanger
                | GmMoveType::OfferOpportunity
                | GmMoveType::RevealUnwelcomeTruth
                | GmMoveType::AdvanceTime
                | GmMoveType::IntroduceNpc
                | GmMoveType::ChangeEnvironment
        )
    }

    pub fn is_hard(&self) -> bool {
        !self.is_soft()
    }

    /// Generative moves create entities when executed.
    pub fn is_generative(&self) -> bool {
        matches!(
            self,
            GmMoveType::IntroduceNpc
                | GmMoveType::ChangeEnvironment
                | GmMoveType::RevealUnwelcomeTruth
        )
    }

    const SOFT: [GmMoveType; 6] = [
        GmMoveType::ShowDanger,
        GmMoveType::OfferOpportunity,
        GmMoveType::RevealUnwelcomeTruth,
        GmMoveType::AdvanceTime,
        GmMoveType::IntroduceNpc,
        GmMoveType::ChangeEnvironment,
    ];

    const HARD: [GmMoveType; 5] = [
        GmMoveType::DealDamage,
        GmMoveType::UseMonsterMove,
        GmMoveType::SeparateThem,
        GmMoveType::TakeAway,
        GmMoveType::Capture,
    ];

    /// Deterministic move selection.
    ///
    /// Danger below 10 draws from the soft pool, 10 and above from the hard
    /// pool; the pick rotates with the recent-event count so consecutive
    /// misses in the same scene produce different moves.
    pub fn select(danger_level: u8, recent_event_count: usize) -> Self {
        if danger_level < 10 {
            Self::SOFT[recent_event_count % Self::SOFT.len()]
        } else {
            Self::HARD[recent_event_count % Self::HARD.len()]
        }
    }
}

impl fmt::Display for GmMoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GmMoveType::ShowDanger => "SHOW_DANGER",
            GmMoveType::OfferOpportunity => "OFFER_OPPORTUNITY",
            GmMoveType::RevealUnwelcomeTruth => "REVEAL_UNWELCOME_TRUTH",
            GmMoveType::DealDamage => "DEAL_DAMAGE",
            GmMoveType::UseMonsterMove => "USE_MONSTER_MOVE",
            GmMoveType::SeparateThem => "SEPARATE_THEM",
            GmMoveType::TakeAway => "TAKE_AWAY",
            GmMoveType::Capture => "CAPTURE",
            GmMoveType::AdvanceTime => "ADVANCE_TIME",
            GmMoveType::IntroduceNpc => "INTRODUCE_NPC",
            GmMoveType::ChangeEnvironment => "CHANGE_ENVIRONMENT",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(OutcomeBand::from_check(20, 15), OutcomeBand::StrongHit);
        assert_eq!(OutcomeBand::from_check(19, 15), OutcomeBand::Success);
        assert_eq!(OutcomeBand::from_check(15, 15), OutcomeBand::Success);
        assert_eq!(OutcomeBand::from_check(14, 15), OutcomeBand::WeakHit);
        assert_eq!(OutcomeBand::from_check(10, 15), OutcomeBand::WeakHit);
        assert_eq!(OutcomeBand::from_check(9, 15), OutcomeBand::Miss);
    }

    #[test]
    fn test_attack_mapping() {
        assert_eq!(OutcomeBand::from_attack(true, true), OutcomeBand::StrongHit);
        assert_eq!(OutcomeBand::from_attack(true, false), OutcomeBand::Success);
        assert_eq!(OutcomeBand::from_attack(false, false), OutcomeBand::Miss);
    }

    #[test]
    fn test_only_miss_triggers_move() {
        assert!(OutcomeBand::Miss.triggers_gm_move());
        assert!(!OutcomeBand::WeakHit.triggers_gm_move());
        assert!(!OutcomeBand::Success.triggers_gm_move());
    }

    #[test]
    fn test_soft_hard_split_covers_all_moves() {
        let soft = GmMoveType::SOFT.len();
        let hard = GmMoveType::HARD.len();
        assert_eq!(soft + hard, 11);
        assert!(GmMoveType::SOFT.iter().all(|m| m.is_soft()));
        assert!(GmMoveType::HARD.iter().all(|m| m.is_hard()));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let a = GmMoveType::select(3, 0);
        let b = GmMoveType::select(3, 0);
        assert_eq!(a, b);
        assert!(a.is_soft());
        assert!(GmMoveType::select(15, 2).is_hard());
    }

    #[test]
    fn test_first_miss_in_quiet_scene_shows_danger() {
        assert_eq!(GmMoveType::select(3, 0), GmMoveType::ShowDanger);
        assert_eq!(GmMoveType::select(3, 1), GmMoveType::OfferOpportunity);
        assert_eq!(GmMoveType::select(12, 0), GmMoveType::DealDamage);
    }

    #[test]
    fn test_generative_moves() {
        assert!(GmMoveType::IntroduceNpc.is_generative());
        assert!(GmMoveType::ChangeEnvironment.is_generative());
        assert!(GmMoveType::RevealUnwelcomeTruth.is_generative());
        assert!(!GmMoveType::DealDamage.is_generative());
    }
}
