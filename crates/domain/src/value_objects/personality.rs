//! NPC personality model
//!
//! Big-Five traits on a 0-100 scale plus a motivation list. The decision
//! service in the engine turns these into action weights; this module only
//! owns the data and clamping.

use serde::{Deserialize, Serialize};

/// Big-Five personality traits, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityProfile {
    pub openness: u8,
    pub conscientiousness: u8,
    pub extraversion: u8,
    pub agreeableness: u8,
    pub neuroticism: u8,
}

impl PersonalityProfile {
    pub fn new(
        openness: u8,
        conscientiousness: u8,
        extraversion: u8,
        agreeableness: u8,
        neuroticism: u8,
    ) -> Self {
        Self {
            openness: openness.min(100),
            conscientiousness: conscientiousness.min(100),
            extraversion: extraversion.min(100),
            agreeableness: agreeableness.min(100),
            neuroticism: neuroticism.min(100),
        }
    }

    /// Flat midline profile for generated NPCs with no assigned traits.
    pub fn neutral() -> Self {
        Self::new(50, 50, 50, 50, 50)
    }
}

impl Default for PersonalityProfile {
    fn default() -> Self {
        Self::neutral()
    }
}

/// What an NPC wants, at the level the decision scorer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motivation {
    Aggression,
    Survival,
    Greed,
    Loyalty,
    Curiosity,
    Vengeance,
    Duty,
}
