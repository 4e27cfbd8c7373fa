//! Per-universe physics overlays
//!
//! An overlay is a configuration record, not a subclass system: the effect
//! pipeline consults it as a set of modifier functions. Enhanced sources
//! gain an extra damage die, restricted sources shift their save DCs, and
//! forbidden sources fail outright.

use serde::{Deserialize, Serialize};

use crate::value_objects::ability::SourceKind;

/// How a universe treats one power source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRule {
    #[default]
    Normal,
    /// Damage rolls gain one extra die of the same size.
    Enhanced,
    /// Save DCs drop by two (targets resist more easily).
    Restricted,
    /// Abilities from this source fail in this universe.
    Forbidden,
}

/// A universe's physics configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsOverlay {
    pub magic: SourceRule,
    pub tech: SourceRule,
    pub martial: SourceRule,
}

impl PhysicsOverlay {
    pub fn rule_for(&self, source: SourceKind) -> SourceRule {
        match source {
            SourceKind::Magic => self.magic,
            SourceKind::Tech => self.tech,
            SourceKind::Martial => self.martial,
        }
    }

    pub fn allows(&self, source: SourceKind) -> bool {
        self.rule_for(source) != SourceRule::Forbidden
    }

    /// Extra damage dice granted to the source (one when enhanced).
    pub fn bonus_damage_dice(&self, source: SourceKind) -> u32 {
        if self.rule_for(source) == SourceRule::Enhanced {
            1
        } else {
            0
        }
    }

    /// Shift applied to the ability's save DC.
    pub fn save_dc_shift(&self, source: SourceKind) -> i32 {
        if self.rule_for(source) == SourceRule::Restricted {
            -2
        } else {
            0
        }
    }
}
