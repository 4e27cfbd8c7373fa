//! Rule-system math: SRD 5e tables and the PbtA outcome overlay.

pub mod pbta;
pub mod srd5e;

pub use pbta::{GmMoveType, OutcomeBand};
pub use srd5e::{ability_modifier, proficiency_bonus, Ability, Cover, Skill};
