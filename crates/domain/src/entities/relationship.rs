//! Directed relationships between entities
//!
//! Relationships are graph edges, universe-local, with a closed type set.
//! KNOWS carries a trust scalar; LOCATED_IN is functional (exactly one per
//! entity per universe); VARIANT_OF links a universe-specific variant to
//! its canonical origin.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{EntityId, RelationshipId, UniverseId};

/// Closed set of relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    Knows,
    Fears,
    Desires,
    LocatedIn,
    Owns,
    Wields,
    Wears,
    Carries,
    Contains,
    ConnectedTo,
    TrappedIn,
    VariantOf,
    HasAtmosphere,
    Caused,
}

impl RelationshipKind {
    /// Exactly one edge of this kind may leave an entity in a universe.
    pub fn is_functional(&self) -> bool {
        matches!(self, RelationshipKind::LocatedIn | RelationshipKind::VariantOf)
    }

    /// Possession edges travel with a character across universes;
    /// social edges stay behind.
    pub fn transfers_on_world_travel(&self) -> bool {
        matches!(self, RelationshipKind::Owns | RelationshipKind::Carries)
    }
}

/// A directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub universe_id: UniverseId,
    pub from: EntityId,
    pub to: EntityId,
    pub kind: RelationshipKind,
    /// Trust in [-1, 1]; only meaningful on KNOWS edges.
    pub trust: Option<f32>,
}

impl Relationship {
    pub fn new(
        universe_id: UniverseId,
        from: EntityId,
        to: EntityId,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            id: RelationshipId::new(),
            universe_id,
            from,
            to,
            kind,
            trust: None,
        }
    }

    /// Attach a trust scalar; rejected outside [-1, 1] or on non-KNOWS
    /// edges.
    pub fn with_trust(mut self, trust: f32) -> Result<Self, DomainError> {
        if self.kind != RelationshipKind::Knows {
            return Err(DomainError::bad_input(
                "trust is only defined for KNOWS relationships",
            ));
        }
        if !(-1.0..=1.0).contains(&trust) {
            return Err(DomainError::bad_input(format!(
                "trust {} out of range [-1, 1]",
                trust
            )));
        }
        self.trust = Some(trust);
        Ok(self)
    }
}
