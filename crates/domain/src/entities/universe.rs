//! Universes and forks
//!
//! Universes form a DAG of forks: the root has no parent, every child's
//! depth is parent.depth + 1. Universes are archived, never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{EventId, UniverseId};

/// Universe lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseStatus {
    Active,
    Archived,
    Merged,
}

/// One branch of reality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Universe {
    pub id: UniverseId,
    /// Branch label, unique per store ("main", "what-if-the-king-dies").
    pub branch: String,
    pub parent_id: Option<UniverseId>,
    pub depth: u32,
    pub status: UniverseStatus,
    pub owner: String,
    /// Event in the parent at which this universe forked off.
    pub forked_at_event: Option<EventId>,
    pub created_at: DateTime<Utc>,
}

impl Universe {
    /// The root universe of a campaign.
    pub fn root(branch: impl Into<String>, owner: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: UniverseId::new(),
            branch: branch.into(),
            parent_id: None,
            depth: 0,
            status: UniverseStatus::Active,
            owner: owner.into(),
            forked_at_event: None,
            created_at,
        }
    }

    /// A child forked from `parent` at `fork_point`.
    pub fn fork_of(
        parent: &Universe,
        branch: impl Into<String>,
        owner: impl Into<String>,
        fork_point: EventId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if parent.status != UniverseStatus::Active {
            return Err(DomainError::rule_violation(format!(
                "cannot fork {} universe '{}'",
                match parent.status {
                    UniverseStatus::Archived => "archived",
                    UniverseStatus::Merged => "merged",
                    UniverseStatus::Active => "active",
                },
                parent.branch
            )));
        }
        Ok(Self {
            id: UniverseId::new(),
            branch: branch.into(),
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
            status: UniverseStatus::Active,
            owner: owner.into(),
            forked_at_event: Some(fork_point),
            created_at,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn archive(&mut self) {
        self.status = UniverseStatus::Archived;
    }
}
