//! Level tier definitions

use crate::LevelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ordered tier reached by cumulative currency.
///
/// Invariant: thresholds and ordinals are each unique among active levels,
/// and active ordinals form a contiguous ascending sequence starting at 1.
/// Retiring a level (`active = false`) must not invalidate balances that
/// still reference it by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDefinition {
    pub id: LevelId,
    pub name: String,
    /// Minimum cumulative currency for this tier.
    pub threshold: u64,
    /// Position in the ladder; compared for `level-at-least` conditions.
    pub ordinal: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl LevelDefinition {
    pub fn new(name: impl Into<String>, threshold: u64, ordinal: u32) -> Self {
        Self {
            id: LevelId::generate(),
            name: name.into(),
            threshold,
            ordinal,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of re-deriving a user's level from their balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTransition {
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<LevelId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<LevelId>,
}

impl LevelTransition {
    pub fn unchanged(current: Option<LevelId>) -> Self {
        Self {
            changed: false,
            from: current.clone(),
            to: current,
        }
    }

    pub fn changed(from: Option<LevelId>, to: Option<LevelId>) -> Self {
        Self {
            changed: true,
            from,
            to,
        }
    }
}
