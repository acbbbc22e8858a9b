//! Consecutive-day streak state

use crate::UserId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-user streak record. Mutated at most once per calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub user: UserId,
    /// Length of the current run of consecutive active days.
    pub current: u32,
    /// Longest run ever achieved. Monotonically non-decreasing.
    pub longest: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<NaiveDate>,
}

impl StreakRecord {
    pub fn opening(user: UserId) -> Self {
        Self {
            user,
            current: 0,
            longest: 0,
            last_activity: None,
        }
    }
}

/// What a `record_activity` call did to the streak.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakOutcome {
    /// First-ever recorded activity.
    Started,
    /// Same reference-timezone date as the last activity; nothing changed.
    Unchanged,
    /// Exactly one day after the last activity.
    Extended,
    /// A gap of more than one day; current run restarted at 1.
    Reset,
}

/// Result of recording one day of activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub record: StreakRecord,
    pub outcome: StreakOutcome,
}
