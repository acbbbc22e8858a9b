//! Mission definitions and per-user mission instances
//!
//! A mission definition declares a goal (criteria), a currency reward, and
//! optional linked effects (an auto-level override and unlock-reward grants)
//! applied when the mission is claimed. Each user working a mission gets an
//! instance whose status moves monotonically through
//! `NotStarted → InProgress → Completed → Claimed`, with `Expired` reachable
//! only from the two non-terminal working states.

use crate::{EventKind, LevelId, MissionId, MissionInstanceId, RewardId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Criteria ─────────────────────────────────────────────────────────

/// The category of a mission. Must agree with the criteria variant carried
/// by the definition; the orchestration layer validates the pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    OneTime,
    Daily,
    Weekly,
    Streak,
}

/// Kind-specific completion criteria, validated at definition-creation time
/// rather than at every evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionCriteria {
    /// First qualifying event completes the mission. No counters.
    OneTime {
        event_kind: EventKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
    },
    /// `target` qualifying events within one reference-timezone calendar
    /// day. The counter resets when the date changes.
    Daily {
        event_kind: EventKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        target: u32,
    },
    /// `target` qualifying events within one reference-timezone week.
    Weekly {
        event_kind: EventKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        target: u32,
    },
    /// Completes when the user's current streak reaches `days`.
    Streak { days: u32 },
}

impl MissionCriteria {
    pub fn kind(&self) -> MissionKind {
        match self {
            Self::OneTime { .. } => MissionKind::OneTime,
            Self::Daily { .. } => MissionKind::Daily,
            Self::Weekly { .. } => MissionKind::Weekly,
            Self::Streak { .. } => MissionKind::Streak,
        }
    }
}

// ── Definition ───────────────────────────────────────────────────────

/// A goal definition owned by the administrative collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionDefinition {
    pub id: MissionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub criteria: MissionCriteria,
    /// Currency granted on claim.
    pub reward_amount: u64,
    /// Repeatable missions may be started again after the previous instance
    /// reaches a terminal state.
    pub repeatable: bool,
    /// Unconditional level override applied on claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_level: Option<LevelId>,
    /// Rewards whose grant is attempted (best-effort) on claim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unlock_rewards: Vec<RewardId>,
    pub active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl MissionDefinition {
    pub fn new(name: impl Into<String>, criteria: MissionCriteria, reward_amount: u64) -> Self {
        Self {
            id: MissionId::generate(),
            name: name.into(),
            description: String::new(),
            criteria,
            reward_amount,
            repeatable: false,
            auto_level: None,
            unlock_rewards: Vec::new(),
            active: true,
            created_by: UserId::new("system"),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn with_auto_level(mut self, level: LevelId) -> Self {
        self.auto_level = Some(level);
        self
    }

    pub fn with_unlock_reward(mut self, reward: RewardId) -> Self {
        self.unlock_rewards.push(reward);
        self
    }

    pub fn with_creator(mut self, creator: UserId) -> Self {
        self.created_by = creator;
        self
    }

    pub fn kind(&self) -> MissionKind {
        self.criteria.kind()
    }
}

// ── Instance status ──────────────────────────────────────────────────

/// Lifecycle status of a mission instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Claimed,
    Expired,
}

impl MissionStatus {
    /// Terminal statuses are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Claimed | Self::Expired)
    }

    /// The monotonic transition relation. Nothing ever moves backwards and
    /// terminal states have no successors.
    pub fn can_transition(&self, to: MissionStatus) -> bool {
        use MissionStatus::*;
        matches!(
            (self, to),
            (NotStarted, InProgress)
                | (NotStarted, Expired)
                | (InProgress, Completed)
                | (InProgress, Expired)
                | (Completed, Claimed)
        )
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

// ── Progress ─────────────────────────────────────────────────────────

/// Kind-specific progress state carried by an instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MissionProgress {
    /// One-time and streak missions carry no counters of their own.
    #[default]
    None,
    /// Counter scoped to a single reference-timezone date.
    DailyCount { date: NaiveDate, count: u32 },
    /// Counter scoped to a week-start anchor date.
    WeeklyCount { week_anchor: NaiveDate, count: u32 },
}

// ── Instance ─────────────────────────────────────────────────────────

/// One user's run at a mission. Mutated in place by the progress engine and
/// by claim; never physically deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionInstance {
    pub id: MissionInstanceId,
    pub user: UserId,
    pub mission: MissionId,
    pub status: MissionStatus,
    pub progress: MissionProgress,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MissionInstance {
    /// Fresh instance in `InProgress` with empty progress state.
    pub fn start(user: UserId, mission: MissionId, now: DateTime<Utc>) -> Self {
        Self {
            id: MissionInstanceId::generate(),
            user,
            mission,
            status: MissionStatus::InProgress,
            progress: MissionProgress::default(),
            started_at: now,
            completed_at: None,
            claimed_at: None,
            updated_at: now,
        }
    }

    /// Guarded status transition. Returns false (and changes nothing) when
    /// the move would violate monotonicity.
    pub fn transition(&mut self, to: MissionStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition(to) {
            return false;
        }
        self.status = to;
        self.updated_at = now;
        match to {
            MissionStatus::Completed => self.completed_at = Some(now),
            MissionStatus::Claimed => self.claimed_at = Some(now),
            _ => {}
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
