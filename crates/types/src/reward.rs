//! Reward definitions, unlock conditions, and grants

use crate::{GrantId, LevelId, MissionId, RewardId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Reward kind ──────────────────────────────────────────────────────

/// What a reward is, with kind-specific metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardKind {
    /// A cosmetic badge shown next to the user.
    Badge { icon: String },
    /// A virtual item, identified by the platform's catalog sku.
    Item { sku: String },
    /// A capability toggle interpreted by the chat platform.
    Permission { permission: String },
    /// Grants extra currency through the ledger when the reward is granted.
    CurrencyBonus { amount: u64 },
}

impl RewardKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Badge { .. } => "badge",
            Self::Item { .. } => "item",
            Self::Permission { .. } => "permission",
            Self::CurrencyBonus { .. } => "currency_bonus",
        }
    }
}

// ── Unlock conditions ────────────────────────────────────────────────

/// Declarative eligibility predicate. The only composite form is
/// conjunction; disjunction and negation are deliberately unsupported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnlockCondition {
    /// All sub-conditions must hold.
    AllOf { conditions: Vec<UnlockCondition> },
    /// The user has a claimed instance of the mission.
    MissionClaimed { mission: MissionId },
    /// The user's assigned level is at or above this one, compared by
    /// ordinal, not id equality.
    LevelAtLeast { level: LevelId },
    /// Current balance is at least this amount.
    BalanceAtLeast { amount: u64 },
}

/// Result of evaluating a reward's unlock condition for a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    Ineligible { reason: String },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    pub fn ineligible(reason: impl Into<String>) -> Self {
        Self::Ineligible {
            reason: reason.into(),
        }
    }
}

// ── Definition ───────────────────────────────────────────────────────

/// A grantable entity, optionally gated and/or purchasable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDefinition {
    pub id: RewardId,
    pub name: String,
    pub kind: RewardKind,
    /// Currency cost for the purchase path. Absent means not purchasable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<u64>,
    /// Absent means unconditionally eligible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock: Option<UnlockCondition>,
    /// Non-repeatable rewards allow at most one grant per user.
    pub repeatable: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl RewardDefinition {
    pub fn new(name: impl Into<String>, kind: RewardKind) -> Self {
        Self {
            id: RewardId::generate(),
            name: name.into(),
            kind,
            cost: None,
            unlock: None,
            repeatable: false,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_unlock(mut self, unlock: UnlockCondition) -> Self {
        self.unlock = Some(unlock);
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }
}

// ── Grants ───────────────────────────────────────────────────────────

/// How a grant came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Mission,
    Purchase,
    Administrative,
    Event,
}

impl std::fmt::Display for GrantSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mission => "mission",
            Self::Purchase => "purchase",
            Self::Administrative => "administrative",
            Self::Event => "event",
        };
        write!(f, "{}", s)
    }
}

/// A reward held by a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardGrant {
    pub id: GrantId,
    pub user: UserId,
    pub reward: RewardId,
    pub source: GrantSource,
    pub granted_at: DateTime<Utc>,
}

impl RewardGrant {
    pub fn new(user: UserId, reward: RewardId, source: GrantSource, now: DateTime<Utc>) -> Self {
        Self {
            id: GrantId::generate(),
            user,
            reward,
            source,
            granted_at: now,
        }
    }
}
