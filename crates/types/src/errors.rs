//! Error taxonomy for the progression engine
//!
//! Expected business-rule outcomes are typed values, not crashes: every
//! exposed operation returns `EngineResult<T>` and a failure carries a stable
//! `kind()` string plus human-readable `Display` text, enough for an external
//! presenter to render a message without inspecting internals. Only store
//! faults cross component boundaries as genuine errors.

use crate::{MissionId, RewardId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage-layer errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// A single rejected input field, accumulated during validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Dotted path to the offending field (e.g. `mission.criteria.target`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Business-rule outcomes. Returned through the normal result type and
/// handled locally; never a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: u64, required: u64 },

    #[error("daily grant cap exceeded: {granted_today} of {cap} already granted")]
    DailyCapExceeded { granted_today: u64, cap: u64 },

    #[error("mission {0} already claimed")]
    AlreadyClaimed(MissionId),

    #[error("mission {0} not completed")]
    NotCompleted(MissionId),

    #[error("mission {0} already has an active instance")]
    AlreadyActive(MissionId),

    #[error("mission {0} is not active")]
    MissionInactive(MissionId),

    #[error("reward {0} is not active")]
    RewardInactive(RewardId),

    #[error("reward {0} already granted")]
    AlreadyGranted(RewardId),

    #[error("reward {reward} not unlocked: {reason}")]
    NotEligible { reward: RewardId, reason: String },

    #[error("reward {0} has no purchase cost")]
    NotPurchasable(RewardId),

    #[error("duplicate name: {0}")]
    DuplicateName(String),
}

impl RuleViolation {
    /// Stable machine-readable kind for external presenters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::DailyCapExceeded { .. } => "daily_cap_exceeded",
            Self::AlreadyClaimed(_) => "already_claimed",
            Self::NotCompleted(_) => "not_completed",
            Self::AlreadyActive(_) => "already_active",
            Self::MissionInactive(_) => "mission_inactive",
            Self::RewardInactive(_) => "reward_inactive",
            Self::AlreadyGranted(_) => "already_granted",
            Self::NotEligible { .. } => "not_eligible",
            Self::NotPurchasable(_) => "not_purchasable",
            Self::DuplicateName(_) => "duplicate_name",
        }
    }
}

/// Top-level error type for every exposed operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input, rejected before any write.
    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationError>),

    /// A business rule blocked the operation.
    #[error(transparent)]
    Rule(#[from] RuleViolation),

    /// A lost-update race persisted past the internal retry.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// The caller-supplied deadline elapsed before any write began.
    #[error("deadline exceeded before operation started")]
    DeadlineExceeded,

    /// Entity referenced by id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store fault — fatal for this call; transaction scoping guarantees no
    /// partially-applied state.
    #[error("store fault: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![ValidationError::new(field, message)])
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Stable machine-readable kind for external presenters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Rule(rule) => rule.kind(),
            Self::Conflict(_) => "concurrency_conflict",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "store_fault",
        }
    }

    /// True for outcomes an end user can act on (as opposed to faults).
    pub fn is_business_outcome(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Rule(_))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Convenience for logging refusals against a user without consuming them.
pub fn log_refusal(user: &UserId, err: &EngineError) {
    tracing::debug!(user = %user, kind = err.kind(), reason = %err, "operation refused");
}
