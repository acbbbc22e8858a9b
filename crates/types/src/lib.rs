//! Questline shared data model
//!
//! Ids, activity events, the currency/streak/level/mission/reward data
//! model, the engine-wide error taxonomy, and the clock/time-policy and
//! notification abstractions. Behavior lives in the component crates; this
//! crate is types plus the small invariant-preserving methods they carry
//! (status transitions, version advancement).

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod context;
mod currency;
mod errors;
mod event;
mod ids;
mod level;
mod mission;
mod notify;
mod reward;
mod streak;
mod time;

pub use context::OpContext;
pub use currency::{CurrencyTransaction, UserBalance};
pub use errors::{
    log_refusal, EngineError, EngineResult, RuleViolation, StoreError, StoreResult,
    ValidationError,
};
pub use event::{ActivityEvent, EventKind};
pub use ids::{
    GrantId, LevelId, MissionId, MissionInstanceId, RewardId, TransactionId, UserId,
};
pub use level::{LevelDefinition, LevelTransition};
pub use mission::{
    MissionCriteria, MissionDefinition, MissionInstance, MissionKind, MissionProgress,
    MissionStatus,
};
pub use notify::{Notifier, NullNotifier, ProgressionEvent, RecordingNotifier};
pub use reward::{
    Eligibility, GrantSource, RewardDefinition, RewardGrant, RewardKind, UnlockCondition,
};
pub use streak::{StreakOutcome, StreakRecord, StreakState};
pub use time::{Clock, FixedClock, SystemClock, TimePolicy};
