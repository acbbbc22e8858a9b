//! Notification fan-out contract
//!
//! Every externally interesting state change is exposed to a notification
//! collaborator. Dispatch is fire-and-forget and decoupled from the engine's
//! transaction boundaries; the collaborator owns retry and rendering.

use crate::{
    GrantSource, LevelId, MissionId, MissionInstanceId, RewardId, StreakRecord, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A state change worth telling the outside world about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressionEvent {
    CurrencyGranted {
        user: UserId,
        amount: u64,
        balance: u64,
        kind: String,
    },
    CurrencyDeducted {
        user: UserId,
        amount: u64,
        balance: u64,
        kind: String,
    },
    StreakChanged {
        user: UserId,
        record: StreakRecord,
    },
    LevelChanged {
        user: UserId,
        from: Option<LevelId>,
        to: Option<LevelId>,
    },
    MissionStarted {
        user: UserId,
        mission: MissionId,
        instance: MissionInstanceId,
    },
    MissionCompleted {
        user: UserId,
        mission: MissionId,
        instance: MissionInstanceId,
        completed_at: DateTime<Utc>,
    },
    MissionClaimed {
        user: UserId,
        mission: MissionId,
        reward_amount: u64,
    },
    MissionExpired {
        user: UserId,
        mission: MissionId,
        instance: MissionInstanceId,
    },
    RewardGranted {
        user: UserId,
        reward: RewardId,
        source: GrantSource,
    },
}

/// External notification collaborator. Implementations must not block the
/// engine: deliver quickly or queue internally.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: ProgressionEvent);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _event: ProgressionEvent) {}
}

/// Buffers events for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ProgressionEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressionEvent> {
        self.events.lock().expect("notifier lock poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("notifier lock poisoned").len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: ProgressionEvent) {
        self.events
            .lock()
            .expect("notifier lock poisoned")
            .push(event);
    }
}
