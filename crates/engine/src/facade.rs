//! Engine facade
//!
//! Wires every component against one store and one clock, with the two lock
//! registries split by domain: balance writes (ledger, level calculator)
//! serialize on one registry, mission-instance writes on another, and the
//! only nesting is instance-then-balance inside claim.
//!
//! `handle_activity` is the per-event control flow: currency grant for the
//! event's configured earn value, streak update, level re-check, mission
//! fan-out. Notification dispatch happens inside the components as their
//! state changes commit.

use crate::batch::{BatchReevaluator, SweepFault, SweepReport};
use crate::bundle::{CreatedBundle, MissionBundle, Orchestrator};
use crate::templates::{TemplateOverrides, TemplateRegistry};
use questline_ledger::{CurrencyLedger, LedgerConfig, LedgerOutcome};
use questline_level::LevelCalculator;
use questline_mission::MissionEngine;
use questline_reward::RewardService;
use questline_store::{ProgressionStore, UserLockRegistry};
use questline_streak::StreakTracker;
use questline_types::{
    log_refusal, ActivityEvent, Clock, EngineResult, EventKind, LevelTransition, MissionInstance,
    Notifier, OpContext, StreakOutcome, StreakRecord, StreakState, TimePolicy, UserId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

// ── Config ───────────────────────────────────────────────────────────

/// Engine-wide policy: what each activity kind earns, the daily grant cap,
/// and the reference calendar.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    earn_values: HashMap<EventKind, u64>,
    pub daily_cap: Option<u64>,
    pub time_policy: TimePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut earn_values = HashMap::new();
        earn_values.insert(EventKind::Message, 5);
        earn_values.insert(EventKind::Reaction, 2);
        earn_values.insert(EventKind::Checkin, 10);
        earn_values.insert(EventKind::Referral, 100);
        Self {
            earn_values,
            daily_cap: None,
            time_policy: TimePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_earn(mut self, kind: EventKind, amount: u64) -> Self {
        self.earn_values.insert(kind, amount);
        self
    }

    pub fn with_daily_cap(mut self, cap: u64) -> Self {
        self.daily_cap = Some(cap);
        self
    }

    pub fn with_time_policy(mut self, policy: TimePolicy) -> Self {
        self.time_policy = policy;
        self
    }

    /// Earn value for an event kind; unknown kinds earn nothing.
    pub fn earn_value(&self, kind: &EventKind) -> u64 {
        self.earn_values.get(kind).copied().unwrap_or(0)
    }

    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            daily_cap: self.daily_cap,
            time_policy: self.time_policy,
        }
    }
}

// ── Receipt ──────────────────────────────────────────────────────────

/// Everything one activity event changed.
#[derive(Clone, Debug, Serialize)]
pub struct ActivityReceipt {
    /// Absent when the kind earns nothing or the grant was refused by a
    /// business rule (daily cap). A redelivered event id carries the
    /// original outcome with `applied = false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted: Option<LedgerOutcome>,
    pub streak: StreakState,
    pub level: LevelTransition,
    pub missions_completed: Vec<MissionInstance>,
}

// ── Facade ───────────────────────────────────────────────────────────

pub struct ProgressionEngine<S> {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ledger: Arc<CurrencyLedger<S>>,
    streaks: Arc<StreakTracker<S>>,
    levels: Arc<LevelCalculator<S>>,
    missions: Arc<MissionEngine<S>>,
    rewards: Arc<RewardService<S>>,
    orchestrator: Orchestrator<S>,
    templates: TemplateRegistry,
    batch: BatchReevaluator<S>,
}

impl<S> ProgressionEngine<S>
where
    S: ProgressionStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        let balance_locks = Arc::new(UserLockRegistry::new());
        let instance_locks = Arc::new(UserLockRegistry::new());

        let ledger = Arc::new(CurrencyLedger::new(
            store.clone(),
            balance_locks.clone(),
            clock.clone(),
            notifier.clone(),
            config.ledger_config(),
        ));
        let streaks = Arc::new(StreakTracker::new(store.clone(), notifier.clone()));
        let levels = Arc::new(LevelCalculator::new(
            store.clone(),
            balance_locks,
            clock.clone(),
            notifier.clone(),
        ));
        let rewards = Arc::new(RewardService::new(
            store.clone(),
            ledger.clone(),
            clock.clone(),
            notifier.clone(),
        ));
        let missions = Arc::new(MissionEngine::new(
            store.clone(),
            ledger.clone(),
            streaks.clone(),
            levels.clone(),
            rewards.clone(),
            instance_locks,
            clock.clone(),
            config.time_policy,
            notifier,
        ));
        let orchestrator = Orchestrator::new(store.clone());
        let batch = BatchReevaluator::new(store, levels.clone());

        Self {
            config,
            clock,
            ledger,
            streaks,
            levels,
            missions,
            rewards,
            orchestrator,
            templates: TemplateRegistry::new(),
            batch,
        }
    }

    // ── Activity pipeline ────────────────────────────────────────────

    /// Apply one activity event end to end. A grant refused by a business
    /// rule (daily cap hit) does not stop the streak, level, and mission
    /// stages; a redelivered event id short-circuits them instead, so one
    /// event never counts twice anywhere.
    pub async fn handle_activity(
        &self,
        ctx: &OpContext,
        event: &ActivityEvent,
    ) -> EngineResult<ActivityReceipt> {
        ctx.check(self.clock.as_ref())?;

        let earn = self.config.earn_value(&event.kind);
        let granted = if earn > 0 {
            match self
                .ledger
                .grant(ctx, &event.user, earn, "activity", &event.event_id)
                .await
            {
                Ok(outcome) => Some(outcome),
                Err(err) if err.is_business_outcome() => {
                    log_refusal(&event.user, &err);
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        // A deduplicated grant means this event id already went through the
        // whole pipeline; running the later stages again would double-count
        // mission progress on feed redelivery.
        if let Some(outcome) = &granted {
            if !outcome.applied {
                return self.replay_receipt(event, granted.clone()).await;
            }
        }

        let streak = self
            .streaks
            .record_activity(&event.user, self.config.time_policy.local_date(event.timestamp))
            .await?;
        let level = self.levels.check_and_apply(ctx, &event.user).await?;
        let missions_completed = self.missions.on_event(ctx, event).await?;

        tracing::debug!(
            user = %event.user, kind = %event.kind,
            granted = granted.is_some(), level_changed = level.changed,
            completed = missions_completed.len(), "activity handled"
        );
        Ok(ActivityReceipt {
            granted,
            streak,
            level,
            missions_completed,
        })
    }

    /// Receipt for a redelivered event: the stored state, nothing touched.
    async fn replay_receipt(
        &self,
        event: &ActivityEvent,
        granted: Option<LedgerOutcome>,
    ) -> EngineResult<ActivityReceipt> {
        tracing::debug!(user = %event.user, event_id = %event.event_id, "replayed event, skipping fan-out");
        let record = match self.streaks.state(&event.user).await? {
            Some(record) => record,
            None => StreakRecord::opening(event.user.clone()),
        };
        let level = LevelTransition::unchanged(self.levels.current(&event.user).await?);
        Ok(ActivityReceipt {
            granted,
            streak: StreakState {
                record,
                outcome: StreakOutcome::Unchanged,
            },
            level,
            missions_completed: Vec::new(),
        })
    }

    // ── Administration ───────────────────────────────────────────────

    pub async fn create_mission_bundle(
        &self,
        bundle: MissionBundle,
    ) -> EngineResult<CreatedBundle> {
        self.orchestrator.create_mission_bundle(bundle).await
    }

    /// Expand a named preset with overrides and create it as a bundle.
    pub async fn apply_template(
        &self,
        name: &str,
        creator: &UserId,
        overrides: TemplateOverrides,
    ) -> EngineResult<CreatedBundle> {
        let bundle = self.templates.expand(name, creator, overrides)?;
        self.orchestrator.create_mission_bundle(bundle).await
    }

    pub async fn recheck_levels(
        &self,
        ctx: &OpContext,
        batch_size: usize,
    ) -> Result<SweepReport, SweepFault> {
        self.batch.recheck_levels(ctx, batch_size).await
    }

    // ── Component access ─────────────────────────────────────────────

    pub fn ledger(&self) -> &CurrencyLedger<S> {
        &self.ledger
    }

    pub fn streaks(&self) -> &StreakTracker<S> {
        &self.streaks
    }

    pub fn levels(&self) -> &LevelCalculator<S> {
        &self.levels
    }

    pub fn missions(&self) -> &MissionEngine<S> {
        &self.missions
    }

    pub fn rewards(&self) -> &RewardService<S> {
        &self.rewards
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::MissionSpec;
    use chrono::{DateTime, Utc};
    use questline_store::InMemoryStore;
    use questline_types::{FixedClock, MissionCriteria, MissionKind, MissionStatus, NullNotifier};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid timestamp")
    }

    fn engine_at(
        start: &str,
        config: EngineConfig,
    ) -> (Arc<FixedClock>, ProgressionEngine<InMemoryStore>) {
        let clock = Arc::new(FixedClock::at(ts(start)));
        let engine = ProgressionEngine::new(
            Arc::new(InMemoryStore::new()),
            clock.clone(),
            Arc::new(NullNotifier),
            config,
        );
        (clock, engine)
    }

    #[tokio::test]
    async fn test_activity_earns_and_starts_streak() {
        let (_clock, engine) = engine_at("2026-03-02T10:00:00Z", EngineConfig::default());
        let user = UserId::new("u1");
        let event = ActivityEvent::new(user.clone(), EventKind::Message, ts("2026-03-02T10:00:00Z"));

        let receipt = engine
            .handle_activity(&OpContext::new(), &event)
            .await
            .expect("handle");
        assert_eq!(receipt.granted.expect("granted").balance, 5);
        assert_eq!(receipt.streak.outcome, StreakOutcome::Started);
        assert_eq!(engine.ledger().balance(&user).await.expect("balance"), 5);
    }

    #[tokio::test]
    async fn test_replayed_event_id_does_not_double_earn() {
        let (_clock, engine) = engine_at("2026-03-02T10:00:00Z", EngineConfig::default());
        let user = UserId::new("u1");
        let event = ActivityEvent::new(user.clone(), EventKind::Message, ts("2026-03-02T10:00:00Z"))
            .with_id("evt-1");

        engine
            .handle_activity(&OpContext::new(), &event)
            .await
            .expect("first");
        let receipt = engine
            .handle_activity(&OpContext::new(), &event)
            .await
            .expect("replay");
        // Deduplicated, not refused: the grant reports applied = false
        assert!(!receipt.granted.expect("outcome").applied);
        assert_eq!(engine.ledger().balance(&user).await.expect("balance"), 5);
        assert_eq!(receipt.streak.outcome, StreakOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_replayed_event_id_does_not_advance_missions() {
        let (_clock, engine) = engine_at("2026-03-02T10:00:00Z", EngineConfig::default());
        let user = UserId::new("u1");
        let created = engine
            .create_mission_bundle(MissionBundle {
                mission: MissionSpec {
                    name: "two-a-day".into(),
                    description: String::new(),
                    kind: MissionKind::Daily,
                    criteria: MissionCriteria::Daily {
                        event_kind: EventKind::Message,
                        subtype: None,
                        target: 2,
                    },
                    reward_amount: 20,
                    repeatable: false,
                    created_by: UserId::new("admin"),
                    auto_level: None,
                    unlock_rewards: Vec::new(),
                },
                level: None,
                rewards: Vec::new(),
            })
            .await
            .expect("bundle");
        engine
            .missions()
            .start(&OpContext::new(), &user, &created.mission)
            .await
            .expect("start");

        let event = ActivityEvent::new(user.clone(), EventKind::Message, ts("2026-03-02T10:00:00Z"))
            .with_id("evt-1");
        engine
            .handle_activity(&OpContext::new(), &event)
            .await
            .expect("first");

        // Redelivery of the same event must not push the counter to the
        // target
        let receipt = engine
            .handle_activity(&OpContext::new(), &event)
            .await
            .expect("replay");
        assert!(receipt.missions_completed.is_empty());
        let open = engine
            .missions()
            .open_instance(&user, &created.mission)
            .await
            .expect("open")
            .expect("still in progress");
        assert_eq!(open.status, MissionStatus::InProgress);

        // A genuinely new event finishes the job
        let second =
            ActivityEvent::new(user.clone(), EventKind::Message, ts("2026-03-02T11:00:00Z"))
                .with_id("evt-2");
        let receipt = engine
            .handle_activity(&OpContext::new(), &second)
            .await
            .expect("second");
        assert_eq!(receipt.missions_completed.len(), 1);
    }

    #[tokio::test]
    async fn test_daily_cap_refusal_does_not_stop_the_pipeline() {
        let (_clock, engine) = engine_at(
            "2026-03-02T10:00:00Z",
            EngineConfig::default().with_daily_cap(8),
        );
        let user = UserId::new("u1");

        let first = ActivityEvent::new(user.clone(), EventKind::Message, ts("2026-03-02T10:00:00Z"));
        engine
            .handle_activity(&OpContext::new(), &first)
            .await
            .expect("first");

        // Another 5 would exceed the cap of 8; the grant is refused but the
        // streak still records
        let second =
            ActivityEvent::new(user.clone(), EventKind::Message, ts("2026-03-02T11:00:00Z"));
        let receipt = engine
            .handle_activity(&OpContext::new(), &second)
            .await
            .expect("second");
        assert!(receipt.granted.is_none());
        assert_eq!(engine.ledger().balance(&user).await.expect("balance"), 5);
    }

    #[tokio::test]
    async fn test_unknown_kind_earns_nothing() {
        let (_clock, engine) = engine_at("2026-03-02T10:00:00Z", EngineConfig::default());
        let user = UserId::new("u1");
        let event = ActivityEvent::new(
            user.clone(),
            EventKind::Custom("voice_join".into()),
            ts("2026-03-02T10:00:00Z"),
        );

        let receipt = engine
            .handle_activity(&OpContext::new(), &event)
            .await
            .expect("handle");
        assert!(receipt.granted.is_none());
        // Still counts as activity for the streak
        assert_eq!(receipt.streak.record.current, 1);
    }

    #[tokio::test]
    async fn test_earn_override() {
        let config = EngineConfig::default().with_earn(EventKind::Custom("boost".into()), 40);
        let (_clock, engine) = engine_at("2026-03-02T10:00:00Z", config);
        let event = ActivityEvent::new(
            UserId::new("u1"),
            EventKind::Custom("boost".into()),
            ts("2026-03-02T10:00:00Z"),
        );
        let receipt = engine
            .handle_activity(&OpContext::new(), &event)
            .await
            .expect("handle");
        assert_eq!(receipt.granted.expect("granted").balance, 40);
    }
}
