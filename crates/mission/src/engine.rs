//! Mission instance lifecycle and event fan-out
//!
//! All instance writes for a user are serialized through the engine's own
//! lock registry, which is distinct from the balance registry held by the
//! ledger and level calculator. Lock order is always instance-then-balance
//! (claim grants currency while holding the instance lock); nothing ever
//! takes them the other way around.

use crate::progress::{advance, ProgressUpdate};
use questline_ledger::CurrencyLedger;
use questline_level::LevelCalculator;
use questline_reward::RewardService;
use questline_store::{ProgressionStore, QueryWindow, UserLockRegistry};
use questline_streak::StreakTracker;
use questline_types::{
    log_refusal, ActivityEvent, Clock, EngineError, EngineResult, GrantSource, LevelTransition,
    MissionCriteria, MissionDefinition, MissionId, MissionInstance, MissionInstanceId,
    MissionStatus, Notifier, OpContext, ProgressionEvent, RewardGrant, RuleViolation, TimePolicy,
    UserId,
};
use serde::Serialize;
use std::sync::Arc;

/// Everything a successful claim produced, in one value.
#[derive(Clone, Debug, Serialize)]
pub struct ClaimReceipt {
    pub instance: MissionInstance,
    /// Currency granted for the claim (zero for missions with no payout).
    pub amount_granted: u64,
    /// Balance after the payout.
    pub balance: u64,
    /// Present when the mission carries an auto-level override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelTransition>,
    /// Unlock rewards that were actually granted. A reward the user is not
    /// eligible for (or already holds) is skipped, not an error.
    pub rewards_granted: Vec<RewardGrant>,
}

/// The mission progress engine.
pub struct MissionEngine<S> {
    store: Arc<S>,
    ledger: Arc<CurrencyLedger<S>>,
    streaks: Arc<StreakTracker<S>>,
    levels: Arc<LevelCalculator<S>>,
    rewards: Arc<RewardService<S>>,
    locks: Arc<UserLockRegistry>,
    clock: Arc<dyn Clock>,
    policy: TimePolicy,
    notifier: Arc<dyn Notifier>,
}

impl<S> MissionEngine<S>
where
    S: ProgressionStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        ledger: Arc<CurrencyLedger<S>>,
        streaks: Arc<StreakTracker<S>>,
        levels: Arc<LevelCalculator<S>>,
        rewards: Arc<RewardService<S>>,
        locks: Arc<UserLockRegistry>,
        clock: Arc<dyn Clock>,
        policy: TimePolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            ledger,
            streaks,
            levels,
            rewards,
            locks,
            clock,
            policy,
            notifier,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start a mission for a user. At most one open instance per
    /// (user, mission); a non-repeatable mission the user already claimed
    /// can never be started again.
    pub async fn start(
        &self,
        ctx: &OpContext,
        user: &UserId,
        mission: &MissionId,
    ) -> EngineResult<MissionInstance> {
        let def = self.require_mission(mission).await?;
        if !def.active {
            return Err(RuleViolation::MissionInactive(mission.clone()).into());
        }

        let _guard = self.locks.acquire(user).await?;

        if self.store.find_open_instance(user, mission).await?.is_some() {
            return Err(RuleViolation::AlreadyActive(mission.clone()).into());
        }
        if !def.repeatable && self.store.has_claimed(user, mission).await? {
            return Err(RuleViolation::AlreadyClaimed(mission.clone()).into());
        }

        ctx.check(self.clock.as_ref())?;

        let instance = MissionInstance::start(user.clone(), mission.clone(), self.clock.now());
        self.store.insert_instance(instance.clone()).await?;

        tracing::info!(
            user = %user, mission = %mission, instance = %instance.id,
            "mission started"
        );
        self.notifier
            .notify(ProgressionEvent::MissionStarted {
                user: user.clone(),
                mission: mission.clone(),
                instance: instance.id.clone(),
            })
            .await;
        Ok(instance)
    }

    /// Fan one activity event out to every in-progress instance of its
    /// user. Returns the instances that reached `Completed` on this event.
    /// A definition that vanished or was retired mid-flight freezes its
    /// instance rather than failing the whole call.
    pub async fn on_event(
        &self,
        ctx: &OpContext,
        event: &ActivityEvent,
    ) -> EngineResult<Vec<MissionInstance>> {
        ctx.check(self.clock.as_ref())?;
        let _guard = self.locks.acquire(&event.user).await?;

        let open = self.store.list_in_progress(&event.user).await?;
        if open.is_empty() {
            return Ok(Vec::new());
        }

        // One streak read covers every streak mission in the batch.
        let needs_streak = {
            let mut found = false;
            for inst in &open {
                if let Some(def) = self.store.get_mission(&inst.mission).await? {
                    if matches!(def.criteria, MissionCriteria::Streak { .. }) {
                        found = true;
                        break;
                    }
                }
            }
            found
        };
        let current_streak = if needs_streak {
            self.streaks.current(&event.user).await?
        } else {
            0
        };

        let mut completed = Vec::new();
        for mut instance in open {
            let def = match self.store.get_mission(&instance.mission).await? {
                Some(def) if def.active => def,
                _ => {
                    tracing::warn!(
                        instance = %instance.id, mission = %instance.mission,
                        "instance references a missing or retired mission, skipping"
                    );
                    continue;
                }
            };

            match advance(
                &def.criteria,
                &instance.progress,
                event,
                &self.policy,
                current_streak,
            ) {
                ProgressUpdate::Unchanged => {}
                ProgressUpdate::Advanced(progress) => {
                    instance.progress = progress;
                    instance.updated_at = self.clock.now();
                    self.store.update_instance(instance).await?;
                }
                ProgressUpdate::Completed(progress) => {
                    instance.progress = progress;
                    let now = self.clock.now();
                    if instance.transition(MissionStatus::Completed, now) {
                        self.store.update_instance(instance.clone()).await?;
                        tracing::info!(
                            user = %event.user, mission = %def.id,
                            instance = %instance.id, "mission completed"
                        );
                        self.notifier
                            .notify(ProgressionEvent::MissionCompleted {
                                user: event.user.clone(),
                                mission: def.id.clone(),
                                instance: instance.id.clone(),
                                completed_at: now,
                            })
                            .await;
                        completed.push(instance);
                    }
                }
            }
        }
        Ok(completed)
    }

    /// Claim the user's completed run of a mission: pay the currency
    /// reward, apply the auto-level override if any, mark the instance
    /// claimed, then attempt the linked unlock-reward grants best-effort.
    ///
    /// The payout is keyed on the instance id, so a claim that failed after
    /// the grant can be retried and the replayed grant deduplicates instead
    /// of paying twice.
    pub async fn claim(
        &self,
        ctx: &OpContext,
        user: &UserId,
        mission: &MissionId,
    ) -> EngineResult<ClaimReceipt> {
        let def = self.require_mission(mission).await?;

        let _guard = self.locks.acquire(user).await?;

        let mut instance = match self.store.find_open_instance(user, mission).await? {
            Some(instance) => instance,
            None => {
                if self.store.has_claimed(user, mission).await? {
                    return Err(RuleViolation::AlreadyClaimed(mission.clone()).into());
                }
                return Err(RuleViolation::NotCompleted(mission.clone()).into());
            }
        };
        if instance.status != MissionStatus::Completed {
            return Err(RuleViolation::NotCompleted(mission.clone()).into());
        }

        ctx.check(self.clock.as_ref())?;

        let balance = if def.reward_amount > 0 {
            let outcome = self
                .ledger
                .grant(ctx, user, def.reward_amount, "mission-reward", &instance.id.0)
                .await?;
            outcome.balance
        } else {
            self.ledger.balance(user).await?
        };

        let level = match &def.auto_level {
            Some(level) => Some(self.levels.set_level(ctx, user, level).await?),
            None => None,
        };

        instance.transition(MissionStatus::Claimed, self.clock.now());
        self.store.update_instance(instance.clone()).await?;

        let rewards_granted = self.grant_unlock_rewards(ctx, user, &def).await;

        tracing::info!(
            user = %user, mission = %def.id, instance = %instance.id,
            amount = def.reward_amount, "mission claimed"
        );
        self.notifier
            .notify(ProgressionEvent::MissionClaimed {
                user: user.clone(),
                mission: def.id.clone(),
                reward_amount: def.reward_amount,
            })
            .await;

        Ok(ClaimReceipt {
            instance,
            amount_granted: def.reward_amount,
            balance,
            level,
            rewards_granted,
        })
    }

    /// Expire a non-terminal instance. Expiring an already-expired instance
    /// is a no-op; a completed or claimed instance cannot expire.
    pub async fn expire(
        &self,
        ctx: &OpContext,
        user: &UserId,
        instance_id: &MissionInstanceId,
    ) -> EngineResult<MissionInstance> {
        let _guard = self.locks.acquire(user).await?;

        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .filter(|i| i.user == *user)
            .ok_or_else(|| EngineError::not_found(format!("mission instance {}", instance_id)))?;

        if instance.status == MissionStatus::Expired {
            return Ok(instance);
        }
        ctx.check(self.clock.as_ref())?;

        if !instance.transition(MissionStatus::Expired, self.clock.now()) {
            return Err(EngineError::Conflict(format!(
                "instance {} cannot expire from {}",
                instance.id, instance.status
            )));
        }
        self.store.update_instance(instance.clone()).await?;

        tracing::info!(user = %user, instance = %instance.id, "mission expired");
        self.notifier
            .notify(ProgressionEvent::MissionExpired {
                user: user.clone(),
                mission: instance.mission.clone(),
                instance: instance.id.clone(),
            })
            .await;
        Ok(instance)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn instances(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> EngineResult<Vec<MissionInstance>> {
        Ok(self.store.list_instances(user, window).await?)
    }

    pub async fn open_instance(
        &self,
        user: &UserId,
        mission: &MissionId,
    ) -> EngineResult<Option<MissionInstance>> {
        Ok(self.store.find_open_instance(user, mission).await?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn require_mission(&self, mission: &MissionId) -> EngineResult<MissionDefinition> {
        self.store
            .get_mission(mission)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("mission {}", mission)))
    }

    /// Attempt every linked unlock-reward grant. Business refusals (not
    /// eligible, already granted, retired reward) are logged and skipped;
    /// the claim itself already succeeded.
    async fn grant_unlock_rewards(
        &self,
        ctx: &OpContext,
        user: &UserId,
        def: &MissionDefinition,
    ) -> Vec<RewardGrant> {
        let mut granted = Vec::new();
        for reward in &def.unlock_rewards {
            match self.rewards.grant(ctx, user, reward, GrantSource::Mission).await {
                Ok(grant) => granted.push(grant),
                Err(err) if err.is_business_outcome() => log_refusal(user, &err),
                Err(err) => {
                    tracing::error!(
                        user = %user, reward = %reward, error = %err,
                        "unlock reward grant failed"
                    );
                }
            }
        }
        granted
    }
}
