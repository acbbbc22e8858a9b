//! Grant and purchase paths
//!
//! Both paths funnel through one internal `record_grant` so a purchased
//! reward behaves exactly like a granted one. A purchase that fails after
//! the cost was deducted is compensated with a refund transaction carrying
//! the same attempt reference, keeping the operation all-or-nothing.

use crate::evaluator::UnlockEvaluator;
use questline_ledger::CurrencyLedger;
use questline_store::{
    BalanceStore, LevelDefinitionStore, MissionInstanceStore, QueryWindow, RewardDefinitionStore,
    RewardGrantStore, TransactionStore,
};
use questline_types::{
    Clock, Eligibility, EngineError, EngineResult, GrantSource, Notifier, OpContext,
    ProgressionEvent, RewardDefinition, RewardGrant, RewardId, RewardKind, RuleViolation, UserId,
};
use std::sync::Arc;

/// Reward eligibility, grants, and currency purchases.
pub struct RewardService<S> {
    store: Arc<S>,
    evaluator: UnlockEvaluator<S>,
    ledger: Arc<CurrencyLedger<S>>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl<S> RewardService<S>
where
    S: BalanceStore
        + TransactionStore
        + LevelDefinitionStore
        + MissionInstanceStore
        + RewardDefinitionStore
        + RewardGrantStore,
{
    pub fn new(
        store: Arc<S>,
        ledger: Arc<CurrencyLedger<S>>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            evaluator: UnlockEvaluator::new(store.clone()),
            store,
            ledger,
            clock,
            notifier,
        }
    }

    /// Evaluate eligibility without side effects.
    pub async fn check(&self, user: &UserId, reward: &RewardId) -> EngineResult<Eligibility> {
        let def = self.require_definition(reward).await?;

        if !def.repeatable && self.store.grant_count(user, reward).await? > 0 {
            return Ok(Eligibility::ineligible("already obtained"));
        }
        match &def.unlock {
            None => Ok(Eligibility::Eligible),
            Some(condition) => self.evaluator.evaluate(user, condition).await,
        }
    }

    /// Grant a reward. Fails with `AlreadyGranted` on a non-repeatable
    /// duplicate and `NotEligible` when the unlock condition is unmet. A
    /// currency-bonus reward pays its bonus through the ledger in the same
    /// call.
    pub async fn grant(
        &self,
        ctx: &OpContext,
        user: &UserId,
        reward: &RewardId,
        source: GrantSource,
    ) -> EngineResult<RewardGrant> {
        let def = self.require_definition(reward).await?;
        if !def.active {
            return Err(RuleViolation::RewardInactive(reward.clone()).into());
        }
        self.ensure_grantable(user, &def).await?;

        ctx.check(self.clock.as_ref())?;
        self.record_grant(ctx, user, &def, source).await
    }

    /// Purchase a reward with currency: one atomic unit, not two steps.
    pub async fn purchase(
        &self,
        ctx: &OpContext,
        user: &UserId,
        reward: &RewardId,
    ) -> EngineResult<RewardGrant> {
        let def = self.require_definition(reward).await?;
        if !def.active {
            return Err(RuleViolation::RewardInactive(reward.clone()).into());
        }
        let cost = def
            .cost
            .ok_or_else(|| RuleViolation::NotPurchasable(reward.clone()))?;
        self.ensure_grantable(user, &def).await?;

        ctx.check(self.clock.as_ref())?;

        // One attempt reference ties the deduct (and any refund) together.
        let attempt = uuid::Uuid::new_v4().to_string();
        self.ledger
            .deduct(ctx, user, cost, "reward-purchase", &attempt)
            .await?;

        match self.record_grant(ctx, user, &def, GrantSource::Purchase).await {
            Ok(grant) => Ok(grant),
            Err(err) => {
                // Roll the deduction back so the failed purchase leaves no
                // trace in the balance.
                tracing::warn!(
                    user = %user, reward = %reward, reason = %err,
                    "purchase grant failed after deduction, refunding"
                );
                if let Err(refund_err) = self
                    .ledger
                    .refund(ctx, user, cost, "purchase-refund", &attempt)
                    .await
                {
                    tracing::error!(
                        user = %user, reward = %reward, error = %refund_err,
                        "purchase refund failed; ledger requires manual reconciliation"
                    );
                }
                Err(err)
            }
        }
    }

    /// Grants held by a user, newest-first.
    pub async fn grants(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> EngineResult<Vec<RewardGrant>> {
        Ok(self.store.list_grants(user, window).await?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn require_definition(&self, reward: &RewardId) -> EngineResult<RewardDefinition> {
        self.store
            .get_reward(reward)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("reward {}", reward)))
    }

    /// Duplicate and eligibility checks shared by grant and purchase.
    async fn ensure_grantable(&self, user: &UserId, def: &RewardDefinition) -> EngineResult<()> {
        if !def.repeatable && self.store.grant_count(user, &def.id).await? > 0 {
            return Err(RuleViolation::AlreadyGranted(def.id.clone()).into());
        }
        if let Some(condition) = &def.unlock {
            if let Eligibility::Ineligible { reason } =
                self.evaluator.evaluate(user, condition).await?
            {
                return Err(RuleViolation::NotEligible {
                    reward: def.id.clone(),
                    reason,
                }
                .into());
            }
        }
        Ok(())
    }

    async fn record_grant(
        &self,
        ctx: &OpContext,
        user: &UserId,
        def: &RewardDefinition,
        source: GrantSource,
    ) -> EngineResult<RewardGrant> {
        let grant = RewardGrant::new(user.clone(), def.id.clone(), source, self.clock.now());

        // The payout lands before the grant row: a refused bonus (daily cap)
        // must not leave a record that blocks every retry of a
        // non-repeatable reward.
        if let RewardKind::CurrencyBonus { amount } = def.kind {
            self.ledger
                .grant(ctx, user, amount, "reward-bonus", &grant.id.0)
                .await?;
        }
        self.store.insert_grant(grant.clone()).await?;

        tracing::info!(
            user = %user, reward = %def.id, source = %source, kind = def.kind.label(),
            "reward granted"
        );
        self.notifier
            .notify(ProgressionEvent::RewardGranted {
                user: user.clone(),
                reward: def.id.clone(),
                source,
            })
            .await;
        Ok(grant)
    }
}
