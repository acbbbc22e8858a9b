//! Level Calculator - maps cumulative currency to an ordered tier
//!
//! The target level is the active level with the highest threshold at or
//! below the user's balance. A balance below every active threshold leaves
//! the user with no level assigned (not pinned to the lowest). Level
//! assignment shares the per-user lock registry with the ledger so level
//! writes never race balance writes for the same user.

#![deny(unsafe_code)]

use questline_store::{BalanceStore, LevelDefinitionStore, UserLockRegistry};
use questline_types::{
    Clock, EngineError, EngineResult, LevelDefinition, LevelId, LevelTransition, Notifier,
    OpContext, ProgressionEvent, UserBalance, UserId,
};
use std::sync::Arc;

/// The level calculator.
pub struct LevelCalculator<S> {
    store: Arc<S>,
    locks: Arc<UserLockRegistry>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl<S> LevelCalculator<S>
where
    S: BalanceStore + LevelDefinitionStore,
{
    pub fn new(
        store: Arc<S>,
        locks: Arc<UserLockRegistry>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            notifier,
        }
    }

    /// The level a balance earns among the active levels. Pure of any user
    /// state; `None` when no threshold is reached or no levels exist.
    pub fn target_for_balance(levels: &[LevelDefinition], balance: u64) -> Option<&LevelDefinition> {
        levels
            .iter()
            .filter(|l| l.threshold <= balance)
            .max_by_key(|l| l.threshold)
    }

    /// Re-derive the user's level from their balance and apply it if it
    /// differs from the current assignment.
    pub async fn check_and_apply(
        &self,
        ctx: &OpContext,
        user: &UserId,
    ) -> EngineResult<LevelTransition> {
        ctx.check(self.clock.as_ref())?;

        let levels = self.store.list_active_levels().await?;
        if levels.is_empty() {
            return Ok(LevelTransition::unchanged(None));
        }

        let _guard = self.locks.acquire(user).await?;
        let now = self.clock.now();
        let current = match self.store.get_balance(user).await? {
            Some(balance) => balance,
            // Never seen by the ledger: balance 0, nothing to assign unless
            // a zero-threshold level exists.
            None => UserBalance::opening(user.clone(), now),
        };

        let target = Self::target_for_balance(&levels, current.balance).map(|l| l.id.clone());
        if target == current.level {
            return Ok(LevelTransition::unchanged(current.level));
        }

        let from = current.level.clone();
        self.store
            .put_balance(current.with_level(target.clone(), now))
            .await?;

        tracing::info!(
            user = %user,
            from = from.as_ref().map(|l| l.0.as_str()).unwrap_or("none"),
            to = target.as_ref().map(|l| l.0.as_str()).unwrap_or("none"),
            "level changed"
        );
        self.notifier
            .notify(ProgressionEvent::LevelChanged {
                user: user.clone(),
                from: from.clone(),
                to: target.clone(),
            })
            .await;

        Ok(LevelTransition::changed(from, target))
    }

    /// Unconditional override, bypassing threshold computation. Used by
    /// mission auto-levels and administrative commands.
    pub async fn set_level(
        &self,
        ctx: &OpContext,
        user: &UserId,
        level: &LevelId,
    ) -> EngineResult<LevelTransition> {
        ctx.check(self.clock.as_ref())?;

        // The level must exist, but may be retired: historical overrides
        // keep resolving.
        if self.store.get_level(level).await?.is_none() {
            return Err(EngineError::not_found(format!("level {}", level)));
        }

        let _guard = self.locks.acquire(user).await?;
        let now = self.clock.now();
        let current = match self.store.get_balance(user).await? {
            Some(balance) => balance,
            None => UserBalance::opening(user.clone(), now),
        };

        if current.level.as_ref() == Some(level) {
            return Ok(LevelTransition::unchanged(current.level));
        }

        let from = current.level.clone();
        self.store
            .put_balance(current.with_level(Some(level.clone()), now))
            .await?;

        tracing::info!(user = %user, level = %level, "level override applied");
        self.notifier
            .notify(ProgressionEvent::LevelChanged {
                user: user.clone(),
                from: from.clone(),
                to: Some(level.clone()),
            })
            .await;

        Ok(LevelTransition::changed(from, Some(level.clone())))
    }

    /// The user's currently assigned level, if any.
    pub async fn current(&self, user: &UserId) -> EngineResult<Option<LevelId>> {
        Ok(self
            .store
            .get_balance(user)
            .await?
            .and_then(|b| b.level))
    }
}
