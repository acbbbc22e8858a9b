//! Currency Ledger - atomic grant/deduct with an immutable transaction log
//!
//! Every currency movement is one append-only `CurrencyTransaction`; the
//! per-user balance is the running sum and the log is the audit source of
//! truth. Mutations on the same user serialize through the shared
//! `UserLockRegistry`; mutations on different users proceed independently.
//! A `(kind, reference)` pair that was already applied replays the previous
//! result instead of applying twice.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use questline_store::{BalanceStore, QueryWindow, TransactionStore, UserLockRegistry};
use questline_types::{
    Clock, CurrencyTransaction, EngineError, EngineResult, Notifier, OpContext, ProgressionEvent,
    RuleViolation, StoreError, TimePolicy, TransactionId, UserBalance, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ledger policy knobs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Maximum cumulative grants per user per reference-timezone calendar
    /// day. A grant that would exceed the cap is rejected outright, never
    /// clipped. `None` disables the cap.
    pub daily_cap: Option<u64>,
    pub time_policy: TimePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            daily_cap: None,
            time_policy: TimePolicy::default(),
        }
    }
}

/// Result of a grant or deduct.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOutcome {
    pub transaction: TransactionId,
    /// Balance after the operation (or the previously computed balance on
    /// an idempotent replay).
    pub balance: u64,
    /// False when the call was deduplicated against an earlier transaction.
    pub applied: bool,
}

/// Whether a credit counts against the daily earn cap. Compensating
/// credits are exempt: a rollback must not be blocked by the policy that
/// refused the forward step.
#[derive(Clone, Copy, PartialEq, Eq)]
enum CapPolicy {
    Enforce,
    Exempt,
}

/// Audit report comparing the balance record against the transaction log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub user: UserId,
    pub balance: u64,
    pub ledger_sum: i64,
    pub consistent: bool,
}

/// The currency ledger.
pub struct CurrencyLedger<S> {
    store: Arc<S>,
    locks: Arc<UserLockRegistry>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    config: LedgerConfig,
}

impl<S> CurrencyLedger<S>
where
    S: BalanceStore + TransactionStore,
{
    pub fn new(
        store: Arc<S>,
        locks: Arc<UserLockRegistry>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            notifier,
            config,
        }
    }

    /// Grant currency. Atomic per user, idempotent per `(kind, reference)`.
    pub async fn grant(
        &self,
        ctx: &OpContext,
        user: &UserId,
        amount: u64,
        kind: &str,
        reference: &str,
    ) -> EngineResult<LedgerOutcome> {
        if amount == 0 {
            return Err(EngineError::validation("amount", "must be positive"));
        }
        ctx.check(self.clock.as_ref())?;

        self.credit(user, amount, kind, reference, CapPolicy::Enforce)
            .await
    }

    /// Compensating grant that rolls back an earlier deduction. Skips the
    /// daily cap check; idempotency and atomicity as for `grant`.
    pub async fn refund(
        &self,
        ctx: &OpContext,
        user: &UserId,
        amount: u64,
        kind: &str,
        reference: &str,
    ) -> EngineResult<LedgerOutcome> {
        if amount == 0 {
            return Err(EngineError::validation("amount", "must be positive"));
        }
        ctx.check(self.clock.as_ref())?;

        self.credit(user, amount, kind, reference, CapPolicy::Exempt)
            .await
    }

    async fn credit(
        &self,
        user: &UserId,
        amount: u64,
        kind: &str,
        reference: &str,
        cap: CapPolicy,
    ) -> EngineResult<LedgerOutcome> {
        let _guard = self.locks.acquire(user).await?;
        let outcome = self
            .apply_with_retry(user, amount as i64, kind, reference, cap)
            .await?;

        if outcome.applied {
            tracing::info!(
                user = %user, amount, kind, reference, balance = outcome.balance,
                "currency granted"
            );
            self.notifier
                .notify(ProgressionEvent::CurrencyGranted {
                    user: user.clone(),
                    amount,
                    balance: outcome.balance,
                    kind: kind.to_string(),
                })
                .await;
        }
        Ok(outcome)
    }

    /// Deduct currency. Fails with `InsufficientFunds` when the balance is
    /// short; atomicity and idempotency as for `grant`.
    pub async fn deduct(
        &self,
        ctx: &OpContext,
        user: &UserId,
        amount: u64,
        kind: &str,
        reference: &str,
    ) -> EngineResult<LedgerOutcome> {
        if amount == 0 {
            return Err(EngineError::validation("amount", "must be positive"));
        }
        ctx.check(self.clock.as_ref())?;

        let _guard = self.locks.acquire(user).await?;
        let outcome = self
            .apply_with_retry(user, -(amount as i64), kind, reference, CapPolicy::Enforce)
            .await?;

        if outcome.applied {
            tracing::info!(
                user = %user, amount, kind, reference, balance = outcome.balance,
                "currency deducted"
            );
            self.notifier
                .notify(ProgressionEvent::CurrencyDeducted {
                    user: user.clone(),
                    amount,
                    balance: outcome.balance,
                    kind: kind.to_string(),
                })
                .await;
        }
        Ok(outcome)
    }

    /// Current balance (0 for a user the ledger has never seen).
    pub async fn balance(&self, user: &UserId) -> EngineResult<u64> {
        Ok(self
            .store
            .get_balance(user)
            .await?
            .map(|b| b.balance)
            .unwrap_or(0))
    }

    /// Transaction history, newest-first.
    pub async fn history(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> EngineResult<Vec<CurrencyTransaction>> {
        Ok(self.store.list_transactions(user, window).await?)
    }

    /// Recompute the balance from the transaction log and compare.
    pub async fn reconcile(&self, user: &UserId) -> EngineResult<ReconcileReport> {
        let balance = self.balance(user).await?;
        let ledger_sum = self.store.sum_transactions(user).await?;
        Ok(ReconcileReport {
            user: user.clone(),
            balance,
            ledger_sum,
            consistent: ledger_sum >= 0 && balance == ledger_sum as u64,
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// One read-modify-write attempt, retried once on an optimistic
    /// conflict, then surfaced as `ConcurrencyConflict`.
    async fn apply_with_retry(
        &self,
        user: &UserId,
        signed_amount: i64,
        kind: &str,
        reference: &str,
        cap: CapPolicy,
    ) -> EngineResult<LedgerOutcome> {
        match self.apply_once(user, signed_amount, kind, reference, cap).await {
            Err(EngineError::Store(StoreError::Conflict(_))) => {
                tracing::debug!(user = %user, kind, reference, "optimistic conflict, retrying");
                match self.apply_once(user, signed_amount, kind, reference, cap).await {
                    Err(EngineError::Store(StoreError::Conflict(detail))) => {
                        Err(EngineError::Conflict(detail))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn apply_once(
        &self,
        user: &UserId,
        signed_amount: i64,
        kind: &str,
        reference: &str,
        cap: CapPolicy,
    ) -> EngineResult<LedgerOutcome> {
        // Deduplicate before touching the balance.
        if let Some(existing) = self.store.find_by_reference(user, kind, reference).await? {
            tracing::debug!(
                user = %user, kind, reference, transaction = %existing.id,
                "duplicate reference, replaying previous result"
            );
            return Ok(LedgerOutcome {
                transaction: existing.id,
                balance: existing.balance_after,
                applied: false,
            });
        }

        let now = self.clock.now();
        let current = match self.store.get_balance(user).await? {
            Some(balance) => balance,
            None => UserBalance::opening(user.clone(), now),
        };

        let new_balance = if signed_amount < 0 {
            let needed = signed_amount.unsigned_abs();
            if current.balance < needed {
                return Err(RuleViolation::InsufficientFunds {
                    balance: current.balance,
                    required: needed,
                }
                .into());
            }
            current.balance - needed
        } else {
            if cap == CapPolicy::Enforce {
                self.enforce_daily_cap(user, signed_amount as u64, now)
                    .await?;
            }
            current.balance + signed_amount as u64
        };

        self.store.put_balance(current.advanced(new_balance, now)).await?;

        let tx = CurrencyTransaction {
            id: TransactionId::generate(),
            user: user.clone(),
            amount: signed_amount,
            kind: kind.to_string(),
            reference: reference.to_string(),
            balance_after: new_balance,
            recorded_at: now,
        };
        let id = tx.id.clone();
        self.store.append_transaction(tx).await?;

        Ok(LedgerOutcome {
            transaction: id,
            balance: new_balance,
            applied: true,
        })
    }

    async fn enforce_daily_cap(
        &self,
        user: &UserId,
        amount: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let Some(cap) = self.config.daily_cap else {
            return Ok(());
        };
        let (from, to) = self.config.time_policy.day_bounds(now);
        let granted_today = self.store.granted_between(user, from, to).await?;
        if granted_today + amount > cap {
            return Err(RuleViolation::DailyCapExceeded { granted_today, cap }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use questline_store::InMemoryStore;
    use questline_types::{FixedClock, NullNotifier};

    fn ledger_with(
        config: LedgerConfig,
        clock: Arc<FixedClock>,
    ) -> CurrencyLedger<InMemoryStore> {
        CurrencyLedger::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(UserLockRegistry::new()),
            clock,
            Arc::new(NullNotifier),
            config,
        )
    }

    fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::at("2026-03-01T12:00:00Z".parse().expect("ts")))
    }

    #[tokio::test]
    async fn test_grant_and_deduct() {
        let ledger = ledger_with(LedgerConfig::default(), fixed_clock());
        let user = UserId::new("u1");
        let ctx = OpContext::new();

        let out = ledger
            .grant(&ctx, &user, 100, "reaction", "ref1")
            .await
            .expect("grant");
        assert_eq!(out.balance, 100);
        assert!(out.applied);

        let out = ledger
            .deduct(&ctx, &user, 40, "purchase", "p1")
            .await
            .expect("deduct");
        assert_eq!(out.balance, 60);

        assert_eq!(ledger.balance(&user).await.expect("balance"), 60);
        let report = ledger.reconcile(&user).await.expect("reconcile");
        assert!(report.consistent);
        assert_eq!(report.ledger_sum, 60);
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let ledger = ledger_with(LedgerConfig::default(), fixed_clock());
        let user = UserId::new("u1");
        let ctx = OpContext::new();

        let result = ledger.deduct(&ctx, &user, 10, "purchase", "p1").await;
        assert!(matches!(
            result,
            Err(EngineError::Rule(RuleViolation::InsufficientFunds {
                balance: 0,
                required: 10
            }))
        ));
        // Nothing was recorded
        assert_eq!(
            ledger
                .history(&user, QueryWindow::default())
                .await
                .expect("history")
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn test_idempotent_replay() {
        let ledger = ledger_with(LedgerConfig::default(), fixed_clock());
        let user = UserId::new("u1");
        let ctx = OpContext::new();

        let first = ledger
            .grant(&ctx, &user, 100, "activity", "evt-1")
            .await
            .expect("first");
        let replay = ledger
            .grant(&ctx, &user, 100, "activity", "evt-1")
            .await
            .expect("replay");

        assert!(first.applied);
        assert!(!replay.applied);
        assert_eq!(replay.transaction, first.transaction);
        assert_eq!(replay.balance, 100);
        assert_eq!(ledger.balance(&user).await.expect("balance"), 100);
    }

    #[tokio::test]
    async fn test_daily_cap_rejects_outright() {
        let clock = fixed_clock();
        let config = LedgerConfig {
            daily_cap: Some(150),
            time_policy: TimePolicy::default(),
        };
        let ledger = ledger_with(config, clock.clone());
        let user = UserId::new("u1");
        let ctx = OpContext::new();

        ledger
            .grant(&ctx, &user, 100, "activity", "a")
            .await
            .expect("within cap");

        // Would exceed: rejected outright, not clipped to the remaining 50
        let result = ledger.grant(&ctx, &user, 100, "activity", "b").await;
        assert!(matches!(
            result,
            Err(EngineError::Rule(RuleViolation::DailyCapExceeded {
                granted_today: 100,
                cap: 150
            }))
        ));
        assert_eq!(ledger.balance(&user).await.expect("balance"), 100);

        // The next reference-timezone day resets the allowance
        clock.advance(chrono::Duration::days(1));
        ledger
            .grant(&ctx, &user, 100, "activity", "b")
            .await
            .expect("next day");
    }

    #[tokio::test]
    async fn test_deducts_do_not_consume_cap() {
        let config = LedgerConfig {
            daily_cap: Some(100),
            time_policy: TimePolicy::default(),
        };
        let ledger = ledger_with(config, fixed_clock());
        let user = UserId::new("u1");
        let ctx = OpContext::new();

        ledger
            .grant(&ctx, &user, 100, "activity", "a")
            .await
            .expect("grant");
        ledger
            .deduct(&ctx, &user, 50, "purchase", "p")
            .await
            .expect("deduct");
        // Cap already reached; spending does not refresh it
        assert!(ledger.grant(&ctx, &user, 1, "activity", "b").await.is_err());
    }

    #[tokio::test]
    async fn test_refund_bypasses_daily_cap() {
        let config = LedgerConfig {
            daily_cap: Some(100),
            time_policy: TimePolicy::default(),
        };
        let ledger = ledger_with(config, fixed_clock());
        let user = UserId::new("u1");
        let ctx = OpContext::new();

        ledger
            .grant(&ctx, &user, 100, "activity", "a")
            .await
            .expect("grant");
        ledger
            .deduct(&ctx, &user, 60, "reward-purchase", "p1")
            .await
            .expect("deduct");

        // Earning is capped out, but the rollback of the deduction lands
        let out = ledger
            .refund(&ctx, &user, 60, "purchase-refund", "p1")
            .await
            .expect("refund");
        assert_eq!(out.balance, 100);
        assert!(ledger.grant(&ctx, &user, 1, "activity", "b").await.is_err());
        assert!(ledger.reconcile(&user).await.expect("reconcile").consistent);
    }

    #[tokio::test]
    async fn test_deadline_checked_before_any_write() {
        let clock = fixed_clock();
        let ledger = ledger_with(LedgerConfig::default(), clock.clone());
        let user = UserId::new("u1");

        let ctx = OpContext::with_deadline(clock.now() - chrono::Duration::seconds(1));
        let result = ledger.grant(&ctx, &user, 100, "activity", "a").await;
        assert!(matches!(result, Err(EngineError::DeadlineExceeded)));
        assert_eq!(ledger.balance(&user).await.expect("balance"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_grants_distinct_refs_both_apply() {
        let ledger = Arc::new(ledger_with(LedgerConfig::default(), fixed_clock()));
        let user = UserId::new("u1");

        let a = {
            let ledger = ledger.clone();
            let user = user.clone();
            tokio::spawn(async move {
                ledger
                    .grant(&OpContext::new(), &user, 50, "activity", "ref-a")
                    .await
            })
        };
        let b = {
            let ledger = ledger.clone();
            let user = user.clone();
            tokio::spawn(async move {
                ledger
                    .grant(&OpContext::new(), &user, 50, "activity", "ref-b")
                    .await
            })
        };
        a.await.expect("join").expect("grant a");
        b.await.expect("join").expect("grant b");

        assert_eq!(ledger.balance(&user).await.expect("balance"), 100);
        assert!(ledger.reconcile(&user).await.expect("reconcile").consistent);
    }

    #[tokio::test]
    async fn test_concurrent_grants_same_ref_apply_once() {
        let ledger = Arc::new(ledger_with(LedgerConfig::default(), fixed_clock()));
        let user = UserId::new("u1");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = ledger.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .grant(&OpContext::new(), &user, 50, "activity", "same-ref")
                    .await
            }));
        }
        let mut applied = 0;
        for handle in handles {
            let outcome = handle.await.expect("join").expect("grant");
            assert_eq!(outcome.balance, 50);
            if outcome.applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(ledger.balance(&user).await.expect("balance"), 50);
        assert_eq!(
            ledger
                .history(&user, QueryWindow::default())
                .await
                .expect("history")
                .len(),
            1
        );
    }

    proptest! {
        /// Balance always equals the sum of recorded transactions, whatever
        /// mix of grants and deducts (including rejected ones) arrives.
        #[test]
        fn prop_balance_equals_transaction_sum(
            ops in proptest::collection::vec((any::<bool>(), 1u64..500), 1..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            rt.block_on(async move {
                let ledger = ledger_with(LedgerConfig::default(), fixed_clock());
                let user = UserId::new("u1");
                let ctx = OpContext::new();

                for (i, (is_grant, amount)) in ops.into_iter().enumerate() {
                    let reference = format!("op-{}", i);
                    if is_grant {
                        ledger
                            .grant(&ctx, &user, amount, "activity", &reference)
                            .await
                            .expect("grant");
                    } else {
                        // May legitimately bounce on insufficient funds
                        let _ = ledger
                            .deduct(&ctx, &user, amount, "spend", &reference)
                            .await;
                    }
                    let report = ledger.reconcile(&user).await.expect("reconcile");
                    prop_assert!(report.consistent);
                }
                Ok(())
            })?;
        }
    }
}
