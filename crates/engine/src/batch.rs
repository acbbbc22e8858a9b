//! Periodic level re-evaluation over the whole user base
//!
//! The scheduler that decides when to run lives outside this core; only the
//! call contract is here. Users are swept in bounded batches and every
//! user's write commits on its own, so a fault mid-sweep loses nothing that
//! already went through — the report says how far the sweep got.

use questline_level::LevelCalculator;
use questline_store::{BalanceStore, LevelDefinitionStore, QueryWindow};
use questline_types::{EngineError, OpContext, UserId};
use serde::Serialize;
use std::sync::Arc;

/// Result of one sweep.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    pub users_checked: usize,
    pub levels_changed: usize,
    pub batches: usize,
}

/// A sweep that stopped on a fault, carrying the progress made before it.
#[derive(Debug)]
pub struct SweepFault {
    pub partial: SweepReport,
    /// The user being processed when the sweep stopped, when known.
    pub user: Option<UserId>,
    pub error: EngineError,
}

pub struct BatchReevaluator<S> {
    store: Arc<S>,
    levels: Arc<LevelCalculator<S>>,
}

impl<S> BatchReevaluator<S>
where
    S: BalanceStore + LevelDefinitionStore,
{
    pub fn new(store: Arc<S>, levels: Arc<LevelCalculator<S>>) -> Self {
        Self { store, levels }
    }

    /// Re-derive every user's level from their balance, `batch_size` users
    /// at a time. A fault stops the sweep; earlier users stay committed and
    /// the fault reports the progress so far.
    pub async fn recheck_levels(
        &self,
        ctx: &OpContext,
        batch_size: usize,
    ) -> Result<SweepReport, SweepFault> {
        let batch_size = batch_size.max(1);
        let mut report = SweepReport::default();
        let mut offset = 0;

        loop {
            let users = self
                .store
                .list_users(QueryWindow::page(batch_size, offset))
                .await
                .map_err(|e| SweepFault {
                    partial: report.clone(),
                    user: None,
                    error: EngineError::Store(e),
                })?;
            if users.is_empty() {
                break;
            }
            report.batches += 1;

            for user in &users {
                match self.levels.check_and_apply(ctx, user).await {
                    Ok(transition) => {
                        report.users_checked += 1;
                        if transition.changed {
                            report.levels_changed += 1;
                        }
                    }
                    Err(error) => {
                        tracing::error!(
                            user = %user, checked = report.users_checked, error = %error,
                            "level sweep stopped on fault"
                        );
                        return Err(SweepFault {
                            partial: report,
                            user: Some(user.clone()),
                            error,
                        });
                    }
                }
            }
            tracing::debug!(
                batch = report.batches, checked = report.users_checked,
                changed = report.levels_changed, "level sweep batch done"
            );
            offset += users.len();
        }

        tracing::info!(
            users = report.users_checked, changed = report.levels_changed,
            batches = report.batches, "level sweep complete"
        );
        Ok(report)
    }
}
