//! Streak Tracker - consecutive-day activity runs
//!
//! Dates arrive already converted to the engine's reference timezone (the
//! facade applies `TimePolicy`); this component only reasons about
//! `NaiveDate` gaps. A user's record changes at most once per calendar day:
//! the first activity of a day either starts, extends, or resets the run,
//! and every further activity that day is a no-op.

#![deny(unsafe_code)]

use chrono::NaiveDate;
use questline_store::StreakStore;
use questline_types::{
    EngineResult, Notifier, ProgressionEvent, StreakOutcome, StreakRecord, StreakState, UserId,
};
use std::sync::Arc;

/// The streak tracker.
pub struct StreakTracker<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S> StreakTracker<S>
where
    S: StreakStore,
{
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Record one day of activity for a user and return the updated state.
    pub async fn record_activity(
        &self,
        user: &UserId,
        activity_date: NaiveDate,
    ) -> EngineResult<StreakState> {
        let mut record = match self.store.get_streak(user).await? {
            Some(record) => record,
            None => StreakRecord::opening(user.clone()),
        };

        let outcome = match record.last_activity {
            None => {
                record.current = 1;
                StreakOutcome::Started
            }
            Some(last) if activity_date == last => StreakOutcome::Unchanged,
            Some(last) if activity_date == last.succ_opt().unwrap_or(last) => {
                record.current += 1;
                StreakOutcome::Extended
            }
            Some(last) if activity_date < last => {
                // Out-of-order delivery of an older event; the record only
                // ever moves forward.
                return Ok(StreakState {
                    record,
                    outcome: StreakOutcome::Unchanged,
                });
            }
            Some(_) => {
                record.current = 1;
                StreakOutcome::Reset
            }
        };

        if outcome == StreakOutcome::Unchanged {
            return Ok(StreakState { record, outcome });
        }

        record.last_activity = Some(activity_date);
        record.longest = record.longest.max(record.current);
        self.store.put_streak(record.clone()).await?;

        tracing::debug!(
            user = %user, date = %activity_date, current = record.current,
            longest = record.longest, outcome = ?outcome, "streak updated"
        );
        self.notifier
            .notify(ProgressionEvent::StreakChanged {
                user: user.clone(),
                record: record.clone(),
            })
            .await;

        Ok(StreakState { record, outcome })
    }

    /// Current streak length (0 for a user with no recorded activity).
    /// Read by streak-mission completion predicates.
    pub async fn current(&self, user: &UserId) -> EngineResult<u32> {
        Ok(self
            .store
            .get_streak(user)
            .await?
            .map(|r| r.current)
            .unwrap_or(0))
    }

    pub async fn state(&self, user: &UserId) -> EngineResult<Option<StreakRecord>> {
        Ok(self.store.get_streak(user).await?)
    }
}
