//! Pure progress evaluation
//!
//! Given a criteria, the instance's current progress state, and one incoming
//! event, decide what (if anything) changes. No storage, no clocks: the
//! engine resolves dates through `TimePolicy` and feeds the current streak
//! length in, so every rule here is a total function over its inputs.

use questline_types::{ActivityEvent, MissionCriteria, MissionProgress, TimePolicy};

/// Outcome of applying one event to an instance's progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// The event does not qualify for this mission.
    Unchanged,
    /// Progress moved but the goal is not yet met.
    Advanced(MissionProgress),
    /// The goal is met; carries the final progress state.
    Completed(MissionProgress),
}

impl ProgressUpdate {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Apply one qualifying-or-not event to the progress state of an in-progress
/// instance.
///
/// Daily and weekly counters are scoped to the policy's reference calendar:
/// an event landing on a new date (or in a new week) restarts the counter at
/// one rather than carrying the stale count forward. Streak criteria ignore
/// the event content entirely and compare the supplied streak length against
/// the goal.
pub fn advance(
    criteria: &MissionCriteria,
    progress: &MissionProgress,
    event: &ActivityEvent,
    policy: &TimePolicy,
    current_streak: u32,
) -> ProgressUpdate {
    match criteria {
        MissionCriteria::OneTime { event_kind, subtype } => {
            if event.matches(event_kind, subtype.as_deref()) {
                ProgressUpdate::Completed(MissionProgress::None)
            } else {
                ProgressUpdate::Unchanged
            }
        }
        MissionCriteria::Daily {
            event_kind,
            subtype,
            target,
        } => {
            if !event.matches(event_kind, subtype.as_deref()) {
                return ProgressUpdate::Unchanged;
            }
            let today = policy.local_date(event.timestamp);
            let count = match progress {
                MissionProgress::DailyCount { date, count } if *date == today => count + 1,
                _ => 1,
            };
            let next = MissionProgress::DailyCount { date: today, count };
            if count >= *target {
                ProgressUpdate::Completed(next)
            } else {
                ProgressUpdate::Advanced(next)
            }
        }
        MissionCriteria::Weekly {
            event_kind,
            subtype,
            target,
        } => {
            if !event.matches(event_kind, subtype.as_deref()) {
                return ProgressUpdate::Unchanged;
            }
            let anchor = policy.week_anchor(event.timestamp);
            let count = match progress {
                MissionProgress::WeeklyCount { week_anchor, count } if *week_anchor == anchor => {
                    count + 1
                }
                _ => 1,
            };
            let next = MissionProgress::WeeklyCount {
                week_anchor: anchor,
                count,
            };
            if count >= *target {
                ProgressUpdate::Completed(next)
            } else {
                ProgressUpdate::Advanced(next)
            }
        }
        MissionCriteria::Streak { days } => {
            if current_streak >= *days {
                ProgressUpdate::Completed(MissionProgress::None)
            } else {
                ProgressUpdate::Unchanged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc, Weekday};
    use questline_types::{EventKind, UserId};

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid timestamp")
    }

    fn message_at(s: &str) -> ActivityEvent {
        ActivityEvent::new(UserId::new("u1"), EventKind::Message, ts(s))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_one_time_completes_on_first_match() {
        let criteria = MissionCriteria::OneTime {
            event_kind: EventKind::Checkin,
            subtype: None,
        };
        let event = ActivityEvent::new(UserId::new("u1"), EventKind::Checkin, Utc::now());
        let update = advance(
            &criteria,
            &MissionProgress::None,
            &event,
            &TimePolicy::default(),
            0,
        );
        assert_eq!(update, ProgressUpdate::Completed(MissionProgress::None));
    }

    #[test]
    fn test_non_matching_event_is_ignored() {
        let criteria = MissionCriteria::Daily {
            event_kind: EventKind::Message,
            subtype: Some("thread_reply".into()),
            target: 3,
        };
        // Right kind, wrong subtype
        let event = message_at("2026-03-02T10:00:00Z");
        let update = advance(
            &criteria,
            &MissionProgress::None,
            &event,
            &TimePolicy::default(),
            0,
        );
        assert_eq!(update, ProgressUpdate::Unchanged);
    }

    #[test]
    fn test_daily_counter_builds_to_target() {
        let criteria = MissionCriteria::Daily {
            event_kind: EventKind::Message,
            subtype: None,
            target: 3,
        };
        let policy = TimePolicy::default();
        let mut progress = MissionProgress::None;

        for expected in 1..=2 {
            let update = advance(
                &criteria,
                &progress,
                &message_at("2026-03-02T10:00:00Z"),
                &policy,
                0,
            );
            match update {
                ProgressUpdate::Advanced(next) => {
                    assert_eq!(
                        next,
                        MissionProgress::DailyCount {
                            date: date(2026, 3, 2),
                            count: expected,
                        }
                    );
                    progress = next;
                }
                other => panic!("expected Advanced, got {:?}", other),
            }
        }

        let update = advance(
            &criteria,
            &progress,
            &message_at("2026-03-02T18:00:00Z"),
            &policy,
            0,
        );
        assert!(update.is_completed());
    }

    #[test]
    fn test_daily_counter_resets_on_new_date() {
        let criteria = MissionCriteria::Daily {
            event_kind: EventKind::Message,
            subtype: None,
            target: 3,
        };
        let progress = MissionProgress::DailyCount {
            date: date(2026, 3, 2),
            count: 2,
        };
        let update = advance(
            &criteria,
            &progress,
            &message_at("2026-03-03T09:00:00Z"),
            &TimePolicy::default(),
            0,
        );
        assert_eq!(
            update,
            ProgressUpdate::Advanced(MissionProgress::DailyCount {
                date: date(2026, 3, 3),
                count: 1,
            })
        );
    }

    #[test]
    fn test_daily_date_follows_reference_offset() {
        // 23:30 UTC on the 2nd is already the 3rd at UTC+1, so the counter
        // does not carry over
        let criteria = MissionCriteria::Daily {
            event_kind: EventKind::Message,
            subtype: None,
            target: 5,
        };
        let policy = TimePolicy::new(3600, Weekday::Mon);
        let progress = MissionProgress::DailyCount {
            date: date(2026, 3, 2),
            count: 4,
        };
        let update = advance(
            &criteria,
            &progress,
            &message_at("2026-03-02T23:30:00Z"),
            &policy,
            0,
        );
        assert_eq!(
            update,
            ProgressUpdate::Advanced(MissionProgress::DailyCount {
                date: date(2026, 3, 3),
                count: 1,
            })
        );
    }

    #[test]
    fn test_weekly_counter_spans_days_within_week() {
        let criteria = MissionCriteria::Weekly {
            event_kind: EventKind::Message,
            subtype: None,
            target: 2,
        };
        let policy = TimePolicy::default();
        // Monday 2026-03-02 anchors the week
        let update = advance(
            &criteria,
            &MissionProgress::None,
            &message_at("2026-03-02T10:00:00Z"),
            &policy,
            0,
        );
        let progress = match update {
            ProgressUpdate::Advanced(p) => p,
            other => panic!("expected Advanced, got {:?}", other),
        };

        // Thursday of the same week completes
        let update = advance(
            &criteria,
            &progress,
            &message_at("2026-03-05T10:00:00Z"),
            &policy,
            0,
        );
        assert_eq!(
            update,
            ProgressUpdate::Completed(MissionProgress::WeeklyCount {
                week_anchor: date(2026, 3, 2),
                count: 2,
            })
        );
    }

    #[test]
    fn test_weekly_counter_resets_on_new_week() {
        let criteria = MissionCriteria::Weekly {
            event_kind: EventKind::Message,
            subtype: None,
            target: 5,
        };
        let progress = MissionProgress::WeeklyCount {
            week_anchor: date(2026, 3, 2),
            count: 4,
        };
        // Next Monday starts a fresh week
        let update = advance(
            &criteria,
            &progress,
            &message_at("2026-03-09T08:00:00Z"),
            &TimePolicy::default(),
            0,
        );
        assert_eq!(
            update,
            ProgressUpdate::Advanced(MissionProgress::WeeklyCount {
                week_anchor: date(2026, 3, 9),
                count: 1,
            })
        );
    }

    #[test]
    fn test_streak_criteria_compares_current_run() {
        let criteria = MissionCriteria::Streak { days: 7 };
        let event = message_at("2026-03-02T10:00:00Z");
        let policy = TimePolicy::default();

        let update = advance(&criteria, &MissionProgress::None, &event, &policy, 6);
        assert_eq!(update, ProgressUpdate::Unchanged);

        let update = advance(&criteria, &MissionProgress::None, &event, &policy, 7);
        assert!(update.is_completed());
    }
}
