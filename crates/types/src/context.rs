//! Per-call operation context
//!
//! Carries the caller-supplied deadline. Mutating operations check it once,
//! before their first write, and never mid-transaction — a cancelled call is
//! either fully applied or not applied at all.

use crate::{Clock, EngineError, EngineResult};
use chrono::{DateTime, Utc};

/// Context handed to every mutating engine operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpContext {
    /// Absolute deadline after which the operation must not begin writing.
    pub deadline: Option<DateTime<Utc>>,
}

impl OpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// Fail fast if the deadline has already elapsed. Call before the first
    /// write of an operation, never between writes.
    pub fn check(&self, clock: &dyn Clock) -> EngineResult<()> {
        match self.deadline {
            Some(deadline) if clock.now() >= deadline => Err(EngineError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedClock;
    use chrono::Duration;

    #[test]
    fn test_deadline_enforced() {
        let clock = FixedClock::at(Utc::now());
        let ctx = OpContext::with_deadline(clock.now() + Duration::seconds(5));
        assert!(ctx.check(&clock).is_ok());

        clock.advance(Duration::seconds(5));
        assert!(matches!(
            ctx.check(&clock),
            Err(EngineError::DeadlineExceeded)
        ));
    }

    #[test]
    fn test_no_deadline_always_passes() {
        let clock = FixedClock::at(Utc::now());
        assert!(OpContext::new().check(&clock).is_ok());
    }
}
