//! Currency model: per-user balance and the immutable transaction log

use crate::{LevelId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's current currency total and assigned level.
///
/// Invariant: `balance` equals the sum of all ledger transactions recorded
/// for the user. `version` is an optimistic-concurrency tag bumped on every
/// write; the store rejects writes whose version is not exactly one past the
/// stored one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub user: UserId,
    pub balance: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelId>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// Fresh zero balance for a user seen for the first time.
    pub fn opening(user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user,
            balance: 0,
            level: None,
            version: 0,
            updated_at: now,
        }
    }

    /// Produce the successor record with an applied delta. The caller has
    /// already checked range (deducts never exceed the balance).
    pub fn advanced(&self, new_balance: u64, now: DateTime<Utc>) -> Self {
        Self {
            user: self.user.clone(),
            balance: new_balance,
            level: self.level.clone(),
            version: self.version + 1,
            updated_at: now,
        }
    }

    /// Successor record with a new level assignment.
    pub fn with_level(&self, level: Option<LevelId>, now: DateTime<Utc>) -> Self {
        Self {
            user: self.user.clone(),
            balance: self.balance,
            level,
            version: self.version + 1,
            updated_at: now,
        }
    }
}

/// One immutable, signed currency movement. Never mutated or deleted once
/// written; `(user, kind, reference)` deduplicates retried calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTransaction {
    pub id: TransactionId,
    pub user: UserId,
    /// Positive for grants, negative for deducts.
    pub amount: i64,
    /// Cause of the movement (e.g. `activity`, `mission-reward`, `purchase`).
    pub kind: String,
    /// Caller-supplied deduplication reference (event id, instance id, ...).
    pub reference: String,
    /// Balance after this transaction applied. Lets an idempotent replay
    /// return the previously computed result.
    pub balance_after: u64,
    pub recorded_at: DateTime<Utc>,
}

impl CurrencyTransaction {
    pub fn is_grant(&self) -> bool {
        self.amount > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_advance_by_one() {
        let now = Utc::now();
        let opening = UserBalance::opening(UserId::new("u1"), now);
        assert_eq!(opening.version, 0);

        let next = opening.advanced(100, now);
        assert_eq!(next.version, 1);
        assert_eq!(next.balance, 100);

        let leveled = next.with_level(Some(LevelId::new("bronze")), now);
        assert_eq!(leveled.version, 2);
        assert_eq!(leveled.balance, 100);
    }
}
