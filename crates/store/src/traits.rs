//! Storage contract consumed by the progression components
//!
//! The engine only relies on this contract: per-user-serializable read/write
//! with optimistic version checks on balances and append-only transaction
//! history. The in-memory adapter in this crate is the deterministic
//! reference; a transactional backend can implement the same traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use questline_types::{
    CurrencyTransaction, LevelDefinition, LevelId, MissionDefinition, MissionId, MissionInstance,
    MissionInstanceId, RewardDefinition, RewardGrant, RewardId, StoreResult, StreakRecord,
    UserBalance, UserId,
};

/// Generic query window for paged reads. A zero limit means "no limit".
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }

    pub fn page(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

/// Per-user balance records with optimistic version checks.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get_balance(&self, user: &UserId) -> StoreResult<Option<UserBalance>>;

    /// Versioned write. A record with `version == 1` must insert (no record
    /// may exist yet); otherwise the stored version must be exactly
    /// `version - 1`. Anything else is a `Conflict` — the caller re-reads
    /// and retries or surfaces it.
    async fn put_balance(&self, balance: UserBalance) -> StoreResult<()>;

    /// Users with a balance record, in stable order, for batch sweeps.
    async fn list_users(&self, window: QueryWindow) -> StoreResult<Vec<UserId>>;
}

/// Append-only currency transaction log.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Append one immutable transaction. Rejects a duplicate id or a
    /// duplicate `(user, kind, reference)` triple with `Conflict`.
    async fn append_transaction(&self, tx: CurrencyTransaction) -> StoreResult<()>;

    /// Idempotency lookup.
    async fn find_by_reference(
        &self,
        user: &UserId,
        kind: &str,
        reference: &str,
    ) -> StoreResult<Option<CurrencyTransaction>>;

    /// History for a user, newest-first.
    async fn list_transactions(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> StoreResult<Vec<CurrencyTransaction>>;

    /// Signed sum of all transactions for a user (audit/reconstruction).
    async fn sum_transactions(&self, user: &UserId) -> StoreResult<i64>;

    /// Total granted (positive amounts only) in `[from, to)`. Feeds the
    /// daily cap check.
    async fn granted_between(
        &self,
        user: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

/// Streak records, one per user.
#[async_trait]
pub trait StreakStore: Send + Sync {
    async fn get_streak(&self, user: &UserId) -> StoreResult<Option<StreakRecord>>;
    async fn put_streak(&self, record: StreakRecord) -> StoreResult<()>;
}

/// Level definitions. The store itself enforces uniqueness among active
/// levels so two concurrent creators cannot both pass a duplicate check.
#[async_trait]
pub trait LevelDefinitionStore: Send + Sync {
    /// Insert, rejecting a name, threshold, or ordinal that collides with an
    /// active level (`Conflict`).
    async fn insert_level(&self, def: LevelDefinition) -> StoreResult<()>;

    async fn get_level(&self, id: &LevelId) -> StoreResult<Option<LevelDefinition>>;

    /// Active levels in ascending threshold order.
    async fn list_active_levels(&self) -> StoreResult<Vec<LevelDefinition>>;

    async fn set_level_active(&self, id: &LevelId, active: bool) -> StoreResult<()>;

    /// Physical removal. Only for rolling back a definition created earlier
    /// in the same bundle call; retired definitions stay resolvable forever.
    async fn remove_level(&self, id: &LevelId) -> StoreResult<()>;
}

/// Mission definitions.
#[async_trait]
pub trait MissionDefinitionStore: Send + Sync {
    /// Insert, rejecting a name that collides with an active mission.
    async fn insert_mission(&self, def: MissionDefinition) -> StoreResult<()>;

    async fn get_mission(&self, id: &MissionId) -> StoreResult<Option<MissionDefinition>>;

    async fn list_active_missions(&self) -> StoreResult<Vec<MissionDefinition>>;

    async fn set_mission_active(&self, id: &MissionId, active: bool) -> StoreResult<()>;

    /// Same-call bundle rollback only.
    async fn remove_mission(&self, id: &MissionId) -> StoreResult<()>;
}

/// Per-user mission instances. Instances are mutated in place and never
/// physically deleted.
#[async_trait]
pub trait MissionInstanceStore: Send + Sync {
    async fn insert_instance(&self, instance: MissionInstance) -> StoreResult<()>;

    /// Replace the stored instance with the same id. `NotFound` if missing.
    async fn update_instance(&self, instance: MissionInstance) -> StoreResult<()>;

    async fn get_instance(
        &self,
        id: &MissionInstanceId,
    ) -> StoreResult<Option<MissionInstance>>;

    /// The user's non-terminal instance of a mission, if any.
    async fn find_open_instance(
        &self,
        user: &UserId,
        mission: &MissionId,
    ) -> StoreResult<Option<MissionInstance>>;

    /// Every in-progress instance for a user (event fan-out).
    async fn list_in_progress(&self, user: &UserId) -> StoreResult<Vec<MissionInstance>>;

    /// Full instance history for a user, newest-first.
    async fn list_instances(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> StoreResult<Vec<MissionInstance>>;

    /// Whether the user has ever claimed the mission.
    async fn has_claimed(&self, user: &UserId, mission: &MissionId) -> StoreResult<bool>;
}

/// Reward definitions.
#[async_trait]
pub trait RewardDefinitionStore: Send + Sync {
    /// Insert, rejecting a name that collides with an active reward.
    async fn insert_reward(&self, def: RewardDefinition) -> StoreResult<()>;

    async fn get_reward(&self, id: &RewardId) -> StoreResult<Option<RewardDefinition>>;

    async fn list_active_rewards(&self) -> StoreResult<Vec<RewardDefinition>>;

    async fn set_reward_active(&self, id: &RewardId, active: bool) -> StoreResult<()>;

    /// Same-call bundle rollback only.
    async fn remove_reward(&self, id: &RewardId) -> StoreResult<()>;
}

/// Reward grants held by users.
#[async_trait]
pub trait RewardGrantStore: Send + Sync {
    async fn insert_grant(&self, grant: RewardGrant) -> StoreResult<()>;

    async fn grant_count(&self, user: &UserId, reward: &RewardId) -> StoreResult<usize>;

    async fn list_grants(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> StoreResult<Vec<RewardGrant>>;
}

/// Unified storage bundle consumed by the engine facade.
pub trait ProgressionStore:
    BalanceStore
    + TransactionStore
    + StreakStore
    + LevelDefinitionStore
    + MissionDefinitionStore
    + MissionInstanceStore
    + RewardDefinitionStore
    + RewardGrantStore
    + Send
    + Sync
{
}

impl<T> ProgressionStore for T where
    T: BalanceStore
        + TransactionStore
        + StreakStore
        + LevelDefinitionStore
        + MissionDefinitionStore
        + MissionInstanceStore
        + RewardDefinitionStore
        + RewardGrantStore
        + Send
        + Sync
{
}
