//! In-memory reference implementation of the storage contract
//!
//! Deterministic and test-friendly. Production deployments should put a
//! transactional backend (e.g. PostgreSQL) behind the same traits; the
//! version checks and uniqueness rules here mirror what that backend would
//! enforce with row versions and unique constraints.

use crate::traits::{
    BalanceStore, LevelDefinitionStore, MissionDefinitionStore, MissionInstanceStore, QueryWindow,
    RewardDefinitionStore, RewardGrantStore, StreakStore, TransactionStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use questline_types::{
    CurrencyTransaction, LevelDefinition, LevelId, MissionDefinition, MissionId, MissionInstance,
    MissionInstanceId, RewardDefinition, RewardGrant, RewardId, StoreError, StoreResult,
    StreakRecord, UserBalance, UserId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory progression store.
#[derive(Default)]
pub struct InMemoryStore {
    balances: RwLock<HashMap<UserId, UserBalance>>,
    transactions: RwLock<Vec<CurrencyTransaction>>,
    streaks: RwLock<HashMap<UserId, StreakRecord>>,
    levels: RwLock<HashMap<LevelId, LevelDefinition>>,
    missions: RwLock<HashMap<MissionId, MissionDefinition>>,
    instances: RwLock<HashMap<MissionInstanceId, MissionInstance>>,
    rewards: RwLock<HashMap<RewardId, RewardDefinition>>,
    grants: RwLock<Vec<RewardGrant>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Backend(format!("{} lock poisoned", what))
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

// ── Balances ─────────────────────────────────────────────────────────

#[async_trait]
impl BalanceStore for InMemoryStore {
    async fn get_balance(&self, user: &UserId) -> StoreResult<Option<UserBalance>> {
        let guard = self.balances.read().map_err(|_| poisoned("balances"))?;
        Ok(guard.get(user).cloned())
    }

    async fn put_balance(&self, balance: UserBalance) -> StoreResult<()> {
        let mut guard = self.balances.write().map_err(|_| poisoned("balances"))?;
        match guard.get(&balance.user) {
            None if balance.version == 1 => {}
            None => {
                return Err(StoreError::Conflict(format!(
                    "balance insert for {} must carry version 1, got {}",
                    balance.user, balance.version
                )));
            }
            Some(stored) if balance.version == stored.version + 1 => {}
            Some(stored) => {
                return Err(StoreError::Conflict(format!(
                    "stale balance write for {}: stored version {}, incoming {}",
                    balance.user, stored.version, balance.version
                )));
            }
        }
        guard.insert(balance.user.clone(), balance);
        Ok(())
    }

    async fn list_users(&self, window: QueryWindow) -> StoreResult<Vec<UserId>> {
        let guard = self.balances.read().map_err(|_| poisoned("balances"))?;
        let mut users = guard.keys().cloned().collect::<Vec<_>>();
        users.sort();
        Ok(apply_window(users, window))
    }
}

// ── Transactions ─────────────────────────────────────────────────────

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn append_transaction(&self, tx: CurrencyTransaction) -> StoreResult<()> {
        let mut guard = self
            .transactions
            .write()
            .map_err(|_| poisoned("transactions"))?;
        if guard.iter().any(|t| t.id == tx.id) {
            return Err(StoreError::Conflict(format!(
                "transaction {} already recorded",
                tx.id
            )));
        }
        if guard
            .iter()
            .any(|t| t.user == tx.user && t.kind == tx.kind && t.reference == tx.reference)
        {
            return Err(StoreError::Conflict(format!(
                "duplicate reference ({}, {}) for {}",
                tx.kind, tx.reference, tx.user
            )));
        }
        guard.push(tx);
        Ok(())
    }

    async fn find_by_reference(
        &self,
        user: &UserId,
        kind: &str,
        reference: &str,
    ) -> StoreResult<Option<CurrencyTransaction>> {
        let guard = self
            .transactions
            .read()
            .map_err(|_| poisoned("transactions"))?;
        Ok(guard
            .iter()
            .find(|t| t.user == *user && t.kind == kind && t.reference == reference)
            .cloned())
    }

    async fn list_transactions(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> StoreResult<Vec<CurrencyTransaction>> {
        let guard = self
            .transactions
            .read()
            .map_err(|_| poisoned("transactions"))?;
        let mut items = guard
            .iter()
            .filter(|t| t.user == *user)
            .cloned()
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(apply_window(items, window))
    }

    async fn sum_transactions(&self, user: &UserId) -> StoreResult<i64> {
        let guard = self
            .transactions
            .read()
            .map_err(|_| poisoned("transactions"))?;
        Ok(guard
            .iter()
            .filter(|t| t.user == *user)
            .map(|t| t.amount)
            .sum())
    }

    async fn granted_between(
        &self,
        user: &UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let guard = self
            .transactions
            .read()
            .map_err(|_| poisoned("transactions"))?;
        Ok(guard
            .iter()
            .filter(|t| {
                t.user == *user && t.amount > 0 && t.recorded_at >= from && t.recorded_at < to
            })
            .map(|t| t.amount as u64)
            .sum())
    }
}

// ── Streaks ──────────────────────────────────────────────────────────

#[async_trait]
impl StreakStore for InMemoryStore {
    async fn get_streak(&self, user: &UserId) -> StoreResult<Option<StreakRecord>> {
        let guard = self.streaks.read().map_err(|_| poisoned("streaks"))?;
        Ok(guard.get(user).cloned())
    }

    async fn put_streak(&self, record: StreakRecord) -> StoreResult<()> {
        let mut guard = self.streaks.write().map_err(|_| poisoned("streaks"))?;
        guard.insert(record.user.clone(), record);
        Ok(())
    }
}

// ── Level definitions ────────────────────────────────────────────────

#[async_trait]
impl LevelDefinitionStore for InMemoryStore {
    async fn insert_level(&self, def: LevelDefinition) -> StoreResult<()> {
        let mut guard = self.levels.write().map_err(|_| poisoned("levels"))?;
        if guard.contains_key(&def.id) {
            return Err(StoreError::Conflict(format!("level {} already exists", def.id)));
        }
        for existing in guard.values().filter(|l| l.active) {
            if existing.name == def.name {
                return Err(StoreError::Conflict(format!(
                    "active level named '{}' already exists",
                    def.name
                )));
            }
            if existing.threshold == def.threshold {
                return Err(StoreError::Conflict(format!(
                    "active level with threshold {} already exists",
                    def.threshold
                )));
            }
            if existing.ordinal == def.ordinal {
                return Err(StoreError::Conflict(format!(
                    "active level with ordinal {} already exists",
                    def.ordinal
                )));
            }
        }
        guard.insert(def.id.clone(), def);
        Ok(())
    }

    async fn get_level(&self, id: &LevelId) -> StoreResult<Option<LevelDefinition>> {
        let guard = self.levels.read().map_err(|_| poisoned("levels"))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_active_levels(&self) -> StoreResult<Vec<LevelDefinition>> {
        let guard = self.levels.read().map_err(|_| poisoned("levels"))?;
        let mut levels = guard
            .values()
            .filter(|l| l.active)
            .cloned()
            .collect::<Vec<_>>();
        levels.sort_by_key(|l| l.threshold);
        Ok(levels)
    }

    async fn set_level_active(&self, id: &LevelId, active: bool) -> StoreResult<()> {
        let mut guard = self.levels.write().map_err(|_| poisoned("levels"))?;
        let def = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("level {}", id)))?;
        def.active = active;
        Ok(())
    }

    async fn remove_level(&self, id: &LevelId) -> StoreResult<()> {
        let mut guard = self.levels.write().map_err(|_| poisoned("levels"))?;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("level {}", id)))
    }
}

// ── Mission definitions ──────────────────────────────────────────────

#[async_trait]
impl MissionDefinitionStore for InMemoryStore {
    async fn insert_mission(&self, def: MissionDefinition) -> StoreResult<()> {
        let mut guard = self.missions.write().map_err(|_| poisoned("missions"))?;
        if guard.contains_key(&def.id) {
            return Err(StoreError::Conflict(format!(
                "mission {} already exists",
                def.id
            )));
        }
        if guard.values().any(|m| m.active && m.name == def.name) {
            return Err(StoreError::Conflict(format!(
                "active mission named '{}' already exists",
                def.name
            )));
        }
        guard.insert(def.id.clone(), def);
        Ok(())
    }

    async fn get_mission(&self, id: &MissionId) -> StoreResult<Option<MissionDefinition>> {
        let guard = self.missions.read().map_err(|_| poisoned("missions"))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_active_missions(&self) -> StoreResult<Vec<MissionDefinition>> {
        let guard = self.missions.read().map_err(|_| poisoned("missions"))?;
        let mut missions = guard
            .values()
            .filter(|m| m.active)
            .cloned()
            .collect::<Vec<_>>();
        missions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(missions)
    }

    async fn set_mission_active(&self, id: &MissionId, active: bool) -> StoreResult<()> {
        let mut guard = self.missions.write().map_err(|_| poisoned("missions"))?;
        let def = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("mission {}", id)))?;
        def.active = active;
        Ok(())
    }

    async fn remove_mission(&self, id: &MissionId) -> StoreResult<()> {
        let mut guard = self.missions.write().map_err(|_| poisoned("missions"))?;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("mission {}", id)))
    }
}

// ── Mission instances ────────────────────────────────────────────────

#[async_trait]
impl MissionInstanceStore for InMemoryStore {
    async fn insert_instance(&self, instance: MissionInstance) -> StoreResult<()> {
        let mut guard = self.instances.write().map_err(|_| poisoned("instances"))?;
        if guard.contains_key(&instance.id) {
            return Err(StoreError::Conflict(format!(
                "instance {} already exists",
                instance.id
            )));
        }
        guard.insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn update_instance(&self, instance: MissionInstance) -> StoreResult<()> {
        let mut guard = self.instances.write().map_err(|_| poisoned("instances"))?;
        if !guard.contains_key(&instance.id) {
            return Err(StoreError::NotFound(format!("instance {}", instance.id)));
        }
        guard.insert(instance.id.clone(), instance);
        Ok(())
    }

    async fn get_instance(
        &self,
        id: &MissionInstanceId,
    ) -> StoreResult<Option<MissionInstance>> {
        let guard = self.instances.read().map_err(|_| poisoned("instances"))?;
        Ok(guard.get(id).cloned())
    }

    async fn find_open_instance(
        &self,
        user: &UserId,
        mission: &MissionId,
    ) -> StoreResult<Option<MissionInstance>> {
        let guard = self.instances.read().map_err(|_| poisoned("instances"))?;
        Ok(guard
            .values()
            .find(|i| i.user == *user && i.mission == *mission && !i.is_terminal())
            .cloned())
    }

    async fn list_in_progress(&self, user: &UserId) -> StoreResult<Vec<MissionInstance>> {
        let guard = self.instances.read().map_err(|_| poisoned("instances"))?;
        let mut items = guard
            .values()
            .filter(|i| i.user == *user && i.status == questline_types::MissionStatus::InProgress)
            .cloned()
            .collect::<Vec<_>>();
        items.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(items)
    }

    async fn list_instances(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> StoreResult<Vec<MissionInstance>> {
        let guard = self.instances.read().map_err(|_| poisoned("instances"))?;
        let mut items = guard
            .values()
            .filter(|i| i.user == *user)
            .cloned()
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(apply_window(items, window))
    }

    async fn has_claimed(&self, user: &UserId, mission: &MissionId) -> StoreResult<bool> {
        let guard = self.instances.read().map_err(|_| poisoned("instances"))?;
        Ok(guard.values().any(|i| {
            i.user == *user
                && i.mission == *mission
                && i.status == questline_types::MissionStatus::Claimed
        }))
    }
}

// ── Reward definitions ───────────────────────────────────────────────

#[async_trait]
impl RewardDefinitionStore for InMemoryStore {
    async fn insert_reward(&self, def: RewardDefinition) -> StoreResult<()> {
        let mut guard = self.rewards.write().map_err(|_| poisoned("rewards"))?;
        if guard.contains_key(&def.id) {
            return Err(StoreError::Conflict(format!(
                "reward {} already exists",
                def.id
            )));
        }
        if guard.values().any(|r| r.active && r.name == def.name) {
            return Err(StoreError::Conflict(format!(
                "active reward named '{}' already exists",
                def.name
            )));
        }
        guard.insert(def.id.clone(), def);
        Ok(())
    }

    async fn get_reward(&self, id: &RewardId) -> StoreResult<Option<RewardDefinition>> {
        let guard = self.rewards.read().map_err(|_| poisoned("rewards"))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_active_rewards(&self) -> StoreResult<Vec<RewardDefinition>> {
        let guard = self.rewards.read().map_err(|_| poisoned("rewards"))?;
        let mut rewards = guard
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect::<Vec<_>>();
        rewards.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rewards)
    }

    async fn set_reward_active(&self, id: &RewardId, active: bool) -> StoreResult<()> {
        let mut guard = self.rewards.write().map_err(|_| poisoned("rewards"))?;
        let def = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("reward {}", id)))?;
        def.active = active;
        Ok(())
    }

    async fn remove_reward(&self, id: &RewardId) -> StoreResult<()> {
        let mut guard = self.rewards.write().map_err(|_| poisoned("rewards"))?;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("reward {}", id)))
    }
}

// ── Reward grants ────────────────────────────────────────────────────

#[async_trait]
impl RewardGrantStore for InMemoryStore {
    async fn insert_grant(&self, grant: RewardGrant) -> StoreResult<()> {
        let mut guard = self.grants.write().map_err(|_| poisoned("grants"))?;
        if guard.iter().any(|g| g.id == grant.id) {
            return Err(StoreError::Conflict(format!(
                "grant {} already recorded",
                grant.id
            )));
        }
        guard.push(grant);
        Ok(())
    }

    async fn grant_count(&self, user: &UserId, reward: &RewardId) -> StoreResult<usize> {
        let guard = self.grants.read().map_err(|_| poisoned("grants"))?;
        Ok(guard
            .iter()
            .filter(|g| g.user == *user && g.reward == *reward)
            .count())
    }

    async fn list_grants(
        &self,
        user: &UserId,
        window: QueryWindow,
    ) -> StoreResult<Vec<RewardGrant>> {
        let guard = self.grants.read().map_err(|_| poisoned("grants"))?;
        let mut items = guard
            .iter()
            .filter(|g| g.user == *user)
            .cloned()
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(apply_window(items, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_types::{MissionCriteria, MissionStatus, TransactionId};

    fn tx(user: &str, kind: &str, reference: &str, amount: i64) -> CurrencyTransaction {
        CurrencyTransaction {
            id: TransactionId::generate(),
            user: UserId::new(user),
            amount,
            kind: kind.to_string(),
            reference: reference.to_string(),
            balance_after: amount.max(0) as u64,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_balance_version_check() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        let now = Utc::now();

        let opening = UserBalance::opening(user.clone(), now);
        // Version 0 cannot be written directly
        assert!(matches!(
            store.put_balance(opening.clone()).await,
            Err(StoreError::Conflict(_))
        ));

        let first = opening.advanced(100, now);
        store.put_balance(first.clone()).await.expect("insert");

        // Writing the same version again is a stale write
        assert!(matches!(
            store.put_balance(first.clone()).await,
            Err(StoreError::Conflict(_))
        ));

        let second = first.advanced(150, now);
        store.put_balance(second).await.expect("advance");
        let stored = store.get_balance(&user).await.expect("get").expect("some");
        assert_eq!(stored.balance, 150);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let store = InMemoryStore::new();
        store
            .append_transaction(tx("u1", "activity", "evt-1", 50))
            .await
            .expect("first");
        let result = store
            .append_transaction(tx("u1", "activity", "evt-1", 50))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // Same reference for another user is a different triple
        store
            .append_transaction(tx("u2", "activity", "evt-1", 50))
            .await
            .expect("other user");
    }

    #[tokio::test]
    async fn test_granted_between_ignores_deducts() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        store
            .append_transaction(tx("u1", "activity", "a", 100))
            .await
            .expect("grant");
        store
            .append_transaction(tx("u1", "purchase", "b", -40))
            .await
            .expect("deduct");

        let from = Utc::now() - chrono::Duration::hours(1);
        let to = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(
            store.granted_between(&user, from, to).await.expect("sum"),
            100
        );
        assert_eq!(store.sum_transactions(&user).await.expect("sum"), 60);
    }

    #[tokio::test]
    async fn test_level_uniqueness_among_active() {
        let store = InMemoryStore::new();
        let bronze = LevelDefinition::new("bronze", 0, 1);
        store.insert_level(bronze.clone()).await.expect("insert");

        // Name, threshold, and ordinal collisions all rejected
        for def in [
            LevelDefinition::new("bronze", 500, 2),
            LevelDefinition::new("silver", 0, 2),
            LevelDefinition::new("silver", 500, 1),
        ] {
            assert!(matches!(
                store.insert_level(def).await,
                Err(StoreError::Conflict(_))
            ));
        }

        // Retiring frees the slot
        store
            .set_level_active(&bronze.id, false)
            .await
            .expect("retire");
        store
            .insert_level(LevelDefinition::new("bronze", 0, 1))
            .await
            .expect("reuse after retire");
    }

    #[tokio::test]
    async fn test_open_instance_and_claims() {
        let store = InMemoryStore::new();
        let user = UserId::new("u1");
        let mission = MissionId::new("m1");
        let now = Utc::now();

        let mut instance = MissionInstance::start(user.clone(), mission.clone(), now);
        store
            .insert_instance(instance.clone())
            .await
            .expect("insert");

        let open = store
            .find_open_instance(&user, &mission)
            .await
            .expect("find")
            .expect("open");
        assert_eq!(open.id, instance.id);
        assert!(!store.has_claimed(&user, &mission).await.expect("claimed"));

        instance.transition(MissionStatus::Completed, now);
        instance.transition(MissionStatus::Claimed, now);
        store
            .update_instance(instance.clone())
            .await
            .expect("update");

        assert!(store
            .find_open_instance(&user, &mission)
            .await
            .expect("find")
            .is_none());
        assert!(store.has_claimed(&user, &mission).await.expect("claimed"));
    }

    #[tokio::test]
    async fn test_mission_definition_lifecycle() {
        let store = InMemoryStore::new();
        let def = MissionDefinition::new(
            "daily-5",
            MissionCriteria::Daily {
                event_kind: questline_types::EventKind::Message,
                subtype: None,
                target: 5,
            },
            100,
        );
        store.insert_mission(def.clone()).await.expect("insert");
        assert_eq!(store.list_active_missions().await.expect("list").len(), 1);

        store
            .set_mission_active(&def.id, false)
            .await
            .expect("retire");
        assert!(store.list_active_missions().await.expect("list").is_empty());
        // Retired definitions stay resolvable by id
        assert!(store.get_mission(&def.id).await.expect("get").is_some());
    }
}
