//! Unlock-condition evaluation
//!
//! Pure reads, no side effects. The only composite form is conjunction;
//! a tree is satisfied when every leaf holds. Level comparisons use the
//! ordinal ladder position, never id equality.

use questline_store::{BalanceStore, LevelDefinitionStore, MissionInstanceStore};
use questline_types::{Eligibility, EngineError, EngineResult, UnlockCondition, UserId};
use std::sync::Arc;

/// Evaluates unlock-condition trees against user state.
pub struct UnlockEvaluator<S> {
    store: Arc<S>,
}

impl<S> UnlockEvaluator<S>
where
    S: BalanceStore + LevelDefinitionStore + MissionInstanceStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Evaluate a condition tree for a user. Fails only on store faults or
    /// a dangling level reference; an unmet condition is a normal
    /// `Ineligible` outcome carrying the first failing leaf's reason.
    pub async fn evaluate(
        &self,
        user: &UserId,
        condition: &UnlockCondition,
    ) -> EngineResult<Eligibility> {
        // AllOf is the only composite, so the tree flattens to a leaf list
        // and no recursion is needed.
        let mut pending = vec![condition];
        while let Some(node) = pending.pop() {
            match node {
                UnlockCondition::AllOf { conditions } => pending.extend(conditions.iter()),
                leaf => {
                    if let Eligibility::Ineligible { reason } =
                        self.evaluate_leaf(user, leaf).await?
                    {
                        return Ok(Eligibility::ineligible(reason));
                    }
                }
            }
        }
        Ok(Eligibility::Eligible)
    }

    async fn evaluate_leaf(
        &self,
        user: &UserId,
        leaf: &UnlockCondition,
    ) -> EngineResult<Eligibility> {
        match leaf {
            UnlockCondition::MissionClaimed { mission } => {
                if self.store.has_claimed(user, mission).await? {
                    Ok(Eligibility::Eligible)
                } else {
                    Ok(Eligibility::ineligible(format!(
                        "mission {} not claimed",
                        mission
                    )))
                }
            }

            UnlockCondition::LevelAtLeast { level } => {
                let required = self
                    .store
                    .get_level(level)
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("level {}", level)))?;

                let assigned = match self.store.get_balance(user).await?.and_then(|b| b.level) {
                    Some(id) => self.store.get_level(&id).await?,
                    None => None,
                };
                match assigned {
                    Some(current) if current.ordinal >= required.ordinal => {
                        Ok(Eligibility::Eligible)
                    }
                    _ => Ok(Eligibility::ineligible(format!(
                        "level '{}' or higher required",
                        required.name
                    ))),
                }
            }

            UnlockCondition::BalanceAtLeast { amount } => {
                let balance = self
                    .store
                    .get_balance(user)
                    .await?
                    .map(|b| b.balance)
                    .unwrap_or(0);
                if balance >= *amount {
                    Ok(Eligibility::Eligible)
                } else {
                    Ok(Eligibility::ineligible(format!(
                        "balance of {} required, have {}",
                        amount, balance
                    )))
                }
            }

            UnlockCondition::AllOf { .. } => {
                // Handled by the caller's worklist; unreachable as a leaf.
                Ok(Eligibility::Eligible)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use questline_store::InMemoryStore;
    use questline_types::{
        LevelDefinition, LevelId, MissionId, MissionInstance, MissionStatus, UserBalance,
    };

    async fn seed_levels(store: &InMemoryStore) -> (LevelId, LevelId) {
        let tier1 = LevelDefinition::new("tier-1", 0, 1);
        let tier2 = LevelDefinition::new("tier-2", 500, 2);
        let (id1, id2) = (tier1.id.clone(), tier2.id.clone());
        store.insert_level(tier1).await.expect("tier-1");
        store.insert_level(tier2).await.expect("tier-2");
        (id1, id2)
    }

    async fn seed_user(store: &InMemoryStore, user: &UserId, balance: u64, level: Option<LevelId>) {
        let funded = UserBalance::opening(user.clone(), Utc::now()).advanced(balance, Utc::now());
        store.put_balance(funded.clone()).await.expect("balance");
        store
            .put_balance(funded.with_level(level, Utc::now()))
            .await
            .expect("level");
    }

    #[tokio::test]
    async fn test_conjunction_requires_every_leaf() {
        let store = Arc::new(InMemoryStore::new());
        let (tier1, tier2) = seed_levels(&store).await;
        let user = UserId::new("u1");
        // Tier-1 with a rich balance: balance leaf holds, level leaf fails
        seed_user(&store, &user, 1500, Some(tier1)).await;

        let evaluator = UnlockEvaluator::new(store.clone());
        let condition = UnlockCondition::AllOf {
            conditions: vec![
                UnlockCondition::LevelAtLeast {
                    level: tier2.clone(),
                },
                UnlockCondition::BalanceAtLeast { amount: 1000 },
            ],
        };

        let result = evaluator.evaluate(&user, &condition).await.expect("eval");
        assert!(!result.is_eligible());

        // After reaching tier-2 the same user qualifies
        let current = store.get_balance(&user).await.expect("get").expect("some");
        store
            .put_balance(current.with_level(Some(tier2), Utc::now()))
            .await
            .expect("promote");
        let result = evaluator.evaluate(&user, &condition).await.expect("eval");
        assert!(result.is_eligible());
    }

    #[tokio::test]
    async fn test_level_compared_by_ordinal_not_id() {
        let store = Arc::new(InMemoryStore::new());
        let (tier1, tier2) = seed_levels(&store).await;
        let user = UserId::new("u1");
        // Assigned tier-2; a tier-1 requirement is satisfied by ordinal
        seed_user(&store, &user, 600, Some(tier2)).await;

        let evaluator = UnlockEvaluator::new(store.clone());
        let result = evaluator
            .evaluate(&user, &UnlockCondition::LevelAtLeast { level: tier1 })
            .await
            .expect("eval");
        assert!(result.is_eligible());
    }

    #[tokio::test]
    async fn test_mission_claimed_leaf() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserId::new("u1");
        let mission = MissionId::new("m1");
        let evaluator = UnlockEvaluator::new(store.clone());
        let condition = UnlockCondition::MissionClaimed {
            mission: mission.clone(),
        };

        let result = evaluator.evaluate(&user, &condition).await.expect("eval");
        assert!(!result.is_eligible());

        let mut instance = MissionInstance::start(user.clone(), mission, Utc::now());
        instance.transition(MissionStatus::Completed, Utc::now());
        instance.transition(MissionStatus::Claimed, Utc::now());
        store.insert_instance(instance).await.expect("insert");

        let result = evaluator.evaluate(&user, &condition).await.expect("eval");
        assert!(result.is_eligible());
    }

    #[tokio::test]
    async fn test_unknown_level_reference_is_a_fault() {
        let store = Arc::new(InMemoryStore::new());
        let evaluator = UnlockEvaluator::new(store);
        let result = evaluator
            .evaluate(
                &UserId::new("u1"),
                &UnlockCondition::LevelAtLeast {
                    level: LevelId::new("ghost"),
                },
            )
            .await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_no_balance_record_counts_as_zero() {
        let store = Arc::new(InMemoryStore::new());
        let evaluator = UnlockEvaluator::new(store);
        let result = evaluator
            .evaluate(
                &UserId::new("ghost"),
                &UnlockCondition::BalanceAtLeast { amount: 1 },
            )
            .await
            .expect("eval");
        assert!(!result.is_eligible());
    }
}
