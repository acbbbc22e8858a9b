//! All-or-nothing creation of interdependent definitions
//!
//! A bundle is one mission plus an optional level and any number of rewards,
//! created as a unit. Validation runs first and accumulates every problem
//! with a dotted field path; nothing is written unless the whole bundle is
//! clean. The commit sequence is level, rewards, mission — the generated ids
//! are wired into the mission definition — and any failure mid-sequence
//! removes what this call created, so partial bundles are never visible.
//!
//! Duplicate checks here are advisory: the store enforces uniqueness among
//! active definitions at insert, so two concurrent creators cannot both pass
//! validation and both commit. That second line surfaces as a `Conflict`.

use questline_store::{
    LevelDefinitionStore, MissionDefinitionStore, RewardDefinitionStore,
};
use questline_types::{
    EngineError, EngineResult, LevelDefinition, LevelId, MissionCriteria, MissionDefinition,
    MissionId, MissionKind, RewardDefinition, RewardId, RewardKind, StoreError, UnlockCondition,
    UserId, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Bundle specs ─────────────────────────────────────────────────────

/// Requested mission, without ids: the orchestrator generates those.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Declared category; must agree with the criteria variant.
    pub kind: MissionKind,
    pub criteria: MissionCriteria,
    pub reward_amount: u64,
    #[serde(default)]
    pub repeatable: bool,
    pub created_by: UserId,
    /// Link to an already-existing level, used when the bundle carries no
    /// level spec of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_level: Option<LevelId>,
    /// Already-existing rewards to link in addition to any created here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unlock_rewards: Vec<RewardId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LevelSpec {
    pub name: String,
    pub threshold: u64,
    pub ordinal: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardSpec {
    pub name: String,
    pub kind: RewardKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock: Option<UnlockCondition>,
    #[serde(default)]
    pub repeatable: bool,
}

/// One atomic creation request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissionBundle {
    pub mission: MissionSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewards: Vec<RewardSpec>,
}

/// Ids of everything a successful bundle call created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatedBundle {
    pub mission: MissionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LevelId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rewards: Vec<RewardId>,
}

// ── Orchestrator ─────────────────────────────────────────────────────

pub struct Orchestrator<S> {
    store: Arc<S>,
}

impl<S> Orchestrator<S>
where
    S: LevelDefinitionStore + MissionDefinitionStore + RewardDefinitionStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validate and create a whole bundle, or create nothing.
    pub async fn create_mission_bundle(
        &self,
        bundle: MissionBundle,
    ) -> EngineResult<CreatedBundle> {
        let errors = self.validate(&bundle).await?;
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        self.commit(bundle).await
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Collect every validation problem before touching the store for
    /// writes. Store reads here only feed collision checks.
    async fn validate(&self, bundle: &MissionBundle) -> EngineResult<Vec<ValidationError>> {
        let mut errors = Vec::new();

        self.validate_mission(&bundle.mission, bundle.level.is_some(), &mut errors)
            .await?;
        if let Some(level) = &bundle.level {
            self.validate_level(level, &mut errors).await?;
        }
        for (i, reward) in bundle.rewards.iter().enumerate() {
            validate_reward(reward, i, &mut errors);
        }
        Ok(errors)
    }

    async fn validate_mission(
        &self,
        spec: &MissionSpec,
        bundle_has_level: bool,
        errors: &mut Vec<ValidationError>,
    ) -> EngineResult<()> {
        if spec.name.trim().is_empty() {
            errors.push(ValidationError::new("mission.name", "must not be empty"));
        } else {
            let taken = self
                .store
                .list_active_missions()
                .await?
                .iter()
                .any(|m| m.name == spec.name);
            if taken {
                errors.push(ValidationError::new(
                    "mission.name",
                    "an active mission already uses this name",
                ));
            }
        }

        if spec.criteria.kind() != spec.kind {
            errors.push(ValidationError::new(
                "mission.criteria",
                format!(
                    "criteria shape {:?} does not match declared kind {:?}",
                    spec.criteria.kind(),
                    spec.kind
                ),
            ));
        }
        match &spec.criteria {
            MissionCriteria::Daily { target, .. } | MissionCriteria::Weekly { target, .. } => {
                if *target == 0 {
                    errors.push(ValidationError::new(
                        "mission.criteria.target",
                        "target count must be positive",
                    ));
                }
            }
            MissionCriteria::Streak { days } => {
                if *days == 0 {
                    errors.push(ValidationError::new(
                        "mission.criteria.days",
                        "streak length must be positive",
                    ));
                }
            }
            MissionCriteria::OneTime { .. } => {}
        }

        if bundle_has_level && spec.auto_level.is_some() {
            errors.push(ValidationError::new(
                "mission.auto_level",
                "cannot both link an existing level and create one in the bundle",
            ));
        }
        if let Some(level) = &spec.auto_level {
            if self.store.get_level(level).await?.is_none() {
                errors.push(ValidationError::new(
                    "mission.auto_level",
                    format!("level {} does not exist", level),
                ));
            }
        }
        for (i, reward) in spec.unlock_rewards.iter().enumerate() {
            if self.store.get_reward(reward).await?.is_none() {
                errors.push(ValidationError::new(
                    format!("mission.unlock_rewards[{}]", i),
                    format!("reward {} does not exist", reward),
                ));
            }
        }
        Ok(())
    }

    /// A new level's threshold and ordinal must not collide with any active
    /// level, and the new ordinal must keep the active ladder contiguous.
    async fn validate_level(
        &self,
        spec: &LevelSpec,
        errors: &mut Vec<ValidationError>,
    ) -> EngineResult<()> {
        if spec.name.trim().is_empty() {
            errors.push(ValidationError::new("level.name", "must not be empty"));
        }

        let active = self.store.list_active_levels().await?;
        if active.iter().any(|l| l.name == spec.name) {
            errors.push(ValidationError::new(
                "level.name",
                "an active level already uses this name",
            ));
        }
        if active.iter().any(|l| l.threshold == spec.threshold) {
            errors.push(ValidationError::new(
                "level.threshold",
                format!("threshold {} collides with an active level", spec.threshold),
            ));
        }
        if active.iter().any(|l| l.ordinal == spec.ordinal) {
            errors.push(ValidationError::new(
                "level.ordinal",
                format!("ordinal {} collides with an active level", spec.ordinal),
            ));
        }
        let expected = active.iter().map(|l| l.ordinal).max().map_or(1, |o| o + 1);
        if spec.ordinal != expected {
            errors.push(ValidationError::new(
                "level.ordinal",
                format!(
                    "ordinal {} breaks contiguity; the next ordinal is {}",
                    spec.ordinal, expected
                ),
            ));
        }
        Ok(())
    }

    // ── Commit ───────────────────────────────────────────────────────

    /// Insert in dependency order, wiring generated ids forward. On any
    /// failure, remove what this call already created and surface the
    /// original error.
    async fn commit(&self, bundle: MissionBundle) -> EngineResult<CreatedBundle> {
        let mut created_level: Option<LevelId> = None;
        let mut created_rewards: Vec<RewardId> = Vec::new();

        let result = self
            .commit_inner(&bundle, &mut created_level, &mut created_rewards)
            .await;
        match result {
            Ok(mission) => {
                tracing::info!(
                    mission = %mission,
                    level = created_level.as_ref().map(|l| l.to_string()).unwrap_or_default(),
                    rewards = created_rewards.len(),
                    "mission bundle created"
                );
                Ok(CreatedBundle {
                    mission,
                    level: created_level,
                    rewards: created_rewards,
                })
            }
            Err(err) => {
                self.rollback(created_level, created_rewards).await;
                Err(err)
            }
        }
    }

    async fn commit_inner(
        &self,
        bundle: &MissionBundle,
        created_level: &mut Option<LevelId>,
        created_rewards: &mut Vec<RewardId>,
    ) -> EngineResult<MissionId> {
        if let Some(spec) = &bundle.level {
            let def = LevelDefinition::new(spec.name.clone(), spec.threshold, spec.ordinal);
            let id = def.id.clone();
            self.store.insert_level(def).await.map_err(race)?;
            *created_level = Some(id);
        }

        for spec in &bundle.rewards {
            let mut def = RewardDefinition::new(spec.name.clone(), spec.kind.clone());
            if let Some(cost) = spec.cost {
                def = def.with_cost(cost);
            }
            if let Some(unlock) = &spec.unlock {
                def = def.with_unlock(unlock.clone());
            }
            if spec.repeatable {
                def = def.repeatable();
            }
            let id = def.id.clone();
            self.store.insert_reward(def).await.map_err(race)?;
            created_rewards.push(id);
        }

        let spec = &bundle.mission;
        let mut def = MissionDefinition::new(
            spec.name.clone(),
            spec.criteria.clone(),
            spec.reward_amount,
        )
        .with_description(spec.description.clone())
        .with_creator(spec.created_by.clone());
        if spec.repeatable {
            def = def.repeatable();
        }
        if let Some(level) = created_level.clone().or_else(|| spec.auto_level.clone()) {
            def = def.with_auto_level(level);
        }
        for reward in spec.unlock_rewards.iter().chain(created_rewards.iter()) {
            def = def.with_unlock_reward(reward.clone());
        }
        let id = def.id.clone();
        self.store.insert_mission(def).await.map_err(race)?;
        Ok(id)
    }

    async fn rollback(&self, level: Option<LevelId>, rewards: Vec<RewardId>) {
        for reward in rewards {
            if let Err(err) = self.store.remove_reward(&reward).await {
                tracing::error!(reward = %reward, error = %err, "bundle rollback failed");
            }
        }
        if let Some(level) = level {
            if let Err(err) = self.store.remove_level(&level).await {
                tracing::error!(level = %level, error = %err, "bundle rollback failed");
            }
        }
    }
}

/// A uniqueness violation at insert means a concurrent bundle won the race.
fn race(err: StoreError) -> EngineError {
    match err {
        StoreError::Conflict(msg) => EngineError::Conflict(msg),
        other => EngineError::Store(other),
    }
}

fn validate_reward(spec: &RewardSpec, index: usize, errors: &mut Vec<ValidationError>) {
    let field = |leaf: &str| format!("rewards[{}].{}", index, leaf);

    if spec.name.trim().is_empty() {
        errors.push(ValidationError::new(field("name"), "must not be empty"));
    }
    match &spec.kind {
        RewardKind::Badge { icon } => {
            if icon.trim().is_empty() {
                errors.push(ValidationError::new(
                    field("kind.icon"),
                    "badge icon must not be empty",
                ));
            }
        }
        RewardKind::Item { sku } => {
            if sku.trim().is_empty() {
                errors.push(ValidationError::new(
                    field("kind.sku"),
                    "item sku must not be empty",
                ));
            }
        }
        RewardKind::Permission { permission } => {
            if permission.trim().is_empty() {
                errors.push(ValidationError::new(
                    field("kind.permission"),
                    "permission must not be empty",
                ));
            }
        }
        RewardKind::CurrencyBonus { amount } => {
            if *amount == 0 {
                errors.push(ValidationError::new(
                    field("kind.amount"),
                    "currency bonus must be positive",
                ));
            }
        }
    }
    if spec.cost == Some(0) {
        errors.push(ValidationError::new(
            field("cost"),
            "purchase cost must be positive when present",
        ));
    }
}
