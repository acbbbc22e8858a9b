//! Named bundle presets
//!
//! Templates expand to an ordinary [`MissionBundle`], get field-level
//! overrides applied, and go through the same validation and commit path as
//! a hand-written bundle. A template is convenience, not a separate code
//! path.

use crate::bundle::{MissionBundle, MissionSpec, RewardSpec};
use questline_types::{
    EngineError, EngineResult, EventKind, MissionCriteria, RewardKind, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field-level adjustments applied on top of a preset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TemplateOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target count for daily/weekly presets, required days for streak ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeatable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_kind: Option<EventKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl TemplateOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_target(mut self, target: u32) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_reward_amount(mut self, amount: u64) -> Self {
        self.reward_amount = Some(amount);
        self
    }

    pub fn with_event_kind(mut self, kind: EventKind) -> Self {
        self.event_kind = Some(kind);
        self
    }
}

/// The built-in presets, keyed by name.
pub struct TemplateRegistry {
    presets: BTreeMap<&'static str, fn(&UserId) -> MissionBundle>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        let mut presets: BTreeMap<&'static str, fn(&UserId) -> MissionBundle> = BTreeMap::new();
        presets.insert("daily-engagement", daily_engagement);
        presets.insert("weekly-challenge", weekly_challenge);
        presets.insert("streak-keeper", streak_keeper);
        presets.insert("onboarding", onboarding);
        Self { presets }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.presets.keys().copied().collect()
    }

    /// Expand a preset and apply overrides. Unknown names are `NotFound`.
    pub fn expand(
        &self,
        name: &str,
        creator: &UserId,
        overrides: TemplateOverrides,
    ) -> EngineResult<MissionBundle> {
        let build = self
            .presets
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("template {}", name)))?;
        let mut bundle = build(creator);
        apply_overrides(&mut bundle.mission, overrides);
        Ok(bundle)
    }
}

fn apply_overrides(spec: &mut MissionSpec, overrides: TemplateOverrides) {
    if let Some(name) = overrides.name {
        spec.name = name;
    }
    if let Some(description) = overrides.description {
        spec.description = description;
    }
    if let Some(amount) = overrides.reward_amount {
        spec.reward_amount = amount;
    }
    if let Some(repeatable) = overrides.repeatable {
        spec.repeatable = repeatable;
    }
    match &mut spec.criteria {
        MissionCriteria::OneTime { event_kind, subtype } => {
            if let Some(kind) = overrides.event_kind {
                *event_kind = kind;
            }
            if overrides.subtype.is_some() {
                *subtype = overrides.subtype;
            }
        }
        MissionCriteria::Daily {
            event_kind,
            subtype,
            target,
        }
        | MissionCriteria::Weekly {
            event_kind,
            subtype,
            target,
        } => {
            if let Some(kind) = overrides.event_kind {
                *event_kind = kind;
            }
            if overrides.subtype.is_some() {
                *subtype = overrides.subtype;
            }
            if let Some(t) = overrides.target {
                *target = t;
            }
        }
        MissionCriteria::Streak { days } => {
            if let Some(t) = overrides.target {
                *days = t;
            }
        }
    }
}

// ── Presets ──────────────────────────────────────────────────────────

fn daily_engagement(creator: &UserId) -> MissionBundle {
    MissionBundle {
        mission: MissionSpec {
            name: "daily-engagement".into(),
            description: "Send five messages today".into(),
            kind: questline_types::MissionKind::Daily,
            criteria: MissionCriteria::Daily {
                event_kind: EventKind::Message,
                subtype: None,
                target: 5,
            },
            reward_amount: 50,
            repeatable: true,
            created_by: creator.clone(),
            auto_level: None,
            unlock_rewards: Vec::new(),
        },
        level: None,
        rewards: Vec::new(),
    }
}

fn weekly_challenge(creator: &UserId) -> MissionBundle {
    MissionBundle {
        mission: MissionSpec {
            name: "weekly-challenge".into(),
            description: "Twenty messages over the week".into(),
            kind: questline_types::MissionKind::Weekly,
            criteria: MissionCriteria::Weekly {
                event_kind: EventKind::Message,
                subtype: None,
                target: 20,
            },
            reward_amount: 200,
            repeatable: true,
            created_by: creator.clone(),
            auto_level: None,
            unlock_rewards: Vec::new(),
        },
        level: None,
        rewards: Vec::new(),
    }
}

fn streak_keeper(creator: &UserId) -> MissionBundle {
    MissionBundle {
        mission: MissionSpec {
            name: "streak-keeper".into(),
            description: "Stay active seven days in a row".into(),
            kind: questline_types::MissionKind::Streak,
            criteria: MissionCriteria::Streak { days: 7 },
            reward_amount: 150,
            repeatable: false,
            created_by: creator.clone(),
            auto_level: None,
            unlock_rewards: Vec::new(),
        },
        level: None,
        rewards: vec![RewardSpec {
            name: "streak-keeper-badge".into(),
            kind: RewardKind::Badge {
                icon: "flame".into(),
            },
            cost: None,
            unlock: None,
            repeatable: false,
        }],
    }
}

fn onboarding(creator: &UserId) -> MissionBundle {
    MissionBundle {
        mission: MissionSpec {
            name: "onboarding".into(),
            description: "Check in for the first time".into(),
            kind: questline_types::MissionKind::OneTime,
            criteria: MissionCriteria::OneTime {
                event_kind: EventKind::Checkin,
                subtype: None,
            },
            reward_amount: 25,
            repeatable: false,
            created_by: creator.clone(),
            auto_level: None,
            unlock_rewards: Vec::new(),
        },
        level: None,
        rewards: vec![RewardSpec {
            name: "welcome-badge".into(),
            kind: RewardKind::Badge {
                icon: "wave".into(),
            },
            cost: None,
            unlock: None,
            repeatable: false,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_expand_clean() {
        let registry = TemplateRegistry::new();
        let admin = UserId::new("admin");
        for name in registry.names() {
            let bundle = registry
                .expand(name, &admin, TemplateOverrides::none())
                .expect("preset expands");
            assert_eq!(bundle.mission.kind, bundle.mission.criteria.kind());
            assert!(!bundle.mission.name.is_empty());
        }
    }

    #[test]
    fn test_overrides_reshape_the_preset() {
        let registry = TemplateRegistry::new();
        let bundle = registry
            .expand(
                "daily-engagement",
                &UserId::new("admin"),
                TemplateOverrides::none()
                    .with_name("reaction-rally")
                    .with_target(10)
                    .with_reward_amount(80)
                    .with_event_kind(EventKind::Reaction),
            )
            .expect("expands");

        assert_eq!(bundle.mission.name, "reaction-rally");
        assert_eq!(bundle.mission.reward_amount, 80);
        match bundle.mission.criteria {
            MissionCriteria::Daily {
                event_kind, target, ..
            } => {
                assert_eq!(event_kind, EventKind::Reaction);
                assert_eq!(target, 10);
            }
            other => panic!("expected daily criteria, got {:?}", other),
        }
    }

    #[test]
    fn test_target_override_reaches_streak_days() {
        let registry = TemplateRegistry::new();
        let bundle = registry
            .expand(
                "streak-keeper",
                &UserId::new("admin"),
                TemplateOverrides::none().with_target(14),
            )
            .expect("expands");
        assert_eq!(
            bundle.mission.criteria,
            MissionCriteria::Streak { days: 14 }
        );
    }

    #[test]
    fn test_unknown_template_is_not_found() {
        let registry = TemplateRegistry::new();
        let result = registry.expand(
            "no-such-template",
            &UserId::new("admin"),
            TemplateOverrides::none(),
        );
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }
}
