//! Orchestration layer and engine facade
//!
//! Ties the progression components together: atomic creation of
//! mission/level/reward bundles ([`bundle`]), named bundle presets
//! ([`templates`]), bounded batch level re-evaluation ([`batch`]), and the
//! [`facade::ProgressionEngine`] that drives the per-activity-event control
//! flow.

#![deny(unsafe_code)]

mod batch;
mod bundle;
mod facade;
mod templates;

pub use batch::{BatchReevaluator, SweepFault, SweepReport};
pub use bundle::{
    CreatedBundle, LevelSpec, MissionBundle, MissionSpec, Orchestrator, RewardSpec,
};
pub use facade::{ActivityReceipt, EngineConfig, ProgressionEngine};
pub use templates::{TemplateOverrides, TemplateRegistry};
