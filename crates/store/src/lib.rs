//! Questline storage abstractions
//!
//! The engine talks to persistence only through the traits defined here:
//! - per-user balances with optimistic version checks
//! - the append-only currency transaction log with reference deduplication
//! - streak records, definitions (levels/missions/rewards), instances, grants
//!
//! `InMemoryStore` is the deterministic reference adapter used by tests and
//! single-process deployments; `UserLockRegistry` supplies the per-user
//! write serialization the components layer on top.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod locks;
mod memory;
mod traits;

pub use locks::UserLockRegistry;
pub use memory::InMemoryStore;
pub use questline_types::{StoreError, StoreResult};
pub use traits::{
    BalanceStore, LevelDefinitionStore, MissionDefinitionStore, MissionInstanceStore,
    ProgressionStore, QueryWindow, RewardDefinitionStore, RewardGrantStore, StreakStore,
    TransactionStore,
};
