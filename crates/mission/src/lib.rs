//! Mission progress engine
//!
//! Missions are goal definitions; each user working one gets an instance
//! whose status moves monotonically to a terminal state. Progress rules are
//! pure functions in [`progress`]; [`engine::MissionEngine`] owns storage,
//! locking, and the claim pipeline (currency payout, auto-level override,
//! best-effort unlock-reward grants).

#![deny(unsafe_code)]

mod engine;
mod progress;

pub use engine::{ClaimReceipt, MissionEngine};
pub use progress::{advance, ProgressUpdate};
