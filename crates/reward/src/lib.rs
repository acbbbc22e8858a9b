//! Reward Unlock Evaluator - declarative eligibility plus grant/purchase
//!
//! `check` evaluates a reward's AND-only unlock-condition tree against the
//! user's state without side effects. `grant` records a grant (paying any
//! currency bonus through the ledger in the same call); `purchase` is the
//! deduct-then-grant path, compensated back to all-or-nothing if the grant
//! step fails after the deduction.

#![deny(unsafe_code)]

mod evaluator;
mod service;

pub use evaluator::UnlockEvaluator;
pub use service::RewardService;
