//! Scenario tests for sequences.
//!
//! ## Test Organization
//!
//! - `common`: Shared fixtures (action log, trigger chains)
//! - `gating`: Condition chain walking and notification handling
//! - `precedence`: Sequential and non-sequential node enabling
//! - `join_policy`: Fail-fast and wait-for-all node outcomes, abort cascades
//! - `sequence`: Gate conditions, final nodes, repeat, reset, build checks
//! - `spawned`: Async actions on a Tokio runtime (`tokio` feature)
//!
//! ## Test Sequences
//!
//! Most tests drive nodes through the built-in collaborators:
//! - `Flag`: condition toggled from the test body
//! - `Trigger`: action completed from the test body
//! - `Immediate`: action that is ready as soon as it runs

mod common;

mod join_policy;
#[cfg(feature = "tokio")]
mod spawned;
