#![deny(missing_docs)]

//! Sequencer — deferred results driving condition-gated scripted sequences.
//!
//! # Design Goals
//!
//! - **Single-assignment tokens**: a [`DeferredResult`] becomes ready at most
//!   once; late completions are ignored, cancellation is explicit
//! - **Explicit join policies**: [`reduce`] fails fast and aborts siblings,
//!   [`pessimistic_reduce`] waits for every input and never fails
//! - **Ordered, gated progress**: a [`Sequence`] enables each node only after
//!   its predecessor completes, and a node acts only once its whole condition
//!   chain is met
//!
//! # Core Concepts
//!
//! - [`DeferredResult`]: a token completed by a producer and observed through
//!   continuations (or `.await`)
//! - [`Condition`]: a monitorable gate that notifies its owner when it flips
//! - [`Action`]: a unit of work returning a [`DeferredResult`]
//! - [`SequenceNode`]: a condition chain plus a set of actions
//! - [`Sequence`]: an ordered set of nodes with a single outcome
//!
//! # Threading
//!
//! Everything is synchronous and re-entrant: continuations run on the thread
//! that completes a token, and a completion may start the next node inside
//! the same call. Sequences assume one logical thread of control. With the
//! `tokio` feature, run [`Spawned`] actions on a current-thread runtime.
//!
//! # Features
//!
//! - `tracing`: lifecycle events for tokens, nodes and sequences
//! - `tokio`: [`AsyncAction`] and the [`Spawned`] adapter

// Modules
pub mod action;
pub mod builtin;
pub mod combinator;
pub mod condition;
pub mod deferred;
pub mod error;
pub mod node;
pub mod sequence;

// Re-exports for convenience
#[cfg(feature = "tokio")]
pub use action::{AsyncAction, Spawned};
pub use action::{Action, ActionContext};
pub use builtin::{Flag, FlagHandle, Immediate, NodeCompleted, Trigger, TriggerHandle};
pub use combinator::{all_succeeded, pessimistic_reduce, reduce, reduce_void};
pub use condition::{Condition, ConditionContext};
pub use deferred::DeferredResult;
pub use error::{Error, Result};
pub use node::{NodeHandle, NodeId, NodeOptions, NodePhase, NodeStatus, NodeTiming, SequenceNode};
pub use sequence::{
    RunId, RunPhase, Sequence, SequenceBuilder, SequenceOptions, SequenceStatus,
};

#[cfg(test)]
mod tests;
