//! Common fixtures for sequence tests.
//!
//! This module contains:
//! - `Log`: a shared record of which actions ran, in order
//! - `record`: an action that appends a label to a `Log` and succeeds
//! - `triggered`: a chain of sequential nodes, each acting through a `Trigger`

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Action, ActionContext, DeferredResult, Sequence, SequenceNode, Trigger, TriggerHandle};

// ============================================================================
// Action Log
// ============================================================================

/// Ordered record of action invocations.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

/// Action that records `label` and succeeds immediately.
pub fn record(log: &Log, label: &'static str) -> impl Action {
    let log = log.clone();
    move |_ctx: &ActionContext| -> DeferredResult<()> {
        log.push(label);
        DeferredResult::succeeded(())
    }
}

// ============================================================================
// Sequences
// ============================================================================

/// Sequence of `n` sequential nodes (ids `1..=n`), each with one trigger.
pub fn triggered(name: &str, n: u32) -> (Sequence, Vec<TriggerHandle>) {
    let mut builder = Sequence::builder(name);
    let mut handles = Vec::new();
    for id in 1..=n {
        let (trigger, handle) = Trigger::new();
        builder = builder.node(SequenceNode::new(id, format!("step-{id}")).action(trigger));
        handles.push(handle);
    }
    let sequence = builder.build().expect("valid sequence");
    (sequence, handles)
}
