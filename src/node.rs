//! Sequence nodes: condition-gated sets of actions.
//!
//! A [`SequenceNode`] is the declaration of a node. Once a
//! [`Sequence`](crate::Sequence) is built, each declaration becomes a runtime
//! node reachable through a [`NodeHandle`].
//!
//! Runtime nodes move through [`NodePhase`]s:
//!
//! ```text
//! Disabled -> ConditionsPending -> Acting -> Complete
//! ```
//!
//! A node leaves `Disabled` once its predecessor (if any) is complete, walks
//! its condition chain while `ConditionsPending`, invokes all of its actions
//! exactly once on entering `Acting`, and becomes `Complete` when the join of
//! the action results is ready.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionContext};
use crate::combinator::{pessimistic_reduce, reduce};
use crate::condition::Condition;
use crate::deferred::DeferredResult;
use crate::error::Error;
use crate::sequence::{Sequence, Shared};

/// Get the current Unix timestamp in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Stable identifier of a node within its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn default_true() -> bool {
    true
}

/// Static configuration of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOptions {
    /// Unique identifier.
    pub id: NodeId,
    /// Diagnostic name.
    pub name: String,
    /// Wait for the previously declared node to complete before enabling.
    #[serde(default = "default_true")]
    pub sequential: bool,
    /// Completing this node finishes the whole sequence.
    #[serde(default, rename = "final")]
    pub is_final: bool,
    /// Join actions fail-fast and fail the sequence on error.
    #[serde(default)]
    pub fail_fast: bool,
}

impl NodeOptions {
    /// Options for a sequential, non-final, wait-for-all node.
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sequential: true,
            is_final: false,
            fail_fast: false,
        }
    }
}

/// Declaration of a node, consumed by [`SequenceBuilder::node`](crate::SequenceBuilder::node).
pub struct SequenceNode {
    pub(crate) options: NodeOptions,
    pub(crate) conditions: Vec<Box<dyn Condition>>,
    pub(crate) actions: Vec<Box<dyn Action>>,
}

impl SequenceNode {
    /// Declare a sequential, non-final, wait-for-all node.
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::with_options(NodeOptions::new(id, name))
    }

    /// Declare a node from existing options.
    pub fn with_options(options: NodeOptions) -> Self {
        Self {
            options,
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Set whether the node waits for its predecessor.
    pub fn sequential(mut self, sequential: bool) -> Self {
        self.options.sequential = sequential;
        self
    }

    /// Set whether completing the node finishes the sequence.
    pub fn final_node(mut self, is_final: bool) -> Self {
        self.options.is_final = is_final;
        self
    }

    /// Set the join policy of the node's actions.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.options.fail_fast = fail_fast;
        self
    }

    /// Append a condition to the chain.
    pub fn condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    /// Add an action.
    pub fn action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    /// The node's options.
    pub fn options(&self) -> &NodeOptions {
        &self.options
    }
}

impl fmt::Debug for SequenceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceNode")
            .field("options", &self.options)
            .field("conditions", &self.conditions.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// Runtime phase of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodePhase {
    /// Waiting for the sequence to start or for the predecessor.
    #[default]
    Disabled,
    /// Enabled and walking the condition chain.
    ConditionsPending,
    /// Actions invoked, join outstanding.
    Acting,
    /// Join ready.
    Complete,
}

/// Timing information for a node (Unix timestamps in ms).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTiming {
    /// When the node was enabled.
    pub enabled_at: Option<u64>,
    /// When the node invoked its actions.
    pub acted_at: Option<u64>,
    /// When the node completed.
    pub completed_at: Option<u64>,
}

impl NodeTiming {
    /// Time spent acting, if the node completed.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.acted_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

/// Point-in-time view of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node identifier.
    pub id: NodeId,
    /// Diagnostic name.
    pub name: String,
    /// Current phase.
    pub phase: NodePhase,
    /// Whether the node completed successfully.
    pub succeeded: bool,
    /// First error reported by the node's actions.
    pub error: Option<Error>,
    /// Timing records.
    pub timing: NodeTiming,
}

// ============================================================================
// Runtime
// ============================================================================

#[derive(Clone)]
enum JoinToken {
    FailFast(DeferredResult<Vec<()>>),
    WaitAll(DeferredResult<Vec<DeferredResult<()>>>),
}

impl JoinToken {
    fn abort(&self) {
        match self {
            Self::FailFast(token) => token.abort(),
            Self::WaitAll(token) => token.abort(),
        }
    }

    fn on_ready<F>(&self, f: F)
    where
        F: FnOnce(Result<(), Error>) + Send + 'static,
    {
        match self {
            Self::FailFast(token) => token.on_ready(move |t| f(t.error().map_or(Ok(()), Err))),
            Self::WaitAll(token) => token.on_ready(move |t| {
                let settled = t.value().unwrap_or_default();
                f(settled
                    .iter()
                    .find_map(DeferredResult::error)
                    .map_or(Ok(()), Err))
            }),
        }
    }
}

#[derive(Default)]
struct NodeState {
    phase: NodePhase,
    succeeded: bool,
    error: Option<Error>,
    join: Option<JoinToken>,
    evaluating: bool,
    dirty: bool,
    timing: NodeTiming,
}

pub(crate) struct NodeRuntime {
    pub(crate) options: NodeOptions,
    conditions: Vec<Mutex<Box<dyn Condition>>>,
    actions: Vec<Mutex<Box<dyn Action>>>,
    pub(crate) predecessor: Option<usize>,
    pub(crate) successors: Vec<usize>,
    state: Mutex<NodeState>,
}

impl NodeRuntime {
    pub(crate) fn new(
        options: NodeOptions,
        conditions: Vec<Box<dyn Condition>>,
        actions: Vec<Box<dyn Action>>,
        predecessor: Option<usize>,
        successors: Vec<usize>,
    ) -> Self {
        Self {
            options,
            conditions: conditions.into_iter().map(Mutex::new).collect(),
            actions: actions.into_iter().map(Mutex::new).collect(),
            predecessor,
            successors,
            state: Mutex::new(NodeState::default()),
        }
    }

    pub(crate) fn phase(&self) -> NodePhase {
        self.state.lock().phase
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.phase() == NodePhase::Complete
    }

    pub(crate) fn status(&self) -> NodeStatus {
        let state = self.state.lock();
        NodeStatus {
            id: self.options.id,
            name: self.options.name.clone(),
            phase: state.phase,
            succeeded: state.succeeded,
            error: state.error.clone(),
            timing: state.timing.clone(),
        }
    }

    /// Enable the node unless its predecessor is still outstanding.
    pub(crate) fn try_enable(&self, shared: &Arc<Shared>, index: usize) {
        if let Some(predecessor) = self.predecessor {
            if !shared.nodes[predecessor].is_complete() {
                return;
            }
        }
        {
            let mut state = self.state.lock();
            if state.phase != NodePhase::Disabled {
                return;
            }
            state.phase = NodePhase::ConditionsPending;
            state.timing.enabled_at = Some(now_millis());
        }

        #[cfg(feature = "tracing")]
        tracing::info!(node = %self.options.id, name = %self.options.name, "node.enable");

        self.evaluate(shared, index);
    }

    /// Re-run the condition chain if the node is idle.
    ///
    /// Notifications raised while a pass is in progress are folded into one
    /// more pass once the current one finishes.
    pub(crate) fn evaluate(&self, shared: &Arc<Shared>, index: usize) {
        {
            let mut state = self.state.lock();
            if state.evaluating {
                state.dirty = true;
                return;
            }
            state.evaluating = true;
        }

        let satisfied = loop {
            {
                let mut state = self.state.lock();
                state.dirty = false;
                if state.phase != NodePhase::ConditionsPending {
                    state.evaluating = false;
                    return;
                }
            }

            let satisfied = self.walk_chain();

            let mut state = self.state.lock();
            if state.dirty {
                continue;
            }
            state.evaluating = false;
            if satisfied && state.phase == NodePhase::ConditionsPending {
                state.phase = NodePhase::Acting;
                state.timing.acted_at = Some(now_millis());
                break true;
            }
            break false;
        };

        if satisfied {
            self.act(shared, index);
        }
    }

    /// Condition `i` is live only while conditions `0..i` are met.
    fn walk_chain(&self) -> bool {
        let mut satisfied = true;
        for condition in &self.conditions {
            let mut condition = condition.lock();
            if condition.is_enabled() != satisfied {
                condition.set_enabled(satisfied);
            }
            satisfied = satisfied && condition.is_met();
        }
        satisfied
    }

    fn disable_conditions(&self) {
        for condition in &self.conditions {
            let mut condition = condition.lock();
            if condition.is_enabled() {
                condition.set_enabled(false);
            }
        }
    }

    fn act(&self, shared: &Arc<Shared>, index: usize) {
        let ctx = ActionContext::new(NodeHandle::new(shared, index));

        #[cfg(feature = "tracing")]
        tracing::info!(
            node = %self.options.id,
            actions = self.actions.len(),
            fail_fast = self.options.fail_fast,
            "node.act"
        );

        let tokens: Vec<DeferredResult<()>> = self
            .actions
            .iter()
            .map(|action| action.lock().act(&ctx))
            .collect();

        let join = if self.options.fail_fast {
            JoinToken::FailFast(reduce(tokens))
        } else {
            JoinToken::WaitAll(pessimistic_reduce(tokens))
        };

        {
            let mut state = self.state.lock();
            if state.phase != NodePhase::Acting {
                drop(state);
                join.abort();
                return;
            }
            state.join = Some(join.clone());
        }

        let sequence = Arc::downgrade(shared);
        join.on_ready(move |outcome| {
            if let Some(shared) = sequence.upgrade() {
                shared.nodes[index].complete(&shared, index, outcome);
            }
        });
    }

    fn complete(&self, shared: &Arc<Shared>, index: usize, outcome: Result<(), Error>) {
        {
            let mut state = self.state.lock();
            if state.phase != NodePhase::Acting {
                return;
            }
            state.phase = NodePhase::Complete;
            state.join = None;
            state.succeeded = outcome.is_ok();
            state.error = outcome.as_ref().err().cloned();
            state.timing.completed_at = Some(now_millis());
        }
        self.disable_conditions();

        #[cfg(feature = "tracing")]
        {
            match &outcome {
                Ok(()) => {
                    tracing::info!(node = %self.options.id, outcome = "succeeded", "node.complete")
                }
                Err(error) => tracing::warn!(node = %self.options.id, %error, "node.complete"),
            }
        }

        shared.node_completed(index, outcome);
    }

    /// Stop the node without forgetting a completed outcome.
    pub(crate) fn halt(&self) {
        let join = {
            let mut state = self.state.lock();
            if matches!(
                state.phase,
                NodePhase::ConditionsPending | NodePhase::Acting
            ) {
                state.phase = NodePhase::Disabled;
            }
            state.join.take()
        };
        if let Some(join) = join {
            join.abort();
        }
        self.disable_conditions();
    }

    /// Return the node to its freshly built state.
    pub(crate) fn reset(&self) {
        let join = {
            let mut state = self.state.lock();
            state.phase = NodePhase::Disabled;
            state.succeeded = false;
            state.error = None;
            state.dirty = false;
            state.timing = NodeTiming::default();
            state.join.take()
        };
        if let Some(join) = join {
            join.abort();
        }
        self.disable_conditions();
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Non-owning reference to a node of a built sequence.
///
/// Handles never keep the sequence alive. Once the sequence has been dropped
/// every query reports the default (`false`, `None`, `Disabled`).
#[derive(Clone)]
pub struct NodeHandle {
    sequence: Weak<Shared>,
    index: usize,
    id: NodeId,
}

impl NodeHandle {
    pub(crate) fn new(shared: &Arc<Shared>, index: usize) -> Self {
        Self::from_weak(Arc::downgrade(shared), index, shared.nodes[index].options.id)
    }

    pub(crate) fn from_weak(sequence: Weak<Shared>, index: usize, id: NodeId) -> Self {
        Self {
            sequence,
            index,
            id,
        }
    }

    fn with_node<R>(&self, f: impl FnOnce(&NodeRuntime) -> R) -> Option<R> {
        let shared = self.sequence.upgrade()?;
        shared.nodes.get(self.index).map(f)
    }

    /// Node identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Position of the node in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The owning sequence, if it is still alive.
    pub fn sequence(&self) -> Option<Sequence> {
        self.sequence.upgrade().map(Sequence::from_shared)
    }

    /// Current phase.
    pub fn phase(&self) -> NodePhase {
        self.with_node(NodeRuntime::phase).unwrap_or_default()
    }

    /// Whether the node is walking its condition chain.
    pub fn is_enabled(&self) -> bool {
        self.phase() == NodePhase::ConditionsPending
    }

    /// Whether the node's join is outstanding.
    pub fn is_active(&self) -> bool {
        self.with_node(|node| node.state.lock().join.is_some()).unwrap_or(false)
    }

    /// Whether the node has completed.
    pub fn is_complete(&self) -> bool {
        self.phase() == NodePhase::Complete
    }

    /// Whether the node completed without any action failing.
    pub fn succeeded(&self) -> bool {
        self.with_node(|node| node.state.lock().succeeded).unwrap_or(false)
    }

    /// First error reported by the node's actions.
    pub fn error(&self) -> Option<Error> {
        self.with_node(|node| node.state.lock().error.clone()).flatten()
    }

    /// Snapshot of the node.
    pub fn status(&self) -> Option<NodeStatus> {
        self.with_node(NodeRuntime::status)
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("index", &self.index)
            .finish()
    }
}
