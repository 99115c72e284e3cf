//! Sequences: ordered node graphs with a single outcome.
//!
//! A [`Sequence`] owns its nodes in declaration order and exposes the whole
//! run as a [`DeferredResult`], so a sequence composes into a larger system
//! the same way a single action does.
//!
//! # Lifecycle
//!
//! 1. [`SequenceBuilder::build`] validates the graph, links every sequential
//!    node to the node declared before it and initializes conditions and
//!    actions.
//! 2. [`Sequence::start`] waits for the optional gate condition, then enables
//!    every node whose predecessor is complete (or that has none).
//! 3. The run finishes when a final node completes, when every node is
//!    complete, or when a fail-fast node fails. Finishing halts the remaining
//!    nodes and aborts their outstanding actions.
//! 4. [`Sequence::reset`] returns everything to the freshly built state.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionContext;
use crate::condition::{Condition, ConditionContext, Owner};
use crate::deferred::DeferredResult;
use crate::error::{Error, Result};
use crate::node::{now_millis, NodeHandle, NodeId, NodeRuntime, NodeStatus, SequenceNode};

/// Unique identifier of one run of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static configuration of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceOptions {
    /// Diagnostic name.
    pub name: String,
    /// A finished run may be started again.
    #[serde(default)]
    pub repeatable: bool,
    /// Fail the run if the gate condition stops being met.
    #[serde(default)]
    pub requires_condition_remains_met: bool,
}

/// Lifecycle of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunPhase {
    /// Built or reset, not started.
    #[default]
    Idle,
    /// Started, waiting for the gate condition.
    Gated,
    /// Nodes are live.
    Running,
    /// The outcome is ready.
    Finished,
}

/// Point-in-time view of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStatus {
    /// Diagnostic name.
    pub name: String,
    /// Current run, if started.
    pub run_id: Option<RunId>,
    /// Lifecycle phase.
    pub phase: RunPhase,
    /// When the current run started (Unix timestamp ms).
    pub started_at: Option<u64>,
    /// When the current run finished (Unix timestamp ms).
    pub finished_at: Option<u64>,
    /// Per-node snapshots in declaration order.
    pub nodes: Vec<NodeStatus>,
}

// ============================================================================
// Builder
// ============================================================================

/// Collects node declarations and builds a [`Sequence`].
pub struct SequenceBuilder {
    options: SequenceOptions,
    gate: Option<Box<dyn Condition>>,
    nodes: Vec<SequenceNode>,
}

impl SequenceBuilder {
    /// Start a builder for a sequence called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(SequenceOptions {
            name: name.into(),
            ..SequenceOptions::default()
        })
    }

    /// Start a builder from existing options.
    pub fn with_options(options: SequenceOptions) -> Self {
        Self {
            options,
            gate: None,
            nodes: Vec::new(),
        }
    }

    /// Allow a finished run to be started again.
    pub fn repeatable(mut self, repeatable: bool) -> Self {
        self.options.repeatable = repeatable;
        self
    }

    /// Fail the run if the gate condition stops being met.
    pub fn requires_condition_remains_met(mut self, required: bool) -> Self {
        self.options.requires_condition_remains_met = required;
        self
    }

    /// Gate the start of every run on `condition`.
    pub fn condition(mut self, condition: impl Condition + 'static) -> Self {
        self.gate = Some(Box::new(condition));
        self
    }

    /// Append a node.
    pub fn node(mut self, node: SequenceNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validate the graph and wire every node.
    ///
    /// Fails on duplicate node ids, on conditions depending on undeclared
    /// nodes, and on dependency cycles (precedence links included).
    pub fn build(self) -> Result<Sequence> {
        let mut index = HashMap::with_capacity(self.nodes.len());
        for (position, node) in self.nodes.iter().enumerate() {
            if index.insert(node.options.id, position).is_some() {
                return Err(Error::DuplicateNode(node.options.id));
            }
        }

        let predecessors: Vec<Option<usize>> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(position, node)| {
                (node.options.sequential && position > 0).then(|| position - 1)
            })
            .collect();

        let mut dependencies = Vec::with_capacity(self.nodes.len());
        for (position, node) in self.nodes.iter().enumerate() {
            let mut edges: Vec<usize> = predecessors[position].into_iter().collect();
            for condition in &node.conditions {
                for id in condition.dependencies() {
                    edges.push(*index.get(&id).ok_or(Error::UnknownNode(id))?);
                }
            }
            dependencies.push(edges);
        }
        if let Some(gate) = &self.gate {
            for id in gate.dependencies() {
                if !index.contains_key(&id) {
                    return Err(Error::UnknownNode(id));
                }
            }
        }
        if let Some(position) = find_cycle(&dependencies) {
            return Err(Error::DependencyCycle(self.nodes[position].options.id));
        }

        let SequenceBuilder {
            options,
            gate,
            nodes,
        } = self;

        let shared = Arc::new_cyclic(|weak| {
            let mut gate = gate;
            if let Some(gate) = gate.as_mut() {
                gate.initialize(ConditionContext::new(weak.clone(), Owner::Gate, None));
            }

            let runtimes = nodes
                .into_iter()
                .enumerate()
                .map(|(position, node)| {
                    let SequenceNode {
                        options,
                        mut conditions,
                        mut actions,
                    } = node;
                    let handle = NodeHandle::from_weak(weak.clone(), position, options.id);
                    for condition in &mut conditions {
                        condition.initialize(ConditionContext::new(
                            weak.clone(),
                            Owner::Node(position),
                            Some(handle.clone()),
                        ));
                    }
                    let ctx = ActionContext::new(handle);
                    for action in &mut actions {
                        action.initialize(&ctx);
                    }
                    let successors = predecessors
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| **p == Some(position))
                        .map(|(successor, _)| successor)
                        .collect();
                    NodeRuntime::new(
                        options,
                        conditions,
                        actions,
                        predecessors[position],
                        successors,
                    )
                })
                .collect();

            Shared {
                options,
                gate: gate.map(Mutex::new),
                nodes: runtimes,
                index,
                run: Mutex::new(RunState::default()),
                node_listeners: Mutex::new(Vec::new()),
                failure_listeners: Mutex::new(Vec::new()),
            }
        });

        Ok(Sequence { shared })
    }
}

/// Return a node on a dependency cycle, if any.
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Visiting,
        Done,
    }

    fn visit(node: usize, dependencies: &[Vec<usize>], marks: &mut [Mark]) -> Option<usize> {
        match marks[node] {
            Mark::Done => return None,
            Mark::Visiting => return Some(node),
            Mark::New => {}
        }
        marks[node] = Mark::Visiting;
        for &next in &dependencies[node] {
            if let Some(cycle) = visit(next, dependencies, marks) {
                return Some(cycle);
            }
        }
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; dependencies.len()];
    (0..dependencies.len()).find_map(|node| visit(node, dependencies, &mut marks))
}

// ============================================================================
// Runtime
// ============================================================================

type NodeListener = Arc<dyn Fn(&NodeHandle) + Send + Sync>;
type FailureListener = Arc<dyn Fn(&Error) + Send + Sync>;

struct RunState {
    phase: RunPhase,
    run_id: Option<RunId>,
    outcome: DeferredResult<()>,
    started_at: Option<u64>,
    finished_at: Option<u64>,
    gate_evaluating: bool,
    gate_dirty: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            run_id: None,
            outcome: DeferredResult::new(),
            started_at: None,
            finished_at: None,
            gate_evaluating: false,
            gate_dirty: false,
        }
    }
}

pub(crate) struct Shared {
    options: SequenceOptions,
    gate: Option<Mutex<Box<dyn Condition>>>,
    pub(crate) nodes: Vec<NodeRuntime>,
    index: HashMap<NodeId, usize>,
    run: Mutex<RunState>,
    node_listeners: Mutex<Vec<NodeListener>>,
    failure_listeners: Mutex<Vec<FailureListener>>,
}

enum GateVerdict {
    Wait,
    Begin,
    Lost,
}

impl Shared {
    pub(crate) fn phase(&self) -> RunPhase {
        self.run.lock().phase
    }

    /// Re-run the gate condition. Notifications raised during a pass are
    /// folded into one more pass.
    pub(crate) fn evaluate_gate(self: &Arc<Self>) {
        let Some(gate) = &self.gate else {
            return;
        };
        {
            let mut run = self.run.lock();
            if run.gate_evaluating {
                run.gate_dirty = true;
                return;
            }
            run.gate_evaluating = true;
        }

        let verdict = loop {
            let phase = {
                let mut run = self.run.lock();
                run.gate_dirty = false;
                run.phase
            };
            let watching = match phase {
                RunPhase::Gated => true,
                RunPhase::Running => self.options.requires_condition_remains_met,
                RunPhase::Idle | RunPhase::Finished => false,
            };
            let met = {
                let mut gate = gate.lock();
                if gate.is_enabled() != watching {
                    gate.set_enabled(watching);
                }
                watching && gate.is_met()
            };

            let mut run = self.run.lock();
            if run.gate_dirty {
                continue;
            }
            run.gate_evaluating = false;
            break match phase {
                RunPhase::Gated if met => GateVerdict::Begin,
                RunPhase::Running if watching && !met => GateVerdict::Lost,
                _ => GateVerdict::Wait,
            };
        };

        match verdict {
            GateVerdict::Begin => self.begin(),
            GateVerdict::Lost => self.finish(Err(Error::ConditionLost)),
            GateVerdict::Wait => {}
        }
    }

    fn disable_gate(&self) {
        if let Some(gate) = &self.gate {
            let mut gate = gate.lock();
            if gate.is_enabled() {
                gate.set_enabled(false);
            }
        }
    }

    fn begin(self: &Arc<Self>) {
        {
            let mut run = self.run.lock();
            if run.phase != RunPhase::Gated {
                return;
            }
            run.phase = RunPhase::Running;
        }
        if !self.options.requires_condition_remains_met {
            self.disable_gate();
        }

        #[cfg(feature = "tracing")]
        tracing::info!(sequence = %self.options.name, nodes = self.nodes.len(), "sequence.begin");

        if self.nodes.is_empty() {
            self.finish(Ok(()));
            return;
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if self.phase() != RunPhase::Running {
                break;
            }
            node.try_enable(self, index);
        }
    }

    /// Settle the run verdict for a completed node, then raise listeners.
    ///
    /// A fail-fast failure or a final node finishes the run before any
    /// listener runs, so nodes woken by listeners find the run halted.
    pub(crate) fn node_completed(self: &Arc<Self>, index: usize, outcome: Result<(), Error>) {
        let node = &self.nodes[index];
        if self.phase() == RunPhase::Running {
            match outcome {
                Err(error) if node.options.fail_fast => self.finish(Err(error)),
                _ if node.options.is_final => self.finish(Ok(())),
                _ => {}
            }
        }

        let handle = NodeHandle::new(self, index);
        let listeners = self.node_listeners.lock().clone();
        for listener in listeners {
            listener(&handle);
        }

        if self.phase() != RunPhase::Running {
            return;
        }
        for &successor in &node.successors {
            self.nodes[successor].try_enable(self, successor);
        }
        if self.nodes.iter().all(NodeRuntime::is_complete) {
            self.finish(Ok(()));
        }
    }

    fn finish(self: &Arc<Self>, result: Result<(), Error>) {
        let outcome = {
            let mut run = self.run.lock();
            if run.phase != RunPhase::Running {
                return;
            }
            run.phase = RunPhase::Finished;
            run.finished_at = Some(now_millis());
            run.outcome.clone()
        };
        self.halt();

        match result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!(sequence = %self.options.name, "sequence.complete");

                outcome.succeed(());
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(sequence = %self.options.name, %error, "sequence.fail");

                outcome.fail(error.clone());
                let listeners = self.failure_listeners.lock().clone();
                for listener in listeners {
                    listener(&error);
                }
            }
        }
    }

    fn halt(&self) {
        self.disable_gate();
        for node in &self.nodes {
            node.halt();
        }
    }
}

// ============================================================================
// Sequence
// ============================================================================

/// A built, runnable sequence. Cloning yields another handle to it.
#[derive(Clone)]
pub struct Sequence {
    shared: Arc<Shared>,
}

impl Sequence {
    /// Start a builder.
    pub fn builder(name: impl Into<String>) -> SequenceBuilder {
        SequenceBuilder::new(name)
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Start a run and return its outcome.
    ///
    /// Starting a sequence that is already running returns the current
    /// outcome. A finished sequence is restarted only if it is repeatable;
    /// otherwise its finished outcome is returned.
    pub fn start(&self) -> DeferredResult<()> {
        let shared = &self.shared;
        let (outcome, restart) = {
            let mut run = shared.run.lock();
            let restart = match run.phase {
                RunPhase::Gated | RunPhase::Running => return run.outcome.clone(),
                RunPhase::Finished if !shared.options.repeatable => return run.outcome.clone(),
                RunPhase::Finished => {
                    run.outcome = DeferredResult::new();
                    run.finished_at = None;
                    true
                }
                RunPhase::Idle => false,
            };
            run.phase = RunPhase::Gated;
            run.run_id = Some(RunId::new());
            run.started_at = Some(now_millis());
            (run.outcome.clone(), restart)
        };
        if restart {
            for node in &shared.nodes {
                node.reset();
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            sequence = %shared.options.name,
            run = ?shared.run.lock().run_id,
            gated = shared.gate.is_some(),
            "sequence.start"
        );

        if shared.gate.is_some() {
            shared.evaluate_gate();
        } else {
            shared.begin();
        }
        outcome
    }

    /// Abort the current run and return every node to its initial state.
    ///
    /// Nodes drop their outstanding joins, which aborts their actions. The
    /// previous outcome token is aborted if it was still pending.
    pub fn reset(&self) {
        let previous = {
            let mut run = self.shared.run.lock();
            let previous = mem::replace(&mut run.outcome, DeferredResult::new());
            run.phase = RunPhase::Idle;
            run.run_id = None;
            run.started_at = None;
            run.finished_at = None;
            previous
        };

        #[cfg(feature = "tracing")]
        tracing::info!(sequence = %self.shared.options.name, "sequence.reset");

        self.shared.disable_gate();
        for node in &self.shared.nodes {
            node.reset();
        }
        previous.abort();
    }

    /// Outcome of the current (or next) run.
    pub fn outcome(&self) -> DeferredResult<()> {
        self.shared.run.lock().outcome.clone()
    }

    /// Lifecycle phase of the current run.
    pub fn phase(&self) -> RunPhase {
        self.shared.phase()
    }

    /// Whether nodes are live.
    pub fn is_running(&self) -> bool {
        self.phase() == RunPhase::Running
    }

    /// Identifier of the current run.
    pub fn run_id(&self) -> Option<RunId> {
        self.shared.run.lock().run_id
    }

    /// The sequence's options.
    pub fn options(&self) -> &SequenceOptions {
        &self.shared.options
    }

    /// Look up a node by identifier.
    pub fn node(&self, id: impl Into<NodeId>) -> Option<NodeHandle> {
        let index = *self.shared.index.get(&id.into())?;
        Some(NodeHandle::new(&self.shared, index))
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> Vec<NodeHandle> {
        (0..self.shared.nodes.len())
            .map(|index| NodeHandle::new(&self.shared, index))
            .collect()
    }

    /// Call `listener` every time a node completes.
    pub fn on_node_complete<F>(&self, listener: F)
    where
        F: Fn(&NodeHandle) + Send + Sync + 'static,
    {
        self.shared.node_listeners.lock().push(Arc::new(listener));
    }

    /// Call `listener` every time a run fails.
    pub fn on_failed<F>(&self, listener: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.shared.failure_listeners.lock().push(Arc::new(listener));
    }

    /// Snapshot of the sequence and its nodes.
    pub fn status(&self) -> SequenceStatus {
        let (phase, run_id, started_at, finished_at) = {
            let run = self.shared.run.lock();
            (run.phase, run.run_id, run.started_at, run.finished_at)
        };
        SequenceStatus {
            name: self.shared.options.name.clone(),
            run_id,
            phase,
            started_at,
            finished_at,
            nodes: self.shared.nodes.iter().map(NodeRuntime::status).collect(),
        }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.shared.options.name)
            .field("phase", &self.phase())
            .field("nodes", &self.shared.nodes.len())
            .finish()
    }
}
