//! Ready-made conditions and actions.
//!
//! - [`Flag`]: a condition toggled from outside through a [`FlagHandle`].
//! - [`NodeCompleted`]: met once another node of the sequence has completed.
//! - [`Immediate`]: an action whose token is ready as soon as it is returned.
//! - [`Trigger`]: an action completed from outside through a [`TriggerHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::action::{Action, ActionContext};
use crate::condition::{Condition, ConditionContext};
use crate::deferred::DeferredResult;
use crate::error::Error;
use crate::node::NodeId;

// ============================================================================
// Flag
// ============================================================================

#[derive(Default)]
struct FlagState {
    met: bool,
    enabled: bool,
    ctx: Option<ConditionContext>,
}

/// A condition whose met state is set from outside.
pub struct Flag {
    state: Arc<Mutex<FlagState>>,
}

/// Controls a [`Flag`] after it has been handed to a node or sequence.
#[derive(Clone)]
pub struct FlagHandle {
    state: Arc<Mutex<FlagState>>,
}

impl Flag {
    /// Create a flag and its controlling handle.
    pub fn new(initially_met: bool) -> (Self, FlagHandle) {
        let state = Arc::new(Mutex::new(FlagState {
            met: initially_met,
            ..FlagState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            FlagHandle { state },
        )
    }
}

impl Condition for Flag {
    fn initialize(&mut self, ctx: ConditionContext) {
        self.state.lock().ctx = Some(ctx);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn is_met(&self) -> bool {
        self.state.lock().met
    }
}

impl FlagHandle {
    /// Change the met state. The owner is notified only if the value changed
    /// while the flag was enabled.
    pub fn set(&self, met: bool) {
        let ctx = {
            let mut state = self.state.lock();
            if state.met == met {
                return;
            }
            state.met = met;
            if !state.enabled {
                return;
            }
            state.ctx.clone()
        };
        if let Some(ctx) = ctx {
            ctx.notify_met_changed();
        }
    }

    /// Whether the owner is currently monitoring the flag.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Current met state.
    pub fn is_met(&self) -> bool {
        self.state.lock().met
    }
}

// ============================================================================
// NodeCompleted
// ============================================================================

/// A condition met once `target` has completed in the current run.
///
/// Lets a non-sequential node branch off any other node. The target is
/// reported through [`Condition::dependencies`] so cycles are rejected when
/// the sequence is built.
pub struct NodeCompleted {
    target: NodeId,
    enabled: Arc<AtomicBool>,
    ctx: Option<ConditionContext>,
    subscribed: bool,
}

impl NodeCompleted {
    /// Wait on the node identified by `target`.
    pub fn new(target: impl Into<NodeId>) -> Self {
        Self {
            target: target.into(),
            enabled: Arc::new(AtomicBool::new(false)),
            ctx: None,
            subscribed: false,
        }
    }

    fn subscribe(&mut self) {
        let Some(ctx) = self.ctx.clone() else {
            return;
        };
        let Some(sequence) = ctx.sequence() else {
            return;
        };
        let target = self.target;
        let enabled = Arc::clone(&self.enabled);
        sequence.on_node_complete(move |node| {
            if node.id() == target && enabled.load(Ordering::Acquire) {
                ctx.notify_met_changed();
            }
        });
        self.subscribed = true;
    }
}

impl Condition for NodeCompleted {
    fn initialize(&mut self, ctx: ConditionContext) {
        self.ctx = Some(ctx);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if enabled && !self.subscribed {
            self.subscribe();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn is_met(&self) -> bool {
        self.ctx
            .as_ref()
            .and_then(ConditionContext::sequence)
            .and_then(|sequence| sequence.node(self.target))
            .is_some_and(|node| node.is_complete())
    }

    fn dependencies(&self) -> Vec<NodeId> {
        vec![self.target]
    }
}

// ============================================================================
// Immediate
// ============================================================================

/// An action that completes as soon as it is invoked.
#[derive(Debug, Clone)]
pub struct Immediate {
    outcome: Result<(), Error>,
}

impl Immediate {
    /// Always succeed.
    pub fn success() -> Self {
        Self { outcome: Ok(()) }
    }

    /// Always fail with `error`.
    pub fn failure(error: Error) -> Self {
        Self {
            outcome: Err(error),
        }
    }
}

impl Action for Immediate {
    fn act(&mut self, _ctx: &ActionContext) -> DeferredResult<()> {
        match &self.outcome {
            Ok(()) => DeferredResult::succeeded(()),
            Err(error) => DeferredResult::failed(error.clone()),
        }
    }
}

// ============================================================================
// Trigger
// ============================================================================

#[derive(Default)]
struct TriggerState {
    token: Option<DeferredResult<()>>,
    acts: usize,
}

/// An action whose token is completed from outside.
pub struct Trigger {
    state: Arc<Mutex<TriggerState>>,
}

/// Completes the tokens handed out by a [`Trigger`].
#[derive(Clone)]
pub struct TriggerHandle {
    state: Arc<Mutex<TriggerState>>,
}

impl Trigger {
    /// Create a trigger and its controlling handle.
    pub fn new() -> (Self, TriggerHandle) {
        let state = Arc::new(Mutex::new(TriggerState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            TriggerHandle { state },
        )
    }
}

impl Action for Trigger {
    fn act(&mut self, _ctx: &ActionContext) -> DeferredResult<()> {
        let token = DeferredResult::new();
        let mut state = self.state.lock();
        state.token = Some(token.clone());
        state.acts += 1;
        token
    }
}

impl TriggerHandle {
    /// Succeed the latest token. Returns `false` if there is none or it was
    /// already ready or aborted.
    pub fn succeed(&self) -> bool {
        self.token().is_some_and(|token| token.succeed(()))
    }

    /// Fail the latest token. Returns `false` if there is none or it was
    /// already ready or aborted.
    pub fn fail(&self, error: Error) -> bool {
        self.token().is_some_and(|token| token.fail(error))
    }

    /// The latest token handed out.
    pub fn token(&self) -> Option<DeferredResult<()>> {
        self.state.lock().token.clone()
    }

    /// How many times the action has been invoked.
    pub fn act_count(&self) -> usize {
        self.state.lock().acts
    }

    /// Whether the latest token was aborted.
    pub fn is_aborted(&self) -> bool {
        self.token().is_some_and(|token| token.is_aborted())
    }
}
