//! The condition contract consumed by nodes and sequence gates.

use std::sync::Weak;

use crate::node::{NodeHandle, NodeId};
use crate::sequence::{RunPhase, Sequence, Shared};

/// A gate that reports whether it is met.
///
/// The owning node enables a condition only while every condition before it
/// in the chain is met, and disables it otherwise. An enabled condition must
/// call [`ConditionContext::notify_met_changed`] whenever `is_met` changes.
///
/// Implementations must not complete other tokens or reset the sequence from
/// inside `set_enabled` or `is_met`; raise a notification instead.
pub trait Condition: Send {
    /// Called once when the sequence is built.
    fn initialize(&mut self, _ctx: ConditionContext) {}

    /// Start or stop monitoring.
    fn set_enabled(&mut self, enabled: bool);

    /// Whether the condition is currently monitoring.
    fn is_enabled(&self) -> bool;

    /// Whether the condition is met.
    fn is_met(&self) -> bool;

    /// Nodes this condition waits on, checked for cycles when the sequence
    /// is built.
    fn dependencies(&self) -> Vec<NodeId> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Owner {
    Gate,
    Node(usize),
}

/// A condition's link back to its owner.
#[derive(Clone)]
pub struct ConditionContext {
    sequence: Weak<Shared>,
    owner: Owner,
    node: Option<NodeHandle>,
}

impl ConditionContext {
    pub(crate) fn new(sequence: Weak<Shared>, owner: Owner, node: Option<NodeHandle>) -> Self {
        Self {
            sequence,
            owner,
            node,
        }
    }

    /// Tell the owner that `is_met` changed.
    ///
    /// Node conditions are only re-evaluated while the run is live.
    pub fn notify_met_changed(&self) {
        let Some(shared) = self.sequence.upgrade() else {
            return;
        };
        match self.owner {
            Owner::Gate => shared.evaluate_gate(),
            Owner::Node(index) if shared.phase() == RunPhase::Running => {
                shared.nodes[index].evaluate(&shared, index)
            }
            Owner::Node(_) => {}
        }
    }

    /// The owning node, or `None` for a sequence gate condition.
    pub fn node(&self) -> Option<&NodeHandle> {
        self.node.as_ref()
    }

    /// The owning sequence, if it is still alive.
    pub fn sequence(&self) -> Option<Sequence> {
        self.sequence.upgrade().map(Sequence::from_shared)
    }
}

impl std::fmt::Debug for ConditionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionContext")
            .field("owner", &self.owner)
            .field("node", &self.node)
            .finish()
    }
}
