//! Error type shared by sequences, nodes and their collaborators.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Errors produced while building or running a sequence.
///
/// Runtime failures travel through [`DeferredResult`](crate::DeferredResult)
/// tokens rather than being returned directly, so the type is `Clone`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    /// An action reported failure.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// Two nodes were declared with the same identifier.
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// A node identifier was referenced but never declared.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Node dependencies form a cycle through the given node.
    #[error("Dependency cycle through node {0}")]
    DependencyCycle(NodeId),

    /// The sequence gate condition stopped being met while the sequence ran.
    #[error("Sequence condition is no longer met")]
    ConditionLost,

    /// An async action was started outside of a runtime.
    #[error("No async runtime available")]
    NoRuntime,
}

impl Error {
    /// Shorthand for [`Error::ActionFailed`].
    pub fn action(reason: impl Into<String>) -> Self {
        Self::ActionFailed(reason.into())
    }
}

/// Result alias used by builders.
pub type Result<T, E = Error> = std::result::Result<T, E>;
