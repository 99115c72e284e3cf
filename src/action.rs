//! The action contract consumed by nodes.
//!
//! An [`Action`] is invoked once per node activation and reports its outcome
//! through a [`DeferredResult`]. Closures of the right shape are actions too.
//!
//! With the `tokio` feature, [`AsyncAction`] implementations can be wrapped in
//! [`Spawned`] to run as Tokio tasks. Aborting the returned token aborts the
//! task.

use crate::deferred::DeferredResult;
use crate::node::NodeHandle;
use crate::sequence::Sequence;

/// A unit of work started by a node.
pub trait Action: Send {
    /// Called once when the sequence is built.
    fn initialize(&mut self, _ctx: &ActionContext) {}

    /// Start the action and return a token for its outcome.
    ///
    /// Called exactly once per activation of the owning node. The token may
    /// already be ready.
    fn act(&mut self, ctx: &ActionContext) -> DeferredResult<()>;
}

impl<F> Action for F
where
    F: FnMut(&ActionContext) -> DeferredResult<()> + Send,
{
    fn act(&mut self, ctx: &ActionContext) -> DeferredResult<()> {
        self(ctx)
    }
}

/// An action's link back to the node that owns it.
#[derive(Debug, Clone)]
pub struct ActionContext {
    node: NodeHandle,
}

impl ActionContext {
    pub(crate) fn new(node: NodeHandle) -> Self {
        Self { node }
    }

    /// The owning node.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    /// The owning sequence, if it is still alive.
    pub fn sequence(&self) -> Option<Sequence> {
        self.node.sequence()
    }
}

#[cfg(feature = "tokio")]
pub use spawned::{AsyncAction, Spawned};

#[cfg(feature = "tokio")]
mod spawned {
    use std::sync::Arc;

    use super::{Action, ActionContext};
    use crate::deferred::DeferredResult;
    use crate::error::Error;

    /// An action written as an async function.
    ///
    /// Sequences assume a single logical thread; run them on a current-thread
    /// runtime (or a `LocalSet`) so completions are not interleaved.
    #[async_trait::async_trait]
    pub trait AsyncAction: Send + Sync + 'static {
        /// Run the action to completion.
        async fn run(&self, ctx: ActionContext) -> Result<(), Error>;
    }

    /// Adapter running an [`AsyncAction`] as a Tokio task.
    pub struct Spawned<A> {
        action: Arc<A>,
    }

    impl<A: AsyncAction> Spawned<A> {
        /// Wrap an async action.
        pub fn new(action: A) -> Self {
            Self {
                action: Arc::new(action),
            }
        }
    }

    impl<A: AsyncAction> Action for Spawned<A> {
        fn act(&mut self, ctx: &ActionContext) -> DeferredResult<()> {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                return DeferredResult::failed(Error::NoRuntime);
            };

            let token = DeferredResult::new();
            let producer = token.clone();
            let action = Arc::clone(&self.action);
            let ctx = ctx.clone();
            let task = runtime.spawn(async move {
                match action.run(ctx).await {
                    Ok(()) => producer.succeed(()),
                    Err(error) => producer.fail(error),
                };
            });
            token.on_abort(move || task.abort());
            token
        }
    }
}
