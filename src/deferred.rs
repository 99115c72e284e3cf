//! Single-assignment deferred results.
//!
//! A [`DeferredResult`] is created empty by a producer and completed exactly
//! once, either with a value ([`succeed`](DeferredResult::succeed)) or an error
//! ([`fail`](DeferredResult::fail)). Consumers register continuations with
//! [`on_ready`](DeferredResult::on_ready) and never complete the token
//! themselves.
//!
//! Cancellation is explicit: [`abort`](DeferredResult::abort) drops every
//! pending continuation and raises the token's abort subscribers, which is how
//! combined tokens forward cancellation to the tokens they wrap. An aborted
//! token is never completed afterwards.

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::Error;

type Continuation<T, E> = Box<dyn FnOnce(&DeferredResult<T, E>) + Send>;
type AbortHandler = Box<dyn FnOnce() + Send>;

struct Inner<T, E> {
    outcome: Option<Result<T, E>>,
    /// Aborted before it became ready.
    aborted: bool,
    abort_raised: bool,
    continuations: Vec<Continuation<T, E>>,
    abort_handlers: Vec<AbortHandler>,
    wakers: Vec<Waker>,
}

/// A single-assignment result that becomes ready at most once.
///
/// Cloning yields another handle to the same token. The lock inside only
/// guards state transitions; continuations and abort subscribers always run
/// after it has been released, so they may freely call back into the token.
pub struct DeferredResult<T, E = Error> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for DeferredResult<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for DeferredResult<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> DeferredResult<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create an empty token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                outcome: None,
                aborted: false,
                abort_raised: false,
                continuations: Vec::new(),
                abort_handlers: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// Create a token that already succeeded with `value`.
    pub fn succeeded(value: T) -> Self {
        let token = Self::new();
        token.succeed(value);
        token
    }

    /// Create a token that already failed with `error`.
    pub fn failed(error: E) -> Self {
        let token = Self::new();
        token.fail(error);
        token
    }

    /// Complete the token with a value.
    ///
    /// Returns `false` without touching the token if it was already ready or
    /// aborted.
    pub fn succeed(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Complete the token with an error.
    ///
    /// Returns `false` without touching the token if it was already ready or
    /// aborted.
    pub fn fail(&self, error: E) -> bool {
        self.complete(Err(error))
    }

    fn complete(&self, outcome: Result<T, E>) -> bool {
        let (continuations, wakers) = {
            let mut inner = self.inner.lock();
            if inner.outcome.is_some() || inner.aborted {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    ready = inner.outcome.is_some(),
                    aborted = inner.aborted,
                    "deferred.ignored"
                );
                return false;
            }
            inner.outcome = Some(outcome);
            (
                mem::take(&mut inner.continuations),
                mem::take(&mut inner.wakers),
            )
        };

        for continuation in continuations {
            continuation(self);
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Run `continuation` once the token is ready.
    ///
    /// A ready token runs it immediately on the calling thread. Otherwise it
    /// is queued behind previously registered continuations. Registrations on
    /// an aborted token are dropped.
    pub fn on_ready<F>(&self, continuation: F)
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if inner.outcome.is_none() {
                if !inner.aborted {
                    inner.continuations.push(Box::new(continuation));
                }
                return;
            }
        }
        continuation(self);
    }

    /// Subscribe to this token's abort notification.
    ///
    /// Subscribers run at most once. Subscribing after the notification was
    /// raised runs the subscriber immediately.
    pub fn on_abort<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if !inner.abort_raised {
                inner.abort_handlers.push(Box::new(handler));
                return;
            }
        }
        handler();
    }

    /// Cancel the token.
    ///
    /// Pending continuations are discarded and abort subscribers are raised.
    /// A token aborted before readiness stays unready for good.
    pub fn abort(&self) {
        let (continuations, handlers, wakers) = {
            let mut inner = self.inner.lock();
            if inner.abort_raised {
                return;
            }
            inner.abort_raised = true;
            let mut wakers = Vec::new();
            if inner.outcome.is_none() {
                inner.aborted = true;
                wakers = mem::take(&mut inner.wakers);
            }
            (
                mem::take(&mut inner.continuations),
                mem::take(&mut inner.abort_handlers),
                wakers,
            )
        };

        drop(continuations);
        for handler in handlers {
            handler();
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Whether the token has been completed.
    pub fn is_ready(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }

    /// Whether the token completed with a value.
    pub fn is_succeeded(&self) -> bool {
        matches!(self.inner.lock().outcome, Some(Ok(_)))
    }

    /// Whether the token completed with an error.
    pub fn is_failed(&self) -> bool {
        matches!(self.inner.lock().outcome, Some(Err(_)))
    }

    /// Whether the token was aborted before it became ready.
    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    /// Number of continuations still waiting for readiness.
    pub fn pending_continuations(&self) -> usize {
        self.inner.lock().continuations.len()
    }

    /// Get the success value, if any.
    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        match &self.inner.lock().outcome {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Get the error, if any.
    pub fn error(&self) -> Option<E>
    where
        E: Clone,
    {
        match &self.inner.lock().outcome {
            Some(Err(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Get the outcome, if ready.
    pub fn result(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.inner.lock().outcome.clone()
    }

    /// Derive a token carrying `f(value)` on success and the same error on
    /// failure. Aborting the derived token aborts this one.
    pub fn map<U, F>(&self, f: F) -> DeferredResult<U, E>
    where
        U: Send + 'static,
        T: Clone,
        E: Clone,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let mapped = DeferredResult::new();
        let source = self.clone();
        mapped.on_abort(move || source.abort());

        let target = mapped.clone();
        self.on_ready(move |source| match source.result() {
            Some(Ok(value)) => {
                target.succeed(f(value));
            }
            Some(Err(error)) => {
                target.fail(error);
            }
            None => {}
        });
        mapped
    }

    /// Whether two handles refer to the same token.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Awaiting a token yields its outcome, or `None` once it has been aborted.
impl<T, E> Future for DeferredResult<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Option<Result<T, E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.lock();
        if let Some(outcome) = &inner.outcome {
            return Poll::Ready(Some(outcome.clone()));
        }
        if inner.aborted {
            return Poll::Ready(None);
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T, E> fmt::Debug for DeferredResult<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DeferredResult")
            .field("ready", &inner.outcome.is_some())
            .field("succeeded", &matches!(inner.outcome, Some(Ok(_))))
            .field("aborted", &inner.aborted)
            .field("pending", &inner.continuations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Token = DeferredResult<u32, String>;

    #[test]
    fn first_completion_wins() {
        let token = Token::new();
        assert!(token.succeed(1));
        assert!(!token.fail("late".into()));
        assert!(!token.succeed(2));

        assert!(token.is_ready());
        assert!(token.is_succeeded());
        assert_eq!(token.value(), Some(1));
        assert_eq!(token.error(), None);
    }

    #[test]
    fn failure_then_success_keeps_failure() {
        let token = Token::new();
        token.fail("boom".into());
        token.succeed(7);

        assert!(token.is_failed());
        assert_eq!(token.error().as_deref(), Some("boom"));
        assert_eq!(token.value(), None);
    }

    #[test]
    fn continuations_run_once_in_registration_order() {
        let token = Token::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["c1", "c2", "c3"] {
            let seen = seen.clone();
            token.on_ready(move |t| seen.lock().push((label, t.value())));
        }
        assert!(seen.lock().is_empty());
        assert_eq!(token.pending_continuations(), 3);

        token.succeed(5);
        token.succeed(6);

        assert_eq!(
            *seen.lock(),
            vec![("c1", Some(5)), ("c2", Some(5)), ("c3", Some(5))]
        );
        assert_eq!(token.pending_continuations(), 0);

        let late = seen.clone();
        token.on_ready(move |t| late.lock().push(("c4", t.value())));
        assert_eq!(seen.lock().last(), Some(&("c4", Some(5))));
    }

    #[test]
    fn abort_drops_continuations_and_leaves_token_unready() {
        let token = Token::new();
        let fired = Arc::new(Mutex::new(0));
        let aborted = Arc::new(Mutex::new(0));

        let f = fired.clone();
        token.on_ready(move |_| *f.lock() += 1);
        let a = aborted.clone();
        token.on_abort(move || *a.lock() += 1);

        token.abort();
        token.abort();
        assert!(!token.succeed(3));

        assert!(!token.is_ready());
        assert!(token.is_aborted());
        assert_eq!(*fired.lock(), 0);
        assert_eq!(*aborted.lock(), 1);

        let f = fired.clone();
        token.on_ready(move |_| *f.lock() += 1);
        assert_eq!(token.pending_continuations(), 0);
        assert_eq!(*fired.lock(), 0);
    }

    #[test]
    fn abort_after_ready_raises_subscribers_without_unreadying() {
        let token = Token::succeeded(9);
        let raised = Arc::new(Mutex::new(false));
        let r = raised.clone();
        token.on_abort(move || *r.lock() = true);

        token.abort();

        assert!(*raised.lock());
        assert!(token.is_succeeded());
        assert!(!token.is_aborted());
    }

    #[test]
    fn map_transforms_value_and_forwards_abort() {
        let source = Token::new();
        let doubled = source.map(|v| v * 2);
        source.succeed(21);
        assert_eq!(doubled.value(), Some(42));

        let source = Token::new();
        let mapped = source.map(|v| v + 1);
        mapped.abort();
        assert!(source.is_aborted());
    }

    #[test]
    fn map_forwards_errors() {
        let source = Token::new();
        let mapped = source.map(|v| v.to_string());
        source.fail("nope".into());
        assert_eq!(mapped.error().as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn awaiting_yields_outcome() {
        let token = Token::new();
        let producer = token.clone();
        tokio::spawn(async move {
            producer.succeed(11);
        });
        assert_eq!(token.await, Some(Ok(11)));
    }

    #[tokio::test]
    async fn awaiting_aborted_token_yields_none() {
        let token = Token::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            canceller.abort();
        });
        assert_eq!(token.await, None);
    }
}
