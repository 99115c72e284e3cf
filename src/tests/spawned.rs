//! Async action tests.
//!
//! Tests for running `AsyncAction`s as Tokio tasks inside a sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    ActionContext, AsyncAction, DeferredResult, Error, Sequence, SequenceNode, Spawned, Trigger,
};

/// Async action that sleeps, then succeeds or fails.
struct Sleep {
    millis: u64,
    fail: bool,
    finished: Arc<AtomicBool>,
}

impl Sleep {
    fn new(millis: u64) -> (Self, Arc<AtomicBool>) {
        let finished = Arc::new(AtomicBool::new(false));
        (
            Self {
                millis,
                fail: false,
                finished: finished.clone(),
            },
            finished,
        )
    }

    fn failing(millis: u64) -> Self {
        Self {
            millis,
            fail: true,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl AsyncAction for Sleep {
    async fn run(&self, _ctx: ActionContext) -> Result<(), Error> {
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        self.finished.store(true, Ordering::SeqCst);
        if self.fail {
            Err(Error::action("slept badly"))
        } else {
            Ok(())
        }
    }
}

/// Test that spawned actions drive the sequence to completion.
///
/// Verifies:
/// - The outcome can be awaited
/// - Nodes complete in order as their tasks finish
#[tokio::test]
async fn spawned_actions_complete_sequence() {
    let (first, first_done) = Sleep::new(5);
    let (second, second_done) = Sleep::new(5);

    let sequence = Sequence::builder("async")
        .node(SequenceNode::new(1, "first").action(Spawned::new(first)))
        .node(SequenceNode::new(2, "second").action(Spawned::new(second)))
        .build()
        .expect("valid sequence");

    let outcome = sequence.start().await;

    assert_eq!(outcome, Some(Ok(())));
    assert!(first_done.load(Ordering::SeqCst));
    assert!(second_done.load(Ordering::SeqCst));
}

/// Test that a failing spawned action fails a fail-fast sequence and
/// cancels its sibling task.
#[tokio::test]
async fn spawned_failure_aborts_sibling_task() {
    let (slow, slow_done) = Sleep::new(200);

    let sequence = Sequence::builder("async-strict")
        .node(
            SequenceNode::new(1, "pair")
                .fail_fast(true)
                .action(Spawned::new(Sleep::failing(5)))
                .action(Spawned::new(slow)),
        )
        .build()
        .expect("valid sequence");

    let outcome = sequence.start().await;
    assert_eq!(outcome, Some(Err(Error::action("slept badly"))));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!slow_done.load(Ordering::SeqCst));
}

/// Test that resetting the sequence cancels the awaited outcome.
#[tokio::test]
async fn reset_cancels_awaited_outcome() {
    let (trigger, _handle) = Trigger::new();
    let sequence = Sequence::builder("cancelled")
        .node(SequenceNode::new(1, "forever").action(trigger))
        .build()
        .expect("valid sequence");

    let outcome = sequence.start();
    let resetter = sequence.clone();
    tokio::spawn(async move {
        resetter.reset();
    });

    assert_eq!(outcome.await, None);
}

/// Test that spawned actions fail cleanly without a runtime.
#[test]
fn spawned_without_runtime_fails() {
    let (sleep, _) = Sleep::new(1);
    let sequence = Sequence::builder("no-runtime")
        .node(
            SequenceNode::new(1, "orphan")
                .fail_fast(true)
                .action(Spawned::new(sleep)),
        )
        .build()
        .expect("valid sequence");

    let outcome: DeferredResult<()> = sequence.start();
    assert_eq!(outcome.error(), Some(Error::NoRuntime));
}
