//! Join policy tests.
//!
//! Tests for how a node combines the outcomes of its actions, and for
//! cancellation of outstanding actions.

use crate::{Error, Immediate, Sequence, SequenceNode, Trigger};

use super::common::{record, Log};

/// Test that a wait-for-all node completes unsuccessfully without skipping
/// any action.
///
/// Verifies:
/// - Both actions are invoked
/// - The node completes with `succeeded == false` and the action's error
/// - The sequence itself carries on and succeeds
#[test]
fn wait_all_node_records_failure() {
    let log = Log::new();
    let sequence = Sequence::builder("wait-all")
        .node(
            SequenceNode::new(1, "mixed")
                .action(Immediate::failure(Error::action("no greeting")))
                .action(record(&log, "waved")),
        )
        .node(SequenceNode::new(2, "after").action(record(&log, "after")))
        .build()
        .expect("valid sequence");

    let outcome = sequence.start();
    let node = sequence.node(1).expect("node exists");

    assert!(node.is_complete());
    assert!(!node.succeeded());
    assert_eq!(node.error(), Some(Error::action("no greeting")));
    assert_eq!(log.entries(), vec!["waved", "after"]);
    assert!(outcome.is_succeeded());
}

/// Test that a wait-for-all node waits for slow actions after a failure.
#[test]
fn wait_all_waits_for_pending_actions() {
    let (failing, fail_handle) = Trigger::new();
    let (slow, slow_handle) = Trigger::new();

    let sequence = Sequence::builder("patient")
        .node(SequenceNode::new(1, "pair").action(failing).action(slow))
        .build()
        .expect("valid sequence");

    let outcome = sequence.start();
    fail_handle.fail(Error::action("first"));

    let node = sequence.node(1).expect("node exists");
    assert!(!node.is_complete());
    assert!(!slow_handle.is_aborted());

    slow_handle.succeed();
    assert!(node.is_complete());
    assert!(!node.succeeded());
    assert!(outcome.is_succeeded());
}

/// Test that a fail-fast node fails the sequence and aborts its siblings.
///
/// Verifies:
/// - The first failure completes the node immediately
/// - Still-pending sibling actions are aborted
/// - The sequence outcome carries the action's error
/// - Later nodes never run
#[test]
fn fail_fast_node_fails_sequence() {
    let log = Log::new();
    let (failing, fail_handle) = Trigger::new();
    let (slow, slow_handle) = Trigger::new();

    let sequence = Sequence::builder("strict")
        .node(
            SequenceNode::new(1, "pair")
                .fail_fast(true)
                .action(failing)
                .action(slow),
        )
        .node(SequenceNode::new(2, "never").action(record(&log, "never")))
        .build()
        .expect("valid sequence");

    let outcome = sequence.start();
    fail_handle.fail(Error::action("tripped"));

    assert!(slow_handle.is_aborted());
    assert_eq!(outcome.error(), Some(Error::action("tripped")));
    assert!(log.entries().is_empty());

    let node = sequence.node(1).expect("node exists");
    assert!(node.is_complete());
    assert!(!node.succeeded());
}

/// Test that a node without actions completes as soon as it acts.
#[test]
fn zero_actions_complete_immediately() {
    let sequence = Sequence::builder("empty-node")
        .node(SequenceNode::new(1, "nothing"))
        .build()
        .expect("valid sequence");

    assert!(sequence.start().is_succeeded());
    let node = sequence.node(1).expect("node exists");
    assert!(node.is_complete());
    assert!(node.succeeded());
}

/// Test that aborting a node's combined token reaches every pending action.
///
/// Verifies:
/// - Resetting the sequence aborts the outstanding join
/// - Every pending per-action token beneath it is aborted
/// - A late completion is ignored
#[test]
fn reset_aborts_pending_actions() {
    let (a, a_handle) = Trigger::new();
    let (b, b_handle) = Trigger::new();

    let sequence = Sequence::builder("cancel")
        .node(SequenceNode::new(1, "pair").action(a).action(b))
        .build()
        .expect("valid sequence");

    let outcome = sequence.start();
    assert!(sequence.node(1).expect("node exists").is_active());

    sequence.reset();

    assert!(a_handle.is_aborted());
    assert!(b_handle.is_aborted());
    assert!(outcome.is_aborted());
    assert!(!a_handle.succeed());

    let node = sequence.node(1).expect("node exists");
    assert!(!node.is_complete());
    assert!(!node.is_active());
}

/// Test that a fail-fast node is cancelled the same way.
#[test]
fn reset_aborts_fail_fast_actions() {
    let (a, a_handle) = Trigger::new();
    let (b, b_handle) = Trigger::new();

    let sequence = Sequence::builder("cancel-strict")
        .node(
            SequenceNode::new(1, "pair")
                .fail_fast(true)
                .action(a)
                .action(b),
        )
        .build()
        .expect("valid sequence");

    sequence.start();
    a_handle.succeed();
    sequence.reset();

    assert!(!a_handle.is_aborted());
    assert!(b_handle.is_aborted());
}
