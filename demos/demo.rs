//! Scripted scene demo showing ordered, gated and failing sequences.
//!
//! Run with: cargo run --example demo --features tokio

use std::time::Duration;

use async_trait::async_trait;
use sequencer::{
    ActionContext, AsyncAction, Error, Flag, NodeCompleted, Sequence, SequenceNode, Spawned,
};

// ============================================================================
// Actions
// ============================================================================

/// Say a line, taking a little while to do it.
struct Say {
    speaker: &'static str,
    line: &'static str,
    millis: u64,
}

impl Say {
    fn new(speaker: &'static str, line: &'static str, millis: u64) -> Spawned<Self> {
        Spawned::new(Self {
            speaker,
            line,
            millis,
        })
    }
}

#[async_trait]
impl AsyncAction for Say {
    async fn run(&self, ctx: ActionContext) -> Result<(), Error> {
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        println!(
            "  [{}] {}: \"{}\"",
            ctx.node().id(),
            self.speaker,
            self.line
        );
        Ok(())
    }
}

/// Play an animation that may be missing.
struct Animate {
    clip: &'static str,
    available: bool,
    millis: u64,
}

impl Animate {
    fn new(clip: &'static str, available: bool, millis: u64) -> Spawned<Self> {
        Spawned::new(Self {
            clip,
            available,
            millis,
        })
    }
}

#[async_trait]
impl AsyncAction for Animate {
    async fn run(&self, ctx: ActionContext) -> Result<(), Error> {
        if !self.available {
            println!("  [{}] animation '{}' is missing!", ctx.node().id(), self.clip);
            return Err(Error::action(format!("missing clip {}", self.clip)));
        }
        println!("  [{}] playing '{}'...", ctx.node().id(), self.clip);
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        println!("  [{}] '{}' finished", ctx.node().id(), self.clip);
        Ok(())
    }
}

// ============================================================================
// Demo scenarios
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           Sequencer Scene Demo                               ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    // Scenario 1: Nodes run one after another
    run_happy_path().await;

    // Scenario 2: The scene waits for the player
    run_gated_scene().await;

    // Scenario 3: A strict node fails and cancels its sibling
    run_fail_fast().await;

    // Scenario 4: A final node ends the scene early
    run_final_branch().await;

    println!("\n✓ All demos completed!");
}

async fn run_happy_path() {
    println!("┌──────────────────────────────────────────────────────────────┐");
    println!("│ Scenario 1: Happy Path - Nodes run in order                  │");
    println!("└──────────────────────────────────────────────────────────────┘\n");

    let built = Sequence::builder("greeting")
        .node(SequenceNode::new(1, "hello").action(Say::new("Guard", "Halt! Who goes there?", 50)))
        .node(
            SequenceNode::new(2, "bow")
                .action(Say::new("Hero", "A friend.", 50))
                .action(Animate::new("bow", true, 80)),
        )
        .node(SequenceNode::new(3, "pass").action(Say::new("Guard", "Pass, friend.", 50)))
        .build();

    let sequence = match built {
        Ok(sequence) => sequence,
        Err(err) => {
            println!("\n  ✗ Invalid scene: {}\n", err);
            return;
        }
    };

    match sequence.start().await {
        Some(Ok(())) => {
            println!("\n  ✓ Scene completed successfully!");
            println!("    Final status: {:?}\n", sequence.status().phase);
        }
        Some(Err(err)) => println!("\n  ✗ Scene failed: {}\n", err),
        None => println!("\n  ✗ Scene was cancelled\n"),
    }
}

async fn run_gated_scene() {
    println!("┌──────────────────────────────────────────────────────────────┐");
    println!("│ Scenario 2: Gated Scene - Waits until the player arrives     │");
    println!("└──────────────────────────────────────────────────────────────┘\n");

    let (in_range, player) = Flag::new(false);
    let built = Sequence::builder("ambush")
        .condition(in_range)
        .node(SequenceNode::new(1, "shout").action(Say::new("Bandit", "Your gold or your life!", 30)))
        .build();

    let sequence = match built {
        Ok(sequence) => sequence,
        Err(err) => {
            println!("\n  ✗ Invalid scene: {}\n", err);
            return;
        }
    };

    let outcome = sequence.start();
    println!("  Scene armed, phase: {:?}", sequence.phase());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        println!("  Player walks into range");
        player.set(true);
    });

    match outcome.await {
        Some(Ok(())) => println!("\n  ✓ Ambush played out!\n"),
        Some(Err(err)) => println!("\n  ✗ Ambush failed: {}\n", err),
        None => println!("\n  ✗ Ambush was cancelled\n"),
    }
}

async fn run_fail_fast() {
    println!("┌──────────────────────────────────────────────────────────────┐");
    println!("│ Scenario 3: Fail Fast - Missing animation cancels the line   │");
    println!("└──────────────────────────────────────────────────────────────┘\n");

    let built = Sequence::builder("dance")
        .node(
            SequenceNode::new(1, "dance")
                .fail_fast(true)
                .action(Animate::new("dance", false, 0))
                .action(Say::new("Bard", "Watch this!", 200)),
        )
        .node(SequenceNode::new(2, "applause").action(Say::new("Crowd", "Bravo!", 20)))
        .build();

    let sequence = match built {
        Ok(sequence) => sequence,
        Err(err) => {
            println!("\n  ✗ Invalid scene: {}\n", err);
            return;
        }
    };
    sequence.on_failed(|err| println!("  Scene failure reported: {}", err));

    match sequence.start().await {
        Some(Ok(())) => println!("\n  ✓ Dance completed\n"),
        Some(Err(err)) => {
            println!("\n  ✗ Dance failed: {}", err);
            for node in sequence.status().nodes {
                println!("    {} {:?} succeeded={}", node.name, node.phase, node.succeeded);
            }
            println!();
        }
        None => println!("\n  ✗ Dance was cancelled\n"),
    }
}

async fn run_final_branch() {
    println!("┌──────────────────────────────────────────────────────────────┐");
    println!("│ Scenario 4: Final Branch - Ending early halts the rest       │");
    println!("└──────────────────────────────────────────────────────────────┘\n");

    let built = Sequence::builder("escape")
        .node(SequenceNode::new(1, "alarm").action(Say::new("Guard", "Intruder!", 30)))
        .node(SequenceNode::new(2, "speech").action(Say::new("Captain", "Men, listen closely...", 500)))
        .node(
            SequenceNode::new(3, "escape")
                .sequential(false)
                .final_node(true)
                .condition(NodeCompleted::new(1))
                .action(Say::new("Hero", "Time to go!", 50)),
        )
        .build();

    let sequence = match built {
        Ok(sequence) => sequence,
        Err(err) => {
            println!("\n  ✗ Invalid scene: {}\n", err);
            return;
        }
    };

    match sequence.start().await {
        Some(Ok(())) => {
            println!("\n  ✓ Hero escaped before the speech ended!");
            for node in sequence.status().nodes {
                println!("    {} {:?}", node.name, node.phase);
            }
            println!();
        }
        Some(Err(err)) => println!("\n  ✗ Escape failed: {}\n", err),
        None => println!("\n  ✗ Escape was cancelled\n"),
    }
}
