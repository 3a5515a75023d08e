// src/lib.rs

pub mod cli;
pub mod errors;
pub mod logging;
pub mod progress;
pub mod task;

use anyhow::Result;
use tokio::runtime::Handle;
use tracing::debug;

use crate::cli::CliArgs;
use crate::task::{ProcessTask, TaskFuture, TaskOutcome, TaskSnapshot, TaskState};

/// High-level entry point used by `main.rs`.
///
/// Runs one external program under supervision, streams progress snapshots
/// to stdout, maps Ctrl-C to a cancel request, and returns the process exit
/// code the binary should use.
pub async fn run(args: CliArgs) -> Result<i32> {
    let task = ProcessTask::new(&args.program, args.args.clone());
    let future = task.start(&Handle::current());

    // Ctrl-C → cooperative cancel. The run loop still waits for the child
    // to actually exit, so the terminal snapshot is always published.
    {
        let future = future.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                future.request_cancel();
            }
        });
    }

    let mut updates = future.subscribe();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        print_snapshot(&snapshot, args.json)?;

        if snapshot.state == TaskState::Finished {
            return Ok(exit_code_for(&snapshot, &future));
        }
        if updates.changed().await.is_err() {
            debug!("task handle dropped before a terminal snapshot");
            return Ok(1);
        }
    }
}

fn print_snapshot(snapshot: &TaskSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("[{:>4}/1000] {}", snapshot.progress, snapshot.progress_text);
    }
    Ok(())
}

fn exit_code_for(snapshot: &TaskSnapshot, future: &TaskFuture) -> i32 {
    match future.outcome() {
        Some(TaskOutcome::Succeeded) => 0,
        Some(TaskOutcome::Canceled) => 130,
        Some(TaskOutcome::Failed) => match &snapshot.error {
            Some(err) if err.exit_code > 0 => err.exit_code,
            _ => 1,
        },
        None => 1,
    }
}
