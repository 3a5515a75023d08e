// src/task/process.rs

//! The schedulable unit: spawn one external program, supervise it, finalize
//! its future.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::RunError;
use crate::progress::{
    LineProgressSource, LogDiagnostics, PROGRESS_DONE, ProgressSource, SharedDiagnostics,
};
use crate::task::future::TaskFuture;
use crate::task::supervisor::ProcessSupervisor;

/// One pending execution of an external command-line program.
///
/// `start` hands the run loop to the given worker pool and immediately
/// returns the [`TaskFuture`]; the caller never blocks on submission.
pub struct ProcessTask {
    location: String,
    args: Vec<String>,
    source: Box<dyn ProgressSource>,
    diagnostics: SharedDiagnostics,
}

impl ProcessTask {
    /// A task for the program at `location` with the given argument list.
    /// Progress is read with the line-oriented reference source by default.
    pub fn new(location: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            location: location.into(),
            args,
            source: Box::new(LineProgressSource),
            diagnostics: Arc::new(LogDiagnostics),
        }
    }

    /// Substitute how the child's stdout is turned into progress events.
    pub fn with_source(mut self, source: Box<dyn ProgressSource>) -> Self {
        self.source = source;
        self
    }

    /// Substitute the sink for non-fatal per-event diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: SharedDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Submit the run loop to `pool` and return the future handle.
    ///
    /// Cancellation is always offered; pausing only on platforms with
    /// process stop/continue signals.
    pub fn start(self, pool: &Handle) -> TaskFuture {
        let future = TaskFuture::new(true, cfg!(unix));
        future.report_started();

        info!(module = %self.location, "task submitted");
        let handle = future.clone();
        pool.spawn(async move { self.run(handle).await });

        future
    }

    /// The run loop, executed on a pool worker.
    async fn run(self, future: TaskFuture) {
        // Canceled before the worker picked us up: never spawn anything.
        if future.is_canceled() {
            debug!(module = %self.location, "canceled before the run loop started");
            future.report_finished();
            return;
        }

        let mut cmd = Command::new(&self.location);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(module = %self.location, error = %err, "failed to spawn external program");
                future.report_exception(RunError::new(
                    &self.location,
                    err.raw_os_error().unwrap_or(-1),
                    err.to_string(),
                ));
                future.set_progress_value_and_text(PROGRESS_DONE, "");
                future.report_finished();
                return;
            }
        };

        // Wire the progress source to the supervisor's event channel.
        let (events_tx, events_rx) = mpsc::channel(64);
        match child.stdout.take() {
            Some(stdout) => self.source.spawn(stdout, events_tx),
            None => drop(events_tx),
        }

        let stderr_task = child.stderr.take().map(collect_stderr);

        let supervisor = ProcessSupervisor::new(
            child,
            self.location.clone(),
            future.clone(),
            events_rx,
            self.diagnostics.clone(),
        );
        let status = supervisor.run().await;

        let stderr_text = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        match status {
            Err(err) => {
                future.report_exception(RunError::new(
                    &self.location,
                    err.raw_os_error().unwrap_or(-1),
                    err.to_string(),
                ));
            }
            Ok(status) if !status.success() => {
                let code = status.code().unwrap_or(-1);
                future.report_exception(RunError::new(
                    &self.location,
                    code,
                    stderr_text.trim_end(),
                ));
            }
            Ok(_) => {}
        }

        // Deterministic terminal snapshot: progress 1000 plus the captured
        // stderr text, published before the finished transition.
        future.set_progress_value_and_text(PROGRESS_DONE, stderr_text.trim_end());
        future.report_finished();
        info!(module = %self.location, outcome = ?future.outcome(), "task finalized");
    }
}

/// Drain stderr so the pipe never fills, keeping the text for the terminal
/// snapshot.
fn collect_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut captured = String::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("stderr: {}", line);
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}
