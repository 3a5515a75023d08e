// src/task/future.rs

//! The shared handle representing one asynchronous process execution.
//!
//! A [`TaskFuture`] is cheap to clone and safe to read from any thread while
//! the worker publishes updates. All observable state lives behind a single
//! `watch` channel, so every update is serialized and no reader can see a
//! torn snapshot. Cancel/pause intent travels on a second, crate-internal
//! channel that only the supervisor watches.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::errors::RunError;
use crate::progress::PROGRESS_DONE;

/// Coarse lifecycle state of a task.
///
/// "Paused" is deliberately not a state here: pausing is a child-process
/// condition layered on a started task, tracked by [`TaskSnapshot::paused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Started,
    /// Cancellation was requested; the run loop is still finalizing.
    Canceled,
    /// Terminal. No field of the snapshot changes after this.
    Finished,
}

/// Terminal classification of a finished task. Exactly one holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Canceled,
}

/// One coherent view of a task's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub state: TaskState,
    /// Normalized progress in `[0, 1000]`; non-decreasing, 1000 only in the
    /// terminal snapshot.
    pub progress: u32,
    /// Last human-readable status line (current step name, or captured
    /// stderr in the terminal snapshot).
    pub progress_text: String,
    /// Pause intent as last requested/corrected; always false when the task
    /// does not support pausing.
    pub paused: bool,
    pub cancel_requested: bool,
    /// Terminal error, present only for failed runs.
    pub error: Option<RunError>,
}

impl TaskSnapshot {
    fn initial() -> Self {
        Self {
            state: TaskState::Created,
            progress: 0,
            progress_text: String::new(),
            paused: false,
            cancel_requested: false,
            error: None,
        }
    }
}

/// Caller-set request flags, observed by the supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ControlRequests {
    pub cancel: bool,
    pub pause: bool,
}

struct Shared {
    can_cancel: bool,
    can_pause: bool,
    snapshot: watch::Sender<TaskSnapshot>,
    control: watch::Sender<ControlRequests>,
}

/// Shared, reference-counted handle to one process execution.
///
/// Request setters (`request_cancel`, `request_pause`, `request_resume`)
/// record intent only; the supervisor observes them and acts on the child
/// process. Report methods (`report_*`) are invoked by the owning task.
#[derive(Clone)]
pub struct TaskFuture {
    inner: Arc<Shared>,
}

impl TaskFuture {
    /// Create a future with its capability flags fixed for its lifetime.
    /// The progress range is fixed to `[0, 1000]`.
    pub fn new(can_cancel: bool, can_pause: bool) -> Self {
        Self {
            inner: Arc::new(Shared {
                can_cancel,
                can_pause,
                snapshot: watch::Sender::new(TaskSnapshot::initial()),
                control: watch::Sender::new(ControlRequests::default()),
            }),
        }
    }

    pub fn can_cancel(&self) -> bool {
        self.inner.can_cancel
    }

    pub fn can_pause(&self) -> bool {
        self.inner.can_pause
    }

    /// The fixed normalized progress domain.
    pub fn progress_range(&self) -> (u32, u32) {
        (0, PROGRESS_DONE)
    }

    // ---- read accessors -------------------------------------------------

    pub fn state(&self) -> TaskState {
        self.inner.snapshot.borrow().state
    }

    pub fn progress_value(&self) -> u32 {
        self.inner.snapshot.borrow().progress
    }

    pub fn progress_text(&self) -> String {
        self.inner.snapshot.borrow().progress_text.clone()
    }

    pub fn error(&self) -> Option<RunError> {
        self.inner.snapshot.borrow().error.clone()
    }

    /// Reflects the most recent cancel request.
    pub fn is_canceled(&self) -> bool {
        self.inner.snapshot.borrow().cancel_requested
    }

    /// Reflects the most recent pause request (or supervisor correction).
    pub fn is_paused(&self) -> bool {
        self.inner.snapshot.borrow().paused
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Terminal classification; `None` while the task is still running.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        let s = self.inner.snapshot.borrow();
        if s.state != TaskState::Finished {
            return None;
        }
        Some(if s.cancel_requested {
            TaskOutcome::Canceled
        } else if s.error.is_some() {
            TaskOutcome::Failed
        } else {
            TaskOutcome::Succeeded
        })
    }

    /// Subscribe to snapshot changes (UI/orchestration side).
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Wait for the terminal snapshot.
    pub async fn wait(&self) -> TaskSnapshot {
        let mut rx = self.subscribe();
        loop {
            if rx.borrow_and_update().state == TaskState::Finished {
                return rx.borrow().clone();
            }
            if rx.changed().await.is_err() {
                // Sender side gone; the last seen snapshot is all there is.
                return rx.borrow().clone();
            }
        }
    }

    // ---- request setters (any caller) -----------------------------------

    /// Record cancellation intent. Does not stop the child by itself; the
    /// supervisor observes the flag and asks the child to terminate.
    pub fn request_cancel(&self) {
        if !self.inner.can_cancel {
            return;
        }
        debug!("cancel requested");
        self.inner.control.send_modify(|c| c.cancel = true);
        self.update(|s| {
            s.cancel_requested = true;
            s.state = TaskState::Canceled;
        });
    }

    /// Record pause intent; no effect unless pausing is supported.
    pub fn request_pause(&self) {
        if !self.inner.can_pause {
            return;
        }
        debug!("pause requested");
        self.inner.control.send_modify(|c| c.pause = true);
        self.update(|s| s.paused = true);
    }

    pub fn request_resume(&self) {
        if !self.inner.can_pause {
            return;
        }
        debug!("resume requested");
        self.inner.control.send_modify(|c| c.pause = false);
        self.update(|s| s.paused = false);
    }

    // ---- worker-side updates --------------------------------------------

    /// Publish a progress value. Values below the current one are ignored so
    /// late or out-of-order events can never move progress backward.
    pub fn set_progress_value(&self, value: u32) {
        let value = value.min(PROGRESS_DONE);
        self.update(|s| {
            if value > s.progress {
                s.progress = value;
            }
        });
    }

    /// Publish a progress value together with its status text. Ignored
    /// entirely when `value` is below the current progress; an equal value
    /// refreshes the text.
    pub fn set_progress_value_and_text(&self, value: u32, text: &str) {
        let value = value.min(PROGRESS_DONE);
        self.update(|s| {
            if value >= s.progress {
                s.progress = value;
                s.progress_text = text.to_string();
            }
        });
    }

    /// Supervisor-side correction after a failed (or successful) signal
    /// delivery, so observers see whether the pause actually took effect.
    pub(crate) fn set_paused(&self, paused: bool) {
        self.inner.control.send_modify(|c| c.pause = paused);
        self.update(|s| s.paused = paused);
    }

    pub(crate) fn control_watch(&self) -> watch::Receiver<ControlRequests> {
        self.inner.control.subscribe()
    }

    // ---- lifecycle transitions (owning task only) ------------------------

    pub fn report_started(&self) {
        self.update(|s| {
            if s.state == TaskState::Created {
                s.state = TaskState::Started;
            }
        });
    }

    /// Attach the terminal error. Called at most once, before
    /// [`report_finished`](Self::report_finished).
    pub fn report_exception(&self, error: RunError) {
        self.update(|s| s.error = Some(error));
    }

    /// Terminal transition. After this every snapshot field is frozen.
    pub fn report_finished(&self) {
        self.update(|s| s.state = TaskState::Finished);
    }

    /// Serialized snapshot mutation; silently dropped once the task is
    /// finished (immutable terminal snapshot).
    fn update(&self, mutate: impl FnOnce(&mut TaskSnapshot)) {
        self.inner.snapshot.send_if_modified(|s| {
            if s.state == TaskState::Finished {
                return false;
            }
            mutate(s);
            true
        });
    }
}

impl std::fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFuture")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
