// src/task/supervisor.rs

//! Bridge between a running child process and its [`TaskFuture`].
//!
//! The supervisor owns the child handle for the lifetime of one run. Its
//! loop waits on four things at once: child exit, parsed progress events,
//! control-flag changes (cancel/resume), and a fixed-interval timer that
//! samples the pause flag. Pause intent is level-triggered by the timer
//! rather than edge-triggered, so a request is honored no matter when it was
//! set relative to the loop starting.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::progress::{PROGRESS_DONE, PROGRESS_RUNNING_MAX, ProgressEvent, SharedDiagnostics};
use crate::task::future::{ControlRequests, TaskFuture};

/// Interval at which the future's pause flag is sampled.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// OS-level control of one child process.
///
/// Split out as a trait so signal delivery (and its failure modes) can be
/// substituted in tests. All methods are requests: delivering a signal says
/// nothing about when the child reacts.
pub trait ChildControl: Send {
    /// Suspend the child (SIGSTOP).
    fn stop(&mut self) -> io::Result<()>;
    /// Resume a suspended child (SIGCONT).
    fn resume(&mut self) -> io::Result<()>;
    /// Ask the child to terminate gracefully (SIGTERM).
    fn terminate(&mut self) -> io::Result<()>;
}

/// Signal-based control for Unix targets.
#[cfg(unix)]
pub struct SignalControl {
    pid: Option<nix::unistd::Pid>,
}

#[cfg(unix)]
impl SignalControl {
    pub fn for_child(child: &Child) -> Self {
        Self {
            pid: child.id().map(|id| nix::unistd::Pid::from_raw(id as i32)),
        }
    }

    fn send(&self, signal: nix::sys::signal::Signal) -> io::Result<()> {
        let pid = self
            .pid
            .ok_or_else(|| io::Error::other("child process has no pid"))?;
        nix::sys::signal::kill(pid, signal)
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
    }
}

#[cfg(unix)]
impl ChildControl for SignalControl {
    fn stop(&mut self) -> io::Result<()> {
        self.send(nix::sys::signal::Signal::SIGSTOP)
    }

    fn resume(&mut self) -> io::Result<()> {
        self.send(nix::sys::signal::Signal::SIGCONT)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.send(nix::sys::signal::Signal::SIGTERM)
    }
}

/// Inert control for targets without process signals. Tasks on these targets
/// are created with `can_pause = false`, so `stop`/`resume` are unreachable;
/// `terminate` reports failure and the caller falls back to a hard kill.
#[cfg(not(unix))]
pub struct SignalControl;

#[cfg(not(unix))]
impl SignalControl {
    pub fn for_child(_child: &Child) -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl ChildControl for SignalControl {
    fn stop(&mut self) -> io::Result<()> {
        Err(io::Error::other("process signals not supported on this platform"))
    }

    fn resume(&mut self) -> io::Result<()> {
        Err(io::Error::other("process signals not supported on this platform"))
    }

    fn terminate(&mut self) -> io::Result<()> {
        Err(io::Error::other("process signals not supported on this platform"))
    }
}

/// Owns the live child process and drives its future until exit.
///
/// Owned exclusively by one task's run loop; never shared across threads.
pub struct ProcessSupervisor {
    child: Child,
    location: String,
    future: TaskFuture,
    events: mpsc::Receiver<ProgressEvent>,
    control: Box<dyn ChildControl>,
    diagnostics: SharedDiagnostics,
    poll_interval: Duration,
    /// Whether a stop signal was last successfully delivered; prevents
    /// redundant or mismatched stop/continue sends.
    child_paused: bool,
    /// Local mirror of the last computed progress value, used for the
    /// +1 increments on textual events.
    last_progress: u32,
}

impl ProcessSupervisor {
    pub fn new(
        child: Child,
        location: String,
        future: TaskFuture,
        events: mpsc::Receiver<ProgressEvent>,
        diagnostics: SharedDiagnostics,
    ) -> Self {
        let control = Box::new(SignalControl::for_child(&child));
        Self {
            child,
            location,
            future,
            events,
            control,
            diagnostics,
            poll_interval: PAUSE_POLL_INTERVAL,
            child_paused: false,
            last_progress: 0,
        }
    }

    /// Substitute the signal-delivery mechanism (tests).
    pub fn with_control(mut self, control: Box<dyn ChildControl>) -> Self {
        self.control = control;
        self
    }

    /// Override the pause-poll interval (tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until the child exits, returning its exit status.
    ///
    /// Cancellation asks the child to terminate but the loop still waits for
    /// the real exit, so the task always finalizes with an actual status.
    pub async fn run(mut self) -> io::Result<ExitStatus> {
        let mut requests = self.future.control_watch();

        // A cancel raced ahead of the loop: act on it now, since `changed()`
        // only fires for updates after this subscription.
        let mut seen = *requests.borrow_and_update();
        if seen.cancel {
            self.terminate_child();
        }

        let mut poll = time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut events_open = true;

        loop {
            tokio::select! {
                status = self.child.wait() => {
                    debug!(module = %self.location, ?status, "child process exited");
                    return status;
                }
                _ = poll.tick() => {
                    self.poll_pause();
                }
                changed = requests.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    let current = *requests.borrow_and_update();
                    self.apply_control(seen, current);
                    seen = current;
                }
                maybe = self.events.recv(), if events_open => {
                    match maybe {
                        Some(event) => self.handle_event(event),
                        // Stdout closed; the child may still be running.
                        None => events_open = false,
                    }
                }
            }
        }
    }

    /// React to control-flag edges. A newly raised pause flag is *not*
    /// handled here; the poll timer samples it (level-triggered).
    fn apply_control(&mut self, previous: ControlRequests, current: ControlRequests) {
        if current.cancel && !previous.cancel {
            self.terminate_child();
        }
        if previous.pause && !current.pause {
            self.resume_child();
        }
    }

    /// Sample the pause flag and deliver a stop signal when intent and child
    /// state disagree. On delivery failure the flag is corrected back to
    /// false so observers see that the pause did not take effect.
    fn poll_pause(&mut self) {
        if self.child_paused || !self.future.is_paused() {
            return;
        }
        match self.control.stop() {
            Ok(()) => {
                debug!(module = %self.location, "child process stopped");
                self.child_paused = true;
            }
            Err(err) => {
                warn!(
                    module = %self.location,
                    error = %err,
                    "failed to deliver stop signal; clearing pause flag"
                );
                self.future.set_paused(false);
            }
        }
    }

    fn resume_child(&mut self) {
        if !self.child_paused {
            return;
        }
        match self.control.resume() {
            Ok(()) => {
                debug!(module = %self.location, "child process resumed");
                self.child_paused = false;
            }
            Err(err) => {
                warn!(
                    module = %self.location,
                    error = %err,
                    "failed to deliver continue signal; child remains paused"
                );
                self.future.set_paused(true);
            }
        }
    }

    fn terminate_child(&mut self) {
        debug!(module = %self.location, "cancel requested; terminating child process");

        // A stopped child cannot act on a terminate request.
        if self.child_paused && self.control.resume().is_ok() {
            self.child_paused = false;
        }

        if let Err(err) = self.control.terminate() {
            warn!(
                module = %self.location,
                error = %err,
                "graceful terminate failed; killing child process"
            );
            if let Err(err) = self.child.start_kill() {
                warn!(module = %self.location, error = %err, "failed to kill child process");
            }
        }
    }

    fn handle_event(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { name, comment: _ } => {
                let value = self.increment_progress();
                self.future.set_progress_value_and_text(value, &name);
            }
            ProgressEvent::Progress { fraction } => {
                let value = self.update_progress(fraction);
                self.future.set_progress_value(value);
            }
            ProgressEvent::Finished { name } => {
                let value = self.increment_progress();
                self.future
                    .set_progress_value_and_text(value, &format!("Finished: {name}"));
            }
            ProgressEvent::Error { message } => {
                // Non-fatal per-event report; never alters future state.
                self.diagnostics.report(&self.location, &message);
            }
        }
    }

    /// Map a fractional report into `[1, 999]`: 0 is reserved for "not yet
    /// started" and 1000 for the terminal snapshot.
    fn update_progress(&mut self, fraction: f32) -> u32 {
        let value = (fraction * PROGRESS_DONE as f32).round() as i64;
        self.last_progress = value.clamp(1, PROGRESS_RUNNING_MAX as i64) as u32;
        self.last_progress
    }

    /// Textual events advance progress by one step even when the child never
    /// reports fractional progress.
    fn increment_progress(&mut self) -> u32 {
        self.last_progress = (self.last_progress + 1).min(PROGRESS_RUNNING_MAX);
        self.last_progress
    }
}
