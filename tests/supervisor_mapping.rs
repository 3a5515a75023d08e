#![cfg(unix)]

use std::error::Error;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use progrun::progress::{DiagnosticsSink, LogDiagnostics, ProgressEvent};
use progrun::task::{ProcessSupervisor, TaskFuture};

type TestResult = Result<(), Box<dyn Error>>;

const POLL: Duration = Duration::from_millis(50);

fn sleeping_child() -> std::io::Result<Child> {
    Command::new("sleep")
        .arg("5")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
}

/// Poll `cond` until it holds or a bounded wait elapses.
async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

struct Harness {
    future: TaskFuture,
    events: mpsc::Sender<ProgressEvent>,
    run: tokio::task::JoinHandle<std::io::Result<std::process::ExitStatus>>,
}

fn start_supervisor(diagnostics: Arc<dyn DiagnosticsSink>) -> std::io::Result<Harness> {
    let child = sleeping_child()?;
    let future = TaskFuture::new(true, true);
    future.report_started();
    let (tx, rx) = mpsc::channel(16);

    let supervisor =
        ProcessSupervisor::new(child, "sleep".into(), future.clone(), rx, diagnostics)
            .with_poll_interval(POLL);
    let run = tokio::spawn(supervisor.run());

    Ok(Harness {
        future,
        events: tx,
        run,
    })
}

async fn finish(harness: Harness) -> TestResult {
    harness.future.request_cancel();
    let _status = timeout(Duration::from_secs(5), harness.run).await??;
    Ok(())
}

#[tokio::test]
async fn fraction_boundaries_map_to_1_and_999() -> TestResult {
    let h = start_supervisor(Arc::new(LogDiagnostics))?;

    h.events.send(ProgressEvent::Progress { fraction: 0.0 }).await?;
    let f = h.future.clone();
    assert!(eventually(move || f.progress_value() == 1).await);

    h.events.send(ProgressEvent::Progress { fraction: 1.0 }).await?;
    let f = h.future.clone();
    assert!(eventually(move || f.progress_value() == 999).await);

    finish(h).await
}

#[tokio::test]
async fn fraction_maps_to_rounded_thousandths() -> TestResult {
    let h = start_supervisor(Arc::new(LogDiagnostics))?;

    h.events.send(ProgressEvent::Progress { fraction: 0.4996 }).await?;
    let f = h.future.clone();
    assert!(eventually(move || f.progress_value() == 500).await);

    finish(h).await
}

#[tokio::test]
async fn textual_events_increment_progress_and_set_text() -> TestResult {
    let h = start_supervisor(Arc::new(LogDiagnostics))?;

    h.events
        .send(ProgressEvent::Started {
            name: "Smoothing".into(),
            comment: "first pass".into(),
        })
        .await?;
    let f = h.future.clone();
    assert!(eventually(move || f.progress_value() == 1).await);
    assert_eq!(h.future.progress_text(), "Smoothing");

    h.events.send(ProgressEvent::Progress { fraction: 0.5 }).await?;
    let f = h.future.clone();
    assert!(eventually(move || f.progress_value() == 500).await);

    h.events
        .send(ProgressEvent::Finished {
            name: "Smoothing".into(),
        })
        .await?;
    let f = h.future.clone();
    assert!(eventually(move || f.progress_value() == 501).await);
    assert_eq!(h.future.progress_text(), "Finished: Smoothing");

    finish(h).await
}

struct CapturingSink(Mutex<Vec<(String, String)>>);

impl DiagnosticsSink for CapturingSink {
    fn report(&self, location: &str, message: &str) {
        self.0
            .lock()
            .unwrap()
            .push((location.to_string(), message.to_string()));
    }
}

#[tokio::test]
async fn error_events_reach_diagnostics_without_touching_the_future() -> TestResult {
    let sink = Arc::new(CapturingSink(Mutex::new(Vec::new())));
    let h = start_supervisor(sink.clone())?;

    h.events
        .send(ProgressEvent::Error {
            message: "unreadable marker".into(),
        })
        .await?;

    let captured = sink.clone();
    assert!(eventually(move || !captured.0.lock().unwrap().is_empty()).await);

    let reports = sink.0.lock().unwrap().clone();
    assert_eq!(reports, vec![("sleep".to_string(), "unreadable marker".to_string())]);
    assert_eq!(h.future.progress_value(), 0);
    assert!(h.future.error().is_none());

    finish(h).await
}

#[tokio::test]
async fn cancel_terminates_the_child_and_ends_the_run() -> TestResult {
    let h = start_supervisor(Arc::new(LogDiagnostics))?;

    h.future.request_cancel();
    let status = timeout(Duration::from_secs(5), h.run).await??;

    // SIGTERM: exited without a normal exit code.
    let status = status?;
    assert!(!status.success());
    assert_eq!(status.code(), None);

    Ok(())
}
