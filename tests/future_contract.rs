use std::error::Error;
use std::thread;

use progrun::errors::RunError;
use progrun::task::{TaskFuture, TaskOutcome, TaskState};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn progress_value_and_text_round_trip() -> TestResult {
    let future = TaskFuture::new(true, true);
    future.report_started();

    future.set_progress_value_and_text(42, "step one");
    assert_eq!(future.progress_value(), 42);
    assert_eq!(future.progress_text(), "step one");

    future.set_progress_value_and_text(500, "step two");
    assert_eq!(future.progress_value(), 500);
    assert_eq!(future.progress_text(), "step two");

    Ok(())
}

#[test]
fn late_lower_values_never_move_progress_backward() -> TestResult {
    let future = TaskFuture::new(true, true);
    future.report_started();

    future.set_progress_value(900);
    future.set_progress_value(200);
    assert_eq!(future.progress_value(), 900);

    // A lower value does not overwrite the text either.
    future.set_progress_value_and_text(100, "stale");
    assert_eq!(future.progress_value(), 900);
    assert_eq!(future.progress_text(), "");

    // An equal value refreshes the text.
    future.set_progress_value_and_text(900, "current");
    assert_eq!(future.progress_text(), "current");

    Ok(())
}

#[test]
fn values_above_the_range_are_clamped() -> TestResult {
    let future = TaskFuture::new(true, true);
    future.report_started();

    future.set_progress_value(5000);
    assert_eq!(future.progress_value(), 1000);
    assert_eq!(future.progress_range(), (0, 1000));

    Ok(())
}

#[test]
fn terminal_snapshot_is_immutable() -> TestResult {
    let future = TaskFuture::new(true, true);
    future.report_started();
    future.set_progress_value_and_text(1000, "done");
    future.report_finished();

    future.set_progress_value_and_text(1000, "too late");
    future.request_cancel();
    future.request_pause();
    future.report_exception(RunError::new("prog", 9, "too late"));

    let snapshot = future.snapshot();
    assert_eq!(snapshot.state, TaskState::Finished);
    assert_eq!(snapshot.progress, 1000);
    assert_eq!(snapshot.progress_text, "done");
    assert!(!snapshot.cancel_requested);
    assert!(!snapshot.paused);
    assert!(snapshot.error.is_none());

    Ok(())
}

#[test]
fn cancel_flag_wins_over_error_in_outcome() -> TestResult {
    let future = TaskFuture::new(true, true);
    future.report_started();
    future.request_cancel();
    assert!(future.is_canceled());
    assert_eq!(future.state(), TaskState::Canceled);

    // A canceled child often exits non-zero; the cancel flag still decides.
    future.report_exception(RunError::new("prog", 143, "terminated"));
    future.report_finished();

    assert_eq!(future.outcome(), Some(TaskOutcome::Canceled));
    assert!(future.error().is_some());

    Ok(())
}

#[test]
fn pause_request_without_capability_has_no_effect() -> TestResult {
    let future = TaskFuture::new(true, false);
    future.report_started();

    future.request_pause();
    assert!(!future.is_paused());

    future.request_resume();
    assert!(!future.is_paused());

    Ok(())
}

#[test]
fn cancel_request_without_capability_has_no_effect() -> TestResult {
    let future = TaskFuture::new(false, false);
    future.report_started();

    future.request_cancel();
    assert!(!future.is_canceled());
    assert_eq!(future.state(), TaskState::Started);

    Ok(())
}

/// Single writer, concurrent readers: every observed snapshot must be
/// internally coherent (text always matches the value it was published
/// with).
#[test]
fn concurrent_readers_never_observe_torn_snapshots() -> TestResult {
    let future = TaskFuture::new(true, true);
    future.report_started();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let future = future.clone();
            thread::spawn(move || {
                while future.state() != TaskState::Finished {
                    let snapshot = future.snapshot();
                    if !snapshot.progress_text.is_empty() {
                        assert_eq!(
                            snapshot.progress_text,
                            snapshot.progress.to_string(),
                            "torn snapshot observed"
                        );
                    }
                }
            })
        })
        .collect();

    for value in 1..=1000u32 {
        future.set_progress_value_and_text(value, &value.to_string());
    }
    future.report_finished();

    for reader in readers {
        reader.join().expect("reader panicked");
    }

    Ok(())
}
