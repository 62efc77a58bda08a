//! Integration tests for explicit cancellation and idempotent teardown.

use std::sync::Arc;
use std::time::Duration;

use import_sync::{JobStatus, SessionPhase, StatusUpdate};

use super::test_helpers::{
    default_timing, settle, spawn_session, wait_for_view, ManualPush, ScriptedPull,
};

#[tokio::test(start_paused = true)]
async fn stop_suppresses_in_flight_probe() {
    let push = Arc::new(ManualPush::default());
    let pull = Arc::new(
        ScriptedPull::always(StatusUpdate::with_status(JobStatus::Completed).progress(100))
            .gated(),
    );
    let handle = spawn_session("cancel-1", &push, &pull, default_timing());
    let feed = push.feed(0);

    feed.update(StatusUpdate::with_status(JobStatus::Processing).progress(20))
        .await;
    feed.fault("proxy timeout").await;
    wait_for_view(&handle, |v| v.phase == SessionPhase::LivePushAndFallback).await;
    settle().await;
    assert_eq!(pull.calls(), 1, "probe should be in flight");

    handle.stop();
    assert_eq!(handle.phase(), SessionPhase::Terminated);

    pull.release(1);
    settle().await;
    handle.closed().await;

    let view = handle.view();
    assert_eq!(view.snapshot.status, JobStatus::Processing);
    assert_eq!(view.snapshot.progress, 20);
    assert_eq!(view.pull_updates, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_during_fallback_stops_polling() {
    let push = Arc::new(ManualPush::default());
    let pull = Arc::new(ScriptedPull::failing());
    let handle = spawn_session("cancel-2", &push, &pull, default_timing());

    push.feed(0)
        .update(StatusUpdate::with_status(JobStatus::Processing))
        .await;
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    settle().await;
    let before = pull.calls();
    assert!(before >= 2, "fallback should be polling, saw {before} calls");

    handle.stop();
    handle.closed().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(pull.calls(), before, "no fetch after stop");
    assert!(push.feed(0).is_closed());
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let push = Arc::new(ManualPush::default());
    let pull = Arc::new(ScriptedPull::failing());
    let handle = spawn_session("cancel-3", &push, &pull, default_timing());
    let clone = handle.clone();

    handle.stop();
    clone.stop();
    handle.stop();
    handle.closed().await;

    assert!(handle.is_terminated());
    assert!(clone.is_closed());
    assert!(push.feed(0).is_closed());
}

#[tokio::test(start_paused = true)]
async fn stop_after_terminal_keeps_final_snapshot() {
    let push = Arc::new(ManualPush::default());
    let pull = Arc::new(ScriptedPull::failing());
    let handle = spawn_session("cancel-4", &push, &pull, default_timing());

    push.feed(0)
        .update(
            StatusUpdate::with_status(JobStatus::Completed)
                .progress(100)
                .processed_rows(3),
        )
        .await;
    let final_view = handle.wait_terminated().await;

    handle.stop();
    handle.closed().await;

    assert_eq!(handle.view(), final_view);
}

#[tokio::test(start_paused = true)]
async fn subscribers_observe_termination() {
    let push = Arc::new(ManualPush::default());
    let pull = Arc::new(ScriptedPull::failing());
    let handle = spawn_session("cancel-5", &push, &pull, default_timing());
    let mut rx = handle.subscribe();

    handle.stop();
    rx.changed().await.expect("sender alive");

    assert_eq!(rx.borrow().phase, SessionPhase::Terminated);
}
