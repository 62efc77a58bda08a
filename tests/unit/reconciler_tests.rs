//! Unit tests for status merging.

use std::time::Duration;

use tokio::time::Instant;

use import_sync::orchestrator::reconciler::{merge, Reconciler};
use import_sync::{JobStatus, StatusSnapshot, StatusUpdate};

fn processing_snapshot() -> StatusSnapshot {
    StatusSnapshot {
        status: JobStatus::Processing,
        progress: 40,
        total_rows: Some(1000),
        processed_rows: Some(400),
        error_message: None,
        eta_seconds: Some(30),
    }
}

#[test]
fn absent_fields_keep_prior_values() {
    let current = processing_snapshot();

    let merged = merge(&current, &StatusUpdate::default().processed_rows(450));

    assert_eq!(
        merged,
        StatusSnapshot {
            processed_rows: Some(450),
            ..current
        }
    );
}

#[test]
fn empty_update_changes_nothing() {
    let current = processing_snapshot();
    assert_eq!(merge(&current, &StatusUpdate::default()), current);
}

#[test]
fn progress_is_clamped() {
    let current = processing_snapshot();

    assert_eq!(merge(&current, &StatusUpdate::default().progress(250)).progress, 100);
    assert_eq!(merge(&current, &StatusUpdate::default().progress(-5)).progress, 0);
    assert_eq!(merge(&current, &StatusUpdate::default().progress(73)).progress, 73);
}

#[test]
fn progress_may_move_backwards() {
    let current = processing_snapshot();
    assert_eq!(merge(&current, &StatusUpdate::default().progress(10)).progress, 10);
}

#[test]
fn error_message_kept_only_when_failed() {
    let current = processing_snapshot();

    let ignored = merge(&current, &StatusUpdate::default().error_message("stray"));
    assert_eq!(ignored.error_message, None);

    let failed = merge(
        &current,
        &StatusUpdate::with_status(JobStatus::Failed).error_message("bad header"),
    );
    assert_eq!(failed.error_message.as_deref(), Some("bad header"));
    assert_eq!(failed.processed_rows, Some(400));

    let repeated = merge(&failed, &StatusUpdate::with_status(JobStatus::Failed));
    assert_eq!(repeated.error_message.as_deref(), Some("bad header"));

    let recovered = merge(&failed, &StatusUpdate::with_status(JobStatus::Processing));
    assert_eq!(recovered.error_message, None);
}

#[test]
fn later_update_wins_regardless_of_content() {
    let current = processing_snapshot();
    let fresher = merge(&current, &StatusUpdate::default().progress(60));
    let stale = merge(&fresher, &StatusUpdate::default().progress(50));
    assert_eq!(stale.progress, 50);
}

#[test]
fn reconciler_starts_unknown_with_session_start_as_reference() {
    let started = Instant::now();
    let reconciler = Reconciler::new(started);

    assert_eq!(reconciler.snapshot(), &StatusSnapshot::default());
    assert_eq!(reconciler.last_update(), started);
    assert!(reconciler.last_update_at().is_none());
}

#[test]
fn apply_records_update_time() {
    let started = Instant::now();
    let mut reconciler = Reconciler::new(started);
    let later = started + Duration::from_secs(4);

    let snapshot = reconciler
        .apply(&StatusUpdate::with_status(JobStatus::Pending), later)
        .clone();

    assert_eq!(snapshot.status, JobStatus::Pending);
    assert_eq!(reconciler.last_update(), later);
    assert!(reconciler.last_update_at().is_some());

    let even_later = later + Duration::from_secs(1);
    reconciler.apply(&StatusUpdate::default(), even_later);
    assert_eq!(reconciler.last_update(), even_later, "empty update still counts");
}
