//! Integration tests for the HTTP transports against a local importer API.
//!
//! Spawns an axum server on an ephemeral port that mimics the job status
//! and event-stream endpoints.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, StreamExt};
use serde_json::json;

use import_sync::channel::client::JobsClient;
use import_sync::channel::pull::HttpPullSource;
use import_sync::channel::push::HttpPushSource;
use import_sync::channel::{PullSource, PushChannel, PushEvent, PushSource};
use import_sync::config::TimingConfig;
use import_sync::{AppError, JobStatus, StatusUpdate, SyncConfig, SyncManager};

async fn job_status(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Job not found" })),
        )
            .into_response(),
        "nostatus" => Json(json!({ "job_id": id, "progress": 5 })).into_response(),
        "hanging" => Json(json!({
            "job_id": id,
            "status": "completed",
            "progress": 100,
            "total_rows": 3,
            "processed_rows": 3,
            "error_message": null,
        }))
        .into_response(),
        _ => Json(json!({
            "job_id": id,
            "task_id": "task-1",
            "file_name": "products.csv",
            "status": "processing",
            "progress": 40,
            "total_rows": 100,
            "processed_rows": 40,
            "error_message": null,
            "created_at": "2026-10-19T09:00:00",
        }))
        .into_response(),
    }
}

fn sse(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn job_events(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "closing" => sse(Body::from(concat!(
            ": keepalive\n\n",
            "data: {\"status\":\"processing\",\"progress\":10,\"total_rows\":3}\n\n",
            "data: {not json}\n\n",
            "data: {\"status\":\"completed\",\"progress\":100,\"processed_rows\":3}\n\n",
            "event: close\ndata: {\"message\":\"Job finished\"}\n\n",
            "data: {\"status\":\"processing\",\"progress\":1}\n\n",
        ))),
        "eof" => sse(Body::from(
            "data: {\"status\":\"processing\",\"progress\":20}\r\n\r\n",
        )),
        "unknown" => sse(Body::from("data: {\"error\":\"Job not found\"}\n\n")),
        _ => {
            let first = stream::once(async {
                Ok::<_, Infallible>("data: {\"status\":\"processing\",\"progress\":15}\n\n")
            });
            sse(Body::from_stream(first.chain(stream::pending())))
        }
    }
}

async fn cancel_job(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({ "job_id": id, "cancelled": true })).into_response()
}

/// Spawn the mock importer API, returning a config pointing at it.
async fn spawn_server() -> SyncConfig {
    let app = Router::new()
        .route("/api/jobs/{id}", get(job_status))
        .route("/api/jobs/{id}/events", get(job_events))
        .route("/api/jobs/{id}/cancel", post(cancel_job));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    SyncConfig {
        base_url: format!("http://{addr}/api/"),
        request_timeout_seconds: 5,
        timing: TimingConfig::default(),
    }
}

async fn client() -> JobsClient {
    let mut config = spawn_server().await;
    config.validate().expect("valid config");
    JobsClient::new(&config).expect("client")
}

/// Drain a push channel until it ends, bounded by a timeout.
async fn drain(mut channel: PushChannel) -> Vec<PushEvent> {
    let mut events = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = channel.recv().await {
            events.push(event);
        }
    })
    .await;
    assert!(drained.is_ok(), "push channel should end, got {events:?}");
    events
}

#[tokio::test]
async fn fetch_status_parses_server_payload() {
    let client = client().await;

    let update = client.fetch_status("job-1").await.expect("status");

    assert_eq!(
        update,
        StatusUpdate::with_status(JobStatus::Processing)
            .progress(40)
            .total_rows(100)
            .processed_rows(40)
    );
}

#[tokio::test]
async fn fetch_status_maps_404_to_not_found() {
    let client = client().await;

    let err = client.fetch_status("missing").await.expect_err("404");

    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn fetch_status_without_status_is_parse_error() {
    let client = client().await;

    let err = client.fetch_status("nostatus").await.expect_err("no status");

    assert!(matches!(err, AppError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn pull_source_delegates_to_client() {
    let pull = HttpPullSource::new(client().await);

    let update = pull.fetch("job-2").await.expect("status");

    assert_eq!(update.status, Some(JobStatus::Processing));
}

#[tokio::test]
async fn event_stream_forwards_updates_until_close_event() {
    let push = HttpPushSource::new(client().await);

    let events = drain(push.open("closing")).await;

    assert_eq!(
        events,
        vec![
            PushEvent::Update(
                StatusUpdate::with_status(JobStatus::Processing)
                    .progress(10)
                    .total_rows(3)
            ),
            PushEvent::Update(
                StatusUpdate::with_status(JobStatus::Completed)
                    .progress(100)
                    .processed_rows(3)
            ),
        ],
        "malformed frame skipped, nothing after close"
    );
}

#[tokio::test]
async fn event_stream_eof_without_close_is_fault() {
    let push = HttpPushSource::new(client().await);

    let events = drain(push.open("eof")).await;

    assert_eq!(events.len(), 2, "got {events:?}");
    assert_eq!(
        events[0],
        PushEvent::Update(StatusUpdate::with_status(JobStatus::Processing).progress(20))
    );
    assert!(matches!(events[1], PushEvent::Fault(_)));
}

#[tokio::test]
async fn event_stream_error_payload_is_fault() {
    let push = HttpPushSource::new(client().await);

    let events = drain(push.open("unknown")).await;

    assert_eq!(events.len(), 1, "got {events:?}");
    assert!(matches!(&events[0], PushEvent::Fault(reason) if reason.contains("Job not found")));
}

#[tokio::test]
async fn event_stream_404_is_fault() {
    let push = HttpPushSource::new(client().await);

    let events = drain(push.open("missing")).await;

    assert_eq!(events.len(), 1, "got {events:?}");
    assert!(matches!(events[0], PushEvent::Fault(_)));
}

#[tokio::test]
async fn closing_hanging_stream_stops_producer() {
    let push = HttpPushSource::new(client().await);
    let mut channel = push.open("hanging");

    let first = tokio::time::timeout(Duration::from_secs(10), channel.recv())
        .await
        .expect("first event");
    assert_eq!(
        first,
        Some(PushEvent::Update(
            StatusUpdate::with_status(JobStatus::Processing).progress(15)
        ))
    );

    channel.close();
    channel.close();
    assert!(channel.is_closed());
    assert_eq!(channel.recv().await, None);
}

#[tokio::test]
async fn cancel_job_posts_to_cancel_endpoint() {
    let client = client().await;

    client.cancel_job("job-3").await.expect("cancel accepted");
    let err = client.cancel_job("missing").await.expect_err("404");

    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn manager_recovers_hanging_stream_through_pull() {
    let mut config = spawn_server().await;
    config.timing = TimingConfig {
        fallback_interval_ms: 100,
        stall_check_interval_ms: 50,
        stall_threshold_ms: 200,
    };
    config.validate().expect("valid config");
    let manager = Arc::new(SyncManager::from_config(&config).expect("manager"));

    let handle = manager.start("hanging").expect("start");
    let view = tokio::time::timeout(Duration::from_secs(10), handle.wait_terminated())
        .await
        .expect("session should finish through fallback");
    handle.closed().await;

    assert_eq!(view.snapshot.status, JobStatus::Completed);
    assert_eq!(view.snapshot.processed_rows, Some(3));
    assert_eq!(view.push_updates, 1);
    assert!(view.pull_updates >= 1);
    assert!(manager.active_job_ids().is_empty());
    manager.shutdown();
}

#[tokio::test]
async fn unsafe_job_ids_never_reach_the_server() {
    let client = client().await;

    for bad in ["../x", "job/../../admin", "a b", ""] {
        let err = client.cancel_job(bad).await.expect_err("cancel rejected");
        assert!(matches!(err, AppError::InvalidJobId(_)), "{bad:?} gave {err:?}");
        let err = client.fetch_status(bad).await.expect_err("fetch rejected");
        assert!(matches!(err, AppError::InvalidJobId(_)), "{bad:?} gave {err:?}");
    }

    let events = drain(HttpPushSource::new(client).open("../x")).await;
    assert_eq!(events.len(), 1, "got {events:?}");
    assert!(matches!(&events[0], PushEvent::Fault(reason) if reason.contains("invalid job id")));
}
