//! HTTP publisher tests against a local ingestion endpoint

mod helpers;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tuneflow_common::events::{EventType, ListenStatus, PlaybackEvent, ProcessingPath};
use tuneflow_tracker::error::PublishError;
use tuneflow_tracker::publish::{HttpPublisher, Publisher, RecordOutcome, RetryPolicy};

/// Ingestion endpoint replaying canned responses, recording each request body
#[derive(Default)]
struct Ingest {
    responses: Mutex<VecDeque<(StatusCode, Value)>>,
    requests: Mutex<Vec<Value>>,
}

impl Ingest {
    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn ingest(State(state): State<Arc<Ingest>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.requests.lock().unwrap().push(body);
    let next = state.responses.lock().unwrap().pop_front();
    let (status, response) = next.unwrap_or((StatusCode::OK, json!({ "failed_record_count": 0 })));
    (status, Json(response))
}

async fn start(responses: Vec<(StatusCode, Value)>) -> (Arc<Ingest>, String) {
    let state = Arc::new(Ingest {
        responses: Mutex::new(responses.into()),
        ..Default::default()
    });
    let router = Router::new()
        .route("/ingest", post(ingest))
        .with_state(Arc::clone(&state));
    let base = helpers::spawn_server(router).await;
    (state, format!("{}/ingest", base))
}

fn publisher(endpoint: &str, max_attempts: u32) -> HttpPublisher {
    HttpPublisher::new(
        endpoint,
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

fn event(track_id: &str, status: ListenStatus) -> PlaybackEvent {
    PlaybackEvent {
        event_type: EventType::TrackChange,
        track_id: track_id.to_string(),
        track_name: Some(format!("Song {}", track_id)),
        status,
        duration_listened_seconds: 42,
        timestamp: 1_760_000_000,
        user_id: "listener-1".to_string(),
        processing_path: ProcessingPath::Hot,
    }
}

#[tokio::test]
async fn test_batch_delivered_with_wire_format() {
    let (state, endpoint) = start(vec![]).await;
    let publisher = publisher(&endpoint, 3);

    let report = publisher
        .publish_batch(&[event("A", ListenStatus::Completed), event("B", ListenStatus::Skipped)])
        .await
        .unwrap();
    assert!(report.is_complete_success());

    let requests = state.requests();
    assert_eq!(requests.len(), 1);
    let records = requests[0]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["partition_key"], "listener-1");
    assert_eq!(records[0]["data"]["track_id"], "A");
    assert_eq!(records[0]["data"]["status"], "COMPLETED");
    assert_eq!(records[0]["data"]["event_type"], "track_change");
    assert_eq!(records[0]["data"]["processing_path"], "hot");
    assert_eq!(records[0]["data"]["timestamp"], 1_760_000_000);
    assert_eq!(records[1]["data"]["status"], "SKIPPED");
}

#[tokio::test]
async fn test_partial_failure_resends_only_rejected_records() {
    let (state, endpoint) = start(vec![(
        StatusCode::OK,
        json!({
            "failed_record_count": 1,
            "records": [{}, { "error_code": "Throttled", "error_message": "slow down" }, {}]
        }),
    )])
    .await;
    let publisher = publisher(&endpoint, 3);

    let report = publisher
        .publish_batch(&[
            event("A", ListenStatus::Completed),
            event("B", ListenStatus::Completed),
            event("C", ListenStatus::Completed),
        ])
        .await
        .unwrap();
    assert!(report.is_complete_success());
    assert_eq!(report.delivered_count(), 3);

    let requests = state.requests();
    assert_eq!(requests.len(), 2);
    let retried = requests[1]["records"].as_array().unwrap();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0]["data"]["track_id"], "B");
}

#[tokio::test]
async fn test_persistent_rejection_reported_per_record() {
    let rejected = json!({
        "failed_record_count": 1,
        "records": [{ "error_code": "InternalFailure" }]
    });
    let (state, endpoint) = start(vec![
        (StatusCode::OK, json!({ "failed_record_count": 1, "records": [{}, { "error_code": "InternalFailure" }] })),
        (StatusCode::OK, rejected.clone()),
        (StatusCode::OK, rejected),
    ])
    .await;
    let publisher = publisher(&endpoint, 3);

    let report = publisher
        .publish_batch(&[event("A", ListenStatus::Completed), event("B", ListenStatus::Skipped)])
        .await
        .unwrap();

    assert_eq!(state.requests().len(), 3);
    assert_eq!(report.outcomes[0], RecordOutcome::Delivered);
    assert_eq!(report.failures().collect::<Vec<_>>(), vec![(1, "InternalFailure")]);
}

#[tokio::test]
async fn test_server_errors_retried_until_exhausted() {
    let (state, endpoint) = start(vec![
        (StatusCode::SERVICE_UNAVAILABLE, json!({})),
        (StatusCode::SERVICE_UNAVAILABLE, json!({})),
        (StatusCode::SERVICE_UNAVAILABLE, json!({})),
    ])
    .await;
    let publisher = publisher(&endpoint, 3);

    let err = publisher
        .publish_batch(&[event("A", ListenStatus::Completed)])
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Status { status: 503, .. }));
    assert_eq!(state.requests().len(), 3);
}

#[tokio::test]
async fn test_server_error_then_success() {
    let (state, endpoint) = start(vec![(StatusCode::INTERNAL_SERVER_ERROR, json!({}))]).await;
    let publisher = publisher(&endpoint, 3);

    publisher.publish(&event("A", ListenStatus::Completed)).await.unwrap();
    assert_eq!(state.requests().len(), 2);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let (state, endpoint) = start(vec![(StatusCode::BAD_REQUEST, json!({ "message": "bad" }))]).await;
    let publisher = publisher(&endpoint, 3);

    let err = publisher
        .publish(&event("A", ListenStatus::Completed))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Status { status: 400, .. }));
    assert_eq!(state.requests().len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let endpoint = format!("{}/ingest", helpers::unreachable_url().await);
    let publisher = publisher(&endpoint, 2);

    let err = publisher
        .publish(&event("A", ListenStatus::Completed))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Transport(_)));
}

/// Endpoint that answers 200 but closes before the promised body is sent
async fn start_truncating() -> (Arc<AtomicUsize>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // Read the whole request so the client sees the response, not a reset
                let mut request = Vec::new();
                let mut chunk = [0u8; 4096];
                while !request.ends_with(b"]}") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"failed_record_count\": 1",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (accepted, format!("http://{}/ingest", addr))
}

#[tokio::test]
async fn test_truncated_success_body_is_retried_not_accepted() {
    let (accepted, endpoint) = start_truncating().await;
    let publisher = publisher(&endpoint, 2);

    let err = publisher
        .publish_batch(&[event("A", ListenStatus::Completed)])
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Transport(_)));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}
