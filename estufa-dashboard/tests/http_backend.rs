use axum::http::StatusCode;
use estufa_dashboard::chat::ChatSession;
use estufa_dashboard::{BackendError, FailureKind, HttpBackend, SendOutcome, TelemetrySource};
use estufa_devkit::fixtures::BatchBuilder;
use estufa_devkit::{StubServer, StubState};
use std::sync::Arc;
use std::time::Duration;

async fn stub_with(temps: &[f64]) -> (StubServer, HttpBackend) {
    let state = StubState::new();
    state.set_points(BatchBuilder::new().temps(temps).build());
    let stub = StubServer::start(state).await.unwrap();
    let backend = HttpBackend::new(&stub.base_url(), Duration::from_secs(2)).unwrap();
    (stub, backend)
}

#[tokio::test]
async fn test_probe_and_fetch_dados() {
    let (_stub, backend) = stub_with(&[20.0, 21.0, 22.0, 23.0]).await;

    backend.probe().await.unwrap();
    let batch = backend.fetch_batch(2).await.unwrap();
    assert_eq!(batch.len(), 2);
    // newest first, as the backend sends it
    assert_eq!(batch[0].temperature, Some(23.0));
    assert_eq!(batch[1].temperature, Some(22.0));
}

#[tokio::test]
async fn test_fetch_series_and_analysis() {
    let (_stub, backend) = stub_with(&[20.0, 22.0, 24.0]).await;

    let series = backend.fetch_series(20).await.unwrap();
    assert_eq!(series.len(), 3);
    assert_eq!(series[0].temperature, Some(20.0));
    assert_eq!(series[2].humidity, Some(50.0));

    let analysis = backend.fetch_analysis(20).await.unwrap();
    assert_eq!(analysis.mean_temperature(), Some(22.0));
    assert_eq!(analysis.mean_humidity(), Some(50.0));
    assert!(analysis.erro.is_none());
}

#[tokio::test]
async fn test_empty_history_analysis() {
    let (_stub, backend) = stub_with(&[]).await;

    let analysis = backend.fetch_analysis(20).await.unwrap();
    assert!(analysis.erro.is_some());
    assert_eq!(analysis.mean_temperature(), None);
}

#[tokio::test]
async fn test_failures_are_classified() {
    let (stub, backend) = stub_with(&[20.0]).await;

    stub.state().fail("/dados", StatusCode::INTERNAL_SERVER_ERROR);
    let err = backend.fetch_batch(20).await.unwrap_err();
    assert_eq!(err, BackendError::Status { status: 500 });
    assert_eq!(err.kind(), FailureKind::Protocol);

    stub.state().heal();
    stub.state().raw_body("/dados", r#"{"dados": []}"#);
    assert_eq!(backend.fetch_batch(20).await.unwrap_err().kind(), FailureKind::DataShape);
    assert_eq!(backend.probe().await.unwrap_err().kind(), FailureKind::DataShape);

    stub.state().raw_body("/dados", "<html>oops</html>");
    assert!(matches!(backend.fetch_batch(20).await, Err(BackendError::Malformed(_))));

    let ragged = r#"{"time": ["2025-03-01T10:00:00Z"], "temperatura": [], "umidade": []}"#;
    stub.state().raw_body("/series", ragged);
    assert_eq!(backend.fetch_series(20).await.unwrap_err().kind(), FailureKind::DataShape);
}

#[tokio::test]
async fn test_unreachable_backend_is_network_failure() {
    let backend = HttpBackend::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    assert_eq!(backend.probe().await.unwrap_err().kind(), FailureKind::Network);
}

#[tokio::test]
async fn test_chat_session_continuity_over_http() {
    let (stub, backend) = stub_with(&[20.0]).await;
    let backend = Arc::new(backend);
    let mut chat = ChatSession::new(backend.clone(), backend.base_url().clone(), "/export.csv");

    assert_eq!(chat.send("oi").await, SendOutcome::Answered);
    assert_eq!(chat.send("qual a temperatura?").await, SendOutcome::Answered);

    let requests = stub.state().chat_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].session_id, None);
    assert_eq!(requests[1].session_id.as_deref(), Some("sess-1"));
    assert_eq!(chat.transcript().last().unwrap().text, "Recebido: qual a temperatura?");
}

#[tokio::test]
async fn test_seed_request() {
    let (stub, backend) = stub_with(&[]).await;

    backend.seed(5, 10).await.unwrap();
    assert_eq!(stub.state().seeds(), vec![(5, 10)]);
    assert_eq!(backend.fetch_batch(20).await.unwrap().len(), 5);
}
