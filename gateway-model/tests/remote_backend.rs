use gateway_model::backend::{GenerationParams, ModelBackend, RemoteBackend};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn successful_response_round_trips_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "output": "hello from upstream" })))
        .mount(&server)
        .await;

    let backend = RemoteBackend::new("remote-m1", server.uri(), Duration::from_secs(5));
    let out = backend.generate("hi", &GenerationParams::default()).await.unwrap();
    assert_eq!(out, "hello from upstream");
}

#[tokio::test]
async fn non_success_status_maps_to_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/generate")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let backend = RemoteBackend::new("remote-m1", server.uri(), Duration::from_secs(5));
    let err = backend.generate("hi", &GenerationParams::default()).await.unwrap_err();
    assert_eq!(err.code(), "upstream_error");
}

#[tokio::test]
async fn malformed_body_maps_to_upstream_bad_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let backend = RemoteBackend::new("remote-m1", server.uri(), Duration::from_secs(5));
    let err = backend.generate("hi", &GenerationParams::default()).await.unwrap_err();
    assert_eq!(err.code(), "upstream_bad_response");
}

#[tokio::test]
async fn unreachable_host_maps_to_upstream_unreachable() {
    // Port 0 on localhost never accepts a connection.
    let backend = RemoteBackend::new("remote-m1", "http://127.0.0.1:0", Duration::from_secs(2));
    let err = backend.generate("hi", &GenerationParams::default()).await.unwrap_err();
    assert_eq!(err.code(), "upstream_unreachable");
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let backend = RemoteBackend::new("remote-m1", server.uri(), Duration::from_millis(50));
    let err = backend.generate("hi", &GenerationParams::default()).await.unwrap_err();
    assert_eq!(err.code(), "upstream_timeout");
}

#[tokio::test]
async fn remote_backend_reports_always_loaded() {
    let server = MockServer::start().await;
    let backend = RemoteBackend::new("remote-m1", server.uri(), Duration::from_secs(5));
    assert!(backend.is_loaded());
    backend.ensure_loaded().await.unwrap();
    assert_eq!(backend.backend_name(), "remote-http");
}
