use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use iris_core::BatchResult;
use iris_core::testutil::{MockRunner, RunnerStep, test_record};

use crate::common::{
    TEST_API_KEY, TestApp, setup_test_app, setup_test_app_no_auth, setup_test_app_with,
};

async fn post_fetch(app: &TestApp, auth: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut request = Request::post("/v1/fetch");
    if let Some(token) = auth {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let response = app
        .router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or_default())
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app();

    let (status, json) = app.get_json("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["poller"], "idle");
}

#[tokio::test]
async fn health_reports_stopped_poller() {
    let app = setup_test_app();
    app.poller.stop();

    let (status, json) = app.get_json("/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["poller"], "stopped");
}

#[tokio::test]
async fn status_before_first_batch() {
    let app = setup_test_app();

    let (status, json) = app.get_json("/v1/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["phase"], "idle");
    assert_eq!(json["is_fetching"], false);
    assert!(json["last_fetch_time"].is_null());
    assert_eq!(json["status_line"], "Waiting for first batch");
}

#[tokio::test]
async fn records_empty_before_first_batch() {
    let app = setup_test_app();

    let (status, json) = app.get_json("/v1/records").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert!(json["updated_at"].is_null());
}

#[tokio::test]
async fn unauthenticated_fetch_returns_401() {
    let app = setup_test_app();

    let (status, _) = post_fetch(&app, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.runner.calls(), 0);
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app();

    let (status, json) = post_fetch(&app, Some("wrong-key")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn no_api_key_configured_returns_403() {
    let app = setup_test_app_no_auth();

    let (status, json) = post_fetch(&app, Some("any-token")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
}

#[tokio::test]
async fn manual_fetch_updates_dashboard() {
    let runner = MockRunner::with_steps(vec![RunnerStep::Batch(BatchResult::completed(
        vec![test_record("USD"), test_record("JPY")],
        vec![],
    ))]);
    let app = setup_test_app_with(runner, Some(TEST_API_KEY));

    let (status, json) = post_fetch(&app, Some(TEST_API_KEY)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["started"], true);

    let records = app.wait_for("/v1/records", |j| j["count"] == 2).await;
    assert_eq!(records["records"][0]["name"], "USD");
    assert!(!records["updated_at"].is_null());

    let status = app
        .wait_for("/v1/status", |j| j["is_fetching"] == false)
        .await;
    assert_eq!(status["last_success"], true);
    assert_eq!(status["last_count"], 2);
    assert!(!status["last_fetch_time"].is_null());
    assert!(status["status_line"].as_str().unwrap().starts_with("Updated 2 records"));
}

#[tokio::test]
async fn fetch_while_in_flight_is_noop() {
    let app = setup_test_app_with(MockRunner::new().gated(), Some(TEST_API_KEY));

    let (first, _) = post_fetch(&app, Some(TEST_API_KEY)).await;
    assert_eq!(first, StatusCode::ACCEPTED);

    let (second, json) = post_fetch(&app, Some(TEST_API_KEY)).await;
    assert_eq!(second, StatusCode::OK);
    assert_eq!(json["started"], false);

    let (_, status) = app.get_json("/v1/status").await;
    assert_eq!(status["is_fetching"], true);

    app.runner.release(1);
    app.wait_for("/v1/status", |j| j["is_fetching"] == false).await;
    assert_eq!(app.runner.calls(), 1);
}

#[tokio::test]
async fn failed_batch_keeps_previous_records() {
    let runner = MockRunner::with_steps(vec![
        RunnerStep::Batch(BatchResult::completed(vec![test_record("USD")], vec![])),
        RunnerStep::Batch(BatchResult::failed("browser unavailable")),
    ]);
    let app = setup_test_app_with(runner, Some(TEST_API_KEY));

    post_fetch(&app, Some(TEST_API_KEY)).await;
    app.wait_for("/v1/records", |j| j["count"] == 1).await;
    app.wait_for("/v1/status", |j| j["is_fetching"] == false).await;

    post_fetch(&app, Some(TEST_API_KEY)).await;
    let status = app
        .wait_for("/v1/status", |j| j["last_success"] == false)
        .await;
    assert_eq!(status["last_error"], "browser unavailable");

    let (_, records) = app.get_json("/v1/records").await;
    assert_eq!(records["count"], 1);
}

#[tokio::test]
async fn fetch_after_stop_returns_503() {
    let app = setup_test_app();
    app.poller.stop();

    let (status, json) = post_fetch(&app, Some(TEST_API_KEY)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "unavailable");
    assert_eq!(app.runner.calls(), 0);
}

#[tokio::test]
async fn closed_display_does_not_block_fetches() {
    let app = setup_test_app();
    app.consumer_shutdown.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (status, _) = post_fetch(&app, Some(TEST_API_KEY)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    app.wait_for("/v1/status", |j| j["is_fetching"] == false && j["last_success"] == true)
        .await;
    let (_, records) = app.get_json("/v1/records").await;
    assert_eq!(records["count"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app();

    let (status, json) = app.get_json("/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/v1/fetch"].is_object());
    assert!(json["paths"]["/v1/records"].is_object());
}
