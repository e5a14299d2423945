use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use iris_core::testutil::MockRunner;
use iris_core::{DeliveryBridge, Poller, PollerConfig};
use iris_server::display::DisplayConsumer;
use iris_server::routes;
use iris_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";

pub struct TestApp {
    pub router: Router,
    pub poller: Poller<MockRunner>,
    pub runner: MockRunner,
    pub consumer_shutdown: CancellationToken,
}

impl TestApp {
    pub async fn get_json(&self, path: &str) -> (axum::http::StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Poll `path` until `check` accepts the body.
    pub async fn wait_for(&self, path: &str, check: impl Fn(&serde_json::Value) -> bool) -> serde_json::Value {
        for _ in 0..200 {
            let (_, json) = self.get_json(path).await;
            if check(&json) {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{path} never reached the expected state");
    }
}

/// App with an idle poller (no timer), a live display consumer, and auth enabled.
pub fn setup_test_app() -> TestApp {
    setup_test_app_with(MockRunner::new(), Some(TEST_API_KEY))
}

/// App whose manual trigger is disabled because no API key is configured.
pub fn setup_test_app_no_auth() -> TestApp {
    setup_test_app_with(MockRunner::new(), None)
}

pub fn setup_test_app_with(runner: MockRunner, api_key: Option<&str>) -> TestApp {
    let (tx, rx) = DeliveryBridge::channel(8);
    let (display, display_rx) = DisplayConsumer::new();
    let consumer_shutdown = CancellationToken::new();
    tokio::spawn(rx.run_until(display, consumer_shutdown.clone()));

    let poller = Poller::new(
        runner.clone(),
        PollerConfig::default().with_interval(Duration::from_secs(3600)),
        tx,
    );

    let state = Arc::new(AppState {
        poller: Arc::new(poller.clone()),
        display: display_rx,
        api_key: api_key.map(str::to_string),
    });

    TestApp {
        router: routes::router(state),
        poller,
        runner,
        consumer_shutdown,
    }
}
