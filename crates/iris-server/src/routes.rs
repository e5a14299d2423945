use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use iris_core::error::AppError;
use iris_core::poller::PollerPhase;

use crate::auth::require_api_key;
use crate::dto::{FetchResponse, HealthResponse, RecordsResponse, StatusResponse, phase_name};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/fetch", post(trigger_fetch))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/records", get(records))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(protected).with_state(state)
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/status",
    responses(
        (status = 200, description = "Poller state and status line", body = StatusResponse),
    ),
    tag = "dashboard"
)]
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let display = state.display.borrow().clone();
    axum::Json(StatusResponse::new(
        state.poller.phase(),
        state.poller.state(),
        &display,
    ))
}

#[utoipa::path(
    get,
    path = "/v1/records",
    responses(
        (status = 200, description = "Records of the last successful batch", body = RecordsResponse),
    ),
    tag = "dashboard"
)]
pub async fn records(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RecordsResponse::from(&*state.display.borrow());
    axum::Json(response)
}

#[utoipa::path(
    post,
    path = "/v1/fetch",
    responses(
        (status = 202, description = "Batch started", body = FetchResponse),
        (status = 200, description = "A batch is already in flight; nothing queued", body = FetchResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Manual trigger disabled"),
        (status = 503, description = "Poller stopped", body = crate::dto::ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "dashboard"
)]
pub async fn trigger_fetch(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    if state.poller.phase() == PollerPhase::Stopped {
        return Err(AppError::Dispatch("Poller has been stopped".into()).into());
    }

    let started = state.poller.trigger_manual_fetch();
    let status = if started {
        tracing::info!("Manual fetch started");
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };

    Ok((status, axum::Json(FetchResponse { started })))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Poller is alive", body = HealthResponse),
        (status = 503, description = "Poller has stopped", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let phase = state.poller.phase();
    let (status, label) = match phase {
        PollerPhase::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        PollerPhase::Idle | PollerPhase::Running => (StatusCode::OK, "healthy"),
    };

    let response = HealthResponse {
        status: label,
        poller: phase_name(phase),
    };

    (status, axum::Json(response))
}
