use chrono::{DateTime, Utc};
use serde::Serialize;

use iris_core::models::PollerState;
use iris_core::poller::PollerPhase;

use crate::display::DisplaySnapshot;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    /// One of `idle`, `running`, `stopped`.
    pub phase: String,
    pub running: bool,
    pub is_fetching: bool,
    /// Completion time of the last successful batch.
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_success: Option<bool>,
    pub last_count: Option<usize>,
    pub last_error: Option<String>,
    /// Human-readable line maintained by the display consumer.
    pub status_line: String,
}

impl StatusResponse {
    pub fn new(phase: PollerPhase, state: PollerState, display: &DisplaySnapshot) -> Self {
        let last = state.last_batch.as_ref();
        Self {
            phase: phase_name(phase).to_string(),
            running: state.running,
            is_fetching: state.is_fetching,
            last_fetch_time: state.last_fetch_time,
            last_success: last.map(|b| b.success()),
            last_count: last.map(|b| b.count()),
            last_error: last.and_then(|b| b.error().map(str::to_string)),
            status_line: display.status_line.clone(),
        }
    }
}

pub fn phase_name(phase: PollerPhase) -> &'static str {
    match phase {
        PollerPhase::Idle => "idle",
        PollerPhase::Running => "running",
        PollerPhase::Stopped => "stopped",
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecordsResponse {
    /// Completion time of the batch the records came from.
    pub updated_at: Option<DateTime<Utc>>,
    pub count: usize,
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl From<&DisplaySnapshot> for RecordsResponse {
    fn from(display: &DisplaySnapshot) -> Self {
        Self {
            updated_at: display.updated_at,
            count: display.records.len(),
            records: display.records.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Manual fetch
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FetchResponse {
    /// False when a batch was already in flight; nothing is queued.
    pub started: bool,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub poller: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
