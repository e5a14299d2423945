use std::sync::Arc;

use tokio::sync::watch;

use iris_core::models::PollerState;
use iris_core::poller::{Poller, PollerPhase};
use iris_core::traits::BatchRunner;

use crate::display::DisplaySnapshot;

/// The poller operations route handlers need, independent of the runner type.
pub trait PollerControl: Send + Sync {
    fn state(&self) -> PollerState;
    fn phase(&self) -> PollerPhase;
    fn trigger_manual_fetch(&self) -> bool;
}

impl<R: BatchRunner> PollerControl for Poller<R> {
    fn state(&self) -> PollerState {
        Poller::state(self)
    }

    fn phase(&self) -> PollerPhase {
        Poller::phase(self)
    }

    fn trigger_manual_fetch(&self) -> bool {
        Poller::trigger_manual_fetch(self)
    }
}

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub poller: Arc<dyn PollerControl>,
    /// Latest snapshot published by the display consumer.
    pub display: watch::Receiver<DisplaySnapshot>,
    /// API key for the manual trigger (None = trigger disabled).
    pub api_key: Option<String>,
}
