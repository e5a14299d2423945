use std::future::Future;
use std::path::PathBuf;

use crate::error::AppError;
use crate::models::{BatchResult, Record};
use crate::schema::ExtractionSchema;

/// Downloads raw documents for URL targets.
///
/// Clones share the underlying client/session and are handed to concurrent
/// fetch tasks, so implementations must be safe to call concurrently.
pub trait Fetcher: Send + Sync + Clone + 'static {
    /// Make sure the acquisition channel is usable for the coming batch.
    ///
    /// A failure here fails the whole batch rather than each target.
    fn connect(&self) -> impl Future<Output = Result<(), AppError>> + Send {
        async { Ok(()) }
    }

    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns a raw document into records according to a field schema.
pub trait Extractor: Send + Sync + Clone + 'static {
    fn extract(&self, document: &str, schema: &ExtractionSchema)
    -> Result<Vec<Record>, AppError>;
}

/// Persists the records of a successful batch.
pub trait RecordSink: Send + Sync + Clone + 'static {
    /// Write `records` under a name derived from `label`. Returns where they went.
    fn persist(
        &self,
        label: &str,
        records: &[Record],
    ) -> impl Future<Output = Result<PathBuf, AppError>> + Send;
}

/// Produces one complete batch per call. Driven by the poller.
pub trait BatchRunner: Send + Sync + 'static {
    /// Run one batch.
    ///
    /// `Err` means the batch could not be attempted at all (e.g. the target
    /// list could not be loaded); channel and per-target failures are
    /// reported inside the returned [`BatchResult`].
    fn run_batch(&self) -> impl Future<Output = Result<BatchResult, AppError>> + Send;
}

/// A no-op RecordSink for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullSink;

impl RecordSink for NullSink {
    async fn persist(&self, _label: &str, _records: &[Record]) -> Result<PathBuf, AppError> {
        Ok(PathBuf::new())
    }
}
