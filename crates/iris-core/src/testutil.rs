//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` or atomics for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::models::{BatchResult, Record};
use crate::poller::{PollerEvent, PollerReporter};
use crate::schema::{ExtractionSchema, FieldKind, FieldSpec};
use crate::traits::{BatchRunner, Extractor, Fetcher, RecordSink};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A record with a single `name` field.
pub fn test_record(name: &str) -> Record {
    let mut record = Record::new();
    record.insert("name".into(), serde_json::Value::String(name.into()));
    record
}

/// A one-field table schema: one record per `tr`, `name` from the first `td`.
pub fn test_schema() -> ExtractionSchema {
    ExtractionSchema {
        name: "test".into(),
        base_selector: "tr".into(),
        fields: vec![FieldSpec {
            name: "name".into(),
            selector: Some("td".into()),
            kind: FieldKind::Text,
            attribute: None,
            default: None,
            fields: vec![],
        }],
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
    /// When set, `connect` succeeds this many times, then fails with a
    /// network error carrying the message.
    connect_error: Option<(usize, String)>,
    connects: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fetched: Arc::new(Mutex::new(Vec::new())),
            connect_error: None,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the channel check fail on every batch.
    pub fn unreachable(self, reason: &str) -> Self {
        self.unreachable_after(0, reason)
    }

    /// Let the channel check pass `healthy` times, then fail on every batch.
    pub fn unreachable_after(mut self, healthy: usize, reason: &str) -> Self {
        self.connect_error = Some((healthy, reason.to_string()));
        self
    }

    /// URLs passed to `fetch`, in call order.
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn connect(&self) -> Result<(), AppError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.connect_error {
            Some((healthy, reason)) if attempt >= *healthy => {
                Err(AppError::NetworkError(reason.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// ProbeFetcher
// ---------------------------------------------------------------------------

/// Fetcher that sleeps per call and records the peak number of concurrent calls.
#[derive(Clone)]
pub struct ProbeFetcher {
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    fail_all: bool,
    panic_on: Option<String>,
}

impl ProbeFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            fail_all: false,
            panic_on: None,
        }
    }

    /// Every fetch returns an HTTP error after the delay.
    pub fn failing_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Fetching `url` panics.
    pub fn panicking_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    /// Highest number of fetches observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Fetcher for ProbeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        if self.panic_on.as_deref() == Some(url) {
            panic!("probe fetcher told to panic on {url}");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all {
            Err(AppError::HttpError("HTTP 503 Service Unavailable".into()))
        } else {
            Ok(format!("<html><body>{url}</body></html>"))
        }
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor that returns the same records for every document.
#[derive(Clone)]
pub struct MockExtractor {
    records: Vec<Record>,
    /// Returned once, on the next call.
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockExtractor {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_error(error: AppError) -> Self {
        Self {
            records: Vec::new(),
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Extractor for MockExtractor {
    fn extract(
        &self,
        _document: &str,
        _schema: &ExtractionSchema,
    ) -> Result<Vec<Record>, AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(self.records.clone())
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// In-memory sink recording every persisted batch.
#[derive(Clone, Default)]
pub struct MockSink {
    pub saved: Arc<Mutex<Vec<(String, Vec<Record>)>>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next persist call.
    pub fn with_error(error: AppError) -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl RecordSink for MockSink {
    async fn persist(&self, label: &str, records: &[Record]) -> Result<PathBuf, AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        self.saved
            .lock()
            .unwrap()
            .push((label.to_string(), records.to_vec()));
        Ok(PathBuf::from(format!("{label}.json")))
    }
}

// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

/// One scripted result of [`MockRunner::run_batch`].
pub enum RunnerStep {
    Batch(BatchResult),
    Fail(AppError),
    Panic,
}

/// Batch runner driven by a script of steps.
///
/// Once the script is exhausted every call returns a successful one-record
/// batch. A gated runner blocks each call until [`release`](Self::release)
/// hands it a permit.
#[derive(Clone)]
pub struct MockRunner {
    steps: Arc<Mutex<VecDeque<RunnerStep>>>,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self::with_steps(Vec::new())
    }

    pub fn with_steps(steps: Vec<RunnerStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    /// Hold every batch until released.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held batches complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Number of batches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BatchRunner for MockRunner {
    async fn run_batch(&self) -> Result<BatchResult, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(RunnerStep::Batch(batch)) => Ok(batch),
            Some(RunnerStep::Fail(e)) => Err(e),
            Some(RunnerStep::Panic) => panic!("scripted runner panic"),
            None => Ok(BatchResult::completed(vec![test_record("default")], vec![])),
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records the debug rendering of every event.
#[derive(Clone, Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events whose variant name is `kind`.
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.strip_prefix(kind)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', '{']))
            })
            .count()
    }
}

impl PollerReporter for MockReporter {
    fn report(&self, event: PollerEvent<'_>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}
