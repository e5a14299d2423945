use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One extracted row: field name to value, in schema order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One thing to fetch in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "lowercase")]
pub enum Target {
    /// A page to download before extraction.
    Url(String),
    /// An already available document, extracted as-is.
    Raw { label: String, html: String },
}

impl Target {
    pub fn url(url: impl Into<String>) -> Self {
        Target::Url(url.into())
    }

    pub fn raw(label: impl Into<String>, html: impl Into<String>) -> Self {
        Target::Raw {
            label: label.into(),
            html: html.into(),
        }
    }

    /// Short human-readable name used in logs and failure summaries.
    pub fn label(&self) -> &str {
        match self {
            Target::Url(url) => url,
            Target::Raw { label, .. } => label,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Url(url) => write!(f, "{url}"),
            Target::Raw { label, .. } => write!(f, "raw://{label}"),
        }
    }
}

/// Result of one fetch attempt against one target.
///
/// Produced exactly once per target per batch by
/// [`TargetFetcher`](crate::fetch::TargetFetcher) and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub(crate) index: usize,
    pub(crate) target: Target,
    pub(crate) records: Vec<Record>,
    pub(crate) error: Option<String>,
}

impl FetchOutcome {
    pub fn success(index: usize, target: Target, records: Vec<Record>) -> Self {
        Self {
            index,
            target,
            records,
            error: None,
        }
    }

    pub fn failure(index: usize, target: Target, error: impl Into<String>) -> Self {
        Self {
            index,
            target,
            records: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Position of the target in the batch input.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// A target that failed within an otherwise working batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Outcome of one whole batch.
///
/// `success` is false only when the acquisition channel itself failed;
/// individual target failures show up as fewer records and in `failures`.
/// `count` always equals `records.len()`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    success: bool,
    records: Vec<Record>,
    count: usize,
    timestamp: DateTime<Utc>,
    error: Option<String>,
    failures: Vec<TargetFailure>,
    saved_to: Option<PathBuf>,
}

impl BatchResult {
    /// A batch whose channel worked, with whatever records the targets yielded.
    pub fn completed(records: Vec<Record>, failures: Vec<TargetFailure>) -> Self {
        Self {
            success: true,
            count: records.len(),
            records,
            timestamp: Utc::now(),
            error: None,
            failures,
            saved_to: None,
        }
    }

    /// A batch that could not run at all.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            records: Vec::new(),
            count: 0,
            timestamp: Utc::now(),
            error: Some(error.into()),
            failures: Vec::new(),
            saved_to: None,
        }
    }

    pub(crate) fn with_saved_to(mut self, path: PathBuf) -> Self {
        self.saved_to = Some(path);
        self
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failures(&self) -> &[TargetFailure] {
        &self.failures
    }

    /// Where the persistence sink wrote this batch, if it did.
    pub fn saved_to(&self) -> Option<&Path> {
        self.saved_to.as_deref()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Snapshot of a poller's state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerState {
    pub running: bool,
    pub is_fetching: bool,
    /// Completion time of the last batch with `success == true`.
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_batch: Option<BatchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> Record {
        let mut r = Record::new();
        r.insert("name".into(), serde_json::Value::String(name.into()));
        r
    }

    #[test]
    fn completed_batch_counts_records() {
        let batch = BatchResult::completed(vec![record("USD"), record("JPY")], vec![]);
        assert!(batch.success());
        assert_eq!(batch.count(), 2);
        assert_eq!(batch.count(), batch.records().len());
        assert!(batch.error().is_none());
        assert!(batch.saved_to().is_none());
    }

    #[test]
    fn failed_batch_is_empty() {
        let batch = BatchResult::failed("connection refused");
        assert!(!batch.success());
        assert_eq!(batch.count(), 0);
        assert!(batch.records().is_empty());
        assert_eq!(batch.error(), Some("connection refused"));
    }

    #[test]
    fn outcome_success_flag_follows_error() {
        let ok = FetchOutcome::success(0, Target::url("https://a"), vec![record("A")]);
        let bad = FetchOutcome::failure(1, Target::url("https://b"), "timeout");
        assert!(ok.succeeded());
        assert!(!bad.succeeded());
        assert!(bad.records().is_empty());
        assert_eq!(bad.error(), Some("timeout"));
    }

    #[test]
    fn target_labels() {
        assert_eq!(Target::url("https://example.com").label(), "https://example.com");
        let raw = Target::raw("fixture", "<html></html>");
        assert_eq!(raw.label(), "fixture");
        assert_eq!(raw.to_string(), "raw://fixture");
    }

    #[test]
    fn batch_serializes_with_count() {
        let batch = BatchResult::completed(vec![record("USD")], vec![]);
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 1);
        assert_eq!(json["records"][0]["name"], "USD");
        assert!(json["error"].is_null());
    }
}
