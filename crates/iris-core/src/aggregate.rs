use crate::models::{BatchResult, FetchOutcome, TargetFailure};
use crate::traits::{NullSink, RecordSink};

/// Folds per-target outcomes into one [`BatchResult`] and hands successful
/// batches to the persistence sink, if one is configured.
pub struct Aggregator<S: RecordSink = NullSink> {
    sink: Option<S>,
    label: String,
}

impl Aggregator<NullSink> {
    /// Create an aggregator without persistence.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            sink: None,
            label: label.into(),
        }
    }
}

impl<S: RecordSink> Aggregator<S> {
    /// Create an aggregator that persists every non-empty successful batch.
    pub fn with_sink(label: impl Into<String>, sink: S) -> Self {
        Self {
            sink: Some(sink),
            label: label.into(),
        }
    }

    /// Build the batch result for `expected` targets.
    ///
    /// Records keep the input order of their targets regardless of the order
    /// outcomes completed in. Zero outcomes for a non-empty target set means
    /// the fan-out never ran and is reported as a failed batch. A persistence
    /// failure is logged and does not affect `success`.
    pub async fn aggregate(
        &self,
        expected: usize,
        mut outcomes: Vec<FetchOutcome>,
    ) -> BatchResult {
        if expected > 0 && outcomes.is_empty() {
            tracing::error!(expected, "No outcomes produced for a non-empty target set");
            return BatchResult::failed(format!(
                "Dispatcher produced no outcomes for {expected} targets"
            ));
        }

        outcomes.sort_by_key(|o| o.index);

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.error {
                None => records.extend(outcome.records),
                Some(error) => {
                    tracing::warn!(source = %outcome.target, %error, "Target failed");
                    failures.push(TargetFailure {
                        target: outcome.target.label().to_string(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            count = records.len(),
            failed = failures.len(),
            "Batch aggregated"
        );

        let batch = BatchResult::completed(records, failures);
        if batch.records().is_empty() {
            return batch;
        }

        match &self.sink {
            Some(sink) => match sink.persist(&self.label, batch.records()).await {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "Batch saved");
                    batch.with_saved_to(path)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to persist batch");
                    batch
                }
            },
            None => batch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::Target;
    use crate::testutil::*;

    fn ok(index: usize, name: &str) -> FetchOutcome {
        FetchOutcome::success(
            index,
            Target::url(format!("https://example.com/{name}")),
            vec![test_record(name)],
        )
    }

    fn failed(index: usize, name: &str, error: &str) -> FetchOutcome {
        FetchOutcome::failure(index, Target::url(format!("https://example.com/{name}")), error)
    }

    fn names(batch: &BatchResult) -> Vec<String> {
        batch
            .records()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn partial_failure_keeps_success_and_input_order() {
        let aggregator = Aggregator::new("stocks");
        // C completes before A; B failed.
        let outcomes = vec![ok(2, "C"), failed(1, "B", "timeout"), ok(0, "A")];

        let batch = aggregator.aggregate(3, outcomes).await;

        assert!(batch.success());
        assert_eq!(batch.count(), 2);
        assert_eq!(names(&batch), vec!["A", "C"]);
        assert!(batch.error().is_none());
        assert_eq!(batch.failures().len(), 1);
        assert_eq!(batch.failures()[0].target, "https://example.com/B");
        assert_eq!(batch.failures()[0].error, "timeout");
    }

    #[tokio::test]
    async fn all_failed_is_empty_success() {
        let aggregator = Aggregator::new("stocks");
        let outcomes = vec![failed(0, "A", "timeout"), failed(1, "B", "HTTP 500")];

        let batch = aggregator.aggregate(2, outcomes).await;

        assert!(batch.success());
        assert_eq!(batch.count(), 0);
        assert!(batch.records().is_empty());
        assert_eq!(batch.failures().len(), 2);
    }

    #[tokio::test]
    async fn missing_outcomes_is_channel_failure() {
        let aggregator = Aggregator::new("stocks");

        let batch = aggregator.aggregate(3, vec![]).await;

        assert!(!batch.success());
        assert_eq!(batch.count(), 0);
        assert!(batch.error().unwrap().contains("no outcomes"));
    }

    #[tokio::test]
    async fn empty_target_set_is_empty_success() {
        let aggregator = Aggregator::new("stocks");
        let batch = aggregator.aggregate(0, vec![]).await;
        assert!(batch.success());
        assert_eq!(batch.count(), 0);
    }

    #[tokio::test]
    async fn multi_record_outcomes_are_flattened() {
        let aggregator = Aggregator::new("rates");
        let outcome = FetchOutcome::success(
            0,
            Target::url("https://example.com/rates"),
            vec![test_record("USD"), test_record("JPY"), test_record("EUR")],
        );

        let batch = aggregator.aggregate(1, vec![outcome]).await;

        assert_eq!(batch.count(), 3);
        assert_eq!(batch.count(), batch.records().len());
        assert_eq!(names(&batch), vec!["USD", "JPY", "EUR"]);
    }

    #[tokio::test]
    async fn successful_batch_is_persisted() {
        let sink = MockSink::new();
        let aggregator = Aggregator::with_sink("rates", sink.clone());

        let batch = aggregator.aggregate(2, vec![ok(0, "A"), ok(1, "B")]).await;

        assert!(batch.saved_to().is_some());
        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "rates");
        assert_eq!(saved[0].1.len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_not_persisted() {
        let sink = MockSink::new();
        let aggregator = Aggregator::with_sink("rates", sink.clone());

        let batch = aggregator.aggregate(1, vec![failed(0, "A", "timeout")]).await;

        assert!(batch.success());
        assert!(batch.saved_to().is_none());
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_does_not_fail_batch() {
        let sink = MockSink::with_error(AppError::PersistenceError("disk full".into()));
        let aggregator = Aggregator::with_sink("rates", sink);

        let batch = aggregator.aggregate(1, vec![ok(0, "A")]).await;

        assert!(batch.success());
        assert_eq!(batch.count(), 1);
        assert!(batch.saved_to().is_none());
    }
}
