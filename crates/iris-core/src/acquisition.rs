use std::path::PathBuf;
use std::sync::Arc;

use crate::aggregate::Aggregator;
use crate::dispatch::Dispatcher;
use crate::error::AppError;
use crate::fetch::TargetFetcher;
use crate::models::{BatchResult, Target};
use crate::schema::ExtractionSchema;
use crate::traits::{BatchRunner, Extractor, Fetcher, NullSink, RecordSink};

/// Where a batch's targets come from.
#[derive(Debug, Clone)]
pub enum TargetSource {
    /// Fixed at construction.
    Static(Vec<Target>),
    /// URL list re-read before every batch, one URL per line.
    /// Blank lines and lines starting with `#` are ignored.
    File(PathBuf),
}

impl TargetSource {
    /// Targets for `template` with `{}` replaced by each code, in code order.
    pub fn from_template(template: &str, codes: &[String]) -> Result<Self, AppError> {
        if !template.contains("{}") {
            return Err(AppError::ConfigError(format!(
                "URL template '{template}' has no '{{}}' placeholder"
            )));
        }
        Ok(TargetSource::Static(
            codes
                .iter()
                .map(|code| Target::url(template.replace("{}", code)))
                .collect(),
        ))
    }

    /// Resolve the current target list.
    pub async fn load(&self) -> Result<Vec<Target>, AppError> {
        match self {
            TargetSource::Static(targets) => Ok(targets.clone()),
            TargetSource::File(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AppError::ConfigError(format!(
                        "Failed to read target list {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(parse_target_list(&raw))
            }
        }
    }
}

fn parse_target_list(raw: &str) -> Vec<Target> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Target::url)
        .collect()
}

/// One acquisition cycle: load targets, check the channel, fan out,
/// aggregate and persist.
pub struct Acquisition<F, E, S = NullSink>
where
    F: Fetcher,
    E: Extractor,
    S: RecordSink,
{
    source: TargetSource,
    schema: Arc<ExtractionSchema>,
    fetcher: TargetFetcher<F, E>,
    dispatcher: Dispatcher,
    aggregator: Aggregator<S>,
}

impl<F, E> Acquisition<F, E, NullSink>
where
    F: Fetcher,
    E: Extractor,
{
    /// Create an acquisition without persistence.
    pub fn new(
        source: TargetSource,
        schema: ExtractionSchema,
        fetcher: F,
        extractor: E,
        concurrency_limit: usize,
    ) -> Result<Self, AppError> {
        let aggregator = Aggregator::new(schema.name.clone());
        Self::build(source, schema, fetcher, extractor, concurrency_limit, aggregator)
    }
}

impl<F, E, S> Acquisition<F, E, S>
where
    F: Fetcher,
    E: Extractor,
    S: RecordSink,
{
    /// Create an acquisition that persists every non-empty batch to `sink`,
    /// labelled with the schema name.
    pub fn with_sink(
        source: TargetSource,
        schema: ExtractionSchema,
        fetcher: F,
        extractor: E,
        sink: S,
        concurrency_limit: usize,
    ) -> Result<Self, AppError> {
        let aggregator = Aggregator::with_sink(schema.name.clone(), sink);
        Self::build(source, schema, fetcher, extractor, concurrency_limit, aggregator)
    }

    fn build(
        source: TargetSource,
        schema: ExtractionSchema,
        fetcher: F,
        extractor: E,
        concurrency_limit: usize,
        aggregator: Aggregator<S>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            source,
            schema: Arc::new(schema),
            fetcher: TargetFetcher::new(fetcher, extractor),
            dispatcher: Dispatcher::new(concurrency_limit)?,
            aggregator,
        })
    }

    pub fn schema(&self) -> &ExtractionSchema {
        &self.schema
    }
}

impl<F, E, S> BatchRunner for Acquisition<F, E, S>
where
    F: Fetcher,
    E: Extractor,
    S: RecordSink,
{
    async fn run_batch(&self) -> Result<BatchResult, AppError> {
        let targets = self.source.load().await?;
        let expected = targets.len();

        if let Err(e) = self.fetcher.connect().await {
            tracing::error!(error = %e, "Acquisition channel unavailable");
            return Ok(BatchResult::failed(format!(
                "Acquisition channel unavailable: {e}"
            )));
        }

        tracing::info!(
            targets = expected,
            limit = self.dispatcher.concurrency_limit(),
            schema = %self.schema.name,
            "Dispatching batch"
        );

        let outcomes = match self
            .dispatcher
            .dispatch(&self.fetcher, targets, Arc::clone(&self.schema))
            .await
        {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch failed");
                return Ok(BatchResult::failed(e.to_string()));
            }
        };

        Ok(self.aggregator.aggregate(expected, outcomes).await)
    }
}
