use std::borrow::Cow;

use crate::error::AppError;
use crate::models::{FetchOutcome, Record, Target};
use crate::schema::ExtractionSchema;
use crate::traits::{Extractor, Fetcher};

/// Runs fetch → extract for a single target and captures every failure
/// into the returned [`FetchOutcome`].
///
/// Generic over the fetcher and extractor so the dispatcher can be exercised
/// without real HTTP.
#[derive(Clone)]
pub struct TargetFetcher<F, E>
where
    F: Fetcher,
    E: Extractor,
{
    fetcher: F,
    extractor: E,
}

impl<F, E> TargetFetcher<F, E>
where
    F: Fetcher,
    E: Extractor,
{
    pub fn new(fetcher: F, extractor: E) -> Self {
        Self { fetcher, extractor }
    }

    /// Check the acquisition channel before a batch.
    pub async fn connect(&self) -> Result<(), AppError> {
        self.fetcher.connect().await
    }

    /// Fetch and extract one target. Never fails: errors become a failed outcome.
    pub async fn fetch(
        &self,
        index: usize,
        target: Target,
        schema: &ExtractionSchema,
    ) -> FetchOutcome {
        match self.try_fetch(&target, schema).await {
            Ok(records) => {
                tracing::debug!(source = %target, count = records.len(), "Target fetched");
                FetchOutcome::success(index, target, records)
            }
            Err(e) => {
                tracing::debug!(source = %target, error = %e, "Target failed");
                FetchOutcome::failure(index, target, e.to_string())
            }
        }
    }

    async fn try_fetch(
        &self,
        target: &Target,
        schema: &ExtractionSchema,
    ) -> Result<Vec<Record>, AppError> {
        let document: Cow<'_, str> = match target {
            Target::Url(url) => {
                let html = self.fetcher.fetch(url).await?;
                tracing::debug!("Fetched {} bytes from {}", html.len(), url);
                Cow::Owned(html)
            }
            Target::Raw { html, .. } => Cow::Borrowed(html),
        };

        self.extractor.extract(&document, schema)
    }
}
