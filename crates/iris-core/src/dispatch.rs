use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};

use crate::error::AppError;
use crate::fetch::TargetFetcher;
use crate::models::{FetchOutcome, Target};
use crate::schema::ExtractionSchema;
use crate::traits::{Extractor, Fetcher};

/// Fans a batch of targets out to concurrent fetch tasks, never running
/// more than `concurrency_limit` of them at once.
///
/// A permit is taken before each task is spawned, so the next pending target
/// starts as soon as any running fetch releases its slot.
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    concurrency_limit: usize,
}

impl Dispatcher {
    pub fn new(concurrency_limit: usize) -> Result<Self, AppError> {
        if concurrency_limit == 0 {
            return Err(AppError::ConfigError(
                "Concurrency limit must be at least 1".into(),
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
        })
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Fetch every target and return exactly one outcome per target, in
    /// completion order.
    ///
    /// Per-target failures (including a panicking fetch task) come back as
    /// failed outcomes. Only a failure of the permit pool itself is returned
    /// as an error.
    pub async fn dispatch<F, E>(
        &self,
        fetcher: &TargetFetcher<F, E>,
        targets: Vec<Target>,
        schema: Arc<ExtractionSchema>,
    ) -> Result<Vec<FetchOutcome>, AppError>
    where
        F: Fetcher,
        E: Extractor,
    {
        let total = targets.len();
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<Id, (usize, Target)> = HashMap::with_capacity(total);

        for (index, target) in targets.into_iter().enumerate() {
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|e| AppError::Dispatch(format!("Semaphore error: {e}")))?;

            let fetcher = fetcher.clone();
            let schema = Arc::clone(&schema);
            let task_target = target.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                fetcher.fetch(index, task_target, &schema).await
            });
            in_flight.insert(handle.id(), (index, target));
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    in_flight.remove(&id);
                    outcomes.push(outcome);
                }
                Err(join_err) => {
                    if let Some((index, target)) = in_flight.remove(&join_err.id()) {
                        tracing::error!(
                            source = %target,
                            error = %join_err,
                            "Fetch task aborted"
                        );
                        outcomes.push(FetchOutcome::failure(
                            index,
                            target,
                            format!("Fetch task aborted: {join_err}"),
                        ));
                    }
                }
            }
        }

        tracing::debug!(
            total,
            failed = outcomes.iter().filter(|o| !o.succeeded()).count(),
            "Dispatch finished"
        );

        Ok(outcomes)
    }
}
