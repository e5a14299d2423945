//! Scheduled acquisition loop.
//!
//! A [`Poller`] owns one [`BatchRunner`] and runs it immediately on start and
//! then once per interval until stopped. At most one batch is in flight at
//! any time, whether it was started by the timer or by
//! [`Poller::trigger_manual_fetch`]. Every completed batch is handed to the
//! consumer through a [`DeliverySender`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::bridge::DeliverySender;
use crate::config::PollerConfig;
use crate::models::{BatchResult, PollerState};
use crate::traits::BatchRunner;

/// Lifecycle of a poller. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerPhase {
    Idle,
    Running,
    Stopped,
}

/// What started a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Timer => write!(f, "timer"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Events emitted by the poller for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PollerEvent<'a> {
    Started,
    BatchStarted {
        trigger: Trigger,
    },
    /// Another batch was already in flight.
    BatchSkipped {
        trigger: Trigger,
    },
    BatchCompleted {
        trigger: Trigger,
        success: bool,
        count: usize,
    },
    /// The runner could not produce a batch at all.
    BatchFailed {
        trigger: Trigger,
        error: &'a str,
    },
    Waiting {
        delay: Duration,
    },
    Stopped,
}

/// Trait for receiving poller events (decoupled logging).
pub trait PollerReporter: Send + Sync {
    fn report(&self, event: PollerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPollerReporter;

impl PollerReporter for TracingPollerReporter {
    fn report(&self, event: PollerEvent<'_>) {
        match event {
            PollerEvent::Started => {
                tracing::info!("Poller started");
            }
            PollerEvent::BatchStarted { trigger } => {
                tracing::info!(%trigger, "Batch started");
            }
            PollerEvent::BatchSkipped { trigger } => {
                tracing::info!(%trigger, "Batch already in flight, skipping");
            }
            PollerEvent::BatchCompleted {
                trigger,
                success,
                count,
            } => {
                if success {
                    tracing::info!(%trigger, count, "Batch completed");
                } else {
                    tracing::warn!(%trigger, "Batch completed without data");
                }
            }
            PollerEvent::BatchFailed { trigger, error } => {
                tracing::error!(%trigger, %error, "Batch failed");
            }
            PollerEvent::Waiting { delay } => {
                tracing::debug!(secs = delay.as_secs(), "Waiting for next batch");
            }
            PollerEvent::Stopped => {
                tracing::info!("Poller stopped");
            }
        }
    }
}

#[derive(Default)]
struct Snapshot {
    last_fetch_time: Option<DateTime<Utc>>,
    last_batch: Option<BatchResult>,
}

struct Inner<R: BatchRunner> {
    runner: R,
    config: PollerConfig,
    running: AtomicBool,
    is_fetching: AtomicBool,
    phase: Mutex<PollerPhase>,
    snapshot: Mutex<Snapshot>,
    cancel: CancellationToken,
    /// Tracks the loop and every manual batch so `stopped()` can wait for all of them.
    tasks: TaskTracker,
    delivery: DeliverySender,
    reporter: Arc<dyn PollerReporter>,
}

/// Runs batches on a fixed interval with single-flight protection.
///
/// Cloning yields another handle to the same poller.
pub struct Poller<R: BatchRunner> {
    inner: Arc<Inner<R>>,
}

impl<R: BatchRunner> Clone for Poller<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: BatchRunner> Poller<R> {
    /// Create an idle poller that logs through `tracing`.
    pub fn new(runner: R, config: PollerConfig, delivery: DeliverySender) -> Self {
        Self::with_reporter(runner, config, delivery, Arc::new(TracingPollerReporter))
    }

    pub fn with_reporter(
        runner: R,
        config: PollerConfig,
        delivery: DeliverySender,
        reporter: Arc<dyn PollerReporter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                config,
                running: AtomicBool::new(false),
                is_fetching: AtomicBool::new(false),
                phase: Mutex::new(PollerPhase::Idle),
                snapshot: Mutex::new(Snapshot::default()),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
                delivery,
                reporter,
            }),
        }
    }

    /// Start the loop on a new tokio task. Returns `false` if the poller
    /// was already started or has been stopped.
    pub fn start(&self) -> bool {
        let tracked = self.inner.tasks.token();
        if !self.inner.enter_running() {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _tracked = tracked;
            inner.run_loop().await;
        });
        true
    }

    /// Run the loop on the current task until stopped.
    ///
    /// Does nothing if the poller was already started or has been stopped.
    pub async fn run(&self) {
        let _tracked = self.inner.tasks.token();
        if self.inner.enter_running() {
            Arc::clone(&self.inner).run_loop().await;
        }
    }

    /// Stop the poller. Idempotent and callable from any context.
    ///
    /// An in-flight batch completes and is delivered; no new batch starts.
    pub fn stop(&self) {
        *self.inner.lock_phase() = PollerPhase::Stopped;
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.cancel.cancel();
        self.inner.tasks.close();
    }

    /// Wait until, after [`stop`](Self::stop), the loop has exited and every
    /// in-flight batch (timer or manual) has been delivered.
    pub async fn stopped(&self) {
        self.inner.tasks.wait().await;
    }

    /// Run one batch now, outside the timer.
    ///
    /// Returns `false` without queueing anything when a batch is already in
    /// flight or the poller has been stopped.
    pub fn trigger_manual_fetch(&self) -> bool {
        // Held until the batch is tracked, so a concurrent stop() cannot miss it.
        let phase = self.inner.lock_phase();
        if *phase == PollerPhase::Stopped {
            return false;
        }
        if !self.inner.try_begin_fetch() {
            self.inner
                .reporter
                .report(PollerEvent::BatchSkipped { trigger: Trigger::Manual });
            return false;
        }
        self.inner
            .tasks
            .spawn(Arc::clone(&self.inner).execute(Trigger::Manual));
        drop(phase);
        true
    }

    pub fn state(&self) -> PollerState {
        let snapshot = self.inner.lock_snapshot();
        PollerState {
            running: self.inner.running.load(Ordering::SeqCst),
            is_fetching: self.inner.is_fetching.load(Ordering::SeqCst),
            last_fetch_time: snapshot.last_fetch_time,
            last_batch: snapshot.last_batch.clone(),
        }
    }

    pub fn phase(&self) -> PollerPhase {
        *self.inner.lock_phase()
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.is_fetching.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }
}

impl<R: BatchRunner> Inner<R> {
    fn lock_phase(&self) -> MutexGuard<'_, PollerPhase> {
        self.phase.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned poller phase");
            poisoned.into_inner()
        })
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned poller snapshot");
            poisoned.into_inner()
        })
    }

    fn enter_running(&self) -> bool {
        let mut phase = self.lock_phase();
        if *phase != PollerPhase::Idle {
            return false;
        }
        *phase = PollerPhase::Running;
        self.running.store(true, Ordering::SeqCst);
        true
    }

    fn try_begin_fetch(&self) -> bool {
        self.is_fetching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn run_loop(self: Arc<Self>) {
        self.reporter.report(PollerEvent::Started);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let delay = if self.try_begin_fetch() {
                if Arc::clone(&self).execute(Trigger::Timer).await {
                    self.config.interval
                } else {
                    self.config.error_backoff
                }
            } else {
                self.reporter
                    .report(PollerEvent::BatchSkipped { trigger: Trigger::Timer });
                self.config.interval
            };

            self.reporter.report(PollerEvent::Waiting { delay });
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.reporter.report(PollerEvent::Stopped);
    }

    /// Run one batch. The caller must hold the `is_fetching` flag, which is
    /// released once the batch has been handed to the consumer.
    ///
    /// Returns `false` when the runner failed or panicked.
    async fn execute(self: Arc<Self>, trigger: Trigger) -> bool {
        self.reporter.report(PollerEvent::BatchStarted { trigger });

        let task_inner = Arc::clone(&self);
        let joined = tokio::spawn(async move { task_inner.runner.run_batch().await }).await;

        let (batch, runner_ok) = match joined {
            Ok(Ok(batch)) => {
                self.reporter.report(PollerEvent::BatchCompleted {
                    trigger,
                    success: batch.success(),
                    count: batch.count(),
                });
                (batch, true)
            }
            Ok(Err(e)) => {
                let error = e.to_string();
                self.reporter.report(PollerEvent::BatchFailed {
                    trigger,
                    error: &error,
                });
                (BatchResult::failed(error), false)
            }
            Err(join_err) => {
                let error = format!("Batch task aborted: {join_err}");
                self.reporter.report(PollerEvent::BatchFailed {
                    trigger,
                    error: &error,
                });
                (BatchResult::failed(error), false)
            }
        };

        {
            let mut snapshot = self.lock_snapshot();
            if batch.success() {
                snapshot.last_fetch_time = Some(batch.timestamp());
            }
            snapshot.last_batch = Some(batch.clone());
        }

        self.delivery.deliver(batch).await;
        self.is_fetching.store(false, Ordering::SeqCst);
        runner_ok
    }
}
