use chrono::{DateTime, Local, Utc};
use tokio::sync::watch;

use iris_core::bridge::BatchConsumer;
use iris_core::models::{BatchResult, Record};

/// What the dashboard currently shows.
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    pub status_line: String,
    /// Completion time of the batch the records came from.
    pub updated_at: Option<DateTime<Utc>>,
    pub records: Vec<Record>,
    pub last_success: Option<bool>,
    pub last_error: Option<String>,
    pub batches_seen: u64,
}

impl Default for DisplaySnapshot {
    fn default() -> Self {
        Self {
            status_line: "Waiting for first batch".to_string(),
            updated_at: None,
            records: Vec::new(),
            last_success: None,
            last_error: None,
            batches_seen: 0,
        }
    }
}

/// Consumer that owns the dashboard snapshot and publishes every change.
///
/// A failed batch updates the status line but keeps the records of the last
/// successful one on display.
pub struct DisplayConsumer {
    snapshot: watch::Sender<DisplaySnapshot>,
}

impl DisplayConsumer {
    pub fn new() -> (Self, watch::Receiver<DisplaySnapshot>) {
        let (tx, rx) = watch::channel(DisplaySnapshot::default());
        (Self { snapshot: tx }, rx)
    }
}

impl BatchConsumer for DisplayConsumer {
    fn on_batch_delivered(&mut self, batch: BatchResult) {
        let time = batch.timestamp().with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");

        self.snapshot.send_modify(|snapshot| {
            snapshot.batches_seen += 1;
            snapshot.last_success = Some(batch.success());
            if batch.success() {
                snapshot.status_line = format!("Updated {} records at {time}", batch.count());
                snapshot.updated_at = Some(batch.timestamp());
                snapshot.last_error = None;
                snapshot.records = batch.into_records();
            } else {
                let error = batch.error().unwrap_or("unknown error").to_string();
                snapshot.status_line = format!("Fetch failed at {time}: {error}");
                snapshot.last_error = Some(error);
            }
        });
    }
}
