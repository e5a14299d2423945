//! Hand-off of completed batches from worker tasks to a single consumer.
//!
//! Workers hold a [`DeliverySender`]; the consumer owns the matching
//! [`DeliveryReceiver`] and drives a [`BatchConsumer`] on its own execution
//! context, either an async task or a dedicated OS thread (e.g. a UI thread).
//! Consumer-owned state is only ever touched from that context.
//!
//! Deliveries arrive in the order they were sent. Once the consumer starts
//! shutting down, further deliveries are dropped without blocking or
//! erroring the worker.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::BatchResult;

/// Receives completed batches on the consumer's execution context.
pub trait BatchConsumer: Send {
    fn on_batch_delivered(&mut self, batch: BatchResult);
}

impl<F> BatchConsumer for F
where
    F: FnMut(BatchResult) + Send,
{
    fn on_batch_delivered(&mut self, batch: BatchResult) {
        self(batch)
    }
}

/// Constructor for a sender/receiver pair.
pub struct DeliveryBridge;

impl DeliveryBridge {
    /// Create a bridge buffering at most `capacity` undelivered batches.
    pub fn channel(capacity: usize) -> (DeliverySender, DeliveryReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (DeliverySender { tx }, DeliveryReceiver { rx })
    }
}

/// Worker side of the bridge.
#[derive(Clone, Debug)]
pub struct DeliverySender {
    tx: mpsc::Sender<BatchResult>,
}

impl DeliverySender {
    /// Hand a batch to the consumer.
    ///
    /// Waits for buffer space while the consumer is alive. Returns `false`
    /// when the consumer is gone or shutting down; the batch is dropped.
    pub async fn deliver(&self, batch: BatchResult) -> bool {
        match self.tx.send(batch).await {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Consumer is shutting down, dropping batch");
                false
            }
        }
    }
}

/// Consumer side of the bridge.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::Receiver<BatchResult>,
}

impl DeliveryReceiver {
    /// Next delivered batch, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<BatchResult> {
        self.rx.recv().await
    }

    /// Begin shutting down: senders fail fast from now on.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Drive `consumer` on the current task until every sender is dropped.
    pub async fn run<C: BatchConsumer>(mut self, mut consumer: C) -> C {
        while let Some(batch) = self.rx.recv().await {
            consumer.on_batch_delivered(batch);
        }
        consumer
    }

    /// Drive `consumer` on the current task until `shutdown` fires or every
    /// sender is dropped. Batches still buffered at shutdown are discarded.
    pub async fn run_until<C: BatchConsumer>(
        mut self,
        mut consumer: C,
        shutdown: CancellationToken,
    ) -> C {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                batch = self.rx.recv() => match batch {
                    Some(batch) => consumer.on_batch_delivered(batch),
                    None => return consumer,
                },
            }
        }
        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded batches buffered at shutdown");
        }
        consumer
    }

    /// Drive `consumer` on the calling OS thread until every sender is
    /// dropped. Must not be called from within an async runtime.
    pub fn run_blocking<C: BatchConsumer>(mut self, mut consumer: C) -> C {
        while let Some(batch) = self.rx.blocking_recv() {
            consumer.on_batch_delivered(batch);
        }
        consumer
    }
}
