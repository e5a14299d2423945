pub mod acquisition;
pub mod aggregate;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod models;
pub mod poller;
pub mod schema;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use acquisition::{Acquisition, TargetSource};
pub use aggregate::Aggregator;
pub use bridge::{BatchConsumer, DeliveryBridge, DeliveryReceiver, DeliverySender};
pub use config::PollerConfig;
pub use dispatch::Dispatcher;
pub use error::AppError;
pub use fetch::TargetFetcher;
pub use models::{BatchResult, FetchOutcome, PollerState, Record, Target, TargetFailure};
pub use poller::{Poller, PollerEvent, PollerPhase, PollerReporter, TracingPollerReporter, Trigger};
pub use schema::{ExtractionSchema, FieldKind, FieldSpec};
pub use traits::{BatchRunner, Extractor, Fetcher, NullSink, RecordSink};
