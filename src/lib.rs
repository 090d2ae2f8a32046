//! Per-stream request aggregation processor for an application-telemetry ingest pipeline.
//!
//! A [`processor::Processor`] is one instance per (stream, database-name) pair. It normalizes
//! incoming request/exception/timing records, folds them into the aggregation maps in
//! [`store::AggregationStore`], decides which raw records are worth forwarding downstream, and
//! hands those to an [`stream::OutboundQueue`]. See `SPEC_FULL.md` for the full specification
//! this crate implements.

pub mod buckets;
pub mod config;
pub mod error;
pub mod frontend;
pub mod increments;
pub mod metrics;
pub mod normalize;
pub mod processor;
pub mod sampling;
pub mod store;
pub mod stream;
pub mod telemetry;
pub mod tracker;

pub use error::{ConfigError, FeMsgDropReason};
pub use increments::Increment;
pub use processor::{Processor, ProcessorDeps};
pub use store::AggregationStore;
pub use stream::{MessageKind, OutboundMessage, OutboundQueue, StreamInfo};
pub use tracker::RequestTracker;
