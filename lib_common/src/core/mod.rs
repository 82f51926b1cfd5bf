//! # Core Engine Module
//!
//! This module forms the heart of the `presstream` telemetry relay. It
//! aggregates every component an event record passes through on its way from
//! arrival to fan-out, independent of which transport delivered it.
//!
//! ## Core Components:
//!
//! - **`model`**: The typed event record, its analysis verdict, and the
//!   validation boundary that turns raw JSON into a record the pipeline
//!   trusts.
//!
//! - **`ring`**: A fixed-capacity, oldest-evicted-first ring buffer that
//!   retains the most recent records in ingestion order.
//!
//! - **`spec`**: The ideal-timing specification table, loaded from a JSON
//!   document at startup and replaceable atomically as a whole at runtime.
//!
//! - **`analyzer`**: A pure deviation check of an observed timing against the
//!   spec table.
//!
//! - **`metrics`**: The Prometheus registry updated as a side effect of
//!   ingestion and connection lifecycle events.
//!
//! - **`dispatcher`**: The subscriber registry and broadcaster. Serializes
//!   each record once and delivers it to every connected observer, and tracks
//!   per-subscriber liveness so unresponsive connections can be evicted.
//!
//! - **`ingestor`**: The orchestrating entry point that ties the above
//!   together; it is the sole mutator of the last-state slot and the history
//!   buffer.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Pure deviation evaluation against the spec table.
pub mod analyzer;
/// The subscriber registry, broadcaster and liveness tracking.
pub mod dispatcher;
/// The orchestrating ingestion entry point.
pub mod ingestor;
/// Prometheus counters and gauges for the relay.
pub mod metrics;
/// Event record types and the validation boundary.
pub mod model;
/// Fixed-capacity, insertion-ordered history buffer.
pub mod ring;
/// The ideal-timing specification table and its persistence.
pub mod spec;

// --- Public API Re-exports ---
pub use analyzer::evaluate;
pub use dispatcher::{Dispatcher, Frame};
pub use ingestor::Ingestor;
pub use metrics::RelayMetrics;
pub use model::{Analysis, EventRecord, StrokeEvent, ValidationError, ValidationMode};
pub use ring::RingBuffer;
pub use spec::{SpecEntry, SpecStore, SpecTable};
