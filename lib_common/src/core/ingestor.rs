//! The orchestrating ingestion entry point.
//!
//! Every accepted record, regardless of which transport delivered it, passes
//! through [`Ingestor::submit`] exactly once. The ingestor is the sole
//! mutator of the last-state slot and the history buffer; transports only
//! read them through [`Ingestor::current`] and [`Ingestor::tail`].
//!
//! One pipeline lock is held across the last-state update, the history push
//! and the broadcast, so an ingestion turn is atomic: concurrent submits from
//! different transports cannot interleave, and broadcast order, history order
//! and last-state order are always the same order. Lock order is pipeline
//! then dispatcher registry; the dispatcher never takes the pipeline lock.

use std::sync::{Arc, Mutex};

use crate::core::analyzer;
use crate::core::dispatcher::Dispatcher;
use crate::core::metrics::RelayMetrics;
use crate::core::model::EventRecord;
use crate::core::ring::RingBuffer;
use crate::core::spec::SpecStore;

/// The mutable per-process ingestion state, guarded as one unit.
struct Pipeline {
    last: Option<EventRecord>,
    history: RingBuffer<EventRecord>,
}

/// Owns the per-process ingestion state and drives the pipeline.
pub struct Ingestor {
    pipeline: Mutex<Pipeline>,
    specs: Arc<SpecStore>,
    metrics: Arc<RelayMetrics>,
    dispatcher: Arc<Dispatcher>,
}

impl Ingestor {
    /// Creates an ingestor with an empty history of the given capacity.
    pub fn new(
        capacity: usize,
        specs: Arc<SpecStore>,
        metrics: Arc<RelayMetrics>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            pipeline: Mutex::new(Pipeline {
                last: None,
                history: RingBuffer::new(capacity),
            }),
            specs,
            metrics,
            dispatcher,
        }
    }

    /// Ingests one already-validated record.
    ///
    /// Synchronous and infallible for a structurally valid record: the
    /// deviation verdict is attached when a spec entry exists (and omitted
    /// otherwise, which is not an error), the last-state slot and history are
    /// updated, the ingestion metrics are bumped, and the (possibly
    /// analysis-augmented) record is broadcast to every subscriber. The whole
    /// turn happens under the pipeline lock.
    pub fn submit(&self, mut record: EventRecord) {
        let table = self.specs.snapshot();
        record.analysis = analyzer::evaluate(&table, &record.topic, record.event, record.t_ms);

        let mut pipeline = self
            .pipeline
            .lock()
            .expect("Ingestor pipeline lock poisoned");
        pipeline.last = Some(record.clone());
        pipeline.history.push(record.clone());

        let event = record.event.as_str();
        let topic = record.topic.as_str();
        self.metrics
            .events_ingested
            .with_label_values(&[event, topic])
            .inc();
        self.metrics
            .last_event_timestamp
            .set(chrono::Utc::now().timestamp());
        self.metrics
            .last_t_ms
            .with_label_values(&[event])
            .set(record.t_ms);
        if let Some(v) = record.v_rms_g {
            self.metrics
                .last_v_rms
                .with_label_values(&[event, topic])
                .set(v);
        }
        if let Some(v) = record.v_peak_g {
            self.metrics
                .last_v_peak
                .with_label_values(&[event, topic])
                .set(v);
        }
        if let Some(analysis) = &record.analysis {
            self.metrics
                .deviation_ms
                .with_label_values(&[event, topic])
                .set(analysis.deviation_ms);
            if !analysis.in_spec {
                self.metrics
                    .out_of_spec
                    .with_label_values(&[event, topic])
                    .inc();
                tracing::warn!(
                    topic,
                    event,
                    deviation_ms = analysis.deviation_ms,
                    tolerance_ms = analysis.tolerance_ms,
                    "event out of spec"
                );
            }
        }

        // Still under the pipeline lock: the broadcast is part of the turn.
        self.dispatcher.publish(&record);
    }

    /// The most recently accepted record, analysis included, or `None` before
    /// the first ingestion.
    pub fn current(&self) -> Option<EventRecord> {
        self.pipeline
            .lock()
            .expect("Ingestor pipeline lock poisoned")
            .last
            .clone()
    }

    /// The most recent `min(limit, len)` records in ingestion order. The
    /// caller-facing surface is responsible for bounding `limit` to `[1, N]`.
    pub fn tail(&self, limit: usize) -> Vec<EventRecord> {
        self.pipeline
            .lock()
            .expect("Ingestor pipeline lock poisoned")
            .history
            .tail(limit)
    }

    /// Current history length.
    pub fn history_len(&self) -> usize {
        self.pipeline
            .lock()
            .expect("Ingestor pipeline lock poisoned")
            .history
            .len()
    }

    /// The history capacity `N`.
    pub fn capacity(&self) -> usize {
        self.pipeline
            .lock()
            .expect("Ingestor pipeline lock poisoned")
            .history
            .capacity()
    }
}
