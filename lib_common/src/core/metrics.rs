//! Prometheus counters and gauges for the relay.
//!
//! Updated as a side effect of ingestion and connection lifecycle events and
//! rendered in text exposition format for the `/metrics` surface.
//!
//! **Counters:**
//! - `dt_events_ingested_total{event,topic}` — accepted records
//! - `dt_out_of_spec_total{event,topic}` — records with an out-of-spec verdict
//!
//! **Gauges:**
//! - `dt_active_subscribers` — currently registered observer connections
//! - `dt_last_event_timestamp_seconds` — unix timestamp of the last ingestion
//! - `dt_last_t_ms{event}` — latest observed timing per event
//! - `dt_last_v_rms_g{event,topic}` / `dt_last_v_peak_g{event,topic}` —
//!   latest vibration amplitudes
//! - `dt_deviation_ms{event,topic}` — latest deviation verdict
//! - `dt_target_t_ms{event,topic}` — configured targets, recomputed on every
//!   spec-table replacement

use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::core::spec::SpecTable;

/// All metric handles, registered on one private registry.
///
/// Updates are thread-safe via the atomics inside the prometheus crate.
#[derive(Clone)]
pub struct RelayMetrics {
    /// The backing registry; gathered by [`RelayMetrics::render`].
    pub registry: Registry,

    // Counters
    pub events_ingested: IntCounterVec,
    pub out_of_spec: IntCounterVec,

    // Gauges
    pub active_subscribers: IntGauge,
    pub last_event_timestamp: IntGauge,
    pub last_t_ms: GaugeVec,
    pub last_v_rms: GaugeVec,
    pub last_v_peak: GaugeVec,
    pub deviation_ms: GaugeVec,
    pub target_t_ms: GaugeVec,
}

impl RelayMetrics {
    /// Creates and registers every metric.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_ingested = IntCounterVec::new(
            Opts::new("dt_events_ingested_total", "Total ingested events"),
            &["event", "topic"],
        )?;
        registry.register(Box::new(events_ingested.clone()))?;

        let out_of_spec = IntCounterVec::new(
            Opts::new("dt_out_of_spec_total", "Events with a deviation beyond tolerance"),
            &["event", "topic"],
        )?;
        registry.register(Box::new(out_of_spec.clone()))?;

        let active_subscribers =
            IntGauge::new("dt_active_subscribers", "Currently connected subscribers")?;
        registry.register(Box::new(active_subscribers.clone()))?;

        let last_event_timestamp = IntGauge::new(
            "dt_last_event_timestamp_seconds",
            "Unix timestamp of the last ingested event",
        )?;
        registry.register(Box::new(last_event_timestamp.clone()))?;

        let last_t_ms = GaugeVec::new(
            Opts::new("dt_last_t_ms", "Latest t_ms observed per event"),
            &["event"],
        )?;
        registry.register(Box::new(last_t_ms.clone()))?;

        let last_v_rms = GaugeVec::new(
            Opts::new("dt_last_v_rms_g", "Latest RMS vibration amplitude (g)"),
            &["event", "topic"],
        )?;
        registry.register(Box::new(last_v_rms.clone()))?;

        let last_v_peak = GaugeVec::new(
            Opts::new("dt_last_v_peak_g", "Latest peak vibration amplitude (g)"),
            &["event", "topic"],
        )?;
        registry.register(Box::new(last_v_peak.clone()))?;

        let deviation_ms = GaugeVec::new(
            Opts::new("dt_deviation_ms", "Latest deviation from the ideal timing (ms)"),
            &["event", "topic"],
        )?;
        registry.register(Box::new(deviation_ms.clone()))?;

        let target_t_ms = GaugeVec::new(
            Opts::new("dt_target_t_ms", "Configured target timing (ms)"),
            &["event", "topic"],
        )?;
        registry.register(Box::new(target_t_ms.clone()))?;

        Ok(Self {
            registry,
            events_ingested,
            out_of_spec,
            active_subscribers,
            last_event_timestamp,
            last_t_ms,
            last_v_rms,
            last_v_peak,
            deviation_ms,
            target_t_ms,
        })
    }

    /// Recomputes the target gauges from a (new) spec table. Existing series
    /// are reset first so entries removed from the table disappear.
    pub fn set_targets(&self, table: &SpecTable) {
        self.target_t_ms.reset();
        for (topic, events) in table {
            for (event, entry) in events {
                self.target_t_ms
                    .with_label_values(&[event, topic])
                    .set(entry.t_ms);
            }
        }
    }

    /// Renders all metrics in Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::SpecEntry;
    use std::collections::HashMap;

    #[test]
    fn counters_and_gauges_appear_in_render() {
        let metrics = RelayMetrics::new().unwrap();

        metrics
            .events_ingested
            .with_label_values(&["top", "press-01"])
            .inc();
        metrics
            .events_ingested
            .with_label_values(&["top", "press-01"])
            .inc();
        metrics
            .out_of_spec
            .with_label_values(&["base", "press-01"])
            .inc();
        metrics.active_subscribers.set(3);
        metrics.last_t_ms.with_label_values(&["top"]).set(905.0);

        let output = metrics.render().unwrap();
        assert!(output.contains("dt_events_ingested_total{event=\"top\",topic=\"press-01\"} 2"));
        assert!(output.contains("dt_out_of_spec_total{event=\"base\",topic=\"press-01\"} 1"));
        assert!(output.contains("dt_active_subscribers 3"));
        assert!(output.contains("dt_last_t_ms{event=\"top\"} 905"));
    }

    #[test]
    fn render_is_valid_exposition_format() {
        let metrics = RelayMetrics::new().unwrap();
        metrics
            .events_ingested
            .with_label_values(&["top", "press-01"])
            .inc();

        let output = metrics.render().unwrap();
        assert!(output.contains("# HELP dt_events_ingested_total"));
        assert!(output.contains("# TYPE dt_events_ingested_total counter"));
        assert!(output.contains("# TYPE dt_active_subscribers gauge"));
    }

    #[test]
    fn set_targets_replaces_previous_series() {
        let metrics = RelayMetrics::new().unwrap();

        let mut events = HashMap::new();
        events.insert("top".to_string(), SpecEntry { t_ms: 880.0, tolerance_ms: 50.0 });
        let mut t1 = HashMap::new();
        t1.insert("press-01".to_string(), events);
        metrics.set_targets(&t1);
        assert!(metrics
            .render()
            .unwrap()
            .contains("dt_target_t_ms{event=\"top\",topic=\"press-01\"} 880"));

        let mut events = HashMap::new();
        events.insert("base".to_string(), SpecEntry { t_ms: 910.0, tolerance_ms: 25.0 });
        let mut t2 = HashMap::new();
        t2.insert("press-02".to_string(), events);
        metrics.set_targets(&t2);

        let output = metrics.render().unwrap();
        assert!(output.contains("dt_target_t_ms{event=\"base\",topic=\"press-02\"} 910"));
        assert!(!output.contains("press-01"));
    }
}
