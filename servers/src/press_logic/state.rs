use std::sync::Arc;

use anyhow::Result;
use lib_common::{Dispatcher, Ingestor, RelayMetrics, SpecStore, ValidationMode};

use crate::press_logic::config::Config;

/// Shared state for every route and background task. All mutation of the
/// relay's core state goes through the services held here; handlers never
/// touch the history, last-state slot or subscriber registry directly.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub dispatcher: Arc<Dispatcher>,
    pub specs: Arc<SpecStore>,
    pub metrics: Arc<RelayMetrics>,
    pub validation_mode: ValidationMode,
    /// History capacity `N`; the `/data/events` limit is clamped to `[1, N]`.
    pub ring_capacity: usize,
}

impl AppState {
    /// Wires up the core services from the resolved configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let metrics = Arc::new(RelayMetrics::new()?);
        let specs = Arc::new(SpecStore::load(config.spec_path())?);
        metrics.set_targets(&specs.snapshot());

        // Normalized once here: the history buffer clamps a zero capacity to
        // one, and the `/data/events` limit clamp needs the same bound.
        let ring_capacity = config.ring_capacity().max(1);

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&metrics)));
        let ingestor = Arc::new(Ingestor::new(
            ring_capacity,
            Arc::clone(&specs),
            Arc::clone(&metrics),
            Arc::clone(&dispatcher),
        ));

        Ok(Self {
            ingestor,
            dispatcher,
            specs,
            metrics,
            validation_mode: config.validation_mode(),
            ring_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ring_capacity_is_normalized_to_one() {
        let config = Config {
            ring_capacity: Some(0),
            spec_path: Some(std::env::temp_dir().join("press-state-test-absent-ideal.json")),
            ..Default::default()
        };
        let state = AppState::new(&config).unwrap();
        assert_eq!(state.ring_capacity, 1);
        assert_eq!(state.ingestor.capacity(), 1);
    }
}
