// Declare the modules to re-export
pub mod core;

// Re-export the primary types for downstream crates
pub use crate::core::analyzer::evaluate;
pub use crate::core::dispatcher::{Dispatcher, Frame};
pub use crate::core::ingestor::Ingestor;
pub use crate::core::metrics::RelayMetrics;
pub use crate::core::model::{Analysis, EventRecord, StrokeEvent, ValidationError, ValidationMode};
pub use crate::core::ring::RingBuffer;
pub use crate::core::spec::{SpecEntry, SpecStore, SpecTable};
