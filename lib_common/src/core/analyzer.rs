//! Pure deviation evaluation against the spec table.

use crate::core::model::{Analysis, StrokeEvent};
use crate::core::spec::SpecTable;

/// Compares an observed timing against the configured ideal for
/// `(topic, event)`.
///
/// Returns `None` when no spec entry exists or `t_ms` is not finite; a
/// verdict is never fabricated. The tolerance boundary is inclusive: a
/// deviation exactly equal to the tolerance is in-spec. Deterministic, no
/// hidden state.
pub fn evaluate(table: &SpecTable, topic: &str, event: StrokeEvent, t_ms: f64) -> Option<Analysis> {
    if !t_ms.is_finite() {
        return None;
    }
    let entry = table.get(topic)?.get(event.as_str())?;
    let deviation_ms = t_ms - entry.t_ms;
    Some(Analysis {
        ideal_ms: entry.t_ms,
        tolerance_ms: entry.tolerance_ms,
        deviation_ms,
        in_spec: deviation_ms.abs() <= entry.tolerance_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::SpecEntry;
    use std::collections::HashMap;

    fn table_880_50() -> SpecTable {
        let mut events = HashMap::new();
        events.insert("top".to_string(), SpecEntry { t_ms: 880.0, tolerance_ms: 50.0 });
        let mut table = HashMap::new();
        table.insert("press-01".to_string(), events);
        table
    }

    #[test]
    fn within_tolerance_is_in_spec() {
        let verdict = evaluate(&table_880_50(), "press-01", StrokeEvent::Top, 905.0).unwrap();
        assert_eq!(verdict.deviation_ms, 25.0);
        assert!(verdict.in_spec);
        assert_eq!(verdict.ideal_ms, 880.0);
        assert_eq!(verdict.tolerance_ms, 50.0);
    }

    #[test]
    fn beyond_tolerance_is_out_of_spec() {
        let verdict = evaluate(&table_880_50(), "press-01", StrokeEvent::Top, 935.0).unwrap();
        assert_eq!(verdict.deviation_ms, 55.0);
        assert!(!verdict.in_spec);
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let verdict = evaluate(&table_880_50(), "press-01", StrokeEvent::Top, 930.0).unwrap();
        assert_eq!(verdict.deviation_ms, 50.0);
        assert!(verdict.in_spec);
    }

    #[test]
    fn negative_deviation_uses_magnitude() {
        let verdict = evaluate(&table_880_50(), "press-01", StrokeEvent::Top, 840.0).unwrap();
        assert_eq!(verdict.deviation_ms, -40.0);
        assert!(verdict.in_spec);
    }

    #[test]
    fn missing_topic_or_event_yields_no_verdict() {
        let table = table_880_50();
        assert!(evaluate(&table, "press-99", StrokeEvent::Top, 880.0).is_none());
        assert!(evaluate(&table, "press-01", StrokeEvent::Base, 880.0).is_none());
    }

    #[test]
    fn non_finite_timing_yields_no_verdict() {
        let table = table_880_50();
        assert!(evaluate(&table, "press-01", StrokeEvent::Top, f64::NAN).is_none());
        assert!(evaluate(&table, "press-01", StrokeEvent::Top, f64::INFINITY).is_none());
    }
}
