//! Per-parse anomaly accumulator.

use kvitto_core::{Anomaly, AnomalyKind};
use tracing::debug;

/// Collects anomalies for one parse call. Never shared between parses.
#[derive(Debug, Default)]
pub struct AnomalyReporter {
    anomalies: Vec<Anomaly>,
}

impl AnomalyReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, anomaly: Anomaly) {
        debug!(
            kind = %anomaly.kind,
            severity = ?anomaly.severity,
            "{}",
            anomaly.description
        );
        self.anomalies.push(anomaly);
    }

    pub fn extend(&mut self, anomalies: impl IntoIterator<Item = Anomaly>) {
        for a in anomalies {
            self.record(a);
        }
    }

    /// Return everything recorded so far and start empty.
    pub fn drain(&mut self) -> Vec<Anomaly> {
        std::mem::take(&mut self.anomalies)
    }

    pub fn has(&self, kind: &AnomalyKind) -> bool {
        self.anomalies.iter().any(|a| &a.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvitto_core::Severity;

    #[test]
    fn test_drain_clears() {
        let mut reporter = AnomalyReporter::new();
        reporter.record(Anomaly::new(
            AnomalyKind::UnmatchedLine,
            Severity::Low,
            "line 3",
        ));
        assert!(reporter.has(&AnomalyKind::UnmatchedLine));
        assert_eq!(reporter.len(), 1);

        let drained = reporter.drain();
        assert_eq!(drained.len(), 1);
        assert!(reporter.is_empty());
        assert!(reporter.drain().is_empty());
    }
}
