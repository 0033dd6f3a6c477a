use std::sync::{Mutex, PoisonError};
use tracing::{error, warn};

use crate::error::{ErrorKind, TrackingError};

/// Receives errors that are handled locally instead of being returned to the
/// presentation layer.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, error: &TrackingError);
}

/// Logs every report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, err: &TrackingError) {
        match err.kind() {
            ErrorKind::Storage => error!("{}", err),
            _ => warn!("{}", err),
        }
    }
}

/// Keeps every report in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    reports: Mutex<Vec<(ErrorKind, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(ErrorKind, String)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn report(&self, err: &TrackingError) {
        TracingDiagnostics.report(err);
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((err.kind(), err.to_string()));
    }
}
