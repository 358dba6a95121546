//! Where stream consumption reports problems it does not propagate.

use std::io;

use tracing::{trace, warn};

use crate::source::SourceKind;

/// Receives non-fatal events from stream consumption.
///
/// The default, [`TracingSink`], logs through `tracing`. Swap it via
/// [`Options::diagnostics`](crate::Options::diagnostics) to collect these
/// events elsewhere.
pub trait DiagnosticSink: Send + Sync {
    /// Releasing a source failed. The consume result is unaffected.
    fn release_failed(&self, kind: SourceKind, err: &io::Error);

    /// A signal arrived after the consume operation had already settled.
    fn late_signal(&self, kind: SourceKind, signal: &'static str) {
        let _ = (kind, signal);
    }
}

/// Logs diagnostics with `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn release_failed(&self, kind: SourceKind, err: &io::Error) {
        warn!(?kind, error = %err, "failed to release stream source");
    }

    fn late_signal(&self, kind: SourceKind, signal: &'static str) {
        trace!(?kind, signal, "ignoring signal after settlement");
    }
}
