//! Diagnostic sinks.

use flowc_core::diagnostic::{Diagnostic, DiagnosticSink, Level};
use tracing::{error, info, warn};

/// Logs diagnostics through `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        let entity = diagnostic
            .entity
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        match diagnostic.level {
            Level::Error => error!(%entity, "{}", diagnostic.message),
            Level::Warn => warn!(%entity, "{}", diagnostic.message),
            Level::Info => info!(%entity, "{}", diagnostic.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowc_core::diagnostic::EntityRef;

    #[test]
    fn test_tracing_sink_accepts_every_level() {
        let mut sink = TracingSink;
        sink.report(Diagnostic::info("i"));
        sink.report(Diagnostic::warn("w").with_entity(EntityRef::batch("b")));
        sink.report(Diagnostic::error("e"));
    }
}
