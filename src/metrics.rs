//! Observability hooks
//!
//! Span constructors only; exporting metrics is left to the host application.

/// Spans for dialect probes, named-lock acquisition and history bootstrap
///
/// Callers enter the returned span for the duration of the operation:
/// `let _span = tracing_helpers::lock_span(&name).entered();`
#[cfg(feature = "tracing")]
pub(crate) mod tracing_helpers {
    use tracing::Span;

    /// Span covering one `GET_LOCK` polling loop
    pub fn lock_span(lock_name: &str) -> Span {
        tracing::info_span!("named_lock.acquire", lock = %lock_name)
    }

    /// Span covering a single capability or identity probe
    pub fn probe_span(query: &str) -> Span {
        tracing::debug_span!("dialect.probe", query = %query)
    }

    /// Span covering `OceanBaseDatabase::open`
    pub fn open_span(product_name: &str) -> Span {
        tracing::info_span!("dialect.open", product = %product_name)
    }

    /// Span covering schema history creation
    pub fn history_span(table: &str) -> Span {
        tracing::info_span!("schema_history.ensure", table = %table)
    }
}
