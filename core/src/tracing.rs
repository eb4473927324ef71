//! Tracing utilities for query and hook observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// quarry_trace_query!(&compiled.sql, compiled.bindings.len());
/// ```
#[macro_export]
macro_rules! quarry_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "quarry.query");
    };
}

/// Emit a trace-level event when an operation hook runs.
///
/// ```ignore
/// quarry_trace_hook!("on_before2", op.name());
/// ```
#[macro_export]
macro_rules! quarry_trace_hook {
    ($hook:expr, $operation:expr) => {
        #[cfg(feature = "tracing")]
        tracing::trace!(hook = %$hook, operation = %$operation, "quarry.hook");
    };
}

/// Emit a debug-level event when a query is resolved before reaching the database.
///
/// ```ignore
/// quarry_trace_resolve!("on_before3");
/// ```
#[macro_export]
macro_rules! quarry_trace_resolve {
    ($phase:expr) => {
        #[cfg(feature = "tracing")]
        tracing::debug!(phase = %$phase, "quarry.resolved");
    };
}
