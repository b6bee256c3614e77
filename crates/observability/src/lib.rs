//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing with the format named by
/// `STOCKVAL_LOG_FORMAT` (JSON unless set to `pretty`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Subscriber configuration (filters, output format).
pub mod tracing;
