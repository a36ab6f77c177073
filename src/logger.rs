//! Structured logging via tracing.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Log level is controlled by the `DOCQA_LOG` env var (default: `info`).
/// Examples:
///   DOCQA_LOG=debug
///   DOCQA_LOG=docqa::retrieve=trace,info
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init() {
    let filter = EnvFilter::try_from_env("DOCQA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init();
}
