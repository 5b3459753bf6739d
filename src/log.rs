//! Structured logging setup.
//!
//! Builds a JSON-formatted [`slog`] drain, routes it through
//! [`slog_envlogger`] so `server.log_level` behaves like an `env_logger`
//! filter string, and installs it as both the global `slog_scope` logger
//! and the backend for the standard [`log`] facade so dependency crates'
//! `log::info!`/etc. records are captured too.

use slog::{o, Drain};
use slog_scope::GlobalLoggerGuard;

use crate::error::FatalError;

/// Initializes the global logger. The returned guard must be kept alive
/// for the lifetime of the process; dropping it restores the previous
/// (no-op) global logger.
pub fn init(level_filter: &str) -> Result<GlobalLoggerGuard, FatalError> {
    let drain = slog_json::Json::new(std::io::stdout())
        .add_default_keys()
        .build()
        .fuse();
    let drain = slog_envlogger::LogBuilder::new(drain)
        .parse(level_filter)
        .build()
        .fuse();
    let drain = slog_async::Async::new(drain)
        .build()
        .fuse();
    let logger = slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")));

    let guard = slog_scope::set_global_logger(logger);
    slog_stdlog::init().map_err(|e| FatalError::Logging(e.to_string()))?;

    Ok(guard)
}
