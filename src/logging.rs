//! Tracing setup.
//!
//! `tracing-subscriber` with an env-filter (`SLIMCLAW_LOG`, falling back to
//! `info`) and an optional JSON formatter for production deployments, plus
//! a rolling file appender when a log directory is configured.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global tracing subscriber. Safe to call once at process
/// startup; a second call is a no-op.
pub fn init(format: LogFormat, log_dir: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_env("SLIMCLAW_LOG")
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    let stdout_layer = match format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().boxed(),
    };

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "slimclaw.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard deliberately: it must live for the process lifetime
        // to flush buffered lines, and `init` is only ever called once at
        // startup (see guard above).
        std::mem::forget(guard);
        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
        let _ = registry.with(stdout_layer).with(file_layer).try_init();
    } else {
        let _ = registry.with(stdout_layer).try_init();
    }
}
