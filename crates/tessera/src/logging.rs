//! Logging initialization.
//!
//! Logs go to stderr through `tracing`; stdout carries the JSON results of
//! each command so it can be piped.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global subscriber at `level`.
///
/// `RUST_LOG` overrides `level` when set, e.g. `RUST_LOG=tessera_core=trace`
/// for per-stage ingest timings.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize from the `[logging]` section; `--verbose` raises the level to
/// at least debug and `--json-logs` forces JSON output.
pub fn init_from_config(config: &tessera_core::Config, verbose: bool, json_logs: bool) {
    let configured = config.logging.level.as_str();
    let level = match (verbose, configured) {
        (true, "trace") => "trace",
        (true, _) => "debug",
        (false, level) => level,
    };
    let json_format = json_logs || config.logging.format == "json";
    init(level, json_format);
}
