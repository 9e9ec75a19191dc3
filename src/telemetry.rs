//! Tracing subscriber setup for the CLI.
//!
//! Filter precedence: `TOONFLOW_LOG`, then `RUST_LOG`, then `-v` (debug),
//! then `[logging] level` from `toonflow.toml`. Logs go to stderr and, once
//! the project is initialized, to a daily file under `.toonflow/logs/`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Environment variable holding a filter directive for toonflow logs.
pub const LOG_ENV: &str = "TOONFLOW_LOG";

/// Build the filter from the environment, the verbose flag and the configured level.
pub fn env_filter(verbose: bool, configured: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            if verbose {
                EnvFilter::new("debug")
            } else {
                EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("warn"))
            }
        })
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so the file writer flushes.
pub fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = env_filter(config.verbose, &config.toml.logging.level);
    let json = config.toml.logging.json;

    let (file_layer, guard) = if config.log_dir.is_dir() {
        let appender = tracing_appender::rolling::daily(&config.log_dir, "toonflow.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let stderr_json = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let stderr_text = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_json)
        .with(stderr_text)
        .with(file_layer)
        .try_init();

    guard
}
