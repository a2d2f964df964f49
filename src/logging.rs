//! Tracing setup: an `EnvFilter`-driven stderr layer (text or JSON) plus a
//! daily-rolling file under `.conveyor/logs/`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_NAME: &str = "conveyor.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "conveyor=debug,warn"
    } else {
        "conveyor=info,warn"
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. With `log_dir` set, events are also written
/// to a daily file there; keep the returned guard alive until exit so buffered
/// lines are flushed.
pub fn init(verbose: bool, format: LogFormat, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr)))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
