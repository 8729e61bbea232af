use anyhow::{Context, Result};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::File;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber for the CLI.
///
/// Records go to stderr, and to `log_file` too when given. Keep the guard
/// alive until exit so the file writer can flush.
pub fn init(log_file: Option<&Path>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let (file, guard) = match log_file {
        Some(path) => {
            let (layer, guard) = file_layer(path)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // -v / -vv pick the default level; RUST_LOG overrides it
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    tracing_subscriber::registry()
        .with(file)
        .with(stderr)
        .with(filter)
        .init();

    if let Some(path) = log_file {
        info!("Writing log records to {}", path.display());
    }
    Ok(guard)
}

fn file_layer(path: &Path) -> Result<(impl Layer<Registry> + Send + Sync, WorkerGuard)> {
    let file = File::create(path).with_context(|| format!("Cannot create log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);
    Ok((layer, guard))
}
