//! Logging initialization

use anyhow::{Context, Result};
use std::fs::File;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::{Args, LogFormat};

/// Initialize logging based on CLI arguments
///
/// `default_directive` comes from the tunables file and only applies when no
/// verbosity flag was given. `RUST_LOG` wins over both. The returned guard
/// flushes the log file and must be held until exit.
pub fn init(args: &Args, default_directive: Option<&str>) -> Result<Option<WorkerGuard>> {
    // Determine log level
    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    // Build env filter
    let env_filter = match default_directive {
        Some(directive) if args.verbose == 0 && !args.quiet => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
        }
        _ => EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy(),
    };

    let (file_writer, guard) = match args.log_file {
        Some(ref path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    // Set up subscriber based on format
    match args.log_format {
        LogFormat::Text => {
            let file_layer = file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(args.verbose >= 2)
                        .with_thread_names(args.verbose >= 3)
                        .with_file(args.verbose >= 3)
                        .with_line_number(args.verbose >= 3),
                )
                .with(file_layer)
                .init();
        }
        LogFormat::Json => {
            let file_layer = file_writer.map(|writer| fmt::layer().json().with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(file_layer)
                .init();
        }
        LogFormat::Compact => {
            let file_layer =
                file_writer.map(|writer| fmt::layer().compact().with_ansi(false).with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .with(file_layer)
                .init();
        }
    }

    Ok(guard)
}
