//! Structured logging setup.
//!
//! Console output goes to stderr so report text on stdout stays clean; when
//! an output directory is known, a plain-text file layer is added alongside.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::Result;

/// Initialize tracing with a console layer and an optional file layer.
///
/// `verbose` lowers the default filter from `info` to `debug`; the
/// `RUST_LOG` environment variable still wins when set.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<()> {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let log_path = dir.join("taguchi-tuner.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;
            Some(fmt::layer().with_writer(file).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(verbose, "logging initialized");
    Ok(())
}
