//! Log file setup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber, appending to `log_path`.
///
/// `RUST_LOG` overrides the default `info` filter. If the file cannot be
/// opened the log goes to stderr. Returns false if a subscriber was
/// already installed.
pub fn init(log_path: &Path) -> bool {
    let (writer, to_file) = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), true),
        Err(_) => (BoxMakeWriter::new(std::io::stderr), false),
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .is_ok();

    if installed && !to_file {
        tracing::warn!(path = %log_path.display(), "cannot open log file, logging to stderr");
    }
    installed
}
