//! # Logging
//!
//! Installs the global `tracing` subscriber of the daemon. Events go to
//! stdout, or to an append-only log file with colours turned off.
//!
//! ```rust,ignore
//! logging::init("debug", Some(Path::new("/var/log/logcarrier.log")))?;
//! tracing::info!(listen = %addr, "started");
//! ```

mod __test__;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing::Level;

#[derive(Debug, Error)]
pub enum LoggingError {
  #[error("unknown log level `{0}`")]
  UnknownLevel(String),

  #[error("cannot open log file `{path}`: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("a global logger is already installed")]
  AlreadyInstalled,
}

pub fn parse_level(level: &str) -> Result<Level, LoggingError> {
  Level::from_str(level).map_err(|_| LoggingError::UnknownLevel(level.to_string()))
}

fn open(path: &Path) -> Result<File, LoggingError> {
  OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .map_err(|source| LoggingError::Open {
      path: path.to_path_buf(),
      source,
    })
}

/// Installs the subscriber. Fails instead of panicking when one is already
/// set.
pub fn init(level: &str, logfile: Option<&Path>) -> Result<(), LoggingError> {
  let level = parse_level(level)?;
  let builder = tracing_subscriber::fmt()
    .with_max_level(level)
    .with_target(false)
    .with_thread_names(true);

  let installed = match logfile {
    Some(path) => builder
      .with_ansi(false)
      .with_writer(Mutex::new(open(path)?))
      .try_init(),
    None => builder.with_writer(io::stdout).try_init(),
  };
  installed.map_err(|_| LoggingError::AlreadyInstalled)
}
