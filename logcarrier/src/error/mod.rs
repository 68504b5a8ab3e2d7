//! Error taxonomy shared by the workers.
//!
//! | variant              | raised by              | wire effect            |
//! |----------------------|------------------------|------------------------|
//! | `MalformedHeader`    | header worker          | close, no reply        |
//! | `UnknownDestination` | rotate on unseen key   | `400 Error`            |
//! | `TransferFailed`     | dump worker mid-stream | rollback, `400 Error`  |
//! | `PersistenceFailure` | flush, close, rename   | logged, `400` if asked |
//! | `Poisoned`           | entry after a panic    | `400 Error`            |
//!
//! Rotating a file that is still open is not an error value: it is an
//! invariant violation and panics.

use std::io;
use thiserror::Error;

use crate::header::HeaderError;

#[derive(Debug, Error)]
pub enum CarrierError {
  #[error("malformed header: {0}")]
  MalformedHeader(#[from] HeaderError),

  #[error("unknown destination `{0}`")]
  UnknownDestination(String),

  #[error("transfer to `{key}` failed: {source}")]
  TransferFailed {
    key: String,
    #[source]
    source: io::Error,
  },

  #[error("persistence failure on `{key}`: {source}")]
  PersistenceFailure {
    key: String,
    #[source]
    source: io::Error,
  },

  #[error("destination `{0}` is unusable after a worker panic")]
  Poisoned(String),
}

impl CarrierError {
  pub fn transfer(key: impl ToString, source: io::Error) -> Self {
    CarrierError::TransferFailed {
      key: key.to_string(),
      source,
    }
  }

  pub fn persistence(key: impl ToString, source: io::Error) -> Self {
    CarrierError::PersistenceFailure {
      key: key.to_string(),
      source,
    }
  }
}

pub type Result<T> = std::result::Result<T, CarrierError>;
