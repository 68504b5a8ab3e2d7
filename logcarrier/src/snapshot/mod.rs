//! # Snapshot Module
//!
//! Captures the state of a buffering chain right before a transfer begins so
//! that a failed transfer can be undone exactly.
//!
//! ## Lifecycle
//!
//! 1. A dump worker locks a registry entry and calls
//!    [`Chain::dump_state`](crate::chain::Chain::dump_state), which serializes
//!    every stage into the worker's reusable [`Snapshot`].
//! 2. The payload is streamed into the chain.
//! 3. On success the snapshot is simply overwritten by the next job. On
//!    failure it is handed to
//!    [`Chain::restore_state`](crate::chain::Chain::restore_state): buffer
//!    contents and counters come back and the file is truncated to the saved
//!    offset.
//!
//! A snapshot that fails to decode means memory corruption or a programming
//! error; restoring it is treated as fatal.


use chrono::{DateTime, Utc};
use std::io;
use thiserror::Error;

use crate::binenc::{CodecError, StateDecoder, StateEncoder};

/// A stage of the chain whose state can be dumped and restored.
pub trait StateDump {
  /// Appends this stage's state.
  fn dump_state(&self, enc: &mut StateEncoder<'_>) -> io::Result<()>;

  /// Reads back the fields written by `dump_state`, in the same order.
  fn restore_state(&mut self, dec: &mut StateDecoder<'_>) -> Result<(), RestoreError>;
}

#[derive(Debug, Error)]
pub enum RestoreError {
  #[error("corrupt state dump: {0}")]
  Corrupt(#[from] CodecError),

  #[error("rollback failed: {0}")]
  Io(#[from] io::Error),
}

/// Reusable state dump buffer. Each dump worker owns one.
#[derive(Debug, Default)]
pub struct Snapshot {
  data: Vec<u8>,
  taken_at: Option<DateTime<Utc>>,
}

impl Snapshot {
  pub fn new() -> Self {
    Self::default()
  }

  /// Clears previous contents and returns an encoder over the buffer.
  pub fn begin(&mut self) -> StateEncoder<'_> {
    self.data.clear();
    self.taken_at = Some(Utc::now());
    StateEncoder::new(&mut self.data)
  }

  pub fn decoder(&self) -> StateDecoder<'_> {
    StateDecoder::new(&self.data)
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// When the current contents were captured, if ever.
  pub fn taken_at(&self) -> Option<DateTime<Utc>> {
    self.taken_at
  }
}

impl From<Vec<u8>> for Snapshot {
  fn from(data: Vec<u8>) -> Self {
    Self {
      data,
      taken_at: None,
    }
  }
}
