//! # Bufferer Chain
//!
//! The per-destination write pipeline:
//!
//! ```text
//! LineWriter -> CompressedWriter -> FrameWriter -> RotatingFile
//!  (lines)       (raw/gzip/zstd/lz4)  (whole frames)  (append, rename)
//! ```
//!
//! ## Transfers
//!
//! A dump worker holding the entry lock calls [`Chain::dump_state`], streams
//! the payload through [`Chain::write`] and finishes with
//! [`Chain::post_write`]. If anything fails, [`Chain::restore_state`] brings
//! every stage back to the dumped state and truncates the file.
//!
//! With a stateful compressor the line writer is deferred: while a transfer
//! is running nothing moves past it, so the compressor never sees data that
//! may still be revoked. `post_write` spills it once the transfer is final.
//! With `raw` the line writer spills eagerly and rollback relies on the
//! frame buffer and file offset in the dump instead.
//!
//! ## Flush and close
//!
//! - `flush`: lines go down if worth it; then, if the frame buffer is worth
//!   flushing or the compressor holds unfinished input, the compressed stream
//!   is closed and frames are written to disk.
//! - `close`: lines, compressor, frames, file, in that order. The first
//!   failure stops the sequence and is returned.
//! - `finish`: `close` after writing out the partial trailing line too.

mod __test__;

use chrono::Local;
use std::io::{self, Write};
use std::sync::Arc;

use crate::compress::{Codec, CompressedWriter};
use crate::file::{RotatingFile, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use crate::frame_writer::FrameWriter;
use crate::line_writer::LineWriter;
use crate::paths::{DestinationKey, PathScheme};
use crate::snapshot::{RestoreError, Snapshot, StateDump};

type Stages = LineWriter<CompressedWriter<FrameWriter<RotatingFile>>>;

/// Buffer sizes and compression shared by every chain.
#[derive(Clone, Copy, Debug)]
pub struct ChainConfig {
  pub input: usize,
  pub framing: usize,
  pub codec: Codec,
  pub file_mode: u32,
  /// Mode of directories created for files, rotated files and links.
  pub dir_mode: u32,
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      input: 128 * 1024,
      framing: 256 * 1024,
      codec: Codec::raw(),
      file_mode: DEFAULT_FILE_MODE,
      dir_mode: DEFAULT_DIR_MODE,
    }
  }
}

pub struct Chain {
  key: DestinationKey,
  scheme: Arc<PathScheme>,
  stages: Stages,
}

impl Chain {
  /// Builds the stages. No file is opened until the first byte reaches disk.
  pub fn new(key: DestinationKey, scheme: Arc<PathScheme>, config: &ChainConfig) -> io::Result<Self> {
    let now = Local::now();
    let file = RotatingFile::new(scheme.current(&key, now), config.file_mode)
      .with_dir_mode(config.dir_mode)
      .with_link(scheme.link(&key, now));
    let frames = FrameWriter::new(file, config.framing);
    let compressed = CompressedWriter::new(frames, config.codec)?;
    let stages = if config.codec.is_stateful() {
      LineWriter::deferred(compressed, config.input)
    } else {
      LineWriter::new(compressed, config.input)
    };

    Ok(Self {
      key,
      scheme,
      stages,
    })
  }

  pub fn key(&self) -> &DestinationKey {
    &self.key
  }

  pub fn file(&self) -> &RotatingFile {
    self.stages.get_ref().get_ref().get_ref()
  }

  pub fn is_open(&self) -> bool {
    self.file().is_open()
  }

  pub fn lines_buffered(&self) -> u64 {
    self.stages.lines_buffered()
  }

  pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
    self.stages.write_all(data)
  }

  /// Makes a finished transfer final: spills an overgrown deferred buffer.
  pub fn post_write(&mut self) -> io::Result<()> {
    if self.stages.overgrown() {
      self.stages.flush_lines()?;
    }
    Ok(())
  }

  pub fn flush(&mut self) -> io::Result<()> {
    if self.stages.worth_flushing() {
      self.stages.flush_lines()?;
    }
    let compressed = self.stages.get_mut();
    let frames_due = compressed.get_mut().worth_flushing();
    if frames_due || compressed.pending() > 0 || compressed.stashed() > 0 {
      compressed.close()?;
      compressed.get_mut().flush_frames()?;
    }
    Ok(())
  }

  pub fn close(&mut self) -> io::Result<()> {
    self.stages.flush_lines()?;
    let compressed = self.stages.get_mut();
    compressed.close()?;
    let frames = compressed.get_mut();
    frames.flush_frames()?;
    frames.get_mut().close()
  }

  pub fn finish(&mut self) -> io::Result<()> {
    self.stages.flush_all()?;
    self.close()
  }

  /// Renames the backing file to its historical name, `explicit` or the
  /// rotation template. Returns whether a rename happened.
  ///
  /// # Panics
  ///
  /// Panics if the chain was not closed first.
  pub fn rotate(&mut self, explicit: Option<&str>) -> io::Result<bool> {
    let now = Local::now();
    let to = self.scheme.rotated(&self.key, explicit, now);
    let next = self.scheme.current(&self.key, now);
    self.file_mut().rotate(&to, next)
  }

  /// Serializes every stage into `snapshot`, replacing its contents.
  pub fn dump_state(&self, snapshot: &mut Snapshot) -> io::Result<()> {
    let mut enc = snapshot.begin();
    let compressed = self.stages.get_ref();
    let frames = compressed.get_ref();
    self.stages.dump_state(&mut enc)?;
    compressed.dump_state(&mut enc)?;
    frames.dump_state(&mut enc)?;
    frames.get_ref().dump_state(&mut enc)
  }

  /// Rolls every stage back to `snapshot`.
  ///
  /// # Panics
  ///
  /// Panics if the snapshot does not decode; it was produced by
  /// [`Chain::dump_state`] moments earlier, so this is memory corruption or
  /// a programming error.
  pub fn restore_state(&mut self, snapshot: &Snapshot) -> io::Result<()> {
    match self.restore_stages(snapshot) {
      Ok(()) => Ok(()),
      Err(RestoreError::Io(e)) => Err(e),
      Err(RestoreError::Corrupt(e)) => panic!("corrupt state dump for {}: {}", self.key, e),
    }
  }

  fn restore_stages(&mut self, snapshot: &Snapshot) -> Result<(), RestoreError> {
    let mut dec = snapshot.decoder();
    self.stages.restore_state(&mut dec)?;
    let compressed = self.stages.get_mut();
    compressed.restore_state(&mut dec)?;
    let frames = compressed.get_mut();
    frames.restore_state(&mut dec)?;
    frames.get_mut().restore_state(&mut dec)?;
    dec.finish()?;
    Ok(())
  }

  fn file_mut(&mut self) -> &mut RotatingFile {
    self.stages.get_mut().get_mut().get_mut()
  }
}
