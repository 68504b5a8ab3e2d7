//! Buffered writer that keeps compression frames whole.
//!
//! Each `write` call is one frame. Frames are only ever split from each other,
//! never internally: if a frame does not fit next to what is buffered the
//! buffer is flushed first, and a frame larger than the whole buffer goes
//! straight to the inner writer.


use std::io::{self, Write};

use crate::binenc::{StateDecoder, StateEncoder};
use crate::snapshot::{RestoreError, StateDump};

pub struct FrameWriter<W: Write> {
  inner: W,
  capacity: usize,
  buffer: Vec<u8>,

  inserted: u64,
  flushed: u64,
  previous: u64,
  worth: bool,
}

impl<W: Write> FrameWriter<W> {
  pub fn new(inner: W, capacity: usize) -> Self {
    Self {
      inner,
      capacity,
      buffer: Vec::with_capacity(capacity),
      inserted: 0,
      flushed: 0,
      previous: 0,
      worth: true,
    }
  }

  /// Writes all buffered frames to the inner writer in one call.
  pub fn flush_frames(&mut self) -> io::Result<()> {
    if !self.buffer.is_empty() {
      self.flushed = self.inserted;
      self.inner.write_all(&self.buffer)?;
    }
    self.buffer.clear();
    Ok(())
  }

  /// Same contract as [`LineWriter::worth_flushing`](crate::line_writer::LineWriter::worth_flushing)
  /// with frames as the unit.
  pub fn worth_flushing(&mut self) -> bool {
    let res = self.worth && self.inserted != self.previous && self.previous == self.flushed;
    self.previous = self.flushed;
    self.worth = true;
    res
  }

  pub fn buffered(&self) -> &[u8] {
    &self.buffer
  }

  pub fn frames_buffered(&self) -> u64 {
    self.inserted - self.flushed
  }

  pub fn get_ref(&self) -> &W {
    &self.inner
  }

  pub fn get_mut(&mut self) -> &mut W {
    &mut self.inner
  }

  pub fn into_inner(self) -> W {
    self.inner
  }
}

impl<W: Write> Write for FrameWriter<W> {
  fn write(&mut self, frame: &[u8]) -> io::Result<usize> {
    if !self.buffer.is_empty() && self.buffer.len() + frame.len() > self.capacity {
      self.worth = false;
      self.flush_frames()?;
    }
    if frame.len() > self.capacity {
      self.inner.write_all(frame)?;
      return Ok(frame.len());
    }
    self.inserted += 1;
    self.buffer.extend_from_slice(frame);
    Ok(frame.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    self.flush_frames()?;
    self.inner.flush()
  }
}

impl<W: Write> StateDump for FrameWriter<W> {
  fn dump_state(&self, enc: &mut StateEncoder<'_>) -> io::Result<()> {
    enc.len(self.capacity);
    enc.bytes(&self.buffer);
    enc.u64(self.inserted);
    enc.u64(self.flushed);
    enc.u64(self.previous);
    enc.bool(self.worth);
    Ok(())
  }

  fn restore_state(&mut self, dec: &mut StateDecoder<'_>) -> Result<(), RestoreError> {
    let capacity = dec.len("frame capacity")?;
    let buffer = dec.bytes("frame buffer")?;
    let inserted = dec.u64("frames inserted")?;
    let flushed = dec.u64("frames flushed")?;
    let previous = dec.u64("previous frames flushed")?;
    let worth = dec.bool("frame worth flushing")?;

    self.capacity = capacity;
    self.buffer.clear();
    self.buffer.extend_from_slice(buffer);
    self.inserted = inserted;
    self.flushed = flushed;
    self.previous = previous;
    self.worth = worth;
    Ok(())
  }
}
