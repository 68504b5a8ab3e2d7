//! # Line Writer
//!
//! Buffered writer that hands complete `\n`-terminated lines to the writer
//! beneath it and never a fragment of one.
//!
//! ## Layout
//!
//! ```text
//! write("1\n2\n3\n456")
//!
//!   buffer  "1\n2\n3\n"   committed lines, flushed by `flush_lines`
//!   carry   "456"         partial tail, only written by `flush_all`
//! ```
//!
//! ## Spilling
//!
//! An *eager* writer (the default) flushes the committed region as soon as
//! the next line would push it past `capacity`. A *deferred* writer never
//! spills on its own: it grows past `capacity` and its owner calls
//! [`LineWriter::overgrown`] / [`LineWriter::flush_lines`] once the data can
//! no longer be revoked. Compressed chains use deferred writers so nothing
//! reaches the compressor while a transfer may still be rolled back.


use std::io::{self, Write};

use crate::binenc::{StateDecoder, StateEncoder};
use crate::snapshot::{RestoreError, StateDump};

const CARRY_RESERVE: usize = 8192;

pub struct LineWriter<W: Write> {
  inner: W,
  capacity: usize,
  deferred: bool,
  buffer: Vec<u8>,
  carry: Vec<u8>,

  lines: u64,
  flushed: u64,
  previous: u64,
  worth: bool,
}

impl<W: Write> LineWriter<W> {
  /// Eager writer: the committed region is flushed before it would exceed
  /// `capacity`. A capacity of zero disables spilling.
  pub fn new(inner: W, capacity: usize) -> Self {
    Self::build(inner, capacity, false)
  }

  /// Deferred writer: grows past `capacity` until the owner spills it.
  pub fn deferred(inner: W, capacity: usize) -> Self {
    Self::build(inner, capacity, true)
  }

  fn build(inner: W, capacity: usize, deferred: bool) -> Self {
    Self {
      inner,
      capacity,
      deferred,
      buffer: Vec::with_capacity(capacity),
      carry: Vec::with_capacity(CARRY_RESERVE),
      lines: 0,
      flushed: 0,
      previous: 0,
      worth: true,
    }
  }

  /// Writes every committed line to the inner writer. The partial tail stays.
  pub fn flush_lines(&mut self) -> io::Result<()> {
    if !self.buffer.is_empty() {
      self.inner.write_all(&self.buffer)?;
      self.buffer.clear();
    }
    self.flushed = self.lines;
    Ok(())
  }

  /// Writes committed lines and then the partial tail.
  pub fn flush_all(&mut self) -> io::Result<()> {
    self.flush_lines()?;
    if !self.carry.is_empty() {
      self.inner.write_all(&self.carry)?;
      self.carry.clear();
    }
    Ok(())
  }

  /// True when new lines were committed since the last decision and no flush
  /// happened behind the caller's back. Every call resets the decision.
  pub fn worth_flushing(&mut self) -> bool {
    let res = self.worth && self.flushed != self.lines && self.flushed == self.previous;
    self.previous = self.flushed;
    self.worth = true;
    res
  }

  /// Committed region is larger than the configured capacity.
  pub fn overgrown(&self) -> bool {
    self.capacity > 0 && self.buffer.len() > self.capacity
  }

  pub fn lines_buffered(&self) -> u64 {
    self.lines - self.flushed
  }

  pub fn lines_written(&self) -> u64 {
    self.flushed
  }

  pub fn buffered(&self) -> &[u8] {
    &self.buffer
  }

  pub fn partial(&self) -> &[u8] {
    &self.carry
  }

  pub fn capacity(&self) -> usize {
    self.capacity
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

  fn commit(&mut self, line: &[u8]) -> io::Result<()> {
    if !self.deferred
      && self.capacity > 0
      && self.buffer.len() + line.len() > self.capacity
    {
      self.worth = false;
      self.flush_lines()?;
    }
    self.buffer.extend_from_slice(line);
    self.lines += 1;
    Ok(())
  }
}

impl<W: Write> Write for LineWriter<W> {
  fn write(&mut self, data: &[u8]) -> io::Result<usize> {
    let mut rest = data;
    while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
      let (line, tail) = rest.split_at(pos + 1);
      if self.carry.is_empty() {
        self.commit(line)?;
      } else {
        self.carry.extend_from_slice(line);
        let joined = std::mem::take(&mut self.carry);
        let res = self.commit(&joined);
        self.carry = joined;
        self.carry.clear();
        res?;
      }
      rest = tail;
    }
    self.carry.extend_from_slice(rest);
    Ok(data.len())
  }

  /// Pushes committed lines down and flushes the inner writer.
  fn flush(&mut self) -> io::Result<()> {
    self.flush_lines()?;
    self.inner.flush()
  }
}

impl<W: Write> StateDump for LineWriter<W> {
  fn dump_state(&self, enc: &mut StateEncoder<'_>) -> io::Result<()> {
    enc.len(self.capacity);
    enc.bytes(&self.buffer);
    enc.bytes(&self.carry);
    enc.u64(self.lines);
    enc.u64(self.flushed);
    enc.u64(self.previous);
    enc.bool(self.worth);
    Ok(())
  }

  fn restore_state(&mut self, dec: &mut StateDecoder<'_>) -> Result<(), RestoreError> {
    let capacity = dec.len("line capacity")?;
    let buffer = dec.bytes("line buffer")?;
    let carry = dec.bytes("line carry")?;
    let lines = dec.u64("line count")?;
    let flushed = dec.u64("flushed line count")?;
    let previous = dec.u64("previous line count")?;
    let worth = dec.bool("line worth flushing")?;

    self.capacity = capacity;
    self.buffer.clear();
    self.buffer.extend_from_slice(buffer);
    self.carry.clear();
    self.carry.extend_from_slice(carry);
    self.lines = lines;
    self.flushed = flushed;
    self.previous = previous;
    self.worth = worth;
    Ok(())
  }
}
