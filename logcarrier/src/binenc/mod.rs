//! Little-endian encoding of primitive fields for chain state dumps.
//!
//! Layout rules:
//!
//! ```text
//! u8 / bool      1 byte (bool is 0 or 1)
//! u32            4 bytes LE  (capacities, lengths)
//! u64            8 bytes LE  (counters)
//! i64            8 bytes LE  (file offsets)
//! bytes          [len: u32 LE][raw bytes]
//! ```
//!
//! The format is process-local: it only needs to survive from the moment a
//! dump worker takes a snapshot until it either discards or restores it.


use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use thiserror::Error;

/// Errors produced while decoding a state dump.
#[derive(Debug, Error)]
pub enum CodecError {
  #[error("state dump truncated while reading {0}")]
  Truncated(&'static str),

  #[error("invalid boolean byte {0:#04x}")]
  InvalidBool(u8),

  #[error("{0} is out of range for this platform")]
  OutOfRange(&'static str),

  #[error("{0} trailing bytes after state dump")]
  Trailing(usize),
}

/// Appends fields to a borrowed byte vector.
pub struct StateEncoder<'a> {
  out: &'a mut Vec<u8>,
}

impl<'a> StateEncoder<'a> {
  pub fn new(out: &'a mut Vec<u8>) -> Self {
    Self { out }
  }

  pub fn u8(&mut self, v: u8) {
    self.out.push(v);
  }

  pub fn bool(&mut self, v: bool) {
    self.out.push(v as u8);
  }

  pub fn u32(&mut self, v: u32) {
    // Writing into a Vec never fails.
    let _ = self.out.write_u32::<LittleEndian>(v);
  }

  pub fn u64(&mut self, v: u64) {
    let _ = self.out.write_u64::<LittleEndian>(v);
  }

  pub fn i64(&mut self, v: i64) {
    let _ = self.out.write_i64::<LittleEndian>(v);
  }

  /// Length-prefixed byte string. Lengths above `u32::MAX` cannot occur for
  /// chain buffers, which are sized by 32-bit configuration values.
  pub fn bytes(&mut self, v: &[u8]) {
    self.u32(v.len() as u32);
    self.out.extend_from_slice(v);
  }

  /// Encodes a `usize` as a 32-bit length or capacity.
  pub fn len(&mut self, v: usize) {
    self.u32(v as u32);
  }

  pub fn written(&self) -> usize {
    self.out.len()
  }
}

/// Reads fields back in the order they were encoded.
pub struct StateDecoder<'a> {
  src: &'a [u8],
}

impl<'a> StateDecoder<'a> {
  pub fn new(src: &'a [u8]) -> Self {
    Self { src }
  }

  pub fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
    self.src.read_u8().map_err(|e| truncated(e, field))
  }

  pub fn bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
    match self.u8(field)? {
      0 => Ok(false),
      1 => Ok(true),
      other => Err(CodecError::InvalidBool(other)),
    }
  }

  pub fn u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
    self
      .src
      .read_u32::<LittleEndian>()
      .map_err(|e| truncated(e, field))
  }

  pub fn u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
    self
      .src
      .read_u64::<LittleEndian>()
      .map_err(|e| truncated(e, field))
  }

  pub fn i64(&mut self, field: &'static str) -> Result<i64, CodecError> {
    self
      .src
      .read_i64::<LittleEndian>()
      .map_err(|e| truncated(e, field))
  }

  pub fn len(&mut self, field: &'static str) -> Result<usize, CodecError> {
    let v = self.u32(field)?;
    usize::try_from(v).map_err(|_| CodecError::OutOfRange(field))
  }

  /// Borrows a length-prefixed byte string from the source.
  pub fn bytes(&mut self, field: &'static str) -> Result<&'a [u8], CodecError> {
    let n = self.len(field)?;
    if self.src.len() < n {
      return Err(CodecError::Truncated(field));
    }
    let (head, tail) = self.src.split_at(n);
    self.src = tail;
    Ok(head)
  }

  pub fn remaining(&self) -> usize {
    self.src.len()
  }

  /// Fails if anything is left unread.
  pub fn finish(self) -> Result<(), CodecError> {
    match self.src.len() {
      0 => Ok(()),
      n => Err(CodecError::Trailing(n)),
    }
  }
}

fn truncated(_: io::Error, field: &'static str) -> CodecError {
  CodecError::Truncated(field)
}
