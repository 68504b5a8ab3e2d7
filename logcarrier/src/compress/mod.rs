//! Compression stream adapter.
//!
//! Sits between the line writer and the frame writer. Compressed output of
//! one stream is kept in memory and handed downstream as a single frame when
//! the stream is closed, after which a fresh encoder is built. Concatenated
//! gzip members, zstd frames and lz4 frames are all readable by the stock
//! tools.
//!
//! `Raw` is the identity: every write is forwarded as its own frame.


use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

use crate::binenc::{StateDecoder, StateEncoder};
use crate::snapshot::{RestoreError, StateDump};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
  #[default]
  Raw,
  Gzip,
  Zstd,
  Lz4,
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Method::Raw => "raw",
      Method::Gzip => "gzip",
      Method::Zstd => "zstd",
      Method::Lz4 => "lz4",
    };
    f.write_str(name)
  }
}

/// Compression method and level. Out of range levels are clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
  pub method: Method,
  pub level: i32,
}

impl Codec {
  pub fn new(method: Method, level: i32) -> Self {
    Self { method, level }
  }

  pub fn raw() -> Self {
    Self::new(Method::Raw, 0)
  }

  /// Whether the encoder keeps state between writes.
  pub fn is_stateful(&self) -> bool {
    self.method != Method::Raw
  }

  fn encoder(&self) -> io::Result<Encoder> {
    let sink = Vec::new();
    Ok(match self.method {
      Method::Raw => Encoder::Raw,
      Method::Gzip => {
        let level = self.level.clamp(0, 9) as u32;
        Encoder::Gzip(GzEncoder::new(sink, flate2::Compression::new(level)))
      },
      Method::Zstd => {
        let (min, max) = (1, zstd::zstd_safe::max_c_level());
        Encoder::Zstd(zstd::stream::write::Encoder::new(sink, self.level.clamp(min, max))?)
      },
      Method::Lz4 => {
        let level = self.level.clamp(0, 16) as u32;
        Encoder::Lz4(lz4::EncoderBuilder::new().level(level).build(sink)?)
      },
    })
  }
}

enum Encoder {
  Raw,
  Gzip(GzEncoder<Vec<u8>>),
  Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
  Lz4(lz4::Encoder<Vec<u8>>),
}

impl Encoder {
  fn finish(self) -> io::Result<Vec<u8>> {
    match self {
      Encoder::Raw => Ok(Vec::new()),
      Encoder::Gzip(e) => e.finish(),
      Encoder::Zstd(e) => e.finish(),
      Encoder::Lz4(e) => {
        let (out, res) = e.finish();
        res.map(|_| out)
      },
    }
  }
}

pub struct CompressedWriter<W: Write> {
  codec: Codec,
  encoder: Encoder,
  inner: W,
  pending: u64,
  /// A finished frame the inner writer refused; handed down first next time.
  stashed: Vec<u8>,
}

impl<W: Write> CompressedWriter<W> {
  pub fn new(inner: W, codec: Codec) -> io::Result<Self> {
    Ok(Self {
      encoder: codec.encoder()?,
      codec,
      inner,
      pending: 0,
      stashed: Vec::new(),
    })
  }

  pub fn codec(&self) -> Codec {
    self.codec
  }

  /// Uncompressed bytes accepted since the current stream was started.
  pub fn pending(&self) -> u64 {
    self.pending
  }

  /// Bytes of a finished frame still waiting to go downstream.
  pub fn stashed(&self) -> usize {
    self.stashed.len()
  }

  /// Finishes the current stream, writes it downstream as one frame and
  /// starts a new one. Does nothing when the stream received no data.
  ///
  /// A frame the inner writer rejects is kept and written again by the next
  /// `close`, ahead of any newer frame.
  pub fn close(&mut self) -> io::Result<()> {
    self.hand_down()?;
    if self.pending == 0 {
      return Ok(());
    }
    let fresh = self.codec.encoder()?;
    self.stashed = std::mem::replace(&mut self.encoder, fresh).finish()?;
    self.pending = 0;
    self.hand_down()
  }

  fn hand_down(&mut self) -> io::Result<()> {
    if !self.stashed.is_empty() {
      self.inner.write_all(&self.stashed)?;
      self.stashed.clear();
    }
    Ok(())
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

impl<W: Write> Write for CompressedWriter<W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let n = match &mut self.encoder {
      Encoder::Raw => return self.inner.write(buf),
      Encoder::Gzip(e) => e.write(buf)?,
      Encoder::Zstd(e) => e.write(buf)?,
      Encoder::Lz4(e) => e.write(buf)?,
    };
    self.pending += n as u64;
    Ok(n)
  }

  /// Flushes the inner writer only; the current stream stays open.
  fn flush(&mut self) -> io::Result<()> {
    self.inner.flush()
  }
}

impl<W: Write> StateDump for CompressedWriter<W> {
  fn dump_state(&self, enc: &mut StateEncoder<'_>) -> io::Result<()> {
    enc.u64(self.pending);
    Ok(())
  }

  fn restore_state(&mut self, dec: &mut StateDecoder<'_>) -> Result<(), RestoreError> {
    let pending = dec.u64("compressed pending")?;
    debug_assert!(
      !self.codec.is_stateful() || pending == self.pending,
      "compressor received data inside a revocable transfer"
    );
    self.pending = pending;
    Ok(())
  }
}
