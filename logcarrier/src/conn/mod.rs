//! Connection plumbing shared by the workers: reply codes, per-read
//! deadlines and a reusable line scanner.


use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Everything the server ever says.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
  Ready,
  ReadyProtocol2,
  Ok,
  Done,
  Error,
}

impl Reply {
  pub fn as_bytes(&self) -> &'static [u8] {
    match self {
      Reply::Ready => b"200 READY\n",
      Reply::ReadyProtocol2 => b"200 READY protocol 2\n",
      Reply::Ok => b"200 OK\n",
      Reply::Done => b"200 DONE\n",
      Reply::Error => b"400 Error\n",
    }
  }
}

pub fn reply<W: Write>(conn: &mut W, reply: Reply) -> io::Result<()> {
  conn.write_all(reply.as_bytes())?;
  conn.flush()
}

/// Every read and write on `stream` gets its own `timeout`, so a client that
/// keeps sending never hits it while a stalled one does.
pub fn set_deadlines(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
  stream.set_read_timeout(Some(timeout))?;
  stream.set_write_timeout(Some(timeout))
}

/// Buffered line reader that is reused across connections.
///
/// Lines are returned with their `\n`. A final line without one is returned
/// at end of stream. Bytes read past a line stay buffered and can be handed
/// on with [`LineScanner::buffered`] or consumed with
/// [`LineScanner::read_some`].
pub struct LineScanner {
  buf: Vec<u8>,
  pos: usize,
  filled: usize,
  line: Vec<u8>,
  limit: usize,
}

impl LineScanner {
  pub fn new(capacity: usize) -> Self {
    Self {
      buf: vec![0; capacity.max(1)],
      pos: 0,
      filled: 0,
      line: Vec::new(),
      limit: 0,
    }
  }

  /// Lines longer than `limit` fail with `InvalidData`. Zero means no limit.
  pub fn with_line_limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }

  pub fn reset(&mut self) {
    self.pos = 0;
    self.filled = 0;
    self.line.clear();
  }

  /// Starts over with `data` as the first bytes to hand out.
  pub fn preload(&mut self, data: &[u8]) {
    self.reset();
    if data.len() > self.buf.len() {
      self.buf.resize(data.len(), 0);
    }
    self.buf[..data.len()].copy_from_slice(data);
    self.filled = data.len();
  }

  pub fn buffered(&self) -> &[u8] {
    &self.buf[self.pos..self.filled]
  }

  fn fill<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
    loop {
      match reader.read(&mut self.buf) {
        Ok(n) => {
          self.pos = 0;
          self.filled = n;
          return Ok(n);
        },
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      }
    }
  }

  pub fn read_line<R: Read>(&mut self, reader: &mut R) -> io::Result<Option<&[u8]>> {
    self.line.clear();
    loop {
      if self.pos < self.filled {
        let avail = &self.buf[self.pos..self.filled];
        if let Some(i) = avail.iter().position(|&b| b == b'\n') {
          let start = self.pos;
          self.pos += i + 1;
          if self.line.is_empty() {
            self.check_limit(self.pos - start)?;
            return Ok(Some(&self.buf[start..self.pos]));
          }
          self.line.extend_from_slice(&self.buf[start..self.pos]);
          self.check_limit(self.line.len())?;
          return Ok(Some(&self.line));
        }
        self.line.extend_from_slice(avail);
        self.pos = self.filled;
        self.check_limit(self.line.len())?;
      }

      if self.fill(reader)? == 0 {
        if self.line.is_empty() {
          return Ok(None);
        }
        return Ok(Some(&self.line));
      }
    }
  }

  /// Reads into `out`, serving buffered bytes before touching `reader`.
  pub fn read_some<R: Read>(&mut self, reader: &mut R, out: &mut [u8]) -> io::Result<usize> {
    if self.pos < self.filled {
      let n = out.len().min(self.filled - self.pos);
      out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
      self.pos += n;
      return Ok(n);
    }
    loop {
      match reader.read(out) {
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        res => return res,
      }
    }
  }

  fn check_limit(&self, len: usize) -> io::Result<()> {
    if self.limit > 0 && len > self.limit {
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line longer than {} bytes", self.limit),
      ));
    }
    Ok(())
  }
}
