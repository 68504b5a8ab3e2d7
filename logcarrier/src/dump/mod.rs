//! # Dump Worker
//!
//! Streams one DATA payload into its destination as a transaction.
//!
//! ```text
//! lock entry
//!   dump chain state ─┐
//!   200 READY [...]   │ any failure: restore state, truncate file
//!   receive payload   │
//!   post_write       ─┘
//! unlock entry
//! 200 OK | 400 Error
//! ```
//!
//! The `READY` reply is only sent once the entry lock is held, so two
//! clients writing to the same destination are serialized and the second
//! one waits before it starts sending.

mod __test__;

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::chain::Chain;
use crate::conn::{reply, set_deadlines, LineScanner, Reply};
use crate::error::CarrierError;
use crate::header::Protocol;
use crate::paths::DestinationKey;
use crate::pool::Worker;
use crate::registry::FileRegistry;
use crate::snapshot::Snapshot;

pub struct DumpJob {
  pub key: DestinationKey,
  pub protocol: Protocol,
  pub stream: TcpStream,
  pub peer: SocketAddr,
  /// Payload bytes that arrived together with the header.
  pub prefetched: Vec<u8>,
}

/// What one successful transfer carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transfer {
  pub bytes: u64,
  pub lines: u64,
}

pub struct DumpWorker {
  registry: Arc<FileRegistry>,
  wait_timeout: Duration,
  scanner: LineScanner,
  chunk: Vec<u8>,
  snapshot: Snapshot,
}

impl DumpWorker {
  pub fn new(registry: Arc<FileRegistry>, wait_timeout: Duration, buffer: usize) -> Self {
    let buffer = buffer.max(1);
    Self {
      registry,
      wait_timeout,
      scanner: LineScanner::new(buffer),
      chunk: vec![0; buffer],
      snapshot: Snapshot::new(),
    }
  }

  fn transaction(
    &mut self,
    chain: &mut Chain,
    protocol: Protocol,
    stream: &mut TcpStream,
    prefetched: &[u8],
  ) -> Result<Transfer, CarrierError> {
    chain
      .dump_state(&mut self.snapshot)
      .map_err(|e| CarrierError::persistence(chain.key(), e))?;

    let received = match self.receive(chain, protocol, stream, prefetched) {
      Ok(transfer) => chain.post_write().map(|_| transfer),
      Err(e) => Err(e),
    };
    match received {
      Ok(transfer) => Ok(transfer),
      Err(e) => {
        if let Err(re) = chain.restore_state(&self.snapshot) {
          tracing::error!(key = %chain.key(), error = %re, "rollback failed");
        }
        Err(CarrierError::transfer(chain.key(), e))
      },
    }
  }

  fn receive(
    &mut self,
    chain: &mut Chain,
    protocol: Protocol,
    stream: &mut TcpStream,
    prefetched: &[u8],
  ) -> io::Result<Transfer> {
    set_deadlines(stream, self.wait_timeout)?;
    self.scanner.preload(prefetched);

    match protocol {
      Protocol::Sized(size) => {
        reply(stream, Reply::ReadyProtocol2)?;
        let mut left = size;
        while left > 0 {
          let want = left.min(self.chunk.len() as u64) as usize;
          let n = self.scanner.read_some(stream, &mut self.chunk[..want])?;
          if n == 0 {
            return Err(io::Error::new(
              io::ErrorKind::UnexpectedEof,
              format!("connection closed with {} of {} bytes outstanding", left, size),
            ));
          }
          chain.write(&self.chunk[..n])?;
          left -= n as u64;
        }
        Ok(Transfer {
          bytes: size,
          lines: 0,
        })
      },
      Protocol::Lines => {
        reply(stream, Reply::Ready)?;
        let mut transfer = Transfer::default();
        loop {
          let Some(line) = self.scanner.read_line(stream)? else {
            return Err(io::Error::new(
              io::ErrorKind::UnexpectedEof,
              "connection closed before the terminating dot",
            ));
          };
          let payload = match line.split_first() {
            Some((b'.', rest)) if rest.iter().all(|&b| b == b'\r' || b == b'\n') => break,
            Some((b'.', rest)) => rest,
            _ => line,
          };
          chain.write(payload)?;
          transfer.bytes += payload.len() as u64;
          transfer.lines += 1;
        }
        Ok(transfer)
      },
    }
  }
}

impl Worker for DumpWorker {
  type Job = DumpJob;

  fn handle(&mut self, job: DumpJob) {
    let DumpJob {
      key,
      protocol,
      mut stream,
      peer,
      prefetched,
    } = job;

    let entry = match self.registry.get_or_create(&key) {
      Ok(entry) => entry,
      Err(e) => {
        tracing::error!(%peer, error = %e, "cannot open destination");
        let _ = reply(&mut stream, Reply::Error);
        return;
      },
    };

    let outcome = match entry.lock() {
      Ok(mut chain) => self.transaction(&mut chain, protocol, &mut stream, &prefetched),
      Err(e) => Err(e),
    };

    let answer = match outcome {
      Ok(transfer) => {
        tracing::info!(
          %peer,
          key = %key,
          bytes = transfer.bytes,
          lines = transfer.lines,
          "dump complete"
        );
        Reply::Ok
      },
      Err(e) => {
        tracing::warn!(%peer, error = %e, "dump rolled back");
        Reply::Error
      },
    };
    if let Err(e) = reply(&mut stream, answer) {
      tracing::debug!(%peer, error = %e, "failed to send final reply");
    }
  }
}
