//! Handles guided `ROTATE` requests: close the destination, rename its file,
//! answer `200 DONE` or `400 Error`.

mod __test__;

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use crate::conn::{reply, Reply};
use crate::paths::DestinationKey;
use crate::pool::Worker;
use crate::registry::FileRegistry;

pub struct LogrotateJob {
  pub key: DestinationKey,
  pub new_name: Option<String>,
  pub stream: TcpStream,
  pub peer: SocketAddr,
}

pub struct RotateWorker {
  registry: Arc<FileRegistry>,
  wait_timeout: Duration,
}

impl RotateWorker {
  pub fn new(registry: Arc<FileRegistry>, wait_timeout: Duration) -> Self {
    Self {
      registry,
      wait_timeout,
    }
  }
}

impl Worker for RotateWorker {
  type Job = LogrotateJob;

  fn handle(&mut self, job: LogrotateJob) {
    let LogrotateJob {
      key,
      new_name,
      mut stream,
      peer,
    } = job;

    let answer = match self.registry.rotate(&key, new_name.as_deref()) {
      Ok(renamed) => {
        tracing::info!(%peer, key = %key, renamed, "rotation done");
        Reply::Done
      },
      Err(e) => {
        tracing::warn!(%peer, error = %e, "rotation failed");
        Reply::Error
      },
    };
    if let Err(e) = stream.set_write_timeout(Some(self.wait_timeout)) {
      tracing::debug!(%peer, error = %e, "failed to set write deadline");
    }
    if let Err(e) = reply(&mut stream, answer) {
      tracing::debug!(%peer, error = %e, "failed to send rotation reply");
    }
  }
}
