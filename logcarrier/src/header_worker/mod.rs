//! Reads the control line of a new connection and routes it.
//!
//! ```text
//! HeaderJob --read line--> parse --check key, paths--> DATA   -> mkdir, DumpJob
//!                                                      ROTATE -> LogrotateJob
//!                                                      other  -> close
//! ```
//!
//! Requests that fail parsing, carry the wrong key or point outside the
//! storage root are closed without a reply.


use crossbeam_channel::Sender;
use std::collections::HashSet;
use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::conn::{reply, set_deadlines, LineScanner, Reply};
use crate::dump::DumpJob;
use crate::error::CarrierError;
use crate::header::{self, Command, Header, Protocol};
use crate::paths::{is_safe_dir, is_safe_name, DestinationKey, PathScheme};
use crate::pool::Worker;
use crate::rotate::LogrotateJob;

const HEADER_BUFFER: usize = 1024;
const HEADER_LIMIT: usize = 4096;

pub struct HeaderJob {
  pub stream: TcpStream,
  pub peer: SocketAddr,
}

/// Settings shared by every header worker.
pub struct RouteSettings {
  pub key: String,
  pub scheme: Arc<PathScheme>,
  pub dir_mode: u32,
  pub wait_timeout: Duration,
  pub guided_rotation: bool,
}

enum Route {
  Dump {
    key: DestinationKey,
    protocol: Protocol,
  },
  Rotate {
    key: DestinationKey,
    new_name: Option<String>,
  },
  Refuse,
}

enum Rejection {
  WrongKey,
  UnsafePath,
  UnknownCommand(String),
}

impl fmt::Display for Rejection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Rejection::WrongKey => f.write_str("wrong key"),
      Rejection::UnsafePath => f.write_str("path escapes the storage root"),
      Rejection::UnknownCommand(cmd) => write!(f, "unknown command `{}`", cmd),
    }
  }
}

pub struct HeaderWorker {
  settings: Arc<RouteSettings>,
  scanner: LineScanner,
  dumps: Sender<DumpJob>,
  rotations: Sender<LogrotateJob>,
  known_dirs: HashSet<String>,
}

impl HeaderWorker {
  pub fn new(
    settings: Arc<RouteSettings>,
    dumps: Sender<DumpJob>,
    rotations: Sender<LogrotateJob>,
  ) -> Self {
    Self {
      settings,
      scanner: LineScanner::new(HEADER_BUFFER).with_line_limit(HEADER_LIMIT),
      dumps,
      rotations,
      known_dirs: HashSet::new(),
    }
  }

  fn route(settings: &RouteSettings, header: &Header<'_>) -> Result<Route, Rejection> {
    if header.key != settings.key {
      return Err(Rejection::WrongKey);
    }
    if !is_safe_dir(header.dir) || !is_safe_name(header.name) || !is_safe_name(header.group) {
      return Err(Rejection::UnsafePath);
    }
    let key = DestinationKey::new(header.dir, header.name, header.group);
    match header.command {
      Command::Data => Ok(Route::Dump {
        key,
        protocol: header.protocol(),
      }),
      Command::Rotate if !settings.guided_rotation => Ok(Route::Refuse),
      Command::Rotate => {
        if let Some(name) = header.new_name {
          if !is_safe_name(name) {
            return Err(Rejection::UnsafePath);
          }
        }
        Ok(Route::Rotate {
          key,
          new_name: header.new_name.map(str::to_string),
        })
      },
      Command::Other(cmd) => Err(Rejection::UnknownCommand(cmd.to_string())),
    }
  }

  fn ensure_dir(&mut self, dir: &str) -> io::Result<PathBuf> {
    let path = self.settings.scheme.directory(dir);
    if !self.known_dirs.contains(dir) {
      DirBuilder::new()
        .recursive(true)
        .mode(self.settings.dir_mode)
        .create(&path)?;
      self.known_dirs.insert(dir.to_string());
    }
    Ok(path)
  }
}

impl Worker for HeaderWorker {
  type Job = HeaderJob;

  fn handle(&mut self, job: HeaderJob) {
    let HeaderJob { mut stream, peer } = job;
    if let Err(e) = set_deadlines(&stream, self.settings.wait_timeout) {
      tracing::warn!(%peer, error = %e, "failed to set connection deadlines");
      return;
    }

    self.scanner.reset();
    let line = match self.scanner.read_line(&mut stream) {
      Ok(Some(line)) => line,
      Ok(None) => {
        tracing::debug!(%peer, "connection closed before a header arrived");
        return;
      },
      Err(e) => {
        tracing::warn!(%peer, error = %e, "failed to read header");
        return;
      },
    };
    let route = match header::parse(line) {
      Ok(header) => Self::route(&self.settings, &header),
      Err(e) => {
        tracing::warn!(%peer, error = %CarrierError::from(e), "closing connection");
        return;
      },
    };
    let route = match route {
      Ok(route) => route,
      Err(rejection) => {
        tracing::warn!(%peer, reason = %rejection, "closing connection");
        return;
      },
    };
    let prefetched = self.scanner.buffered().to_vec();

    match route {
      Route::Dump { key, protocol } => {
        if let Err(e) = self.ensure_dir(key.dir()) {
          tracing::error!(%peer, key = %key, error = %e, "couldn't create directory");
          let _ = reply(&mut stream, Reply::Error);
          return;
        }
        let job = DumpJob {
          key,
          protocol,
          stream,
          peer,
          prefetched,
        };
        if self.dumps.send(job).is_err() {
          tracing::warn!(%peer, "dump pool is gone, dropping connection");
        }
      },
      Route::Rotate { key, new_name } => {
        let job = LogrotateJob {
          key,
          new_name,
          stream,
          peer,
        };
        if self.rotations.send(job).is_err() {
          tracing::warn!(%peer, "logrotate pool is gone, dropping connection");
        }
      },
      Route::Refuse => {
        tracing::info!(%peer, "guided rotation is disabled");
        let _ = reply(&mut stream, Reply::Error);
      },
    }
  }
}
