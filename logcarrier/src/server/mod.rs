//! # Server
//!
//! Wires the listener, the three pools and the registry together.
//!
//! ```text
//! acceptor --HeaderJob--> [route pool] --DumpJob------> [dumper pool]     --> registry
//!                                      --LogrotateJob-> [logrotater pool] --> registry
//! registry: flusher loop, cron rotation loop
//! ```
//!
//! Shutdown runs front to back: the acceptor stops taking connections,
//! every pool finishes the jobs it is running, and the registry writes out
//! whatever is still buffered.


use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::dump::DumpWorker;
use crate::header_worker::{HeaderJob, HeaderWorker};
use crate::periodic::{self, ScheduleError};
use crate::pool::WorkerPool;
use crate::registry::{FileRegistry, SchemeFactory};
use crate::rotate::RotateWorker;

/// Why the daemon should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shutdown {
  Interrupted,
  Panicked(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Schedule(#[from] ScheduleError),

  #[error("cannot listen on {addr}: {source}")]
  Bind {
    addr: SocketAddr,
    #[source]
    source: io::Error,
  },

  #[error("failed to start a server thread: {0}")]
  Spawn(#[from] io::Error),
}

pub struct Server {
  addr: SocketAddr,
  registry: Arc<FileRegistry>,
  stopping: Arc<AtomicBool>,
  acceptor: Option<JoinHandle<()>>,
  headers: WorkerPool<HeaderWorker>,
  dumps: WorkerPool<DumpWorker>,
  rotations: WorkerPool<RotateWorker>,
}

impl Server {
  pub fn start(config: &Config) -> Result<Self, ServerError> {
    config.validate()?;
    let scheme = config.scheme()?;
    let ticks = if config.logrotate.method.periodic() {
      Some(periodic::schedule(&config.logrotate.schedule)?)
    } else {
      None
    };
    let listener = TcpListener::bind(config.listen).map_err(|source| ServerError::Bind {
      addr: config.listen,
      source,
    })?;
    let addr = listener.local_addr()?;

    let registry = Arc::new(FileRegistry::new(SchemeFactory::new(
      scheme.clone(),
      config.chain_config(),
    )));
    let settings = Arc::new(config.route_settings(Arc::new(scheme)));

    let wait_timeout = config.wait_timeout;
    let input = config.buffers.input.as_usize();
    let mut dumps = WorkerPool::new("dumper", config.buffers.dumps, {
      let registry = Arc::clone(&registry);
      move || DumpWorker::new(Arc::clone(&registry), wait_timeout, input)
    });
    dumps.spawn_many(config.workers.dumper)?;

    let mut rotations = WorkerPool::new("logrotater", config.buffers.logrotates, {
      let registry = Arc::clone(&registry);
      move || RotateWorker::new(Arc::clone(&registry), wait_timeout)
    });
    rotations.spawn_many(config.workers.logrotater)?;

    let mut headers = WorkerPool::new("route", config.buffers.connections, {
      let dump_tx = dumps.sender();
      let rotate_tx = rotations.sender();
      move || HeaderWorker::new(Arc::clone(&settings), dump_tx.clone(), rotate_tx.clone())
    });
    headers.spawn_many(config.workers.route)?;

    registry.flush_periodic(config.workers.flusher_sleep)?;
    if let Some(ticks) = ticks {
      registry.rotate_periodic(ticks)?;
    }

    let stopping = Arc::new(AtomicBool::new(false));
    let acceptor = {
      let stopping = Arc::clone(&stopping);
      let jobs = headers.sender();
      thread::Builder::new()
        .name("acceptor".to_string())
        .spawn(move || {
          for conn in listener.incoming() {
            if stopping.load(Ordering::SeqCst) {
              break;
            }
            let stream = match conn {
              Ok(stream) => stream,
              Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
              },
            };
            let peer = match stream.peer_addr() {
              Ok(peer) => peer,
              Err(e) => {
                tracing::debug!(error = %e, "peer went away before routing");
                continue;
              },
            };
            if jobs.send(HeaderJob { stream, peer }).is_err() {
              break;
            }
          }
        })?
    };

    tracing::info!(
      listen = %addr,
      root = %config.files.root.display(),
      compression = %config.compression.method,
      "logcarrier started"
    );
    Ok(Self {
      addr,
      registry,
      stopping,
      acceptor: Some(acceptor),
      headers,
      dumps,
      rotations,
    })
  }

  pub fn local_addr(&self) -> SocketAddr {
    self.addr
  }

  pub fn registry(&self) -> &Arc<FileRegistry> {
    &self.registry
  }

  /// Stops accepting, drains the pools in pipeline order and writes out
  /// every destination.
  pub fn shutdown(mut self) {
    tracing::info!("shutting down");
    self.stopping.store(true, Ordering::SeqCst);
    if let Some(acceptor) = self.acceptor.take() {
      // wake the blocking accept
      if let Err(e) = TcpStream::connect(self.wake_addr()) {
        tracing::warn!(error = %e, "could not wake the acceptor");
      }
      if acceptor.join().is_err() {
        tracing::error!("acceptor panicked");
      }
    }
    self.headers.stop();
    self.dumps.stop();
    self.rotations.stop();
    self.registry.shutdown();
    tracing::info!("logcarrier stopped");
  }

  fn wake_addr(&self) -> SocketAddr {
    let ip = match self.addr.ip() {
      IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
      IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
      ip => ip,
    };
    SocketAddr::new(ip, self.addr.port())
  }
}
