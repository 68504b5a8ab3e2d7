//! # File Registry
//!
//! Maps destination keys to their chains and owns the background loops that
//! flush and rotate them.
//!
//! ## Locking
//!
//! - The key map is guarded by one mutex held only for lookup and insert
//!   (the factory runs under it; chain construction opens no files).
//! - Every entry has its own mutex. Dump and rotate workers block on it;
//!   the periodic flusher only tries it and skips busy entries.
//! - Entries are never removed while the process runs.
//!
//! ## Background loops
//!
//! ```text
//! flush_periodic(interval)  tick -> try-lock each entry -> chain.flush()
//! rotate_periodic(ticks)    tick -> lock each entry -> close + rotate
//! shutdown()                stop loops, join them, finish every chain
//! ```


use crossbeam_channel::{select, Receiver, Sender};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::chain::{Chain, ChainConfig};
use crate::error::{CarrierError, Result};
use crate::paths::{DestinationKey, PathScheme};

/// Builds the chain of a destination seen for the first time.
pub trait ChainFactory: Send + Sync {
  fn create(&self, key: &DestinationKey) -> io::Result<Chain>;
}

/// Factory producing chains laid out by a [`PathScheme`].
pub struct SchemeFactory {
  scheme: Arc<PathScheme>,
  config: ChainConfig,
}

impl SchemeFactory {
  pub fn new(scheme: PathScheme, config: ChainConfig) -> Self {
    Self {
      scheme: Arc::new(scheme),
      config,
    }
  }
}

impl ChainFactory for SchemeFactory {
  fn create(&self, key: &DestinationKey) -> io::Result<Chain> {
    Chain::new(key.clone(), Arc::clone(&self.scheme), &self.config)
  }
}

pub struct Entry {
  key: DestinationKey,
  chain: Mutex<Chain>,
}

impl Entry {
  pub fn key(&self) -> &DestinationKey {
    &self.key
  }

  /// Fails with `Poisoned` once a thread panicked while holding the entry:
  /// its chain may be half rolled back and is never touched again.
  pub fn lock(&self) -> Result<MutexGuard<'_, Chain>> {
    self.chain.lock().map_err(|_| self.poisoned())
  }

  /// `Ok(None)` when another thread holds the entry.
  pub fn try_lock(&self) -> Result<Option<MutexGuard<'_, Chain>>> {
    match self.chain.try_lock() {
      Ok(guard) => Ok(Some(guard)),
      Err(TryLockError::WouldBlock) => Ok(None),
      Err(TryLockError::Poisoned(_)) => Err(self.poisoned()),
    }
  }

  pub fn is_poisoned(&self) -> bool {
    self.chain.is_poisoned()
  }

  fn poisoned(&self) -> CarrierError {
    CarrierError::Poisoned(self.key.to_string())
  }
}

/// Outcome of one pass of the periodic flusher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
  pub flushed: usize,
  pub skipped: usize,
  pub failed: usize,
}

pub struct FileRegistry {
  factory: Box<dyn ChainFactory>,
  entries: Mutex<HashMap<DestinationKey, Arc<Entry>>>,
  stop_tx: Mutex<Option<Sender<()>>>,
  stop_rx: Receiver<()>,
  loops: Mutex<Vec<JoinHandle<()>>>,
}

impl FileRegistry {
  pub fn new(factory: impl ChainFactory + 'static) -> Self {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
    Self {
      factory: Box::new(factory),
      entries: Mutex::new(HashMap::new()),
      stop_tx: Mutex::new(Some(stop_tx)),
      stop_rx,
      loops: Mutex::new(Vec::new()),
    }
  }

  fn map(&self) -> MutexGuard<'_, HashMap<DestinationKey, Arc<Entry>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn all(&self) -> Vec<Arc<Entry>> {
    self.map().values().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.map().len()
  }

  pub fn is_empty(&self) -> bool {
    self.map().is_empty()
  }

  pub fn get(&self, key: &DestinationKey) -> Option<Arc<Entry>> {
    self.map().get(key).cloned()
  }

  pub fn get_or_create(&self, key: &DestinationKey) -> Result<Arc<Entry>> {
    let mut map = self.map();
    if let Some(entry) = map.get(key) {
      return Ok(Arc::clone(entry));
    }
    let chain = self
      .factory
      .create(key)
      .map_err(|e| CarrierError::persistence(key, e))?;
    let entry = Arc::new(Entry {
      key: key.clone(),
      chain: Mutex::new(chain),
    });
    map.insert(key.clone(), Arc::clone(&entry));
    tracing::debug!(key = %key, "registered destination");
    Ok(entry)
  }

  /// Appends `data` to the destination under its lock.
  pub fn write(&self, key: &DestinationKey, data: &[u8]) -> Result<()> {
    let entry = self.get_or_create(key)?;
    let mut chain = entry.lock()?;
    let res = match chain.write(data) {
      Ok(()) => chain.post_write(),
      Err(e) => Err(e),
    };
    res.map_err(|e| CarrierError::persistence(key, e))
  }

  /// Closes and rotates one destination. `Ok(false)` means it had nothing
  /// new since the previous rotation.
  pub fn rotate(&self, key: &DestinationKey, explicit: Option<&str>) -> Result<bool> {
    let entry = self
      .get(key)
      .ok_or_else(|| CarrierError::UnknownDestination(key.to_string()))?;
    Self::rotate_entry(&entry, explicit)
  }

  fn rotate_entry(entry: &Entry, explicit: Option<&str>) -> Result<bool> {
    let mut chain = entry.lock()?;
    chain
      .close()
      .map_err(|e| CarrierError::persistence(entry.key(), e))?;
    chain
      .rotate(explicit)
      .map_err(|e| CarrierError::persistence(entry.key(), e))
  }

  /// Rotates every destination sequentially; returns how many were renamed.
  pub fn rotate_all(&self) -> usize {
    let mut rotated = 0;
    for entry in self.all() {
      match Self::rotate_entry(&entry, None) {
        Ok(true) => rotated += 1,
        Ok(false) => {},
        Err(e) => tracing::error!(key = %entry.key(), error = %e, "periodic rotation failed"),
      }
    }
    rotated
  }

  /// One flusher pass. Entries locked by someone else are skipped.
  pub fn flush_once(&self) -> FlushReport {
    let mut report = FlushReport::default();
    for entry in self.all() {
      let mut chain = match entry.try_lock() {
        Ok(Some(chain)) => chain,
        Ok(None) => {
          report.skipped += 1;
          continue;
        },
        Err(e) => {
          report.failed += 1;
          tracing::warn!(error = %e, "not flushing");
          continue;
        },
      };
      match chain.flush() {
        Ok(()) => report.flushed += 1,
        Err(e) => {
          report.failed += 1;
          tracing::error!(key = %entry.key(), error = %e, "flush failed");
        },
      }
    }
    report
  }

  /// Starts the flusher thread.
  pub fn flush_periodic(self: &Arc<Self>, interval: Duration) -> io::Result<()> {
    let registry = Arc::clone(self);
    let stop = self.stop_rx.clone();
    let handle = thread::Builder::new()
      .name("flusher".to_string())
      .spawn(move || {
        let ticker = crossbeam_channel::tick(interval);
        loop {
          select! {
            recv(ticker) -> _ => {
              let report = registry.flush_once();
              tracing::debug!(
                flushed = report.flushed,
                skipped = report.skipped,
                failed = report.failed,
                "periodic flush"
              );
            },
            recv(stop) -> _ => break,
          }
        }
      })?;
    self.track(handle);
    Ok(())
  }

  /// Starts the rotation thread; every message on `ticks` rotates all
  /// destinations. The loop also ends when `ticks` disconnects.
  pub fn rotate_periodic<T: Send + 'static>(self: &Arc<Self>, ticks: Receiver<T>) -> io::Result<()> {
    let registry = Arc::clone(self);
    let stop = self.stop_rx.clone();
    let handle = thread::Builder::new()
      .name("logrotater".to_string())
      .spawn(move || loop {
        select! {
          recv(ticks) -> tick => match tick {
            Ok(_) => {
              let rotated = registry.rotate_all();
              tracing::info!(rotated, "periodic rotation");
            },
            Err(_) => break,
          },
          recv(stop) -> _ => break,
        }
      })?;
    self.track(handle);
    Ok(())
  }

  fn track(&self, handle: JoinHandle<()>) {
    self
      .loops
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(handle);
  }

  /// Stops the background loops and finishes every chain, writing out all
  /// buffered data. Poisoned entries are skipped. Calling it again only
  /// repeats the final flush.
  pub fn shutdown(&self) {
    drop(self.stop_tx.lock().unwrap_or_else(PoisonError::into_inner).take());
    let loops: Vec<_> = self
      .loops
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .drain(..)
      .collect();
    for handle in loops {
      if handle.join().is_err() {
        tracing::error!("registry loop panicked");
      }
    }

    for entry in self.all() {
      let mut chain = match entry.lock() {
        Ok(chain) => chain,
        Err(e) => {
          tracing::error!(error = %e, "leaving destination unfinished");
          continue;
        },
      };
      if let Err(e) = chain.finish() {
        tracing::error!(key = %entry.key(), error = %e, "failed to close destination");
      }
    }
  }
}
