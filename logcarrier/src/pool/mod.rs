//! # Worker Pool
//!
//! The shape shared by the header, dump and rotate pools.
//!
//! ## Architecture
//!
//! ```text
//!  producers --send(job)--> [bounded queue] --recv--> worker-1 .. worker-N
//!                                                       |  select! {
//!  stop() ---one stop per worker, rendezvous--------->  |    job  => handle
//!         <--all exit guards dropped (barrier)----------+    stop => exit }
//! ```
//!
//! - The queue is bounded: a producer blocks while it is full, which is the
//!   only backpressure in the system.
//! - A worker only looks at the stop channel between jobs, so a job that has
//!   started always runs to completion.
//! - Each worker is built by the pool's factory and owns its scratch
//!   buffers for its whole life.
//! - Every worker thread holds a clone of an exit sender. `stop` drops the
//!   pool's own copy and waits until the channel disconnects, i.e. until the
//!   last worker has returned.


use crossbeam_channel::{select, Receiver, Sender};
use std::io;
use std::thread;

/// A job handler living on one pool thread.
pub trait Worker: Send + 'static {
  type Job: Send + 'static;

  fn handle(&mut self, job: Self::Job);
}

type Factory<W> = Box<dyn Fn() -> W + Send + Sync>;

pub struct WorkerPool<W: Worker> {
  name: &'static str,
  factory: Factory<W>,
  jobs_tx: Sender<W::Job>,
  jobs_rx: Receiver<W::Job>,
  stop_tx: Sender<()>,
  stop_rx: Receiver<()>,
  exit_tx: Option<Sender<()>>,
  exit_rx: Receiver<()>,
  running: usize,
}

impl<W: Worker> WorkerPool<W> {
  pub fn new(name: &'static str, capacity: usize, factory: impl Fn() -> W + Send + Sync + 'static) -> Self {
    let (jobs_tx, jobs_rx) = crossbeam_channel::bounded(capacity);
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
    let (exit_tx, exit_rx) = crossbeam_channel::bounded(0);
    Self {
      name,
      factory: Box::new(factory),
      jobs_tx,
      jobs_rx,
      stop_tx,
      stop_rx,
      exit_tx: Some(exit_tx),
      exit_rx,
      running: 0,
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn running(&self) -> usize {
    self.running
  }

  /// Producer handle. Sending blocks while the queue is full.
  pub fn sender(&self) -> Sender<W::Job> {
    self.jobs_tx.clone()
  }

  pub fn queued(&self) -> usize {
    self.jobs_rx.len()
  }

  /// Starts one more worker.
  pub fn spawn(&mut self) -> io::Result<()> {
    let Some(exit_tx) = self.exit_tx.clone() else {
      return Err(io::Error::new(
        io::ErrorKind::Other,
        format!("{} pool is stopped", self.name),
      ));
    };
    let mut worker = (self.factory)();
    let jobs = self.jobs_rx.clone();
    let stop = self.stop_rx.clone();

    thread::Builder::new()
      .name(format!("{}-{}", self.name, self.running))
      .spawn(move || {
        let _exit = exit_tx;
        loop {
          select! {
            recv(jobs) -> job => match job {
              Ok(job) => worker.handle(job),
              Err(_) => break,
            },
            recv(stop) -> _ => break,
          }
        }
      })?;
    self.running += 1;
    Ok(())
  }

  /// Starts `n` workers.
  pub fn spawn_many(&mut self, n: usize) -> io::Result<()> {
    for _ in 0..n {
      self.spawn()?;
    }
    Ok(())
  }

  /// Stops every worker and waits until all of them returned. Workers busy
  /// with a job finish it first. Jobs still queued are dropped, which closes
  /// their connections.
  pub fn stop(&mut self) {
    tracing::info!(pool = self.name, workers = self.running, "stopping pool");
    self.exit_tx = None;
    for _ in 0..self.running {
      // A worker that panicked never takes its stop message; the exit
      // channel disconnecting means nobody is left to take one.
      select! {
        send(self.stop_tx, ()) -> sent => if sent.is_err() { break },
        recv(self.exit_rx) -> _ => break,
      }
    }
    while self.exit_rx.recv().is_ok() {}
    self.running = 0;

    while self.jobs_rx.try_recv().is_ok() {}
    tracing::info!(pool = self.name, "pool stopped");
  }
}
