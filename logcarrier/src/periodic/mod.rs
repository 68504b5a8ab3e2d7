//! Cron driven ticks for periodic log rotation.
//!
//! [`schedule`] parses a cron expression (seconds field first, as in
//! `0 0 * * * *`) and starts a thread that sends the local time on the
//! returned channel at every upcoming instant. A tick that finds the
//! previous one still unread is dropped. The thread exits at the first
//! tick after the receiver is gone.


use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, TrySendError};
use std::io;
use std::str::FromStr;
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
  #[error("invalid schedule `{expr}`: {source}")]
  Parse {
    expr: String,
    #[source]
    source: cron::error::Error,
  },

  #[error("failed to start scheduler thread: {0}")]
  Spawn(#[from] io::Error),

  #[error("schedule `{0}` never fires")]
  Exhausted(String),
}

pub fn schedule(expr: &str) -> Result<Receiver<DateTime<Local>>, ScheduleError> {
  let schedule = cron::Schedule::from_str(expr).map_err(|source| ScheduleError::Parse {
    expr: expr.to_string(),
    source,
  })?;
  if schedule.upcoming(Local).next().is_none() {
    return Err(ScheduleError::Exhausted(expr.to_string()));
  }

  let (tx, rx) = crossbeam_channel::bounded(1);
  thread::Builder::new()
    .name("scheduler".to_string())
    .spawn(move || {
      for at in schedule.upcoming(Local) {
        if let Ok(wait) = (at - Local::now()).to_std() {
          thread::sleep(wait);
        }
        match tx.try_send(at) {
          Ok(()) => {},
          Err(TrySendError::Full(_)) => tracing::debug!(%at, "previous tick still pending, skipping"),
          Err(TrySendError::Disconnected(_)) => break,
        }
      }
    })?;
  Ok(rx)
}
