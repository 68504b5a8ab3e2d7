mod __test__;

use crossbeam_channel::Sender;

use crate::server::Shutdown;

pub struct SignalHook {}

impl SignalHook {
  /// Turns SIGINT, SIGTERM and SIGHUP into a shutdown request. Can only be
  /// installed once per process.
  pub fn install(sender: Sender<Shutdown>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
      tracing::info!("termination signal received");
      // A second signal while the first is still queued changes nothing.
      let _ = sender.try_send(Shutdown::Interrupted);
    })
  }
}
