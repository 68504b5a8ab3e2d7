mod __test__;

use crossbeam_channel::Sender;
use std::thread;

use crate::server::Shutdown;

pub struct PanicHook {}

impl PanicHook {
  /// Logs every panic and asks the daemon to shut down, so chains held by
  /// the surviving threads still get flushed.
  pub fn install(sender: Sender<Shutdown>) {
    std::panic::set_hook(Box::new(move |info| {
      let current = thread::current();
      let name = current.name().unwrap_or("<unnamed>");
      tracing::error!(thread = name, "{}", info);

      // never block inside the hook
      if let Err(e) = sender.try_send(Shutdown::Panicked(info.to_string())) {
        eprintln!("[Panic] Unable to request shutdown: {:?}", e);
      }
    }));
  }
}
