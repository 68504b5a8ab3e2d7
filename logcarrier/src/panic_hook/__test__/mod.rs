#[cfg(test)]
mod __test__ {
  use crate::panic_hook::PanicHook;
  use crate::server::Shutdown;
  use crossbeam_channel::{bounded, unbounded, Sender};
  use std::panic;

  /// Installs the hook, runs `action` and puts the previous hook back.
  fn install_hook_and_run<F>(sender: Sender<Shutdown>, action: F) -> std::thread::Result<()>
  where
    F: FnOnce() + panic::UnwindSafe,
  {
    let previous_hook = panic::take_hook();
    PanicHook::install(sender);
    let result = panic::catch_unwind(action);
    panic::set_hook(previous_hook);
    result
  }

  #[test]
  fn test_panic_requests_shutdown() {
    let (sender, receiver) = unbounded();
    let result = install_hook_and_run(sender, || panic!("test panic for hook"));
    assert!(result.is_err());

    // Panics of tests running in parallel may land here as well.
    let seen = receiver.try_iter().any(|msg| match msg {
      Shutdown::Panicked(text) => text.contains("test panic for hook"),
      Shutdown::Interrupted => false,
    });
    assert!(seen, "expected the hook to forward the panic");
  }

  #[test]
  fn test_full_channel_does_not_block() {
    let (sender, receiver) = bounded(1);
    sender.send(Shutdown::Interrupted).unwrap();

    let result = install_hook_and_run(sender, || panic!("second panic"));
    assert!(result.is_err());
    assert!(matches!(receiver.try_recv(), Ok(Shutdown::Interrupted)));
  }
}
