#[cfg(test)]
mod __test__ {
  use crate::signal_hook::SignalHook;
  use crossbeam_channel::bounded;

  #[test]
  fn test_install_only_once() {
    let (sender, _receiver) = bounded(1);
    SignalHook::install(sender.clone()).expect("first install");
    assert!(matches!(
      SignalHook::install(sender),
      Err(ctrlc::Error::MultipleHandlers)
    ));
  }
}
