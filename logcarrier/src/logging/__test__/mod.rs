#[cfg(test)]
mod __test__ {
  use crate::logging::{init, parse_level, LoggingError};
  use std::fs;
  use tempfile::tempdir;
  use tracing::Level;

  #[test]
  fn test_parse_level() {
    assert_eq!(parse_level("info").unwrap(), Level::INFO);
    assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
    assert!(matches!(parse_level("chatty"), Err(LoggingError::UnknownLevel(_))));
  }

  #[test]
  fn test_init_writes_to_logfile_once() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("carrier.log");

    init("info", Some(&path)).expect("first init");
    tracing::info!(marker = "logging-test", "hello from the test");
    tracing::debug!("filtered out");

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("hello from the test"));
    assert!(text.contains("logging-test"));
    assert!(!text.contains("filtered out"));
    assert!(!text.contains("\x1b["));

    assert!(matches!(init("info", None), Err(LoggingError::AlreadyInstalled)));
  }
}
