#[cfg(test)]
mod __test__ {
  use crate::chain::ChainConfig;
  use crate::paths::{DestinationKey, PathScheme, Template};
  use crate::pool::Worker;
  use crate::registry::{FileRegistry, SchemeFactory};
  use crate::rotate::{LogrotateJob, RotateWorker};
  use std::fs;
  use std::io::Read;
  use std::net::{TcpListener, TcpStream};
  use std::path::Path;
  use std::sync::Arc;
  use std::time::Duration;
  use tempfile::tempdir;

  fn registry(root: &Path) -> Arc<FileRegistry> {
    let scheme = PathScheme::new(
      root,
      Template::parse("{dir}/{name}").unwrap(),
      Template::parse("{dir}/{name}-{time}").unwrap(),
    );
    Arc::new(FileRegistry::new(SchemeFactory::new(scheme, ChainConfig::default())))
  }

  fn rotate(registry: &Arc<FileRegistry>, new_name: Option<&str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let mut client = TcpStream::connect(listener.local_addr().unwrap()).expect("connect");
    let (stream, peer) = listener.accept().expect("accept");

    let mut worker = RotateWorker::new(Arc::clone(registry), Duration::from_secs(5));
    worker.handle(LogrotateJob {
      key: DestinationKey::new("d", "n", "g"),
      new_name: new_name.map(str::to_string),
      stream,
      peer,
    });

    let mut answer = String::new();
    client.read_to_string(&mut answer).expect("reply");
    answer
  }

  #[test]
  fn test_unknown_destination_answers_error() {
    let dir = tempdir().expect("Failed to create temp dir");
    let reg = registry(dir.path());
    assert_eq!(rotate(&reg, Some("newn")), "400 Error\n");
  }

  #[test]
  fn test_rotation_renames_and_answers_done() {
    let dir = tempdir().expect("Failed to create temp dir");
    let reg = registry(dir.path());
    reg.write(&DestinationKey::new("d", "n", "g"), b"x\n").unwrap();

    assert_eq!(rotate(&reg, Some("newn")), "200 DONE\n");
    assert_eq!(fs::read(dir.path().join("d/newn")).unwrap(), b"x\n");

    // No new data: still DONE, nothing renamed.
    assert_eq!(rotate(&reg, Some("newer")), "200 DONE\n");
    assert!(!dir.path().join("d/newer").exists());
  }
}
