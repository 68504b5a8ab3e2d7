#[cfg(test)]
mod __test__ {
  use crate::chain::ChainConfig;
  use crate::dump::{DumpJob, DumpWorker};
  use crate::header::Protocol;
  use crate::paths::{DestinationKey, PathScheme, Template};
  use crate::pool::Worker;
  use crate::registry::{FileRegistry, SchemeFactory};
  use std::fs;
  use std::io::{BufRead, BufReader, Write};
  use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
  use std::path::Path;
  use std::sync::Arc;
  use std::thread::{self, JoinHandle};
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

  fn pair() -> (TcpStream, TcpStream, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let client = TcpStream::connect(listener.local_addr().unwrap()).expect("connect");
    let (server, peer) = listener.accept().expect("accept");
    (client, server, peer)
  }

  fn run(
    registry: &Arc<FileRegistry>,
    protocol: Protocol,
    prefetched: &[u8],
  ) -> (TcpStream, JoinHandle<()>) {
    let (client, stream, peer) = pair();
    let job = DumpJob {
      key: DestinationKey::new("d", "n", "g"),
      protocol,
      stream,
      peer,
      prefetched: prefetched.to_vec(),
    };
    let mut worker = DumpWorker::new(Arc::clone(registry), Duration::from_secs(5), 16);
    let handle = thread::spawn(move || worker.handle(job));
    (client, handle)
  }

  fn read_reply(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).expect("reply");
    line
  }

  fn contents(registry: &FileRegistry, root: &Path) -> Vec<u8> {
    registry.shutdown();
    fs::read(root.join("d/n")).unwrap_or_default()
  }

  #[test]
  fn test_sized_transfer() {
    let dir = tempdir().expect("Failed to create temp dir");
    let reg = registry(dir.path());
    let (mut client, handle) = run(&reg, Protocol::Sized(11), b"");
    let mut reader = BufReader::new(client.try_clone().unwrap());

    assert_eq!(read_reply(&mut reader), "200 READY protocol 2\n");
    client.write_all(b"hello world").unwrap();
    assert_eq!(read_reply(&mut reader), "200 OK\n");
    handle.join().unwrap();

    assert_eq!(contents(&reg, dir.path()), b"hello world");
  }

  #[test]
  fn test_sized_transfer_with_prefetched_bytes() {
    let dir = tempdir().expect("Failed to create temp dir");
    let reg = registry(dir.path());
    let (mut client, handle) = run(&reg, Protocol::Sized(12), b"hello ");
    let mut reader = BufReader::new(client.try_clone().unwrap());

    assert_eq!(read_reply(&mut reader), "200 READY protocol 2\n");
    client.write_all(b"world\n").unwrap();
    assert_eq!(read_reply(&mut reader), "200 OK\n");
    handle.join().unwrap();

    assert_eq!(contents(&reg, dir.path()), b"hello world\n");
  }

  #[test]
  fn test_line_transfer_unstuffs_dots() {
    let dir = tempdir().expect("Failed to create temp dir");
    let reg = registry(dir.path());
    let (mut client, handle) = run(&reg, Protocol::Lines, b"");
    let mut reader = BufReader::new(client.try_clone().unwrap());

    assert_eq!(read_reply(&mut reader), "200 READY\n");
    client.write_all(b"abc\n.def\n..\n.\r\n").unwrap();
    assert_eq!(read_reply(&mut reader), "200 OK\n");
    handle.join().unwrap();

    assert_eq!(contents(&reg, dir.path()), b"abc\ndef\n.\n");
  }

  #[test]
  fn test_short_sized_transfer_rolls_back() {
    let dir = tempdir().expect("Failed to create temp dir");
    let reg = registry(dir.path());
    reg.write(&DestinationKey::new("d", "n", "g"), b"earlier\n").unwrap();

    let (mut client, handle) = run(&reg, Protocol::Sized(100), b"");
    let mut reader = BufReader::new(client.try_clone().unwrap());
    assert_eq!(read_reply(&mut reader), "200 READY protocol 2\n");
    client.write_all(b"only a part of the payload\nand more").unwrap();
    client.shutdown(Shutdown::Write).unwrap();
    assert_eq!(read_reply(&mut reader), "400 Error\n");
    handle.join().unwrap();

    assert_eq!(contents(&reg, dir.path()), b"earlier\n");
  }

  #[test]
  fn test_line_transfer_without_terminator_rolls_back() {
    let dir = tempdir().expect("Failed to create temp dir");
    let reg = registry(dir.path());
    let (mut client, handle) = run(&reg, Protocol::Lines, b"");
    let mut reader = BufReader::new(client.try_clone().unwrap());

    assert_eq!(read_reply(&mut reader), "200 READY\n");
    client.write_all(b"line one\nline two\n").unwrap();
    client.shutdown(Shutdown::Write).unwrap();
    assert_eq!(read_reply(&mut reader), "400 Error\n");
    handle.join().unwrap();

    assert!(contents(&reg, dir.path()).is_empty());
  }
}
