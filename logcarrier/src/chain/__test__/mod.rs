#[cfg(test)]
mod __test__ {
  use crate::chain::{Chain, ChainConfig};
  use crate::compress::{Codec, Method};
  use crate::paths::{DestinationKey, PathScheme, Template};
  use crate::snapshot::Snapshot;
  use std::fs;
  use std::io::Read;
  use std::path::Path;
  use std::sync::Arc;
  use tempfile::{tempdir, TempDir};

  fn scheme(root: &Path) -> Arc<PathScheme> {
    Arc::new(PathScheme::new(
      root,
      Template::parse("{dir}/{name}").unwrap(),
      Template::parse("{dir}/{name}-{time}").unwrap(),
    ))
  }

  fn chain(dir: &TempDir, config: ChainConfig) -> Chain {
    let key = DestinationKey::new("d", "n", "g");
    Chain::new(key, scheme(dir.path()), &config).expect("chain")
  }

  fn small(codec: Codec) -> ChainConfig {
    ChainConfig {
      input: 16,
      framing: 32,
      codec,
      ..ChainConfig::default()
    }
  }

  fn live(dir: &TempDir) -> Vec<u8> {
    fs::read(dir.path().join("d/n")).unwrap_or_default()
  }

  #[test]
  fn test_raw_write_flush_close() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig::default());
    assert!(!c.is_open());

    c.write(b"hello world\npartial").unwrap();
    c.post_write().unwrap();
    assert!(live(&dir).is_empty());

    c.flush().unwrap();
    assert_eq!(live(&dir), b"hello world\n");

    c.close().unwrap();
    assert!(!c.is_open());
    assert_eq!(live(&dir), b"hello world\n");

    c.finish().unwrap();
    assert_eq!(live(&dir), b"hello world\npartial");
  }

  #[test]
  fn test_second_flush_without_new_lines_is_quiet() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig::default());
    c.write(b"a\n").unwrap();
    c.flush().unwrap();
    assert_eq!(live(&dir), b"a\n");
    assert_eq!(c.lines_buffered(), 0);

    c.flush().unwrap();
    assert_eq!(live(&dir), b"a\n");
  }

  #[test]
  fn test_zstd_chain_writes_on_flush() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig {
      codec: Codec::new(Method::Zstd, 3),
      ..ChainConfig::default()
    });

    c.write(b"one\ntwo\n").unwrap();
    c.post_write().unwrap();
    assert!(live(&dir).is_empty());

    c.flush().unwrap();
    c.write(b"three\n").unwrap();
    c.close().unwrap();

    let decoded = zstd::stream::decode_all(live(&dir).as_slice()).unwrap();
    assert_eq!(decoded, b"one\ntwo\nthree\n");
  }

  #[test]
  fn test_gzip_deferred_buffer_spills_after_transfer() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, small(Codec::new(Method::Gzip, 6)));
    for i in 0..20 {
      c.write(format!("line {}\n", i).as_bytes()).unwrap();
    }
    assert_eq!(c.lines_buffered(), 20, "nothing moves during a transfer");

    c.post_write().unwrap();
    assert_eq!(c.lines_buffered(), 0);
    c.close().unwrap();

    let mut out = String::new();
    flate2::read::MultiGzDecoder::new(live(&dir).as_slice())
      .read_to_string(&mut out)
      .unwrap();
    assert_eq!(out.lines().count(), 20);
    assert!(out.ends_with("line 19\n"));
  }

  #[test]
  fn test_raw_rollback_after_spill_to_disk() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, small(Codec::raw()));
    c.write(b"committed 1\n").unwrap();
    c.flush().unwrap();
    c.write(b"buffered\n").unwrap();

    let mut snap = Snapshot::new();
    c.dump_state(&mut snap).unwrap();

    // Enough to spill through the line and frame buffers onto disk.
    for _ in 0..10 {
      c.write(b"doomed transfer line\n").unwrap();
    }
    assert!(live(&dir).len() > b"committed 1\n".len());

    c.restore_state(&snap).unwrap();
    assert_eq!(live(&dir), b"committed 1\n");

    c.write(b"retried\n").unwrap();
    c.close().unwrap();
    assert_eq!(live(&dir), b"committed 1\nbuffered\nretried\n");
  }

  #[test]
  fn test_compressed_rollback() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, small(Codec::new(Method::Zstd, 1)));
    c.write(b"kept\n").unwrap();
    c.post_write().unwrap();

    let mut snap = Snapshot::new();
    c.dump_state(&mut snap).unwrap();
    for _ in 0..50 {
      c.write(b"never happened\n").unwrap();
    }
    c.restore_state(&snap).unwrap();
    c.close().unwrap();

    let decoded = zstd::stream::decode_all(live(&dir).as_slice()).unwrap();
    assert_eq!(decoded, b"kept\n");
  }

  #[test]
  #[should_panic(expected = "corrupt state dump")]
  fn test_corrupt_snapshot_is_fatal() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig::default());
    let _ = c.restore_state(&Snapshot::from(vec![1, 2, 3]));
  }

  #[test]
  fn test_close_stops_at_first_failing_stage() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig::default());
    c.write(b"kept\n").unwrap();

    // a plain file where the destination directory should be
    let blocker = dir.path().join("d");
    fs::write(&blocker, b"").unwrap();
    assert!(c.close().is_err());
    assert!(!c.is_open());
    assert!(fs::metadata(&blocker).unwrap().is_file());

    fs::remove_file(&blocker).unwrap();
    c.close().unwrap();
    assert!(!c.is_open());
    assert_eq!(live(&dir), b"kept\n");
  }

  #[test]
  fn test_rotate_unwritten_chain_is_noop() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig::default());
    c.close().unwrap();
    assert!(!c.rotate(Some("newn")).unwrap());
    assert!(!dir.path().join("d/newn").exists());
  }

  #[test]
  fn test_rotate_after_close() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig::default());
    c.write(b"before\n").unwrap();
    c.close().unwrap();
    assert!(c.rotate(Some("n.old")).unwrap());
    assert_eq!(fs::read(dir.path().join("d/n.old")).unwrap(), b"before\n");

    c.write(b"after\n").unwrap();
    c.close().unwrap();
    assert_eq!(live(&dir), b"after\n");
  }

  #[test]
  #[should_panic(expected = "still open")]
  fn test_rotate_open_chain_panics() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut c = chain(&dir, ChainConfig::default());
    c.write(b"x\n").unwrap();
    c.flush().unwrap();
    let _ = c.rotate(None);
  }
}
