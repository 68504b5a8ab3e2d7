use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use logcarrier::chain::{Chain, ChainConfig};
use logcarrier::compress::{Codec, Method};
use logcarrier::frame_writer::FrameWriter;
use logcarrier::line_writer::LineWriter;
use logcarrier::paths::{DestinationKey, PathScheme, Template};
use logcarrier::snapshot::Snapshot;

fn configure_criterion() -> Criterion {
  Criterion::default()
    .sample_size(30)
    .measurement_time(Duration::from_secs(5))
    .warm_up_time(Duration::from_secs(2))
}

/// Access-log looking lines, cut into network sized chunks.
fn payload(lines: usize) -> Vec<u8> {
  (0..lines)
    .map(|i| {
      format!(
        "10.0.{}.{} - - [19/Oct/2026:12:00:{:02}] \"GET /api/v1/items/{} HTTP/1.1\" 200 {}\n",
        i % 256,
        (i * 7) % 256,
        i % 60,
        i,
        512 + i % 4096
      )
    })
    .collect::<String>()
    .into_bytes()
}

fn bench_line_writer(c: &mut Criterion) {
  let data = payload(10_000);
  let mut group = c.benchmark_group("line_writer");
  group.throughput(Throughput::Bytes(data.len() as u64));

  for chunk in [64usize, 1024, 16 * 1024] {
    group.bench_with_input(BenchmarkId::new("eager", chunk), &chunk, |b, &chunk| {
      b.iter(|| {
        let mut w = LineWriter::new(io::sink(), 128 * 1024);
        for part in data.chunks(chunk) {
          w.write_all(part).unwrap();
        }
        w.flush_all().unwrap();
      })
    });
  }
  group.finish();
}

fn bench_frame_writer(c: &mut Criterion) {
  let data = payload(10_000);
  let mut group = c.benchmark_group("frame_writer");
  group.throughput(Throughput::Bytes(data.len() as u64));

  for frame in [512usize, 8 * 1024, 64 * 1024] {
    group.bench_with_input(BenchmarkId::new("frames", frame), &frame, |b, &frame| {
      b.iter(|| {
        let mut w = FrameWriter::new(io::sink(), 256 * 1024);
        for part in data.chunks(frame) {
          w.write_all(part).unwrap();
        }
        w.flush_frames().unwrap();
      })
    });
  }
  group.finish();
}

fn bench_chain(c: &mut Criterion) {
  let data = payload(10_000);
  let dir = tempfile::tempdir().unwrap();
  let scheme = Arc::new(PathScheme::new(
    dir.path(),
    Template::parse("{dir}/{name}").unwrap(),
    Template::parse("{dir}/{name}-{time}").unwrap(),
  ));

  let mut group = c.benchmark_group("chain");
  group.throughput(Throughput::Bytes(data.len() as u64));

  for method in [Method::Raw, Method::Gzip, Method::Zstd, Method::Lz4] {
    let config = ChainConfig {
      codec: Codec::new(method, 3),
      ..ChainConfig::default()
    };
    let key = DestinationKey::new("bench", &method.to_string(), "g");
    let mut chain = Chain::new(key, Arc::clone(&scheme), &config).unwrap();
    let mut snapshot = Snapshot::new();

    group.bench_function(BenchmarkId::new("transaction", method), |b| {
      b.iter(|| {
        chain.dump_state(&mut snapshot).unwrap();
        for part in data.chunks(4096) {
          chain.write(part).unwrap();
        }
        chain.post_write().unwrap();
        chain.flush().unwrap();
      })
    });
    chain.finish().unwrap();
  }
  group.finish();
}

criterion_group! {
  name = benches;
  config = configure_criterion();
  targets =
    bench_line_writer,
    bench_frame_writer,
    bench_chain,
}

criterion_main!(benches);
