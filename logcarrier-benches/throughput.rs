//! Pushes generated traffic through a running carrier and prints the rates.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use logcarrier::compress::Method;
use logcarrier::config::Config;
use logcarrier::server::Server;

const CLIENTS: usize = 8;
const TRANSFERS: usize = 50;
const LINES: usize = 1000;

fn transfer(addr: SocketAddr, dest: &str, data: &[u8]) -> std::io::Result<()> {
  let mut conn = TcpStream::connect(addr)?;
  let mut reader = BufReader::new(conn.try_clone()?);
  let mut reply = String::new();

  conn.write_all(format!("DATA key bench {} log {}\n", dest, data.len()).as_bytes())?;
  reader.read_line(&mut reply)?;
  conn.write_all(data)?;
  reply.clear();
  reader.read_line(&mut reply)?;
  if reply != "200 OK\n" {
    return Err(std::io::Error::new(std::io::ErrorKind::Other, reply));
  }
  Ok(())
}

fn run(method: Method) {
  let dir = tempfile::tempdir().expect("scratch dir");
  let mut config = Config::default();
  config.listen = "127.0.0.1:0".parse().expect("address");
  config.files.root = dir.path().to_path_buf();
  config.compression.method = method;
  config.compression.level = 3;
  config.workers.route = 16;
  config.workers.dumper = 8;
  config.workers.flusher_sleep = Duration::from_millis(200);
  let server = Server::start(&config).expect("server");
  let addr = server.local_addr();

  let data: Vec<u8> = (0..LINES)
    .map(|i| format!("worker line {:06} with some padding to look like a log\n", i))
    .collect::<String>()
    .into_bytes();

  let start = Instant::now();
  let clients: Vec<_> = (0..CLIENTS)
    .map(|id| {
      let data = data.clone();
      thread::spawn(move || {
        let dest = format!("client{}", id % 4);
        for _ in 0..TRANSFERS {
          transfer(addr, &dest, &data).expect("transfer");
        }
      })
    })
    .collect();
  for client in clients {
    client.join().expect("client thread");
  }
  let elapsed = start.elapsed();
  server.shutdown();

  let bytes = (CLIENTS * TRANSFERS * data.len()) as f64;
  println!(
    "  {:<5} {:>8.2} MiB/s  {:>8.0} transfers/s",
    method.to_string(),
    bytes / elapsed.as_secs_f64() / (1024.0 * 1024.0),
    (CLIENTS * TRANSFERS) as f64 / elapsed.as_secs_f64()
  );
}

fn main() {
  println!("logcarrier throughput ({} clients x {} transfers x {} lines)", CLIENTS, TRANSFERS, LINES);
  for method in [Method::Raw, Method::Gzip, Method::Zstd, Method::Lz4] {
    run(method);
  }
}
