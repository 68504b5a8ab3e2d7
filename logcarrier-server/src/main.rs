//! logcarrier daemon entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use logcarrier::config::Config;
use logcarrier::logging;
use logcarrier::panic_hook::PanicHook;
use logcarrier::server::{Server, Shutdown};
use logcarrier::signal_hook::SignalHook;

/// Receives tailed logs over TCP and stores them with buffering,
/// compression and rotation.
#[derive(Debug, Parser)]
#[command(name = "logcarrier", version, about)]
struct Cli {
  /// TOML configuration file; built-in defaults when omitted
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Print the default configuration and exit
  #[arg(long)]
  print_default_config: bool,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  if cli.print_default_config {
    print!("{}", Config::default().to_toml()?);
    return Ok(());
  }

  let config = match &cli.config {
    Some(path) => Config::load(path)?,
    None => Config::default(),
  };
  logging::init(&config.log_level, config.logfile.as_deref()).context("failed to set up logging")?;

  let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<Shutdown>(1);
  PanicHook::install(shutdown_tx.clone());
  SignalHook::install(shutdown_tx).context("failed to install signal handler")?;

  let server = Server::start(&config).context("failed to start server")?;

  match shutdown_rx.recv() {
    Ok(Shutdown::Interrupted) => tracing::info!("interrupted"),
    Ok(Shutdown::Panicked(reason)) => tracing::error!(%reason, "stopping after a panic"),
    Err(_) => tracing::warn!("shutdown channel closed"),
  }
  server.shutdown();
  Ok(())
}
