use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use posworker::config::Config;
use posworker::engine::Engine;
use posworker::fetch::HttpFetcher;
use posworker::store::{PartitionStore, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "posworker")]
#[command(about = "Offline cache and update engine for the retail POS web client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/posworker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Print per-partition entry counts and exit
  #[arg(long)]
  status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("posworker=info")),
    )
    .init();

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let store = Arc::new(match &config.cache_db {
    Some(path) => SqliteStore::open_at(path)?,
    None => SqliteStore::open()?,
  });

  if args.status {
    print_status(&config, store.as_ref())?;
    return Ok(());
  }

  // Pre-warm this version's partitions, then take over and collect the
  // previous version's partitions
  let fetcher = Arc::new(HttpFetcher::new()?);
  let engine = Engine::new(&config, store.clone(), fetcher)?;

  engine.install().await?;
  engine.activate().await?;

  print_status(&config, store.as_ref())?;

  Ok(())
}

fn print_status(config: &Config, store: &dyn PartitionStore) -> Result<()> {
  println!("version: {}", config.version);
  for partition in config.partition_set().expected() {
    println!("{:>6}  {}", store.entry_count(&partition)?, partition);
  }
  Ok(())
}
