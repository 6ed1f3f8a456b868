use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use url::Url;

use offline_sw::cache::{CacheStorage, CacheStore, MemoryStorage, SqliteStorage};
use offline_sw::config::{Config, LogConfig};
use offline_sw::event::{Dispatcher, EventSender};
use offline_sw::host::{ConsoleHost, Notification, NotificationData};
use offline_sw::http::Request;
use offline_sw::network::HttpNetwork;
use offline_sw::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "offline-sw")]
#[command(about = "Offline-first request intermediary with versioned caches")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin the worker serves, overriding the config file
  #[arg(short, long)]
  origin: Option<Url>,

  /// Keep caches in memory for this run only
  #[arg(long)]
  ephemeral: bool,

  /// Log to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the current generation and activate it
  Install,
  /// Resolve requests through the worker
  Fetch {
    /// Absolute or origin-relative URLs
    urls: Vec<String>,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Print response bodies
    #[arg(long)]
    body: bool,
  },
  /// List cache generations and the current generation's entries
  Caches,
  /// Deliver a background sync event
  Sync { tag: String },
  /// Deliver a push message with an optional JSON payload
  Push { payload: Option<String> },
  /// Simulate a click on a notification targeting the given URL
  Click { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    Config { origin, ..config }
  } else {
    config
  };

  let _guard = init_logging(&config.log, args.log_stderr)?;

  if args.ephemeral {
    run(Arc::new(MemoryStorage::new()), &config, args.command).await
  } else {
    let storage = match &config.storage.path {
      Some(path) => SqliteStorage::open_at(path)?,
      None => SqliteStorage::open()?,
    };
    run(Arc::new(storage), &config, args.command).await
  }
}

fn init_logging(config: &LogConfig, to_stderr: bool) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env("OFFLINE_SW_LOG")
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log filter: {}", e))?;

  if to_stderr {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  let dir = match &config.dir {
    Some(dir) => dir.clone(),
    None => SqliteStorage::default_path()?
      .parent()
      .map(PathBuf::from)
      .ok_or_else(|| eyre!("Could not determine log directory"))?,
  };
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "offline-sw.log"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(Some(guard))
}

async fn run<S: CacheStorage>(storage: Arc<S>, config: &Config, command: Command) -> Result<()> {
  let network = Arc::new(HttpNetwork::new(&config.origin)?);
  let worker = Arc::new(Worker::new(
    Arc::clone(&storage),
    network,
    Arc::new(ConsoleHost),
    config,
  )?);

  let (dispatcher, events) = Dispatcher::new(Arc::clone(&worker));
  let dispatcher = tokio::spawn(dispatcher.run());

  let result = deliver(storage.as_ref(), &worker, &events, config, command).await;

  // Closing the channel lets the dispatcher flush pending cache writes
  drop(events);
  dispatcher
    .await
    .map_err(|e| eyre!("Dispatcher task failed: {}", e))?;

  result
}

async fn deliver<S: CacheStorage>(
  storage: &S,
  worker: &Worker<S>,
  events: &EventSender,
  config: &Config,
  command: Command,
) -> Result<()> {
  match command {
    Command::Install => {
      events.install().await?;
      println!(
        "installed and activated {}",
        worker.generations().generation()
      );
    }
    Command::Fetch { urls, method, body } => {
      if worker.generations().is_installed()? {
        worker.resume().await?;
      } else {
        events.install().await?;
      }

      for url in urls {
        let url = config
          .origin
          .join(&url)
          .map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
        let request = Request::get(url).with_method(&method);
        let resolved = events.fetch_resolved(request.clone()).await?;

        println!(
          "{} {} {:?} ({} bytes)",
          resolved.response.status,
          request.url,
          resolved.source,
          resolved.response.body.len()
        );
        if body {
          println!("{}", String::from_utf8_lossy(&resolved.response.body));
        }
      }
    }
    Command::Sync { tag } => {
      if !events.sync(&tag).await? {
        println!("ignored sync tag {}", tag);
      }
    }
    Command::Push { payload } => {
      events.push(payload.map(String::into_bytes)).await?;
    }
    Command::Click { url } => {
      let defaults = &config.notifications;
      let notification = Notification {
        title: defaults.default_title.clone(),
        body: defaults.default_body.clone(),
        icon: defaults.icon.clone(),
        badge: defaults.badge.clone(),
        vibrate: defaults.vibrate.clone(),
        data: NotificationData { url },
      };
      events.notification_click(notification).await?;
    }
    Command::Caches => list_caches(storage, worker)?,
  }

  Ok(())
}

fn list_caches<S: CacheStorage>(storage: &S, worker: &Worker<S>) -> Result<()> {
  let current = worker.generations().generation();

  for name in storage.names()? {
    let marker = if name == current { "*" } else { " " };
    println!("{} {}", marker, name);
  }

  if worker.generations().is_installed()? {
    for entry in worker.generations().current()?.keys()? {
      println!(
        "    {}  {}",
        entry.cached_at.format("%Y-%m-%d %H:%M:%S"),
        entry.key
      );
    }
  }

  Ok(())
}
