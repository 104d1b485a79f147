//! `zakupai-etl`: the ingestion batch driver, the Query Service process, config bootstrap,
//! and the orphan-reconciliation pass (§6 CLI surface).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chrono::{DateTime, Utc};
use db::{RelationalStore, VectorStore};
use daemon::{AppState, Coordinator, HttpLotFeed, NoopSink, PoolDeps};
use embedding::{EmbeddingProvider, HttpEmbeddingProvider};
use etl_core::EtlConfig;
use extract::ocr::{OcrEngine, TesseractOcrEngine};
use fetch::{Fetcher, Unpacker};
use index::Indexer;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Exit code for "bad args" (§6 CLI surface: `exit 64 on bad args`).
const EXIT_BAD_ARGS: u8 = 64;
/// Exit code for a `LotFeed.Fetch` failure on the initial pull (§6: `exit 2 on LotFeed unavailable`).
const EXIT_LOT_FEED_UNAVAILABLE: u8 = 2;

#[derive(Parser)]
#[command(name = "zakupai-etl")]
#[command(about = "ZakupAI ETL core: procurement-lot ingestion and semantic search")]
struct Cli {
  /// Path to a TOML config file. Defaults to the platform config dir, then built-in defaults.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run one ingestion batch against the configured LotFeed and print a JSON BatchReport.
  Ingest {
    /// Comma-separated, case-insensitive substrings matched against lot title/description.
    #[arg(long, value_delimiter = ',')]
    keywords: Vec<String>,
    #[arg(long = "max-lots", default_value_t = 100)]
    max_lots: usize,
    /// RFC 3339 timestamp, passed through opaquely to the LotFeed.
    #[arg(long)]
    since: Option<String>,
  },
  /// Run the Query Service HTTP surface until SIGINT/SIGTERM.
  Serve {
    /// Overrides `http_bind_addr` from config.
    #[arg(long)]
    addr: Option<String>,
  },
  /// Configuration file management.
  Config {
    #[command(subcommand)]
    action: ConfigAction,
  },
  /// Run the orphan-reconciliation pass once and print a summary.
  Reconcile,
}

#[derive(Subcommand)]
enum ConfigAction {
  /// Write a commented default config file.
  Init {
    /// Destination path. Defaults to the platform config dir.
    #[arg(long)]
    path: Option<PathBuf>,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
  },
}

/// Console-only logging, used for `ingest`/`config`/`reconcile` (short-lived invocations).
fn init_cli_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

/// Console + daily-rotating file logging for `serve`, which runs as a long-lived process.
/// Falls back to console-only when `log_dir` is unset or can't be created. The returned
/// guard must be kept alive for the duration of the program.
fn init_serve_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let Some(log_dir) = log_dir else {
    init_cli_logging();
    return None;
  };
  if std::fs::create_dir_all(log_dir).is_err() {
    init_cli_logging();
    return None;
  }

  let file_appender = tracing_appender::rolling::daily(log_dir, "zakupai-etl.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

  let console_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(true);
  let file_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(false).with_writer(file_writer);

  tracing_subscriber::registry().with(env_filter).with(console_layer).with(file_layer).init();
  Some(guard)
}

fn load_config(path: Option<&PathBuf>) -> EtlConfig {
  match path {
    Some(p) => EtlConfig::load(Some(p)),
    None => EtlConfig::load(EtlConfig::default_config_path().as_deref()),
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  let config = load_config(cli.config.as_ref());

  let _guard = match &cli.command {
    Commands::Serve { .. } => init_serve_logging(config.log_dir.as_deref()),
    _ => {
      init_cli_logging();
      None
    }
  };

  match cli.command {
    Commands::Ingest { keywords, max_lots, since } => cmd_ingest(config, keywords, max_lots, since).await,
    Commands::Serve { addr } => cmd_serve(config, addr).await,
    Commands::Config { action } => cmd_config(action),
    Commands::Reconcile => cmd_reconcile(config).await,
  }
}

/// Shared adapter wiring used by `ingest`, `serve`, and `reconcile`: one relational pool, one
/// vector-store client, one (resilient) embedder, one indexer. Each subcommand borrows only
/// the pieces it needs.
struct Adapters {
  relational: Arc<RelationalStore>,
  vector: Arc<VectorStore>,
  embedder: Arc<dyn EmbeddingProvider>,
  ocr_engine: Arc<dyn OcrEngine>,
  indexer: Arc<Indexer>,
}

async fn build_adapters(config: &EtlConfig) -> Result<Adapters> {
  let pool_size = db::pool_size_for_workers(config.max_workers);
  let relational = RelationalStore::connect(&config.relational_dsn, pool_size, config.db_timeout())
    .await
    .context("connecting to relational store")?;
  let relational = Arc::new(relational);

  let vector = Arc::new(VectorStore::new(config.vector_store_url.clone(), config.vector_timeout()));

  let raw_embedder = HttpEmbeddingProvider::new(config.embedder_url.clone(), config.embedding_dim, config.embed_timeout());
  let embedder: Arc<dyn EmbeddingProvider> = embedding::wrap_resilient_arc(raw_embedder);

  let ocr_engine: Arc<dyn OcrEngine> = Arc::new(TesseractOcrEngine::new(config.ocr_timeout()));

  let indexer = Arc::new(Indexer::new(
    relational.clone(),
    vector.clone(),
    embedder.clone(),
    config.embedding_dim,
    config.collection_name.clone(),
  ));

  Ok(Adapters {
    relational,
    vector,
    embedder,
    ocr_engine,
    indexer,
  })
}

async fn cmd_ingest(config: EtlConfig, keywords: Vec<String>, max_lots: usize, since: Option<String>) -> ExitCode {
  let keywords: Vec<String> = keywords.into_iter().map(|k| k.trim().to_lowercase()).filter(|k| !k.is_empty()).collect();

  let since: Option<DateTime<Utc>> = match since {
    None => None,
    Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
      Ok(dt) => Some(dt.with_timezone(&Utc)),
      Err(e) => {
        eprintln!("bad --since value {raw:?}: {e}");
        return ExitCode::from(EXIT_BAD_ARGS);
      }
    },
  };

  let adapters = match build_adapters(&config).await {
    Ok(a) => a,
    Err(e) => {
      error!("failed to build adapters: {e:#}");
      return ExitCode::FAILURE;
    }
  };

  let auth = (!config.lot_feed_auth.is_empty()).then(|| config.lot_feed_auth.as_str().to_string());

  let lot_feed = Arc::new(HttpLotFeed::new(config.lot_feed_url.clone(), auth.clone(), config.fetch_timeout()));

  let pool_deps = PoolDeps {
    fetcher: Fetcher::new().with_max_bytes(config.max_file_bytes).with_timeout(config.fetch_timeout()),
    unpacker: Unpacker::new(config.max_file_bytes),
    ocr_engine: adapters.ocr_engine.clone(),
    indexer: adapters.indexer.clone(),
    text_threshold_chars: config.text_threshold_chars,
    render_scale: config.render_scale,
    ocr_languages: config.ocr_languages.clone(),
    retry_config: config.retry_config(),
    sink: Arc::new(NoopSink),
    lot_feed_auth: auth,
  };

  let coordinator = Coordinator::new(lot_feed, adapters.relational.clone(), config.max_workers, config.queue_capacity, pool_deps);

  match coordinator.run_batch(keywords, max_lots, since).await {
    Ok(report) => {
      println!("{}", serde_json::to_string_pretty(&report).expect("BatchReport always serializes"));
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!("batch failed: {e}");
      eprintln!("{}", serde_json::json!({"error": "lot_feed_unavailable", "detail": e.to_string()}));
      ExitCode::from(EXIT_LOT_FEED_UNAVAILABLE)
    }
  }
}

async fn cmd_serve(config: EtlConfig, addr: Option<String>) -> ExitCode {
  let bind_addr = addr.unwrap_or_else(|| config.http_bind_addr.clone());

  let adapters = match build_adapters(&config).await {
    Ok(a) => a,
    Err(e) => {
      error!("failed to build adapters: {e:#}");
      return ExitCode::FAILURE;
    }
  };

  let state = AppState {
    relational: adapters.relational,
    vector: adapters.vector,
    embedder: adapters.embedder,
    indexer: adapters.indexer,
    fetcher: Fetcher::new().with_max_bytes(config.max_file_bytes).with_timeout(config.fetch_timeout()),
    unpacker: Unpacker::new(config.max_file_bytes),
    ocr_engine: adapters.ocr_engine,
    config: Arc::new(config),
  };

  info!("starting query service on {bind_addr}");
  match daemon::run(&bind_addr, state).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("query service exited with error: {e}");
      ExitCode::FAILURE
    }
  }
}

fn cmd_config(action: ConfigAction) -> ExitCode {
  match action {
    ConfigAction::Init { path, force } => {
      let destination = path.or_else(EtlConfig::default_config_path);
      let Some(destination) = destination else {
        eprintln!("could not determine a default config path; pass --path explicitly");
        return ExitCode::from(EXIT_BAD_ARGS);
      };

      if destination.exists() && !force {
        eprintln!("{} already exists; pass --force to overwrite", destination.display());
        return ExitCode::from(EXIT_BAD_ARGS);
      }

      if let Some(parent) = destination.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
          eprintln!("failed to create {}: {e}", parent.display());
          return ExitCode::FAILURE;
        }
      }

      if let Err(e) = std::fs::write(&destination, EtlConfig::generate_template()) {
        eprintln!("failed to write {}: {e}", destination.display());
        return ExitCode::FAILURE;
      }

      println!("wrote {}", destination.display());
      ExitCode::SUCCESS
    }
  }
}

async fn cmd_reconcile(config: EtlConfig) -> ExitCode {
  let adapters = match build_adapters(&config).await {
    Ok(a) => a,
    Err(e) => {
      error!("failed to build adapters: {e:#}");
      return ExitCode::FAILURE;
    }
  };

  match index::reconcile_once(&adapters.relational, adapters.vector.as_ref(), &config.collection_name, adapters.indexer.as_ref()).await {
    Ok(report) => {
      println!("{}", serde_json::to_string_pretty(&report).expect("ReconcileReport always serializes"));
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!("reconciliation failed: {e}");
      ExitCode::FAILURE
    }
  }
}
