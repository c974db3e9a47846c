//! haven-migrate binary.
//!
//! Reads `haven.toml` (or the path given with `--config`), opens the SQLite
//! directory and ingests every configured source document.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use haven_core::catalog::Catalog;
use haven_migrate::{
  CancelFlag, Engine, MigrateConfig,
  config::{DEFAULT_CONFIG_FILE, expand_tilde},
};
use haven_store_sqlite::{SchemaSource, SqliteStore};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, filter::Directive, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about = "Load scraped recovery service documents into the directory")]
struct Cli {
  /// SQLite database to create or update. Overrides `db_path`.
  db_path: Option<PathBuf>,

  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
  config: PathBuf,

  /// Default log directive, e.g. `debug` or `haven_migrate=debug`.
  #[arg(long)]
  log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  let mut cfg = MigrateConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
  if let Some(db_path) = cli.db_path {
    cfg.db_path = expand_tilde(&db_path);
  }
  if let Some(level) = cli.log_level {
    cfg.log_level = level;
  }

  // Held until exit so buffered file logs are flushed.
  let _guard = init_tracing(&cfg)?;

  let schema = cfg
    .schema_dir
    .clone()
    .map_or(SchemaSource::Embedded, SchemaSource::Directory);
  let store = SqliteStore::open_with_schema(&cfg.db_path, &schema)
    .await
    .with_context(|| format!("failed to open directory at {:?}", cfg.db_path))?;

  let catalog = Catalog::standard().context("built-in reference data is invalid")?;

  let cancel = CancelFlag::new();
  tokio::spawn({
    let cancel = cancel.clone();
    async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received; stopping after the current batch");
        cancel.cancel();
      }
    }
  });

  let engine = Engine::new(store, catalog)
    .context("failed to build the ingest pipeline")?
    .with_batch_size(cfg.batch_size)
    .with_cancel_flag(cancel);

  info!(
    db_path = %cfg.db_path.display(),
    sources = cfg.sources.len(),
    "migration started"
  );
  let report = engine.migrate(&cfg.sources).await.context("migration failed")?;

  for run in report.failed_runs() {
    warn!(
      source_id = %run.run.source_id,
      reason = run.failure.as_deref().unwrap_or_default(),
      "source failed"
    );
  }
  Ok(())
}

/// Console logging plus an optional plain-text file layer.
fn init_tracing(cfg: &MigrateConfig) -> anyhow::Result<Option<WorkerGuard>> {
  let directive: Directive = cfg
    .log_level
    .parse()
    .with_context(|| format!("invalid log level {:?}", cfg.log_level))?;
  let filter = EnvFilter::builder()
    .with_default_directive(directive)
    .from_env_lossy();

  let (file_layer, guard) = match &cfg.log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
      let file_name = path
        .file_name()
        .with_context(|| format!("log_file {path:?} has no file name"))?;
      std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {dir:?}"))?;
      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer())
    .with(file_layer)
    .init();
  Ok(guard)
}
