//! Watch the docs root for file changes and re-sync the store automatically.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ragsync::llm::OllamaClient;
use ragsync::ingest::Exclusions;
use ragsync::store::ensure_index;
use ragsync::watch::run_watcher;
use ragsync::{Config, Ingestor, SqliteVectorStore};

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Watch a documents directory and re-ingest on changes")]
struct Args {
    /// Directory to watch (defaults to ragsync.docs_root)
    root: Option<PathBuf>,

    /// Quiet period in milliseconds before a burst of changes is processed
    #[arg(long, default_value = "500")]
    debounce_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.ragsync.log_level),
    )
    .init();

    let root = args.root.unwrap_or_else(|| config.docs_root().to_path_buf());
    log::info!("Starting ragsync file watcher on {}", root.display());
    log::info!("Debounce: {} ms", args.debounce_ms);

    let client = Arc::new(OllamaClient::new(&config.llm)?);
    let store = SqliteVectorStore::open(&config, client).await?;
    ensure_index(store.db(), store.definition(), config.index.poll_policy()).await?;

    // The database may live under the watched root
    let ingestor = Ingestor::new(Arc::new(store), config.chunking)
        .with_exclusions(Exclusions::new().with_database(config.db_path()));

    log::info!("Watching for changes (Ctrl+C to stop)");
    run_watcher(ingestor, &root, Duration::from_millis(args.debounce_ms)).await?;
    Ok(())
}
