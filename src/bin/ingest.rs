use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ragsync::llm::OllamaClient;
use ragsync::ingest::Exclusions;
use ragsync::store::ensure_index;
use ragsync::{Config, IngestOptions, Ingestor, SqliteVectorStore};

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Sync a documents directory into the vector store (incremental by default)")]
struct Args {
    /// File or directory to ingest (defaults to ragsync.docs_root)
    root: Option<PathBuf>,

    /// Force re-ingestion of all files (ignore stored modification times)
    #[arg(short, long)]
    force: bool,

    /// Remove stored passages of files that no longer exist under the root
    #[arg(short, long)]
    cleanup: bool,
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
    log::info!("Starting ingestion of {}", root.display());
    log::info!("Database path: {}", config.db_path().display());

    let client = Arc::new(OllamaClient::new(&config.llm)?);
    let store = SqliteVectorStore::open(&config, client).await?;
    ensure_index(store.db(), store.definition(), config.index.poll_policy()).await?;

    let options = IngestOptions {
        force: args.force,
        cleanup: args.cleanup,
    };
    let ingestor = Ingestor::new(Arc::new(store), config.chunking)
        .with_options(options)
        .with_exclusions(Exclusions::new().with_database(config.db_path()));

    let report = ingestor.run(&root).await?;

    log::info!("=== Ingestion Complete ===");
    log::info!("Files discovered: {}", report.files_discovered);
    if !args.force {
        log::info!("  New: {}", report.new_files);
        log::info!("  Modified: {}", report.modified_files);
        log::info!("  Unchanged (skipped): {}", report.unchanged_files);
    }
    log::info!("Passages loaded: {}", report.passages_loaded);
    log::info!("Passages stored: {}", report.ids.len());
    if report.passages_deleted > 0 {
        log::info!("Passages removed (files deleted from disk): {}", report.passages_deleted);
    }

    Ok(())
}
