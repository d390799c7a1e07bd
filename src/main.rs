use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ragsync::ingest::SOURCE_PATH_KEY;
use ragsync::llm::OllamaClient;
use ragsync::store::ensure_index;
use ragsync::{Config, SqliteVectorStore, VectorStore};

#[derive(Parser, Debug)]
#[command(name = "ragsync", version)]
#[command(about = "Set up and inspect the ragsync vector store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and create the vector index if absent
    Init,
    /// Show passage counts and vector index state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.ragsync.log_level),
    )
    .init();

    match cli.command {
        Command::Init => run_init(&config).await,
        Command::Status => run_status(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<SqliteVectorStore> {
    let client = Arc::new(OllamaClient::new(&config.llm)?);
    Ok(SqliteVectorStore::open(config, client).await?)
}

async fn run_init(config: &Config) -> Result<()> {
    log::info!("Starting ragsync v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let store = open_store(config).await?;
    log::info!("Database initialized");

    let state = ensure_index(store.db(), store.definition(), config.index.poll_policy()).await?;
    log::info!(
        "Vector index '{}' ready ({} dims, {})",
        state.definition.name,
        state.definition.dimensions,
        state.definition.similarity
    );
    Ok(())
}

async fn run_status(config: &Config) -> Result<()> {
    let store = open_store(config).await?;

    let passages = store.count().await?;
    let sources = store.distinct_metadata_values(SOURCE_PATH_KEY).await?;

    println!("Database:  {}", config.db_path().display());
    println!("Passages:  {}", passages);
    println!("Sources:   {}", sources.len());

    match store.index_state().await? {
        Some(state) => {
            println!(
                "Index:     {} ({} dims, {}) {}",
                state.definition.name,
                state.definition.dimensions,
                state.definition.similarity,
                state.status.as_str()
            );
            if let Some(message) = state.message {
                println!("           {}", message);
            }
        }
        None => println!("Index:     {} (not created, run `ragsync init`)", store.definition().name),
    }

    Ok(())
}
