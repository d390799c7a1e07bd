use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use ragsync::ingest::extract::markdown::SECTION_KEY;
use ragsync::llm::OllamaClient;
use ragsync::{Config, SqliteVectorStore, VectorStore};

#[derive(Parser, Debug)]
#[command(name = "search")]
#[command(about = "Similarity search over ingested passages")]
struct Args {
    /// Search query
    query: String,

    /// Number of results (defaults to search.default_k)
    #[arg(short, long)]
    k: Option<usize>,

    /// Minimum relevance score between 0.0 and 1.0
    #[arg(long)]
    min_score: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.ragsync.log_level),
    )
    .init();

    if args.query.trim().is_empty() {
        anyhow::bail!("Query cannot be empty");
    }
    let k = args.k.unwrap_or(config.search.default_k);
    let min_score = args.min_score.or(config.search.score_threshold);

    let client = Arc::new(OllamaClient::new(&config.llm)?);
    let store = SqliteVectorStore::open(&config, client).await?;

    let start = Instant::now();
    let results = store.similarity_search(&args.query, k, min_score).await?;
    let latency = start.elapsed();

    println!("\nQuery: \"{}\"", args.query);
    println!("Found {} results in {:?}\n", results.len(), latency);

    for (rank, hit) in results.iter().enumerate() {
        let metadata = &hit.passage.metadata;
        let source = metadata.source_path().unwrap_or("<unknown>");
        print!("{}. [{:.3}] {}", rank + 1, hit.score, source);
        if let Ok(section) = metadata.get_str(SECTION_KEY) {
            print!(" > {}", section);
        }
        println!();

        let snippet: String = hit.passage.content.chars().take(200).collect();
        println!("   {}\n", snippet.replace('\n', " "));
    }

    Ok(())
}
