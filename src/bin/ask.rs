use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ragsync::llm::OllamaClient;
use ragsync::qa::RetrievalQa;
use ragsync::{Config, SqliteVectorStore};

#[derive(Parser, Debug)]
#[command(name = "ask")]
#[command(about = "Answer a question from the ingested documents")]
struct Args {
    /// The question
    #[arg(required = true, num_args = 1..)]
    question: Vec<String>,

    /// Number of passages to retrieve (defaults to search.qa_k)
    #[arg(short, long)]
    k: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.ragsync.log_level),
    )
    .init();

    let question = args.question.join(" ");
    let k = args.k.unwrap_or(config.search.qa_k);

    let client = Arc::new(OllamaClient::new(&config.llm)?);
    let store = SqliteVectorStore::open(&config, client.clone()).await?;

    let qa = RetrievalQa::new(Arc::new(store), client, k)
        .with_score_threshold(config.search.score_threshold);
    let answer = qa.answer(&question).await?;

    println!("{}\n", answer.answer.trim());
    if !answer.sources.is_empty() {
        println!("Sources:");
        for hit in &answer.sources {
            println!(
                "  [{:.3}] {}",
                hit.score,
                hit.passage.metadata.source_path().unwrap_or("<unknown>")
            );
        }
    }

    Ok(())
}
