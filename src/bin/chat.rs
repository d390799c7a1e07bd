use std::io::Write;

use anyhow::Result;
use clap::Parser;
use ragsync::llm::{Conversation, OllamaClient};
use ragsync::Config;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "chat")]
#[command(about = "Interactive multi-turn chat with the configured model")]
struct Args {
    /// Optional system prompt for the whole conversation
    #[arg(long)]
    system: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.ragsync.log_level),
    )
    .init();

    let client = OllamaClient::new(&config.llm)?;
    let mut conversation = match args.system {
        Some(prompt) => Conversation::with_system_prompt(prompt),
        None => Conversation::new(),
    };

    println!("Chatting with {} (type 'exit' to quit)", config.llm.chat_model);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match conversation.send(&client, input).await {
            Ok(reply) => println!("{}\n", reply.trim()),
            Err(e) => log::error!("chat request failed: {}", e),
        }
    }

    Ok(())
}
