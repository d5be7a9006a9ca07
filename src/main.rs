use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use cv_rag::config::RagConfig;
use cv_rag::gemini::{GeminiClient, GeminiConfig};
use cv_rag::loader::IndexLoader;
use cv_rag::rag::RagEngine;

/// Answer questions about a CV using Gemini embeddings and a local vector index
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the corpus (plain text or PDF)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Where the vector index is persisted
    #[arg(long)]
    index: Option<PathBuf>,

    /// Number of chunks handed to the model per question
    #[arg(long)]
    top_k: Option<usize>,

    /// Discard any persisted index and build it again
    #[arg(long)]
    rebuild: bool,

    /// Answer a single question and exit
    #[arg(short, long)]
    question: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Fail fast on a missing API key, before any index work
    let gemini_config = GeminiConfig::from_env().context("Invalid Gemini configuration")?;

    let mut config = RagConfig::from_env().context("Invalid configuration")?;
    if let Some(corpus) = args.corpus {
        config.corpus_path = corpus;
    }
    if let Some(index) = args.index {
        config.index_path = index;
    }
    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }

    info!(
        "Corpus: {}, index: {}",
        config.corpus_path.display(),
        config.index_path.display()
    );

    let gemini = Arc::new(GeminiClient::new(gemini_config));
    let loader = IndexLoader::new(config.chunking.clone());

    if args.rebuild {
        loader
            .discard(&config.index_path)
            .await
            .context("Failed to remove persisted index")?;
    }

    let engine = RagEngine::initialize(&config, gemini.clone(), gemini, &loader)
        .await
        .context("Failed to prepare the vector index")?;

    match args.question {
        Some(question) => println!("{}", engine.answer_question(&question).await),
        None => engine
            .run_query_loop()
            .await
            .context("Error in query loop")?,
    }

    Ok(())
}
