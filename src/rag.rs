use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{render_error, Result};
use crate::index::VectorIndex;
use crate::loader::IndexLoader;
use crate::prompt::{GenerationProvider, PromptComposer};
use crate::retriever::retrieve;
use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// RAG (Retrieval-Augmented Generation) engine
///
/// Owns the index for the life of the process. Every question is answered
/// independently; `&self` methods may be called concurrently.
pub struct RagEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    composer: PromptComposer,
    top_k: usize,
}

impl RagEngine {
    /// Create a new RAG engine around an already built index
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        composer: PromptComposer,
        top_k: usize,
    ) -> Self {
        RagEngine {
            index,
            embedder,
            generator,
            composer,
            top_k,
        }
    }

    /// Load or build the index described by `config` and wire up the engine
    pub async fn initialize(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        loader: &IndexLoader,
    ) -> Result<Self> {
        config.validate()?;

        let index = loader
            .load_or_build(&config.corpus_path, &config.index_path, embedder.as_ref())
            .await?;
        info!("Index ready with {} chunks", index.entries().len());

        let composer = PromptComposer::new(config.template.clone(), config.generation_timeout);
        Ok(RagEngine::new(index, embedder, generator, composer, config.top_k))
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Answer a question, reporting failures as typed errors
    pub async fn ask(&self, question: &str) -> Result<String> {
        let chunks = retrieve(
            question,
            self.index.as_ref(),
            self.embedder.as_ref(),
            self.top_k,
        )
        .await?;

        self.composer
            .try_answer(question, &chunks, self.generator.as_ref())
            .await
    }

    /// Answer a question; never fails. Errors are rendered as a string
    /// starting with the failure marker.
    pub async fn answer_question(&self, question: &str) -> String {
        match self.ask(question).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Failed to answer {:?}: {}", question, e);
                render_error(&e)
            }
        }
    }

    /// Run the interactive question loop on stdin until `exit` or EOF
    pub async fn run_query_loop(&self) -> Result<()> {
        println!("Ready to answer questions. Type 'exit' to quit.");

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buffer = String::new();

        loop {
            print!("\nYour question: ");
            stdout.flush()?;

            buffer.clear();
            if stdin.lock().read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") {
                println!("Goodbye!");
                break;
            }

            let answer = self.answer_question(question).await;
            println!("\n{}", answer);
        }

        Ok(())
    }
}
