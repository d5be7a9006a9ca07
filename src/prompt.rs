use crate::chunking::TextChunk;
use crate::error::{render_error, ProviderError, RagError, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

/// Produces text from a prompt
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError>;
}

/// The variable parts of the answering instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Whose CV the corpus is
    pub subject: String,
    /// Language of the corpus, and of the answers
    pub language: String,
    /// Sentence the model must reply with when the context has no answer
    pub unknown_answer: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        PromptTemplate {
            subject: "the candidate".to_string(),
            language: "Turkish".to_string(),
            unknown_answer: "Bu konuda bilgim yok".to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn render(&self, context: &str, question: &str) -> String {
        format!(
            "You are the personal CV assistant of {subject}. Answer the question using the context below.\n\
             CONTEXT:\n\
             {context}\n\
             \n\
             QUESTION: {question}\n\
             \n\
             RULES:\n\
             1. Use only the information in the context.\n\
             2. Answer in {language}.\n\
             3. Keep a warm but professional tone.\n\
             4. If the context does not contain the answer, reply exactly \"{unknown}\".\n\
             5. Keep the answer short and clear.\n\
             ANSWER:\n",
            subject = self.subject,
            context = context,
            question = question,
            language = self.language,
            unknown = self.unknown_answer,
        )
    }
}

/// Concatenate chunk texts in rank order, separated by a blank line
pub fn build_context(chunks: &[TextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.trim())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

/// Turns retrieved chunks and a question into a generated answer
#[derive(Debug, Clone)]
pub struct PromptComposer {
    template: PromptTemplate,
    timeout: Duration,
}

impl PromptComposer {
    pub fn new(template: PromptTemplate, timeout: Duration) -> Self {
        PromptComposer { template, timeout }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn compose(&self, question: &str, chunks: &[TextChunk]) -> String {
        self.template.render(&build_context(chunks), question)
    }

    /// Generate an answer, reporting failures as typed errors
    pub async fn try_answer(
        &self,
        question: &str,
        chunks: &[TextChunk],
        generator: &dyn GenerationProvider,
    ) -> Result<String> {
        let prompt = self.compose(question, chunks);
        debug!("Prompt is {} bytes with {} chunks", prompt.len(), chunks.len());

        tokio::time::timeout(self.timeout, generator.generate(&prompt))
            .await
            .map_err(|_| RagError::Timeout(self.timeout))?
            .map_err(RagError::Generation)
    }

    /// Generate an answer; failures come back as a displayable string
    /// starting with the failure marker.
    pub async fn answer(
        &self,
        question: &str,
        chunks: &[TextChunk],
        generator: &dyn GenerationProvider,
    ) -> String {
        match self.try_answer(question, chunks, generator).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Answer generation failed: {}", e);
                render_error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FAILURE_MARKER;
    use std::sync::Mutex;

    /// Records the prompt and echoes a canned answer
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationProvider for Recorder {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("X Üniversitesi'nde okudu.".to_string())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl GenerationProvider for Unreachable {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, ProviderError> {
            Err(ProviderError::Other("connection refused".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl GenerationProvider for Slow {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    fn chunks() -> Vec<TextChunk> {
        vec![
            TextChunk {
                text: "### Eğitim\nX Üniversitesi 2020-2024\n".to_string(),
                start_position: 0,
            },
            TextChunk {
                text: "### Deneyim\nY Şirketi stajyer".to_string(),
                start_position: 36,
            },
        ]
    }

    fn composer() -> PromptComposer {
        PromptComposer::new(PromptTemplate::default(), Duration::from_secs(5))
    }

    #[test]
    fn test_context_joins_chunks_with_blank_line() {
        assert_eq!(
            build_context(&chunks()),
            "### Eğitim\nX Üniversitesi 2020-2024\n\n### Deneyim\nY Şirketi stajyer"
        );
    }

    #[test]
    fn test_prompt_contains_context_question_and_rules() {
        let prompt = composer().compose("Eğitim bilgisi nedir?", &chunks());

        assert!(prompt.contains("X Üniversitesi 2020-2024"));
        assert!(prompt.contains("QUESTION: Eğitim bilgisi nedir?"));
        assert!(prompt.contains("Answer in Turkish."));
        assert!(prompt.contains("\"Bu konuda bilgim yok\""));
        assert!(prompt.find("### Eğitim").unwrap() < prompt.find("### Deneyim").unwrap());
        for rule in 1..=5 {
            assert!(prompt.contains(&format!("\n{}. ", rule)));
        }
    }

    #[tokio::test]
    async fn test_answer_is_returned_verbatim() {
        let recorder = Recorder {
            prompts: Mutex::new(Vec::new()),
        };
        let answer = composer()
            .answer("Eğitim bilgisi nedir?", &chunks(), &recorder)
            .await;

        assert_eq!(answer, "X Üniversitesi'nde okudu.");
        let prompts = recorder.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Y Şirketi stajyer"));
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_marked_answer() {
        let answer = composer().answer("Nerede çalıştı?", &chunks(), &Unreachable).await;
        assert!(answer.starts_with(FAILURE_MARKER));
        assert!(answer.contains("connection refused"));

        let error = composer()
            .try_answer("Nerede çalıştı?", &chunks(), &Unreachable)
            .await
            .unwrap_err();
        assert!(matches!(error, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn test_slow_generation_times_out() {
        let composer = PromptComposer::new(PromptTemplate::default(), Duration::from_millis(20));

        let error = composer
            .try_answer("Nerede çalıştı?", &chunks(), &Slow)
            .await
            .unwrap_err();
        assert!(matches!(error, RagError::Timeout(_)));

        let answer = composer.answer("Nerede çalıştı?", &chunks(), &Slow).await;
        assert!(answer.starts_with(FAILURE_MARKER));
    }
}
