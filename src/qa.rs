//! Retrieval-augmented question answering over the vector store.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel};
use crate::store::{ScoredPassage, VectorStore};

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// An answer and the passages it was grounded on, best match first
#[derive(Debug, Clone)]
pub struct QaAnswer {
    pub answer: String,
    pub sources: Vec<ScoredPassage>,
}

/// Retrieve the closest passages, stuff them into one prompt, ask the model once.
pub struct RetrievalQa {
    store: Arc<dyn VectorStore>,
    model: Arc<dyn ChatModel>,
    k: usize,
    score_threshold: Option<f32>,
}

impl RetrievalQa {
    pub fn new(store: Arc<dyn VectorStore>, model: Arc<dyn ChatModel>, k: usize) -> Self {
        Self {
            store,
            model,
            k,
            score_threshold: None,
        }
    }

    pub fn with_score_threshold(mut self, score_threshold: Option<f32>) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub async fn answer(&self, question: &str) -> Result<QaAnswer> {
        let sources = self
            .store
            .similarity_search(question, self.k, self.score_threshold)
            .await?;
        log::debug!("Retrieved {} passages for question", sources.len());

        let prompt = build_prompt(question, &sources);
        let answer = self.model.generate(&[ChatMessage::user(prompt)]).await?;

        Ok(QaAnswer { answer, sources })
    }
}

fn build_prompt(question: &str, sources: &[ScoredPassage]) -> String {
    let context = if sources.is_empty() {
        "(no context available)".to_string()
    } else {
        sources
            .iter()
            .map(|hit| hit.passage.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    // Single pass: retrieved text is never scanned for placeholders
    format!("{}\n\n{}\n\nQuestion: {}\nHelpful Answer:", PROMPT_PREAMBLE, context, question)
}
