//! Retrieval-augmented query pipeline.
//!
//! Per question: embed → hybrid search → assemble context → render prompt →
//! generate. Each step's failure maps to a distinct [`Answer`] variant, so a
//! failed question never ends an interactive session. The pipeline keeps no
//! state between questions.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, with_deadline};
use crate::llm::LanguageModel;
use crate::vectorstore::{HybridQuery, VectorStore};

/// What the model is told to answer when the context does not contain the answer.
pub const NOT_IN_CONTEXT: &str = "Answer is not available in the context.";

/// Separator placed between passages in the assembled context.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

/// The fixed prompt. `{context}` and `{question}` are substituted by [`render_prompt`].
pub const PROMPT_TEMPLATE: &str = "You are an expert assistant helping users extract answers from documents.

Use only the provided context to answer the question.
If the answer is not found in the context, respond with: \"Answer is not available in the context.\"
Answer in detail.

Context:
{context}

Question: {question}

Answer:";

/// Fill [`PROMPT_TEMPLATE`] with an assembled context and a question.
pub fn render_prompt(context: &AnswerContext, question: &str) -> String {
    // The template's {context} precedes the question slot, so placeholders
    // inside either substituted text stay literal.
    PROMPT_TEMPLATE.replacen("{question}", question, 1).replacen("{context}", context.as_str(), 1)
}

/// Retrieved passage texts joined in retrieval order, within a character budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerContext {
    text: String,
    passages: usize,
}

impl AnswerContext {
    /// Join the passages of `result` with [`PASSAGE_SEPARATOR`], most relevant first.
    ///
    /// The top passage is always kept. Later passages are dropped once adding
    /// one would push the context past `max_chars` characters.
    pub fn assemble(result: &RetrievalResult, max_chars: usize) -> Self {
        let mut text = String::new();
        let mut used_chars = 0;
        let mut passages = 0;

        for passage in result.texts() {
            let chars = passage.chars().count();
            if passages == 0 {
                text.push_str(passage);
                used_chars = chars;
            } else {
                let added = PASSAGE_SEPARATOR.len() + chars;
                if used_chars + added > max_chars {
                    break;
                }
                text.push_str(PASSAGE_SEPARATOR);
                text.push_str(passage);
                used_chars += added;
            }
            passages += 1;
        }

        Self { text, passages }
    }

    /// The assembled context.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of passages that made it into the context.
    pub fn passage_count(&self) -> usize {
        self.passages
    }

    /// Whether nothing was assembled.
    pub fn is_empty(&self) -> bool {
        self.passages == 0
    }
}

impl fmt::Display for AnswerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The outcome of one question.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// The model produced an answer from the retrieved context.
    Generated {
        /// The model's answer.
        text: String,
        /// The context the answer was generated from.
        context: AnswerContext,
        /// The passages returned by the search.
        passages: RetrievalResult,
    },
    /// The search returned nothing; the model was not called.
    NoRelevantDocuments,
    /// The question could not be embedded or searched; the model was not called.
    RetrievalUnavailable {
        /// Why retrieval failed.
        reason: String,
    },
    /// Retrieval succeeded but the model call failed.
    GenerationFailed {
        /// Why generation failed.
        reason: String,
    },
}

impl Answer {
    /// Whether the model produced an answer.
    pub fn is_generated(&self) -> bool {
        matches!(self, Answer::Generated { .. })
    }

    /// The generated text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::Generated { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Generated { text, .. } => f.write_str(text.trim()),
            Answer::NoRelevantDocuments => f.write_str("No relevant documents found."),
            Answer::RetrievalUnavailable { reason } => {
                write!(f, "No answer: retrieval unavailable ({reason})")
            }
            Answer::GenerationFailed { reason } => write!(f, "LLM generation error: {reason}"),
        }
    }
}

/// Answers questions from the indexed collection.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{QueryPipeline, RagConfig};
///
/// let pipeline = QueryPipeline::new(config, embedder, store, llm)?;
/// let answer = pipeline.answer("What color is the sky?").await;
/// println!("{answer}");
/// pipeline.shutdown().await?;
/// ```
pub struct QueryPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
}

impl QueryPipeline {
    /// Assemble a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`](crate::RagError::Configuration) if `config` is invalid.
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, embedder, store, llm })
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Embed `question` and run a hybrid search for it.
    ///
    /// # Errors
    ///
    /// Fails if embedding or searching fails or times out.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        let timeout = self.config.request_timeout();
        let vector =
            with_deadline("question embedding", timeout, self.embedder.embed(question)).await?;
        let query = HybridQuery::new(question, vector, self.config.alpha, self.config.limit)?;
        let search = self.store.hybrid_search(&self.config.collection, &query);
        let result = with_deadline("hybrid search", timeout, search).await?;

        for (rank, passage) in result.passages().iter().enumerate() {
            debug!(
                rank = rank + 1,
                score = passage.score,
                text_len = passage.text.len(),
                "retrieved passage"
            );
        }
        Ok(result)
    }

    /// Answer `question` from the indexed documents.
    ///
    /// Never fails: every failure mode is an [`Answer`] variant.
    pub async fn answer(&self, question: &str) -> Answer {
        let started = Instant::now();

        let passages = match self.retrieve(question).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!(error = %e, "retrieval unavailable");
                return Answer::RetrievalUnavailable { reason: e.to_string() };
            }
        };
        if passages.is_empty() {
            warn!(collection = %self.config.collection, "no relevant documents found");
            return Answer::NoRelevantDocuments;
        }

        let context = AnswerContext::assemble(&passages, self.config.max_context_chars);
        let prompt = render_prompt(&context, question);
        debug!(
            passages = context.passage_count(),
            context_len = context.as_str().len(),
            model = self.llm.name(),
            "generating answer"
        );

        let generation = self.llm.generate(&prompt);
        match with_deadline("generation", self.config.request_timeout(), generation).await {
            Ok(text) => {
                info!(
                    passages = context.passage_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "query completed"
                );
                Answer::Generated { text, context, passages }
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                Answer::GenerationFailed { reason: e.to_string() }
            }
        }
    }

    /// Release the store handle held by this pipeline.
    pub async fn shutdown(self) -> Result<()> {
        self.store.close().await
    }
}
