//! Language model trait used to turn an assembled prompt into an answer.

use async_trait::async_trait;

use crate::error::Result;

/// A text generation service.
///
/// The query pipeline calls [`generate`](LanguageModel::generate) once per
/// answered question with a fully rendered prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// A short model name for logs and errors.
    fn name(&self) -> &str;
}
