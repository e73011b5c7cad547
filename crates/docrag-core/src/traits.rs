use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::types::ModelConfig;

/// Turns texts into fixed-size vectors.
///
/// One call is one request to the backing model; callers decide the batch
/// size. Implementations return exactly one vector per input, all of the
/// same length.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &ModelConfig;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed a single text, e.g. a search query.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    if vectors.len() != 1 {
        return Err(EmbeddingError::CountMismatch { expected: 1, got: vectors.len() });
    }
    Ok(vectors.swap_remove(0))
}
