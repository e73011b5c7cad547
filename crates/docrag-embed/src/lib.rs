//! docrag-embed
//!
//! Embedding backends: an Ollama-compatible HTTP client with retry/backoff
//! and a deterministic fake for tests.

pub mod fake;
pub mod ollama;
pub mod retry;

use std::sync::Arc;

use tracing::info;

use docrag_core::types::ModelConfig;
use docrag_core::{Embedder, EmbeddingError};

pub use fake::FakeEmbedder;
pub use ollama::{OllamaEmbedder, DEFAULT_EMBED_MODEL, DEFAULT_OLLAMA_URL};
pub use retry::{with_retry, RetryPolicy};

/// Dimension used by the fake embedder when selected through the environment.
pub const FAKE_EMBEDDING_DIM: usize = 1024;

/// Build the embedder for `model`.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` swaps in [`FakeEmbedder`], which records the
/// requested model so index provenance checks still line up.
pub fn default_embedder(model: ModelConfig, retry: RetryPolicy) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if use_fake {
        info!(model = %model.name, "using fake embeddings");
        return Ok(Arc::new(FakeEmbedder::with_model(FAKE_EMBEDDING_DIM, model)));
    }
    Ok(Arc::new(OllamaEmbedder::new(model, retry)?))
}
