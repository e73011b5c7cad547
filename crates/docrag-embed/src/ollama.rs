use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docrag_core::types::ModelConfig;
use docrag_core::{Embedder, EmbeddingError};

use crate::retry::{with_retry, RetryPolicy};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "mxbai-embed-large";

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// `/api/embed` answers with `embeddings`; older servers send one `embedding`.
#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

/// Embedder backed by an Ollama-compatible HTTP endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: ModelConfig,
    retry: RetryPolicy,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(model: ModelConfig, retry: RetryPolicy) -> Result<Self, EmbeddingError> {
        Self::with_timeout(model, retry, Duration::from_secs(120))
    }

    pub fn with_timeout(model: ModelConfig, retry: RetryPolicy, timeout: Duration) -> Result<Self, EmbeddingError> {
        check_endpoint(&model.endpoint)?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;
        Ok(Self { client, model, retry, timeout })
    }

    fn url(&self) -> String {
        format!("{}/api/embed", self.model.endpoint.trim_end_matches('/'))
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let req = EmbedRequest { model: &self.model.name, input: texts };
        let resp = self.client.post(self.url()).json(&req).send().await.map_err(|e| self.transport_error(&e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(&e))?;
        if !status.is_success() {
            return Err(EmbeddingError::Status { status: status.as_u16(), body: truncate(&body, 512) });
        }
        let vectors = parse_embeddings(&body)?;
        validate_vectors(texts.len(), &vectors)?;
        Ok(vectors)
    }

    fn transport_error(&self, err: &reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else if err.is_builder() {
            EmbeddingError::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            EmbeddingError::Decode(err.to_string())
        } else {
            EmbeddingError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model(&self) -> &ModelConfig {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model.name, inputs = texts.len(), "embedding batch");
        with_retry(&self.retry, || self.embed_once(texts)).await
    }
}

/// Endpoints must be absolute `http`/`https` URLs.
fn check_endpoint(endpoint: &str) -> Result<(), EmbeddingError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| EmbeddingError::InvalidRequest(format!("endpoint '{endpoint}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(EmbeddingError::InvalidRequest(format!(
            "endpoint '{endpoint}' must be an http(s) URL, e.g. http://localhost:11434"
        )));
    }
    Ok(())
}

pub(crate) fn parse_embeddings(body: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let parsed: EmbedResponse =
        serde_json::from_str(body).map_err(|e| EmbeddingError::Decode(format!("{e} | {}", truncate(body, 256))))?;
    match (parsed.embeddings, parsed.embedding) {
        (Some(many), _) => Ok(many),
        (None, Some(one)) => Ok(vec![one]),
        (None, None) => Err(EmbeddingError::Decode("no embeddings in response".to_string())),
    }
}

/// One vector per input, all non-empty and of the same length.
pub fn validate_vectors(expected: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch { expected, got: vectors.len() });
    }
    let Some(first) = vectors.first() else { return Ok(()) };
    let dim = first.len();
    if dim == 0 {
        return Err(EmbeddingError::DimensionMismatch { expected: 1, got: 0 });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(EmbeddingError::DimensionMismatch { expected: dim, got: bad.len() });
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
