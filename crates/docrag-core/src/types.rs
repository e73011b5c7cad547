//! Domain types shared by the indexer and the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::chunker::compute_char_window;

/// Version written into every index file. Readers refuse anything newer.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// A text file read from the input tree.
///
/// - `path`: root-relative path with `/` separators
/// - `raw_text`: full UTF-8 contents
/// - `content_hash`: hex BLAKE3 of the raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: String,
    pub raw_text: String,
    pub content_hash: String,
}

/// A window of a document's text; the unit of embedding and retrieval.
///
/// Offsets count characters, not bytes, and `end_offset` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub doc_path: String,
    pub chunk_index: usize,
    pub text: String,
    #[serde(default)]
    pub start_offset: usize,
    #[serde(default)]
    pub end_offset: usize,
}

impl Chunk {
    /// Stable identity used for citations and dedup: `path#chunkIndex`.
    pub fn citation(&self) -> String {
        format!("{}#{}", self.doc_path, self.chunk_index)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Embedding model provenance recorded in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub endpoint: String,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self { name: name.into(), endpoint: endpoint.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub docs: usize,
    pub chunks: usize,
    pub avg_chunk_len: f64,
    pub elapsed_ms: u64,
}

/// Per-document bookkeeping kept alongside the chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub path: String,
    pub content_hash: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    pub chunks: Vec<EmbeddedChunk>,
    #[serde(default)]
    pub documents: Vec<DocumentEntry>,
    pub model: ModelConfig,
    pub stats: BuildStats,
}

fn legacy_schema_version() -> u32 {
    1
}

impl Index {
    pub fn empty(model: ModelConfig) -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            chunks: Vec::new(),
            documents: Vec::new(),
            model,
            stats: BuildStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Dimension shared by every vector, `None` for an empty index.
    pub fn dim(&self) -> Option<usize> {
        self.chunks.first().map(|c| c.vector.len())
    }

    /// Number of chunks the index holds for `doc_path`.
    pub fn chunk_count(&self, doc_path: &str) -> usize {
        if let Some(entry) = self.documents.iter().find(|d| d.path == doc_path) {
            return entry.chunks;
        }
        self.chunks.iter().filter(|c| c.chunk.doc_path == doc_path).count()
    }

    /// Canonical persisted order: document path, then chunk index.
    pub fn sort_chunks(&mut self) {
        self.chunks.sort_by(|a, b| {
            a.chunk
                .doc_path
                .cmp(&b.chunk.doc_path)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        self.documents.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

/// Chunking and embedding parameters for one build.
///
/// `max_chars`/`overlap_chars` are always derived from the token values, so
/// construct through [`BuildParams::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct BuildParams {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub chars_per_token: f64,
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub concurrency: usize,
    pub batch_size: usize,
}

impl BuildParams {
    pub fn new(target_tokens: usize, overlap_tokens: usize, chars_per_token: f64, concurrency: usize) -> Self {
        let window = compute_char_window(target_tokens, overlap_tokens, chars_per_token);
        Self {
            target_tokens,
            overlap_tokens,
            chars_per_token,
            max_chars: window.max_chars,
            overlap_chars: window.overlap_chars,
            concurrency: concurrency.max(1),
            batch_size: 16,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl Default for BuildParams {
    fn default() -> Self {
        Self::new(400, 80, 3.0, 4)
    }
}

/// Second-stage re-scoring strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerankMode {
    /// Keep kNN scores as they are.
    #[default]
    None,
    /// Blend cosine with the share of query terms found in the chunk.
    TermOverlap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CutoffMode {
    None,
    #[default]
    Quantile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub mode: RerankMode,
    pub cutoff_mode: CutoffMode,
    pub quantile_q: f64,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self { mode: RerankMode::None, cutoff_mode: CutoffMode::Quantile, quantile_q: 0.0 }
    }
}

/// Retrieval settings, owned by whoever hosts the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub enabled: bool,
    pub index_path: String,
    pub top_k: usize,
    pub rerank: RerankSettings,
    /// First-stage kNN fetches `top_k * overfetch_factor` candidates.
    pub overfetch_factor: usize,
    /// Character budget for the rendered context block.
    pub max_context_chars: Option<usize>,
    /// Embedding model the caller expects the index to be built with.
    pub expected_model: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            index_path: "rag-index.json".to_string(),
            top_k: 5,
            rerank: RerankSettings::default(),
            overfetch_factor: 4,
            max_context_chars: None,
            expected_model: None,
            request_timeout_ms: 30_000,
        }
    }
}

impl RagSettings {
    pub fn first_stage_k(&self) -> usize {
        self.top_k.saturating_mul(self.overfetch_factor.max(1))
    }
}

/// A kNN hit: the chunk without its vector, plus the similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub score: f32,
}
