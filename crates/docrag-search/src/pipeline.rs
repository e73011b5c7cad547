use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use docrag_core::traits::embed_one;
use docrag_core::types::{Index, RagSettings, RetrievedChunk};
use docrag_core::{Embedder, EmbeddingError, Error, Result};
use docrag_index::{knn, sort_ranked};

use crate::rerank::{cutoff_for, reranker_for};

/// Question in, ranked chunks and a rendered context block out.
pub struct SearchPipeline {
    embedder: Arc<dyn Embedder>,
}

impl SearchPipeline {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `question`, fetch `top_k * overfetch_factor` neighbours, rerank,
    /// cut off and keep the best `top_k`.
    pub async fn retrieve_chunks(
        &self,
        question: &str,
        index: &Index,
        settings: &RagSettings,
    ) -> Result<Vec<RetrievedChunk>> {
        self.check_model(index, settings)?;
        if index.is_empty() || settings.top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed_question(question, settings.request_timeout_ms).await?;
        let candidates = knn(&query, index, settings.first_stage_k())?;
        let fetched = candidates.len();

        let reranked = reranker_for(settings.rerank.mode).rerank(question, candidates);
        let mut kept = cutoff_for(&settings.rerank).apply(reranked);
        sort_ranked(&mut kept);
        kept.truncate(settings.top_k);

        debug!(fetched, kept = kept.len(), top_k = settings.top_k, "retrieved chunks");
        Ok(kept)
    }

    fn check_model(&self, index: &Index, settings: &RagSettings) -> Result<()> {
        if let Some(expected) = settings.expected_model.as_deref() {
            if expected != index.model.name {
                return Err(Error::StaleIndex { expected: expected.to_string(), found: index.model.name.clone() });
            }
        }
        let current = &self.embedder.model().name;
        if *current != index.model.name {
            return Err(Error::StaleIndex { expected: current.clone(), found: index.model.name.clone() });
        }
        Ok(())
    }

    async fn embed_question(&self, question: &str, timeout_ms: u64) -> Result<Vec<f32>> {
        let embedding = embed_one(self.embedder.as_ref(), question);
        if timeout_ms == 0 {
            return Ok(embedding.await?);
        }
        match tokio::time::timeout(Duration::from_millis(timeout_ms), embedding).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EmbeddingError::Timeout(timeout_ms).into()),
        }
    }
}

/// Render `chunks` as numbered, cited excerpts separated by blank lines.
///
/// Each entry reads `[n] path#idx (part i of m, score s)` followed by the
/// chunk text. With `max_context_chars` set, entries are added while they fit;
/// the first one is always present. If it alone is over budget its header is
/// kept whole and only the chunk text is cut, so even `Some(0)` yields a citation.
pub fn build_context(chunks: &[RetrievedChunk], index: &Index, settings: &RagSettings) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for (n, hit) in chunks.iter().enumerate() {
        let (header, body) = render_entry(n + 1, hit, index);
        let entry_len = header.chars().count() + 1 + body.chars().count();
        let sep = if out.is_empty() { 0 } else { 2 };

        if let Some(budget) = settings.max_context_chars {
            if out.is_empty() && entry_len > budget {
                let room = budget.saturating_sub(header.chars().count() + 1);
                out.push_str(&header);
                if room > 0 {
                    out.push('\n');
                    out.extend(body.chars().take(room));
                }
                break;
            }
            if used + sep + entry_len > budget {
                break;
            }
        }
        if sep > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&header);
        out.push('\n');
        out.push_str(body);
        used += sep + entry_len;
    }
    out
}

fn render_entry<'a>(n: usize, hit: &'a RetrievedChunk, index: &Index) -> (String, &'a str) {
    let part = hit.chunk.chunk_index + 1;
    let total = index.chunk_count(&hit.chunk.doc_path).max(part);
    let header = format!("[{n}] {} (part {part} of {total}, score {:.3})", hit.chunk.citation(), hit.score);
    (header, hit.chunk.text.trim())
}
