//! Read, chunk and embed a directory tree into an in-memory [`Index`].
//!
//! Typical flow:
//! 1) Walk the input root with [`ContentReader`] (sorted, text files only)
//! 2) Split every document into overlapping character windows
//! 3) Embed batches of chunk texts, at most `concurrency` requests in flight
//! 4) Assemble the index in `(doc_path, chunk_index)` order with build stats
//!
//! The first embedding failure cancels every outstanding batch and the build
//! returns that error; nothing is written.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use docrag_core::chunker::Chunker;
use docrag_core::reader::ContentReader;
use docrag_core::types::{BuildParams, BuildStats, Chunk, DocumentEntry, EmbeddedChunk, Index, INDEX_SCHEMA_VERSION};
use docrag_core::{Embedder, EmbeddingError, Result};

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub input_dir: PathBuf,
    pub params: BuildParams,
}

impl BuildRequest {
    pub fn new(input_dir: impl Into<PathBuf>, params: BuildParams) -> Self {
        Self { input_dir: input_dir.into(), params }
    }
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    reader: ContentReader,
    progress: ProgressBar,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, reader: ContentReader::default(), progress: ProgressBar::hidden() }
    }

    pub fn with_reader(mut self, reader: ContentReader) -> Self {
        self.reader = reader;
        self
    }

    /// Report embedded chunks on `progress`; the length is set once chunking is done.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Bar styled for terminal use by the CLI.
    pub fn terminal_progress() -> ProgressBar {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    pub async fn build(&self, request: &BuildRequest) -> Result<Index> {
        let started = Instant::now();
        let params = &request.params;
        let docs = self.reader.read(&request.input_dir)?;

        let chunker = Chunker::from_params(params);
        let mut documents = Vec::with_capacity(docs.len());
        let mut chunks: Vec<Chunk> = Vec::new();
        for doc in &docs {
            let doc_chunks = chunker.chunk(doc);
            debug!(path = %doc.path, chunks = doc_chunks.len(), "chunked document");
            documents.push(DocumentEntry {
                path: doc.path.clone(),
                content_hash: doc.content_hash.clone(),
                chunks: doc_chunks.len(),
            });
            chunks.extend(doc_chunks);
        }
        info!(
            root = %request.input_dir.display(),
            docs = docs.len(),
            chunks = chunks.len(),
            max_chars = params.max_chars,
            overlap_chars = params.overlap_chars,
            "chunked input"
        );

        self.progress.set_length(chunks.len() as u64);
        let vectors = self.embed_all(&chunks, params).await;
        let vectors = match vectors {
            Ok(v) => v,
            Err(err) => {
                self.progress.abandon_with_message("embedding failed");
                return Err(err.into());
            }
        };
        self.progress.finish_with_message("embedded");

        let total_chars: usize = chunks.iter().map(Chunk::char_len).sum();
        #[allow(clippy::cast_precision_loss)]
        let avg_chunk_len = if chunks.is_empty() { 0.0 } else { total_chars as f64 / chunks.len() as f64 };
        let stats = BuildStats {
            docs: docs.len(),
            chunks: chunks.len(),
            avg_chunk_len,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        let mut index = Index {
            schema_version: INDEX_SCHEMA_VERSION,
            chunks: chunks.into_iter().zip(vectors).map(|(chunk, vector)| EmbeddedChunk { chunk, vector }).collect(),
            documents,
            model: self.embedder.model().clone(),
            stats,
        };
        index.sort_chunks();
        info!(
            docs = index.stats.docs,
            chunks = index.stats.chunks,
            dim = index.dim().unwrap_or(0),
            elapsed_ms = index.stats.elapsed_ms,
            "index built"
        );
        Ok(index)
    }

    /// One vector per chunk, in chunk order.
    async fn embed_all(
        &self,
        chunks: &[Chunk],
        params: &BuildParams,
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let batch_size = params.batch_size.max(1);
        let batch_count = chunks.len().div_ceil(batch_size);
        let semaphore = Arc::new(Semaphore::new(params.concurrency.max(1)));
        let mut tasks: JoinSet<std::result::Result<(usize, Vec<Vec<f32>>), EmbeddingError>> = JoinSet::new();

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedder = Arc::clone(&self.embedder);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| EmbeddingError::Transport("embedding pool closed".to_string()))?;
                let vectors = embedder.embed(&texts).await?;
                if vectors.len() != texts.len() {
                    return Err(EmbeddingError::CountMismatch { expected: texts.len(), got: vectors.len() });
                }
                Ok((batch_no, vectors))
            });
        }

        let mut batches: Vec<Option<Vec<Vec<f32>>>> = vec![None; batch_count];
        let mut dim: Option<usize> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) if join_err.is_panic() => std::panic::resume_unwind(join_err.into_panic()),
                Err(join_err) => Err(EmbeddingError::Transport(format!("embedding task cancelled: {join_err}"))),
            };
            let (batch_no, vectors) = match outcome.and_then(|(n, v)| check_dims(&mut dim, &v).map(|()| (n, v))) {
                Ok(done) => done,
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            };
            self.progress.inc(vectors.len() as u64);
            debug!(batch = batch_no, size = vectors.len(), "embedded batch");
            batches[batch_no] = Some(vectors);
        }

        let mut out = Vec::with_capacity(chunks.len());
        for batch in batches {
            out.extend(batch.unwrap_or_default());
        }
        if out.len() != chunks.len() {
            return Err(EmbeddingError::CountMismatch { expected: chunks.len(), got: out.len() });
        }
        Ok(out)
    }
}

/// Every vector in the build must share the first one's non-zero length.
fn check_dims(dim: &mut Option<usize>, vectors: &[Vec<f32>]) -> std::result::Result<(), EmbeddingError> {
    for v in vectors {
        match *dim {
            None if v.is_empty() => return Err(EmbeddingError::DimensionMismatch { expected: 1, got: 0 }),
            None => *dim = Some(v.len()),
            Some(d) if d != v.len() => return Err(EmbeddingError::DimensionMismatch { expected: d, got: v.len() }),
            Some(_) => {}
        }
    }
    Ok(())
}
