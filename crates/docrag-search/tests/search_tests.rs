use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use docrag_core::types::{
    BuildParams, BuildStats, Chunk, CutoffMode, EmbeddedChunk, Index, ModelConfig, RagSettings, RerankMode,
    RetrievedChunk,
};
use docrag_core::{Embedder, EmbeddingError, Error};
use docrag_embed::FakeEmbedder;
use docrag_index::{write_index, BuildRequest, IndexBuilder};
use docrag_search::{build_context, quantile, rerank::query_terms, IndexHandle, RagService, Role, SearchPipeline};

/// Maps known questions to fixed vectors.
struct TableEmbedder {
    model: ModelConfig,
    table: HashMap<String, Vec<f32>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl TableEmbedder {
    fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            model: ModelConfig::new("table", "memory://table"),
            table: entries.iter().map(|(q, v)| ((*q).to_string(), v.clone())).collect(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn model(&self) -> &ModelConfig {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        texts
            .iter()
            .map(|t| self.table.get(t).cloned().ok_or_else(|| EmbeddingError::Decode(format!("unknown text {t}"))))
            .collect()
    }
}

fn embedded(path: &str, idx: usize, text: &str, vector: Vec<f32>) -> EmbeddedChunk {
    EmbeddedChunk {
        chunk: Chunk { doc_path: path.into(), chunk_index: idx, text: text.into(), start_offset: 0, end_offset: 0 },
        vector,
    }
}

fn abc_index() -> Index {
    let mut index = Index::empty(ModelConfig::new("table", "memory://table"));
    index.chunks = vec![
        embedded("a.txt", 0, "alpha facts", vec![1.0, 0.0, 0.0]),
        embedded("b.txt", 0, "bravo facts", vec![0.0, 1.0, 0.0]),
        embedded("c.txt", 0, "charlie facts", vec![0.0, 0.0, 1.0]),
    ];
    index.stats = BuildStats { docs: 3, chunks: 3, avg_chunk_len: 11.0, elapsed_ms: 1 };
    index
}

fn settings(top_k: usize) -> RagSettings {
    RagSettings { top_k, overfetch_factor: 1, ..RagSettings::default() }
}

fn hit(path: &str, idx: usize, text: &str, score: f32) -> RetrievedChunk {
    RetrievedChunk {
        chunk: Chunk { doc_path: path.into(), chunk_index: idx, text: text.into(), start_offset: 0, end_offset: 0 },
        score,
    }
}

#[tokio::test]
async fn identical_vector_ranks_first_with_unit_score() {
    let pipeline = SearchPipeline::new(Arc::new(TableEmbedder::new(&[("what is alpha", vec![1.0, 0.0, 0.0])])));
    let hits = pipeline.retrieve_chunks("what is alpha", &abc_index(), &settings(1)).await.expect("retrieve");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.citation(), "a.txt#0");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn zero_quantile_keeps_every_candidate() {
    let pipeline = SearchPipeline::new(Arc::new(TableEmbedder::new(&[("q", vec![1.0, 0.5, 0.2])])));
    let mut s = settings(10);
    s.rerank.cutoff_mode = CutoffMode::Quantile;
    s.rerank.quantile_q = 0.0;

    let hits = pipeline.retrieve_chunks("q", &abc_index(), &s).await.unwrap();
    let cites: Vec<String> = hits.iter().map(|h| h.chunk.citation()).collect();
    assert_eq!(cites, vec!["a.txt#0", "b.txt#0", "c.txt#0"]);

    s.rerank.quantile_q = 0.5;
    let cut = pipeline.retrieve_chunks("q", &abc_index(), &s).await.unwrap();
    assert_eq!(cut.len(), 2, "scores below the median are dropped");

    s.rerank.cutoff_mode = CutoffMode::None;
    assert_eq!(pipeline.retrieve_chunks("q", &abc_index(), &s).await.unwrap().len(), 3);
}

#[tokio::test]
async fn overfetch_feeds_rerank_before_truncation() {
    let pipeline = SearchPipeline::new(Arc::new(TableEmbedder::new(&[("charlie", vec![0.6, 0.0, 0.5])])));
    let mut s = RagSettings { top_k: 1, overfetch_factor: 3, ..RagSettings::default() };

    let plain = pipeline.retrieve_chunks("charlie", &abc_index(), &s).await.unwrap();
    assert_eq!(plain[0].chunk.doc_path, "a.txt");

    s.rerank.mode = RerankMode::TermOverlap;
    let reranked = pipeline.retrieve_chunks("charlie", &abc_index(), &s).await.unwrap();
    assert_eq!(reranked.len(), 1);
    assert_eq!(reranked[0].chunk.doc_path, "c.txt", "lexical match lifts the second candidate");
}

#[tokio::test]
async fn model_mismatch_is_stale_index() {
    let pipeline = SearchPipeline::new(Arc::new(TableEmbedder::new(&[("q", vec![1.0, 0.0, 0.0])])));
    let mut s = settings(1);
    s.expected_model = Some("mxbai-embed-large".into());
    let err = pipeline.retrieve_chunks("q", &abc_index(), &s).await.unwrap_err();
    assert!(matches!(err, Error::StaleIndex { .. }), "got {err:?}");

    let other = SearchPipeline::new(Arc::new(FakeEmbedder::new(3)));
    let err = other.retrieve_chunks("q", &abc_index(), &settings(1)).await.unwrap_err();
    assert!(matches!(err, Error::StaleIndex { .. }), "got {err:?}");
}

#[tokio::test]
async fn query_dimension_mismatch_is_stale_index() {
    let pipeline = SearchPipeline::new(Arc::new(TableEmbedder::new(&[("q", vec![1.0, 0.0])])));
    let err = pipeline.retrieve_chunks("q", &abc_index(), &settings(1)).await.unwrap_err();
    assert!(matches!(err, Error::StaleIndex { .. }), "got {err:?}");
}

#[tokio::test]
async fn empty_index_returns_nothing_without_embedding() {
    let embedder = Arc::new(TableEmbedder::new(&[]));
    let pipeline = SearchPipeline::new(embedder.clone());
    let index = Index::empty(ModelConfig::new("table", "memory://table"));

    let hits = pipeline.retrieve_chunks("anything", &index, &settings(5)).await.expect("empty is fine");
    assert!(hits.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_embedding_times_out() {
    let mut embedder = TableEmbedder::new(&[("q", vec![1.0, 0.0, 0.0])]);
    embedder.delay = Duration::from_millis(500);
    let pipeline = SearchPipeline::new(Arc::new(embedder));
    let s = RagSettings { request_timeout_ms: 20, ..settings(1) };

    let err = pipeline.retrieve_chunks("q", &abc_index(), &s).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(EmbeddingError::Timeout(20))), "got {err:?}");
}

#[test]
fn context_lists_citations_in_order() {
    let mut index = abc_index();
    index.chunks.push(embedded("a.txt", 1, "alpha more", vec![1.0, 0.0, 0.0]));
    let hits = vec![hit("a.txt", 0, "alpha facts\n", 0.9), hit("b.txt", 0, "bravo facts", 0.5)];

    let context = build_context(&hits, &index, &settings(5));
    assert_eq!(
        context,
        "[1] a.txt#0 (part 1 of 2, score 0.900)\nalpha facts\n\n[2] b.txt#0 (part 1 of 1, score 0.500)\nbravo facts"
    );
    assert_eq!(build_context(&[], &index, &settings(5)), "");
}

#[test]
fn context_respects_character_budget() {
    let index = abc_index();
    let hits = vec![hit("a.txt", 0, "alpha facts", 0.9), hit("b.txt", 0, "bravo facts", 0.5)];
    let first = "[1] a.txt#0 (part 1 of 1, score 0.900)\nalpha facts";

    let s = RagSettings { max_context_chars: Some(first.len() + 5), ..settings(5) };
    assert_eq!(build_context(&hits, &index, &s), first);

    let header = "[1] a.txt#0 (part 1 of 1, score 0.900)";
    for budget in [0, 10, header.len()] {
        let tiny = RagSettings { max_context_chars: Some(budget), ..settings(5) };
        assert_eq!(build_context(&hits, &index, &tiny), header, "budget {budget}");
    }

    let cut = RagSettings { max_context_chars: Some(header.len() + 1 + 5), ..settings(5) };
    assert_eq!(build_context(&hits, &index, &cut), format!("{header}\nalpha"));
}

#[test]
fn quantile_interpolates_linearly() {
    assert_eq!(quantile(&[], 0.5), None);
    assert_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.5), Some(2.5));
    assert_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.0), Some(1.0));
    assert_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 1.0), Some(4.0));
    assert_eq!(query_terms("What is Alpha? alpha!"), vec!["what", "is", "alpha"]);
}

#[test]
fn reload_swaps_index_and_keeps_old_readers() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.json");
    write_index(&abc_index(), &path).unwrap();

    let handle = IndexHandle::new();
    let first = handle.get_or_load(&path).expect("load");
    assert!(Arc::ptr_eq(&first, &handle.get_or_load(&path).unwrap()), "second call is cached");

    let mut bigger = abc_index();
    bigger.chunks.push(embedded("d.txt", 0, "delta", vec![1.0, 1.0, 0.0]));
    write_index(&bigger, &path).unwrap();
    let second = handle.reload(&path).expect("reload");

    assert_eq!(first.index.chunks.len(), 3);
    assert_eq!(second.index.chunks.len(), 4);
    assert!(Arc::ptr_eq(&second, &handle.current().unwrap()));

    fs::write(&path, "garbage").unwrap();
    assert!(matches!(handle.reload(&path).unwrap_err(), Error::CorruptIndex { .. }));
    assert_eq!(handle.current().unwrap().index.chunks.len(), 4, "failed reload keeps the old index");

    handle.clear();
    assert!(handle.current().is_none());
}

#[tokio::test]
async fn augment_injects_context_or_degrades() {
    let docs = TempDir::new().unwrap();
    fs::write(docs.path().join("river.txt"), "river water boil quickly").unwrap();
    fs::write(docs.path().join("peaks.md"), "mountain snow cold wind").unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(1024));
    let index = IndexBuilder::new(embedder.clone())
        .build(&BuildRequest::new(docs.path(), BuildParams::default()))
        .await
        .expect("build");
    let out = TempDir::new().unwrap();
    let index_path = out.path().join("rag-index.json");
    write_index(&index, &index_path).unwrap();

    let service = RagService::new(SearchPipeline::new(embedder));
    let s = RagSettings { top_k: 1, index_path: index_path.to_string_lossy().into_owned(), ..RagSettings::default() };

    let messages = service.augment("boil river water", &s).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].content.contains("river.txt#0"));
    assert!(!messages[0].content.contains("peaks.md"));
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "boil river water");

    let disabled = RagSettings { enabled: false, ..s.clone() };
    assert_eq!(service.augment("boil river water", &disabled).await.len(), 1);

    let missing = RagSettings { index_path: out.path().join("absent.json").to_string_lossy().into_owned(), ..s.clone() };
    assert!(service.context_for("boil river water", &missing).await.is_err());
    let degraded = service.augment("boil river water", &missing).await;
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].role, Role::User);
}

#[tokio::test]
async fn service_resolves_relative_and_env_index_paths() {
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("docrag.toml"), "[rag]\n").unwrap();
    fs::create_dir_all(project.path().join("data")).unwrap();
    let nested = project.path().join("notes/drafts");
    fs::create_dir_all(&nested).unwrap();
    write_index(&abc_index(), &project.path().join("data/rag-index.json")).unwrap();

    let embedder = Arc::new(TableEmbedder::new(&[("what is alpha", vec![1.0, 0.0, 0.0])]));
    let service = RagService::new(SearchPipeline::new(embedder)).with_base_dir(&nested);

    let relative = RagSettings { index_path: "data/rag-index.json".into(), ..settings(1) };
    assert_eq!(service.index_path(&relative).unwrap(), project.path().join("data/rag-index.json"));
    let context = service.context_for("what is alpha", &relative).await.expect("project-relative index");
    assert!(context.starts_with("[1] a.txt#0"), "got {context}");

    std::env::set_var("DOCRAG_TEST_INDEX_DIR", project.path().join("data"));
    let from_env = RagSettings { index_path: "${DOCRAG_TEST_INDEX_DIR}/rag-index.json".into(), ..settings(1) };
    assert_eq!(service.index_path(&from_env).unwrap(), project.path().join("data/rag-index.json"));
    assert!(service.context_for("what is alpha", &from_env).await.expect("env index").contains("alpha facts"));
}
