use std::cmp::Ordering;

use docrag_core::types::{Index, RetrievedChunk};
use docrag_core::{Error, Result};

/// Cosine similarity; `0.0` when either side has zero norm or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    finite_or_zero(dot / (norm_a * norm_b))
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Non-finite scores become `0.0`, and `-0.0` becomes `+0.0`.
fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() && x != 0.0 {
        x
    } else {
        0.0
    }
}

/// Ranking order: score descending, then `(doc_path, chunk_index)` ascending.
///
/// `-0.0` and `+0.0` rank as equal scores.
pub fn rank_order(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    finite_or_zero(b.score)
        .total_cmp(&finite_or_zero(a.score))
        .then_with(|| a.chunk.doc_path.cmp(&b.chunk.doc_path))
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
}

pub fn sort_ranked(hits: &mut [RetrievedChunk]) {
    hits.sort_by(rank_order);
}

/// Exhaustive cosine kNN over every chunk of `index`.
///
/// Returns at most `k` hits in [`rank_order`]. A query whose length differs
/// from the index dimension means the index was built with another model and
/// yields [`Error::StaleIndex`].
pub fn knn(query: &[f32], index: &Index, k: usize) -> Result<Vec<RetrievedChunk>> {
    let Some(dim) = index.dim() else { return Ok(Vec::new()) };
    if k == 0 {
        return Ok(Vec::new());
    }
    if query.len() != dim {
        return Err(Error::StaleIndex {
            expected: format!("{dim}-dimensional vectors ({})", index.model.name),
            found: format!("{}-dimensional query embedding", query.len()),
        });
    }

    let query_norm = l2_norm(query);
    let mut hits: Vec<RetrievedChunk> = index
        .chunks
        .iter()
        .map(|c| {
            let score = if query_norm == 0.0 {
                0.0
            } else {
                let dot: f32 = query.iter().zip(&c.vector).map(|(x, y)| x * y).sum();
                let norm = l2_norm(&c.vector);
                if norm == 0.0 { 0.0 } else { finite_or_zero(dot / (query_norm * norm)) }
            };
            RetrievedChunk { chunk: c.chunk.clone(), score }
        })
        .collect();

    if k < hits.len() {
        hits.select_nth_unstable_by(k - 1, rank_order);
        hits.truncate(k);
    }
    sort_ranked(&mut hits);
    Ok(hits)
}
