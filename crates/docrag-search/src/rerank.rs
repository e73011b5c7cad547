//! Second-stage strategies applied to the over-fetched kNN candidates.

use std::collections::HashSet;

use docrag_core::types::{CutoffMode, RerankMode, RerankSettings, RetrievedChunk};
use docrag_index::sort_ranked;

pub trait Reranker: Send + Sync {
    /// Re-score `hits` for `question` and return them in ranking order.
    fn rerank(&self, question: &str, hits: Vec<RetrievedChunk>) -> Vec<RetrievedChunk>;
}

/// Keeps kNN scores untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRerank;

impl Reranker for NoRerank {
    fn rerank(&self, _question: &str, hits: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        hits
    }
}

/// Blends cosine similarity with the share of question terms found in the
/// chunk text: `vector_weight * cosine + (1 - vector_weight) * overlap`.
#[derive(Debug, Clone, Copy)]
pub struct TermOverlapRerank {
    pub vector_weight: f32,
}

impl Default for TermOverlapRerank {
    fn default() -> Self {
        Self { vector_weight: 0.7 }
    }
}

impl Reranker for TermOverlapRerank {
    fn rerank(&self, question: &str, mut hits: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        let terms = query_terms(question);
        if terms.is_empty() {
            return hits;
        }
        for hit in &mut hits {
            let text = hit.chunk.text.to_lowercase();
            let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
            #[allow(clippy::cast_precision_loss)]
            let overlap = matched as f32 / terms.len() as f32;
            hit.score = hit.score * self.vector_weight + overlap * (1.0 - self.vector_weight);
        }
        sort_ranked(&mut hits);
        hits
    }
}

/// Lowercased, de-duplicated words of `text` with surrounding punctuation stripped.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty() && seen.insert(w.clone()))
        .collect()
}

pub fn reranker_for(mode: RerankMode) -> Box<dyn Reranker> {
    match mode {
        RerankMode::None => Box::new(NoRerank),
        RerankMode::TermOverlap => Box::new(TermOverlapRerank::default()),
    }
}

pub trait Cutoff: Send + Sync {
    fn apply(&self, hits: Vec<RetrievedChunk>) -> Vec<RetrievedChunk>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCutoff;

impl Cutoff for NoCutoff {
    fn apply(&self, hits: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        hits
    }
}

/// Drops every candidate scoring strictly below the `q`-quantile of the
/// candidate scores. `q = 0` keeps everything.
#[derive(Debug, Clone, Copy)]
pub struct QuantileCutoff {
    q: f64,
}

impl QuantileCutoff {
    pub fn new(q: f64) -> Self {
        let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
        Self { q }
    }

    pub fn q(&self) -> f64 {
        self.q
    }
}

impl Cutoff for QuantileCutoff {
    fn apply(&self, hits: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        if self.q <= 0.0 || hits.len() < 2 {
            return hits;
        }
        let scores: Vec<f64> = hits.iter().map(|h| f64::from(h.score)).collect();
        let Some(threshold) = quantile(&scores, self.q) else { return hits };
        hits.into_iter().filter(|h| f64::from(h.score) >= threshold).collect()
    }
}

/// Linear-interpolated `q`-quantile (`q` in `[0, 1]`); `None` for no values.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn cutoff_for(settings: &RerankSettings) -> Box<dyn Cutoff> {
    match settings.cutoff_mode {
        CutoffMode::None => Box::new(NoCutoff),
        CutoffMode::Quantile => Box::new(QuantileCutoff::new(settings.quantile_q)),
    }
}
