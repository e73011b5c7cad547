//! Online retrieval: question embedding, kNN over a loaded index, rerank and
//! cutoff, and rendering of the context block handed to a chat model.

pub mod handle;
pub mod pipeline;
pub mod rerank;
pub mod service;

pub use handle::{IndexHandle, LoadedIndex};
pub use pipeline::{build_context, SearchPipeline};
pub use rerank::{cutoff_for, quantile, reranker_for, Cutoff, NoCutoff, NoRerank, QuantileCutoff, Reranker, TermOverlapRerank};
pub use service::{ChatMessage, RagService, Role};
