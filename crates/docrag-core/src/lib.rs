//! docrag-core
//!
//! Data model, error taxonomy and the offline front half of the pipeline:
//! reading a document tree and cutting it into overlapping chunks.

pub mod chunker;
pub mod config;
pub mod error;
pub mod reader;
pub mod traits;
pub mod types;

pub use error::{EmbeddingError, Error, Result};
pub use traits::Embedder;
