//! Index construction, persistence and nearest-neighbour search.

pub mod builder;
pub mod knn;
pub mod store;

pub use builder::{BuildRequest, IndexBuilder};
pub use knn::{cosine_similarity, knn, rank_order, sort_ranked};
pub use store::{read_index, validate_index, write_index};
