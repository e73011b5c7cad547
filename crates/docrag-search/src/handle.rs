use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use docrag_core::types::Index;
use docrag_core::Result;
use docrag_index::read_index;

/// An index together with the file it was read from.
#[derive(Debug)]
pub struct LoadedIndex {
    pub path: PathBuf,
    pub index: Index,
}

/// Owns the currently loaded index.
///
/// Readers clone the `Arc` and keep using it; a reload parses the new file
/// completely before swapping, so readers never observe a partial index.
#[derive(Debug, Default)]
pub struct IndexHandle {
    current: RwLock<Option<Arc<LoadedIndex>>>,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached index for `path`, loading it on first use or when a
    /// different path was loaded before.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<LoadedIndex>> {
        if let Some(loaded) = self.current.read().as_ref() {
            if loaded.path == path {
                return Ok(Arc::clone(loaded));
            }
        }
        self.reload(path)
    }

    /// Read `path` and make it the current index.
    pub fn reload(&self, path: &Path) -> Result<Arc<LoadedIndex>> {
        let index = read_index(path)?;
        let loaded = Arc::new(LoadedIndex { path: path.to_path_buf(), index });
        *self.current.write() = Some(Arc::clone(&loaded));
        info!(path = %path.display(), chunks = loaded.index.chunks.len(), "index loaded");
        Ok(loaded)
    }

    pub fn current(&self) -> Option<Arc<LoadedIndex>> {
        self.current.read().clone()
    }

    pub fn clear(&self) {
        self.current.write().take();
    }
}
