//! JSON persistence for [`Index`].
//!
//! Writes go to a temp file in the destination directory and are renamed into
//! place, so readers see either the previous file or the complete new one.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use docrag_core::types::{Index, INDEX_SCHEMA_VERSION};
use docrag_core::{Error, Result};

/// Serialize `index` to `path`, creating parent directories as needed.
pub fn write_index(index: &Index, path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let sorted;
    let index = if is_canonical_order(index) {
        index
    } else {
        let mut copy = index.clone();
        copy.sort_chunks();
        sorted = copy;
        &sorted
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, index).map_err(|e| Error::io(path, e.into()))?;
        writer.flush().map_err(|e| Error::io(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;

    info!(path = %path.display(), chunks = index.chunks.len(), "index written");
    Ok(())
}

/// Load and validate an index file.
pub fn read_index(path: &Path) -> Result<Index> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let index: Index = serde_json::from_slice(&bytes).map_err(|e| Error::corrupt(path, e.to_string()))?;
    validate_index(&index).map_err(|reason| Error::corrupt(path, reason))?;
    debug!(path = %path.display(), chunks = index.chunks.len(), model = %index.model.name, "index loaded");
    Ok(index)
}

/// Structural checks a freshly parsed index must pass.
pub fn validate_index(index: &Index) -> std::result::Result<(), String> {
    if index.schema_version == 0 || index.schema_version > INDEX_SCHEMA_VERSION {
        return Err(format!(
            "unsupported schemaVersion {} (this build reads up to {INDEX_SCHEMA_VERSION})",
            index.schema_version
        ));
    }
    if index.model.name.trim().is_empty() {
        return Err("model name is empty".to_string());
    }
    let Some(dim) = index.dim() else { return Ok(()) };
    if dim == 0 {
        return Err("chunk vectors are empty".to_string());
    }
    if let Some(bad) = index.chunks.iter().find(|c| c.vector.len() != dim) {
        return Err(format!(
            "vector of {} has {} dimensions, expected {dim}",
            bad.chunk.citation(),
            bad.vector.len()
        ));
    }
    Ok(())
}

fn is_canonical_order(index: &Index) -> bool {
    index.chunks.windows(2).all(|w| {
        (&w[0].chunk.doc_path, w[0].chunk.chunk_index) <= (&w[1].chunk.doc_path, w[1].chunk.chunk_index)
    }) && index.documents.windows(2).all(|w| w[0].path <= w[1].path)
}
