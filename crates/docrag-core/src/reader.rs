use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::types::Document;

pub const DEFAULT_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "adoc", "org", "csv", "json", "yaml", "yml", "toml", "xml", "html", "htm",
    "rs", "kt", "kts", "java", "py", "js", "ts", "tsx", "go", "c", "h", "cpp", "hpp", "swift", "sh", "sql",
];

pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[".git", "target", "node_modules", ".idea", ".vscode", "build", "dist"];

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub extensions: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_TEXT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| (*s).to_string()).collect(),
            max_file_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Walks a directory tree and returns every readable text document.
#[derive(Debug, Clone, Default)]
pub struct ContentReader {
    config: ReaderConfig,
}

impl ContentReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    pub fn read(&self, root: &Path) -> Result<Vec<Document>> {
        let meta = fs::metadata(root).map_err(|e| Error::io(root, e))?;
        if !meta.is_dir() {
            return Err(Error::io(
                root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "input root is not a directory"),
            ));
        }

        let mut docs = Vec::new();
        let walker = WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| !self.is_excluded(e));
        for entry in walker {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            if !entry.file_type().is_file() || !self.has_text_extension(entry.path()) {
                continue;
            }
            if let Some(doc) = self.read_document(root, entry.path())? {
                docs.push(doc);
            }
        }
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(root = %root.display(), docs = docs.len(), "read documents");
        Ok(docs)
    }

    fn read_document(&self, root: &Path, path: &Path) -> Result<Option<Document>> {
        let len = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
        if len > self.config.max_file_bytes {
            debug!(path = %path.display(), len, "skipping oversized file");
            return Ok(None);
        }
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        if bytes.contains(&0) {
            debug!(path = %path.display(), "skipping binary file");
            return Ok(None);
        }
        let content_hash = hash_bytes(&bytes);
        let Ok(raw_text) = String::from_utf8(bytes) else {
            debug!(path = %path.display(), "skipping non-UTF-8 file");
            return Ok(None);
        };
        Ok(Some(Document { path: relative_path(root, path), raw_text, content_hash }))
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && self.config.exclude_dirs.iter().any(|d| entry.file_name().to_string_lossy() == d.as_str())
    }

    fn has_text_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}

/// Hex BLAKE3 digest over raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().map_or_else(|| root.to_path_buf(), PathBuf::from);
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop detected"));
    Error::io(path, source)
}
