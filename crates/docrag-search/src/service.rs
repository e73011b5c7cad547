use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docrag_core::types::RagSettings;
use docrag_core::config::resolve_project_path;
use docrag_core::{Error, Result};

use crate::handle::IndexHandle;
use crate::pipeline::{build_context, SearchPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

const CONTEXT_PREAMBLE: &str =
    "Answer using the excerpts below when they are relevant. Cite sources as path#chunk.";

/// Entry point for chat code that wants retrieved context in its prompt.
pub struct RagService {
    handle: IndexHandle,
    pipeline: SearchPipeline,
    base_dir: Option<PathBuf>,
}

impl RagService {
    pub fn new(pipeline: SearchPipeline) -> Self {
        Self { handle: IndexHandle::new(), pipeline, base_dir: None }
    }

    /// Directory relative index paths are resolved from; defaults to the
    /// process working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    /// Rendered context for `question`; empty when retrieval is disabled or
    /// nothing relevant was found.
    pub async fn context_for(&self, question: &str, settings: &RagSettings) -> Result<String> {
        if !settings.enabled {
            return Ok(String::new());
        }
        let loaded = self.handle.get_or_load(&self.index_path(settings)?)?;
        let chunks = self.pipeline.retrieve_chunks(question, &loaded.index, settings).await?;
        Ok(build_context(&chunks, &loaded.index, settings))
    }

    /// `settings.index_path` with `~` and `${VAR}` expanded; a relative path is
    /// joined to the project root found from the base directory.
    pub fn index_path(&self, settings: &RagSettings) -> Result<PathBuf> {
        let cwd;
        let base: &Path = match &self.base_dir {
            Some(dir) => dir.as_path(),
            None => {
                cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
                &cwd
            }
        };
        Ok(resolve_project_path(base, &settings.index_path))
    }

    /// Messages for a chat call: the context as a system message ahead of the
    /// question, or the bare question when there is no context. Retrieval
    /// failures are logged and never block the call.
    pub async fn augment(&self, question: &str, settings: &RagSettings) -> Vec<ChatMessage> {
        let context = match self.context_for(question, settings).await {
            Ok(context) => context,
            Err(err) => {
                warn!(error = %err, "retrieval failed, sending question without context");
                String::new()
            }
        };
        if context.is_empty() {
            debug!("no context, question sent as-is");
            return vec![ChatMessage::user(question)];
        }
        vec![ChatMessage::system(format!("{CONTEXT_PREAMBLE}\n\n{context}")), ChatMessage::user(question)]
    }
}
