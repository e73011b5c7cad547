//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `docrag.toml` + `docrag.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RAG__TOP_K=8`). Provides helpers
//! to expand `~` and `${VAR}` and to resolve relative paths against the
//! project root.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::RagSettings;

/// Files whose presence marks a project root for relative CLI paths.
pub const PROJECT_MARKERS: &[&str] = &["docrag.toml", "Cargo.toml", ".git"];

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Merge `docrag.toml`, `docrag.<env>.toml` and `APP_*` variables found
    /// relative to `dir`. Missing files are fine.
    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("docrag.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("docrag.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("docrag.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("docrag.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed `rag` section; defaults when the section is absent.
    pub fn rag_settings(&self) -> Result<RagSettings> {
        if self.figment.find_value("rag").is_err() {
            return Ok(RagSettings::default());
        }
        self.get("rag")
    }

    fn validate(&self) -> Result<()> {
        let rag = self.rag_settings()?;
        if rag.top_k == 0 {
            return Err(Error::InvalidConfig("rag.top_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&rag.rerank.quantile_q) {
            return Err(Error::InvalidConfig(format!(
                "rag.rerank.quantile_q must be within [0, 1], got {}",
                rag.rerank.quantile_q
            )));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

/// Nearest ancestor of `start` (inclusive) containing one of `markers`.
pub fn find_project_root(start: &Path, markers: &[&str]) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| markers.iter().any(|m| dir.join(m).exists()))
        .map(Path::to_path_buf)
}

/// Resolve a CLI path: absolute paths are kept, relative ones are joined to
/// the project root found from `cwd`, or to `cwd` itself when no marker exists.
pub fn resolve_project_path<S: AsRef<str>>(cwd: &Path, p: S) -> PathBuf {
    let base = find_project_root(cwd, PROJECT_MARKERS).unwrap_or_else(|| cwd.to_path_buf());
    resolve_with_base(&base, p)
}
