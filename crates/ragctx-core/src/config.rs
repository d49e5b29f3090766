//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys split on `__`, e.g. `APP_RETRIEVAL__TOP_N=5`). Every section has
//! defaults, so running without any config file is valid.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Builds a config from an inline TOML document layered over the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml));
        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub corpus: CorpusSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub context: ContextSettings,
    pub generation: GenerationSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.index.dim == 0 {
            return Err(Error::InvalidConfig("index.dim must be positive".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be positive".into()));
        }
        if self.retrieval.top_n == 0 {
            return Err(Error::InvalidConfig("retrieval.top_n must be positive".into()));
        }
        if self.corpus.delimiter.is_empty() {
            return Err(Error::InvalidConfig("corpus.delimiter must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Inserting an existing id replaces the stored entry.
    #[default]
    Overwrite,
    /// Inserting an existing id is a validation error.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub path: String,
    pub collection: String,
    pub dim: usize,
    pub duplicate_ids: DuplicatePolicy,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            path: "./data/index".into(),
            collection: "manual_docs".into(),
            dim: 1024,
            duplicate_ids: DuplicatePolicy::Overwrite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub text_dir: String,
    pub images_dir: String,
    pub descriptions: String,
    pub delimiter: String,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            text_dir: "./data/text_files".into(),
            images_dir: "./data/images".into(),
            descriptions: "./data/images/descriptions.json".into(),
            delimiter: crate::chunker::DEFAULT_DELIMITER.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    Model,
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: String,
    pub batch_size: usize,
    pub max_len: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { backend: EmbeddingBackend::Model, model_dir: "../models/bge-m3".into(), batch_size: 16, max_len: 256 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMatch {
    Exact,
    #[default]
    Fuzzy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_n: usize,
    /// Candidate pool fetched when a scope filter is applied afterwards.
    pub scoped_pool: usize,
    pub images_per_source: usize,
    pub max_chars_per_chunk: usize,
    pub scope_match: ScopeMatch,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_n: 3, scoped_pool: 10, images_per_source: 2, max_chars_per_chunk: 3500, scope_match: ScopeMatch::Fuzzy }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub max_chars: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self { max_chars: 12_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.2,
            timeout_secs: 60,
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_files() {
        let cfg = Config::from_toml_str("").unwrap();
        let s = cfg.settings().unwrap();
        assert_eq!(s.index.collection, "manual_docs");
        assert_eq!(s.embedding.batch_size, 16);
        assert_eq!(s.retrieval.top_n, 3);
        assert_eq!(s.corpus.delimiter, "***");
        assert_eq!(s.index.duplicate_ids, DuplicatePolicy::Overwrite);
    }

    #[test]
    fn toml_overrides_nested_keys() {
        let cfg = Config::from_toml_str("[retrieval]\ntop_n = 5\nscope_match = \"exact\"\n[index]\nduplicate_ids = \"reject\"").unwrap();
        let s = cfg.settings().unwrap();
        assert_eq!(s.retrieval.top_n, 5);
        assert_eq!(s.retrieval.scope_match, ScopeMatch::Exact);
        assert_eq!(s.retrieval.scoped_pool, 10);
        assert_eq!(s.index.duplicate_ids, DuplicatePolicy::Reject);
        let top_n: usize = cfg.get("retrieval.top_n").unwrap();
        assert_eq!(top_n, 5);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = Config::from_toml_str("[embedding]\nbatch_size = 0").err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/ragctx");
        assert_eq!(resolve_with_base(base, "data/index"), PathBuf::from("/srv/ragctx/data/index"));
        assert_eq!(resolve_with_base(base, "/abs/index"), PathBuf::from("/abs/index"));
    }
}
