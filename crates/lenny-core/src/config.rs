//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `lenny.toml` + `lenny.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_GENERATION__MODEL`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::Framework;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("lenny.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("lenny.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("lenny.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("lenny.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Loads a single TOML file (plus `APP_*` overrides), bypassing env selection.
    pub fn from_file(path: &Path) -> Self {
        Self { figment: Figment::new().merge(Toml::file(path)).merge(Env::prefixed("APP_").split("__")) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The full typed settings tree; missing keys take their defaults.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        match env {
            "prod" | "production" => {
                // Hash embeddings are only meant for offline development.
                let provider: String = self.get("embedding.provider").unwrap_or_else(|_| "hash".to_string());
                if provider == "hash" {
                    tracing::warn!("hash embeddings configured in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub persona: PersonaSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.retrieval.top_k_per_partition == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k_per_partition must be at least 1".into()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(Error::InvalidConfig(format!("generation.temperature {} outside [0, 2]", self.generation.temperature)));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be positive".into()));
        }
        if let Some(frameworks) = &self.persona.frameworks {
            if let Some(f) = frameworks.iter().find(|f| f.keywords.iter().all(|k| k.trim().is_empty())) {
                return Err(Error::InvalidConfig(format!("framework '{}' has no keywords", f.name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k_per_partition: usize,
    pub index_path: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_k_per_partition: 3, index_path: "./data/lenny_index.json".to_string() } }
}

impl RetrievalSettings {
    pub fn index_path(&self) -> PathBuf { expand_path(&self.index_path) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `hash` (offline, deterministic) or `http` (OpenAI-compatible `/embeddings`).
    pub provider: String,
    pub dim: usize,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            dim: 384,
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            model: "nvidia/nv-embedqa-e5-v5".to_string(),
            api_key_env: "NVIDIA_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key_env: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            model: "meta/llama-3.1-70b-instruct".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            api_key_env: "NVIDIA_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    /// Ordered most-specific-first. `None` selects the built-in table.
    pub frameworks: Option<Vec<Framework>>,
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
