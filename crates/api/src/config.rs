use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use extract::ExtractionSchema;
use index::{EmbeddingConfig, Neo4jConfig, StoreOptions, VectorIndexConfig};
use ingest::ChunkerConfig;

/// Everything the pipeline needs, built once and handed to each component.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub neo4j: Neo4jConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkerConfig,
    pub extraction: ExtractionSchema,
    pub store: StoreOptions,
    pub vector: VectorIndexConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sample-text.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// No timeout when unset
    pub request_timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7860".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Read a TOML file, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply `NEO4J_URI`, `NEO4J_USERNAME` and `NEO4J_PASSWORD` overrides.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(username) = lookup("NEO4J_USERNAME") {
            self.neo4j.username = username;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate().context("Invalid [chunking] config")?;
        self.vector.validate().context("Invalid [vector] config")?;
        self.embedding.validate().context("Invalid [embedding] config")?;

        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        if self.neo4j.uri.trim().is_empty() {
            bail!("neo4j.uri must not be empty");
        }
        Ok(())
    }
}
