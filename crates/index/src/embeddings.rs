//! Text embedding backends.
//!
//! - [`OllamaEmbedder`] calls a running Ollama server.
//! - [`LocalEmbedder`] runs a published ONNX model in-process through
//!   fastembed (feature `local-embeddings`). The model is downloaded from
//!   Hugging Face on first use and cached.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .context("Embedder returned no vector for query")
    }

    /// Get embedding dimension
    async fn dimension(&self) -> Result<usize> {
        let test_embedding = self.embed_query("test").await?;
        Ok(test_embedding.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"local"` or `"ollama"`
    pub provider: String,
    pub model: String,
    /// Ollama server, ignored by the local provider
    pub base_url: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "bge-base-en-v1.5".to_string(),
            base_url: "http://localhost:11434".to_string(),
            batch_size: 64,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        Ok(())
    }
}

pub async fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    config.validate()?;
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(
            config.base_url.clone(),
            config.model.clone(),
        ))),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::load(&config.model, config.batch_size).await?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: '{}'. Expected 'local' or 'ollama'", other),
    }
}

// ============ Ollama ============

#[derive(Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    /// Generate embedding for text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Embedding request failed: {}", response.status());
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        Ok(embedding_response.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

// ============ Local (fastembed) ============

pub fn local_model_dimension(name: &str) -> Option<usize> {
    match name {
        "all-minilm-l6-v2" | "bge-small-en-v1.5" => Some(384),
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => Some(768),
        "bge-large-en-v1.5" => Some(1024),
        _ => None,
    }
}

#[cfg(feature = "local-embeddings")]
fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    /// Load (downloading on first use) a model by its published name,
    /// e.g. `bge-base-en-v1.5`.
    pub async fn load(model_name: &str, batch_size: usize) -> Result<Self> {
        // `BAAI/bge-base-en-v1.5` and `bge-base-en-v1.5` name the same model
        let short_name = model_name
            .rsplit('/')
            .next()
            .unwrap_or(model_name)
            .to_lowercase();
        let fastembed_model = to_fastembed_model(&short_name)?;

        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))
        })
        .await??;

        tracing::info!(model = %short_name, "Loaded local embedding model");

        Ok(Self {
            model_name: short_name,
            batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("Local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }

    async fn dimension(&self) -> Result<usize> {
        match local_model_dimension(&self.model_name) {
            Some(dims) => Ok(dims),
            None => Ok(self.embed_query("test").await?.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_ollama_embedder() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/embeddings").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref());
                body.contains("\"model\":\"nomic-embed-text\"")
            });
            then.status(200)
                .json_body(serde_json::json!({ "embedding": [0.25, -0.5, 1.0] }));
        });

        let embedder = OllamaEmbedder::new(server.base_url(), "nomic-embed-text".to_string());
        let vectors = embedder
            .embed_documents(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let expected: Vec<Vec<f32>> = vec![vec![0.25, -0.5, 1.0]; 2];
        assert_eq!(vectors, expected);
        assert_eq!(embedder.dimension().await.unwrap(), 3);
        mock.assert_calls(3);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let config = EmbeddingConfig {
            batch_size: 0,
            ..EmbeddingConfig::default()
        };

        let err = create_embedder(&config).await.err().unwrap();
        assert!(err.to_string().contains("batch_size"));
    }

    #[tokio::test]
    async fn test_ollama_embedder_error_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(500).body("boom");
        });

        let embedder = OllamaEmbedder::new(server.base_url(), "nomic-embed-text".to_string());
        let err = embedder.embed_query("a").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).await.err().unwrap();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_known_dimensions() {
        assert_eq!(local_model_dimension("bge-base-en-v1.5"), Some(768));
        assert_eq!(local_model_dimension("mystery"), None);
    }
}
