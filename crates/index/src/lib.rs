pub mod embeddings;
pub mod neo4j_index;
pub mod retriever;
pub mod vector_index;

pub use embeddings::{Embedder, EmbeddingConfig, OllamaEmbedder, create_embedder};
#[cfg(feature = "local-embeddings")]
pub use embeddings::LocalEmbedder;
pub use neo4j_index::{GraphStats, GraphStore, Neo4jGraphStore, StoreOptions};
pub use retriever::{RetrievedDocument, Retriever};
pub use vector_index::{Neo4jVectorIndex, SearchType, VectorIndexConfig};

use anyhow::{Context, Result};
use neo4rs::Graph;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: "testing123".to_string(),
        }
    }
}

/// Connect to Neo4j server
pub async fn connect(config: &Neo4jConfig) -> Result<Graph> {
    let graph = Graph::new(&config.uri, &config.username, &config.password)
        .await
        .with_context(|| format!("Failed to connect to Neo4j at {}", config.uri))?;

    info!(uri = %config.uri, "Connected to Neo4j");
    Ok(graph)
}
