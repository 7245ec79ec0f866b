use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use neo4rs::{Graph, Query};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::neo4j_index::{SOURCE_LABEL, quote_identifier};
use crate::retriever::{RetrievedDocument, Retriever};

const EMBED_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Vector,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub node_label: String,
    pub text_node_properties: Vec<String>,
    pub embedding_node_property: String,
    pub index_name: String,
    pub keyword_index_name: String,
    pub search_type: SearchType,
    pub top_k: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            node_label: SOURCE_LABEL.to_string(),
            text_node_properties: vec!["text".to_string()],
            embedding_node_property: "embedding".to_string(),
            index_name: "vector".to_string(),
            keyword_index_name: "keyword".to_string(),
            search_type: SearchType::Hybrid,
            top_k: 4,
        }
    }
}

impl VectorIndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.text_node_properties.is_empty() {
            bail!("text_node_properties must name at least one property");
        }
        if self.top_k == 0 {
            bail!("top_k must be positive");
        }
        Ok(())
    }

    /// `"\n{prop}: {value}"` for every text property of `var`.
    fn text_expression(&self, var: &str) -> String {
        format!("reduce(str = '', prop IN $props | str + '\\n' + prop + ': ' + coalesce({var}[prop], ''))")
    }

    pub fn vector_index_query(&self, dimension: usize) -> String {
        format!(
            "CREATE VECTOR INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.{}) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {}, `vector.similarity_function`: 'cosine'}}}}",
            quote_identifier(&self.index_name),
            quote_identifier(&self.node_label),
            quote_identifier(&self.embedding_node_property),
            dimension
        )
    }

    pub fn keyword_index_query(&self) -> String {
        let properties: Vec<String> = self
            .text_node_properties
            .iter()
            .map(|p| format!("n.{}", quote_identifier(p)))
            .collect();

        format!(
            "CREATE FULLTEXT INDEX {} IF NOT EXISTS FOR (n:{}) ON EACH [{}]",
            quote_identifier(&self.keyword_index_name),
            quote_identifier(&self.node_label),
            properties.join(", ")
        )
    }

    pub fn missing_embeddings_query(&self) -> String {
        format!(
            "MATCH (n:{label}) WHERE n.{emb} IS NULL AND any(prop IN $props WHERE n[prop] IS NOT NULL) \
             RETURN elementId(n) AS id, {text} AS text LIMIT {limit}",
            label = quote_identifier(&self.node_label),
            emb = quote_identifier(&self.embedding_node_property),
            text = self.text_expression("n"),
            limit = EMBED_BATCH_SIZE
        )
    }

    pub fn set_embedding_query(&self) -> String {
        format!(
            "MATCH (n:{}) WHERE elementId(n) = $id \
             CALL db.create.setNodeVectorProperty(n, $property, $embedding)",
            quote_identifier(&self.node_label)
        )
    }

    pub fn vector_search_query(&self) -> String {
        format!(
            "CALL db.index.vector.queryNodes($index, $k, $embedding) YIELD node, score \
             RETURN {} AS text, score, coalesce(node.id, elementId(node)) AS id",
            self.text_expression("node")
        )
    }

    /// Vector and keyword hits, each normalised by its best score, merged by
    /// node with the higher score winning.
    pub fn hybrid_search_query(&self) -> String {
        format!(
            "CALL {{ \
               CALL db.index.vector.queryNodes($index, $k, $embedding) YIELD node, score \
               WITH collect({{node: node, score: score}}) AS nodes, max(score) AS max \
               UNWIND nodes AS n \
               RETURN n.node AS node, (n.score / max) AS score \
               UNION \
               CALL db.index.fulltext.queryNodes($keyword_index, $query, {{limit: $k}}) YIELD node, score \
               WITH collect({{node: node, score: score}}) AS nodes, max(score) AS max \
               UNWIND nodes AS n \
               RETURN n.node AS node, (n.score / max) AS score \
             }} \
             WITH node, max(score) AS score ORDER BY score DESC LIMIT $k \
             RETURN {} AS text, score, coalesce(node.id, elementId(node)) AS id",
            self.text_expression("node")
        )
    }
}

/// Replace Lucene query syntax characters with spaces so free text can be
/// sent to a full-text index.
pub fn remove_lucene_chars(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
    ];
    text.chars()
        .map(|c| if SPECIAL.contains(&c) { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Vector (and optionally keyword) index over existing graph nodes.
pub struct Neo4jVectorIndex {
    graph: Graph,
    embedder: Arc<dyn Embedder>,
    config: VectorIndexConfig,
}

impl Neo4jVectorIndex {
    /// Create the indexes if needed and embed every node of the configured
    /// label that does not have an embedding yet.
    pub async fn from_existing_graph(
        graph: Graph,
        embedder: Arc<dyn Embedder>,
        config: VectorIndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        let index = Self {
            graph,
            embedder,
            config,
        };

        let dimension = index.embedder.dimension().await
            .context("Failed to probe embedding dimension")?;
        index.create_indexes(dimension).await?;

        let embedded = index.embed_missing().await?;
        info!(
            label = %index.config.node_label,
            model = index.embedder.model_name(),
            embedded,
            "Vector index ready"
        );

        Ok(index)
    }

    async fn create_indexes(&self, dimension: usize) -> Result<()> {
        self.graph.run(Query::new(self.config.vector_index_query(dimension))).await
            .context("Failed to create vector index")?;

        if self.config.search_type == SearchType::Hybrid {
            self.graph.run(Query::new(self.config.keyword_index_query())).await
                .context("Failed to create keyword index")?;
        }

        Ok(())
    }

    /// Returns the number of nodes embedded.
    pub async fn embed_missing(&self) -> Result<usize> {
        let mut total = 0;

        loop {
            let query = Query::new(self.config.missing_embeddings_query())
                .param("props", self.config.text_node_properties.clone());
            let mut result = self.graph.execute(query).await
                .context("Failed to fetch nodes without embeddings")?;

            let mut ids = Vec::new();
            let mut texts = Vec::new();
            while let Some(row) = result.next().await? {
                ids.push(row.get::<String>("id")?);
                texts.push(row.get::<String>("text")?);
            }

            if ids.is_empty() {
                break;
            }

            let vectors = self.embedder.embed_documents(&texts).await
                .context("Failed to embed stored nodes")?;
            if vectors.len() != ids.len() {
                bail!("Embedder returned {} vectors for {} texts", vectors.len(), ids.len());
            }

            for (id, vector) in ids.iter().zip(vectors) {
                let query = Query::new(self.config.set_embedding_query())
                    .param("id", id.clone())
                    .param("property", self.config.embedding_node_property.clone())
                    .param("embedding", to_f64(&vector));
                self.graph.run(query).await
                    .context("Failed to store node embedding")?;
            }

            total += ids.len();
            debug!(batch = ids.len(), total, "Embedded stored nodes");
        }

        Ok(total)
    }

    pub async fn similarity_search(&self, query_text: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let embedding = self.embedder.embed_query(query_text).await
            .context("Failed to embed query")?;
        let keywords = remove_lucene_chars(query_text);

        // an empty full-text query is a Lucene syntax error
        let hybrid = self.config.search_type == SearchType::Hybrid && !keywords.is_empty();
        let cypher = if hybrid {
            self.config.hybrid_search_query()
        } else {
            self.config.vector_search_query()
        };

        let mut query = Query::new(cypher)
            .param("index", self.config.index_name.clone())
            .param("k", k as i64)
            .param("embedding", to_f64(&embedding))
            .param("props", self.config.text_node_properties.clone());
        if hybrid {
            query = query
                .param("keyword_index", self.config.keyword_index_name.clone())
                .param("query", keywords);
        }

        let mut result = self.graph.execute(query).await
            .context("Failed to query vector index")?;

        let mut documents = Vec::new();
        while let Some(row) = result.next().await? {
            documents.push(RetrievedDocument {
                id: row.get::<String>("id").unwrap_or_default(),
                text: row.get::<String>("text")?,
                score: row.get::<f64>("score").unwrap_or(0.0),
            });
        }

        debug!(hits = documents.len(), hybrid, "Retrieved documents");
        Ok(documents)
    }
}

#[async_trait]
impl Retriever for Neo4jVectorIndex {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        self.similarity_search(query, self.config.top_k).await
    }
}

fn to_f64(vector: &[f32]) -> Vec<f64> {
    vector.iter().map(|&v| v as f64).collect()
}
