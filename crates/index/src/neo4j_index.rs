use anyhow::{Context, Result};
use async_trait::async_trait;
use extract::{GraphDocument, Node, Relationship};
use neo4rs::{Graph, Query};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const BASE_ENTITY_LABEL: &str = "__Entity__";
pub const SOURCE_LABEL: &str = "Document";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreOptions {
    /// Add `__Entity__` to every extracted node and merge nodes on it
    pub base_entity_label: bool,
    /// Store the source chunk as a `Document` node that MENTIONS its entities
    pub include_source: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            base_entity_label: true,
            include_source: true,
        }
    }
}

/// Backtick-quote a label, relationship type or property name for Cypher.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn merge_node_clause(var: &str, node: &Node, id_param: &str, options: StoreOptions) -> String {
    if options.base_entity_label {
        format!(
            "MERGE ({var}:{} {{id: ${id_param}}}) SET {var}:{}",
            quote_identifier(BASE_ENTITY_LABEL),
            quote_identifier(&node.node_type)
        )
    } else {
        format!(
            "MERGE ({var}:{} {{id: ${id_param}}})",
            quote_identifier(&node.node_type)
        )
    }
}

pub fn node_upsert_query(node: &Node, options: StoreOptions) -> String {
    let mut cypher = merge_node_clause("n", node, "id", options);
    if options.include_source {
        cypher.push_str(&format!(
            " WITH n MATCH (d:{} {{id: $chunk_id}}) MERGE (d)-[:MENTIONS]->(n)",
            quote_identifier(SOURCE_LABEL)
        ));
    }
    cypher
}

pub fn relationship_upsert_query(rel: &Relationship, options: StoreOptions) -> String {
    format!(
        "{} {} MERGE (s)-[:{}]->(t)",
        merge_node_clause("s", &rel.source, "source_id", options),
        merge_node_clause("t", &rel.target, "target_id", options),
        quote_identifier(&rel.rel_type)
    )
}

pub fn source_upsert_query() -> String {
    format!(
        "MERGE (d:{} {{id: $chunk_id}}) \
         SET d.text = $text, d.source = $source, d.doc_id = $doc_id, d.chunk_index = $chunk_index",
        quote_identifier(SOURCE_LABEL)
    )
}

/// Destination for extracted graph documents.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create whatever the store needs before the first write.
    async fn init_schema(&self, options: StoreOptions) -> Result<()>;

    /// Upsert documents. Writing the same documents twice leaves the store
    /// unchanged.
    async fn add_graph_documents(&self, documents: &[GraphDocument], options: StoreOptions) -> Result<()>;
}

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Upsert one graph document. Re-running on the same input leaves the
    /// graph unchanged.
    pub async fn add_graph_document(&self, document: &GraphDocument, options: StoreOptions) -> Result<()> {
        let chunk = &document.source;

        if options.include_source {
            let query = Query::new(source_upsert_query())
                .param("chunk_id", chunk.chunk_id.clone())
                .param("text", chunk.text.clone())
                .param("source", chunk.source.clone())
                .param("doc_id", chunk.doc_id.clone())
                .param("chunk_index", chunk.index as i64);

            self.graph.run(query).await
                .context("Failed to upsert source document")?;
        }

        for node in &document.nodes {
            let query = Query::new(node_upsert_query(node, options))
                .param("id", node.id.clone())
                .param("chunk_id", chunk.chunk_id.clone());

            self.graph.run(query).await
                .with_context(|| format!("Failed to upsert node {}", node.id))?;
        }

        for rel in &document.relationships {
            let query = Query::new(relationship_upsert_query(rel, options))
                .param("source_id", rel.source.id.clone())
                .param("target_id", rel.target.id.clone());

            self.graph.run(query).await
                .with_context(|| {
                    format!("Failed to upsert relationship {} -[{}]-> {}", rel.source.id, rel.rel_type, rel.target.id)
                })?;
        }

        debug!(
            chunk_id = %chunk.chunk_id,
            nodes = document.nodes.len(),
            relationships = document.relationships.len(),
            "Stored graph document"
        );

        Ok(())
    }

    /// Get graph statistics
    pub async fn get_stats(&self) -> Result<GraphStats> {
        let entity_count = self.count(&format!(
            "MATCH (e) WHERE NOT e:{} RETURN count(e) as count",
            quote_identifier(SOURCE_LABEL)
        )).await?;
        let relation_count = self.count(
            "MATCH ()-[r]->() WHERE type(r) <> 'MENTIONS' RETURN count(r) as count"
        ).await?;
        let document_count = self.count(&format!(
            "MATCH (d:{}) RETURN count(d) as count",
            quote_identifier(SOURCE_LABEL)
        )).await?;

        Ok(GraphStats {
            entity_count,
            relation_count,
            document_count,
        })
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        let mut result = self.graph.execute(Query::new(cypher.to_string())).await?;
        let count = if let Some(row) = result.next().await? {
            row.get::<i64>("count").unwrap_or(0) as usize
        } else {
            0
        };
        Ok(count)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    /// Uniqueness constraints on the merge keys
    async fn init_schema(&self, options: StoreOptions) -> Result<()> {
        info!("Creating Neo4j constraints...");

        let mut statements = vec![format!(
            "CREATE CONSTRAINT document_id IF NOT EXISTS FOR (d:{}) REQUIRE d.id IS UNIQUE",
            quote_identifier(SOURCE_LABEL)
        )];
        if options.base_entity_label {
            statements.push(format!(
                "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (e:{}) REQUIRE e.id IS UNIQUE",
                quote_identifier(BASE_ENTITY_LABEL)
            ));
        }

        for statement in statements {
            self.graph.run(Query::new(statement)).await
                .context("Failed to create Neo4j constraint")?;
        }

        Ok(())
    }

    async fn add_graph_documents(&self, documents: &[GraphDocument], options: StoreOptions) -> Result<()> {
        for document in documents {
            self.add_graph_document(document, options).await?;
        }
        info!(documents = documents.len(), "Documents successfully added to graph database");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub document_count: usize,
}
