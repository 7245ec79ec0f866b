use anyhow::{Context, Result};
use neo4rs::Graph;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

use extract::{GraphExtractor, LanguageModel, OllamaClient};
use index::{GraphStore, Neo4jVectorIndex};
use ingest::Chunker;
use query::RetrievalQA;

use crate::config::{AppConfig, LlmConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub chunks: usize,
    pub nodes: usize,
    pub relationships: usize,
}

fn ollama_client(config: &LlmConfig) -> Result<OllamaClient> {
    let client = OllamaClient::new(config.base_url.clone(), config.model.clone());
    match config.request_timeout() {
        Some(timeout) => client.with_timeout(timeout),
        None => Ok(client),
    }
}

/// Client for graph extraction, constrained to JSON output.
pub fn extraction_model(config: &LlmConfig) -> Result<OllamaClient> {
    Ok(ollama_client(config)?.with_json_format())
}

/// File -> chunks -> graph documents -> store.
///
/// The store is opened only once the input file has loaded, and a load
/// failure returns before any model call.
pub async fn ingest_graph<L, S, F, Fut>(config: &AppConfig, llm: L, open_store: F) -> Result<(IngestReport, S)>
where
    L: LanguageModel,
    S: GraphStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<S>>,
{
    let document = match ingest::load_document(&config.input.path).await {
        Ok(document) => document,
        Err(e) => {
            error!(error = %e, "Cannot build the graph without an input document");
            return Err(e).context("Failed to load input document");
        }
    };

    let store = open_store().await?;

    let chunker = Chunker::new(config.chunking)?;
    let chunks = chunker.chunk_document(&document);
    info!(
        chunks = chunks.len(),
        chunk_size = config.chunking.chunk_size,
        chunk_overlap = config.chunking.chunk_overlap,
        "Split document"
    );
    for chunk in &chunks {
        debug!(index = chunk.index, tokens = chunk.token_count(), text = %chunk.text, "Chunk");
    }

    let mut extractor = GraphExtractor::new(llm, config.extraction.clone());
    let documents = extractor.convert_to_graph_documents(&chunks).await?;

    let report = IngestReport {
        chunks: chunks.len(),
        nodes: documents.iter().map(|d| d.nodes.len()).sum(),
        relationships: documents.iter().map(|d| d.relationships.len()).sum(),
    };

    store.init_schema(config.store).await?;
    store.add_graph_documents(&documents, config.store).await?;

    info!(
        chunks = report.chunks,
        nodes = report.nodes,
        relationships = report.relationships,
        "Graph ingestion complete"
    );
    Ok((report, store))
}

/// Embed whatever is stored under the configured label and open the index.
pub async fn build_vector_index(config: &AppConfig, graph: &Graph) -> Result<Neo4jVectorIndex> {
    let embedder = index::create_embedder(&config.embedding).await?;
    Neo4jVectorIndex::from_existing_graph(graph.clone(), embedder, config.vector.clone()).await
}

pub fn build_qa(config: &AppConfig, vector_index: Neo4jVectorIndex) -> Result<RetrievalQA> {
    let llm = ollama_client(&config.llm)?;
    Ok(RetrievalQA::new(Arc::new(vector_index), Arc::new(llm)))
}
