pub mod llm;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod schema;

pub use llm::{LanguageModel, OllamaClient};
pub use normalizer::EntityNormalizer;
pub use schema::{ExtractionSchema, GraphDocument, Node, RawTriple, Relationship};

use anyhow::{Context, Result};
use ingest::Chunk;
use tracing::{debug, info, warn};

use normalizer::{format_node_type, format_relationship_type};

/// Type given to an entity the model left untyped.
pub const DEFAULT_NODE_TYPE: &str = "Node";

/// Turns chunks into graph documents with one model call per chunk.
pub struct GraphExtractor<L> {
    llm: L,
    schema: ExtractionSchema,
    normalizer: EntityNormalizer,
}

impl<L: LanguageModel> GraphExtractor<L> {
    pub fn new(llm: L, schema: ExtractionSchema) -> Self {
        Self {
            llm,
            schema,
            normalizer: EntityNormalizer::new(),
        }
    }

    /// Extract a graph document from a single chunk
    pub async fn extract_chunk(&mut self, chunk: &Chunk) -> Result<GraphDocument> {
        let prompt = prompt::build_extraction_prompt(&self.schema, &chunk.text);

        let response = self.llm
            .generate(&prompt)
            .await
            .with_context(|| format!("Failed to extract graph from chunk {}", chunk.index))?;

        let triples = parser::parse_triples(&response)
            .with_context(|| format!("Malformed extraction output for chunk {}", chunk.index))?;

        Ok(self.build_graph_document(triples, chunk))
    }

    /// Extract every chunk in order. The first failure aborts the run.
    pub async fn convert_to_graph_documents(&mut self, chunks: &[Chunk]) -> Result<Vec<GraphDocument>> {
        let mut documents = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let document = self.extract_chunk(chunk).await?;
            info!(
                chunk = chunk.index,
                nodes = document.nodes.len(),
                relationships = document.relationships.len(),
                "Extracted graph document"
            );
            documents.push(document);
        }

        Ok(documents)
    }

    fn build_graph_document(&mut self, triples: Vec<RawTriple>, chunk: &Chunk) -> GraphDocument {
        let mut nodes: Vec<Node> = Vec::new();
        let mut relationships: Vec<Relationship> = Vec::new();

        for triple in triples {
            if triple.head.trim().is_empty() || triple.tail.trim().is_empty() {
                debug!(?triple, "Skipping triple without both endpoints");
                continue;
            }
            let rel_type = format_relationship_type(&triple.relation);
            if rel_type.is_empty() {
                debug!(?triple, "Skipping triple without a relation");
                continue;
            }

            let source = Node::new(
                self.normalizer.normalize_id(&triple.head),
                node_type_or_default(&triple.head_type),
            );
            let target = Node::new(
                self.normalizer.normalize_id(&triple.tail),
                node_type_or_default(&triple.tail_type),
            );

            for node in [&source, &target] {
                if !nodes.contains(node) {
                    nodes.push(node.clone());
                }
            }

            let relationship = Relationship {
                source,
                target,
                rel_type,
            };
            if !relationships.contains(&relationship) {
                relationships.push(relationship);
            }
        }

        if self.schema.strict_mode {
            self.apply_allow_lists(&mut nodes, &mut relationships);
        }

        GraphDocument {
            nodes,
            relationships,
            source: chunk.clone(),
        }
    }

    /// Drop items outside the allow-lists and rewrite the rest to the
    /// allow-list spelling.
    fn apply_allow_lists(&self, nodes: &mut Vec<Node>, relationships: &mut Vec<Relationship>) {
        let schema = &self.schema;

        nodes.retain_mut(|node| match schema.resolve_node_type(&node.node_type) {
            Some(allowed) => {
                node.node_type = allowed.to_string();
                true
            }
            None => {
                warn!(id = %node.id, node_type = %node.node_type, "Dropping node outside allow-list");
                false
            }
        });

        relationships.retain_mut(|rel| {
            let resolved = (
                schema.resolve_relationship_type(&rel.rel_type).map(str::to_string),
                schema.resolve_node_type(&rel.source.node_type).map(str::to_string),
                schema.resolve_node_type(&rel.target.node_type).map(str::to_string),
            );
            match resolved {
                (Some(rel_type), Some(source_type), Some(target_type)) => {
                    rel.rel_type = rel_type;
                    rel.source.node_type = source_type;
                    rel.target.node_type = target_type;
                    true
                }
                _ => {
                    warn!(
                        source = %rel.source.id,
                        rel_type = %rel.rel_type,
                        target = %rel.target.id,
                        "Dropping relationship outside allow-list"
                    );
                    false
                }
            }
        });

        // distinct raw spellings can resolve to the same allow-list type
        let mut seen = Vec::with_capacity(nodes.len());
        nodes.retain(|node| {
            if seen.contains(node) {
                false
            } else {
                seen.push(node.clone());
                true
            }
        });
    }
}

fn node_type_or_default(raw: &str) -> String {
    let node_type = format_node_type(raw);
    if node_type.is_empty() {
        DEFAULT_NODE_TYPE.to_string()
    } else {
        node_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses and records the prompts it was given.
    struct ScriptedModel {
        responses: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("[]".to_string()))
        }
    }

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk::new("doc".into(), index, text.into(), "sample-text.txt".into(), (0, text.len()), (0, 1))
    }

    #[tokio::test]
    async fn test_single_sentence_author_and_book() {
        let model = ScriptedModel::new(vec![Ok(r#"[
            {"head": "the hobbit", "head_type": "book", "relation": "written by",
             "tail": "J.R.R. Tolkien", "tail_type": "author"}
        ]"#
        .to_string())]);
        let mut extractor = GraphExtractor::new(model, ExtractionSchema::default());

        let docs = extractor
            .convert_to_graph_documents(&[chunk(0, "The Hobbit was written by J.R.R. Tolkien.")])
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.nodes.len(), 2);
        assert!(doc.nodes.contains(&Node::new("The Hobbit", "Book")));
        assert!(doc.nodes.contains(&Node::new("J.R.R. Tolkien", "Author")));
        assert_eq!(doc.relationships.len(), 1);
        assert_eq!(doc.relationships[0].rel_type, "WRITTEN_BY");
        assert_eq!(doc.relationships[0].source.id, "The Hobbit");
        assert_eq!(doc.relationships[0].target.id, "J.R.R. Tolkien");
        assert_eq!(doc.source.text, "The Hobbit was written by J.R.R. Tolkien.");
    }

    #[tokio::test]
    async fn test_types_stay_within_allow_lists() {
        let model = ScriptedModel::new(vec![Ok(r#"[
            {"head": "Dune", "head_type": "Book", "relation": "WRITTEN_BY", "tail": "Frank Herbert", "tail_type": "Author"},
            {"head": "Dune", "head_type": "Book", "relation": "PUBLISHED_BY", "tail": "Chilton Books", "tail_type": "Publisher"},
            {"head": "Frank Herbert", "head_type": "Person", "relation": "BORN_IN", "tail": "Tacoma", "tail_type": "City"},
            {"head": "Dune", "head_type": "Book", "relation": "SET_ON", "tail": "Arrakis", "tail_type": "Planet"},
            {"head": "Dune", "head_type": "Book", "relation": "WRITTEN_BY", "tail": "Tacoma", "tail_type": "City"}
        ]"#
        .to_string())]);
        let mut extractor = GraphExtractor::new(model, ExtractionSchema::default());

        let doc = extractor.extract_chunk(&chunk(0, "...")).await.unwrap();

        let allowed_nodes = ["Author", "Book", "Publisher"];
        let allowed_rels = ["WRITTEN_BY", "PUBLISHED_BY"];
        for node in &doc.nodes {
            assert!(allowed_nodes.contains(&node.node_type.as_str()), "{node:?}");
        }
        for rel in &doc.relationships {
            assert!(allowed_rels.contains(&rel.rel_type.as_str()), "{rel:?}");
            assert!(allowed_nodes.contains(&rel.source.node_type.as_str()));
            assert!(allowed_nodes.contains(&rel.target.node_type.as_str()));
        }
        assert_eq!(doc.relationships.len(), 2);
        assert_eq!(doc.nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_lenient_mode_keeps_everything() {
        let model = ScriptedModel::new(vec![Ok(
            r#"[{"head": "Frank Herbert", "head_type": "Person", "relation": "born in", "tail": "Tacoma", "tail_type": "City"}]"#
                .to_string(),
        )]);
        let schema = ExtractionSchema {
            strict_mode: false,
            ..ExtractionSchema::default()
        };
        let mut extractor = GraphExtractor::new(model, schema);

        let doc = extractor.extract_chunk(&chunk(0, "...")).await.unwrap();

        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.relationships[0].rel_type, "BORN_IN");
    }

    #[tokio::test]
    async fn test_entities_canonicalised_across_chunks() {
        let model = ScriptedModel::new(vec![
            Ok(r#"[{"head": "Emma", "head_type": "Book", "relation": "WRITTEN_BY", "tail": "Jane Austen", "tail_type": "Author"}]"#.to_string()),
            Ok(r#"[{"head": "Persuasion", "head_type": "Book", "relation": "WRITTEN_BY", "tail": "jane austen", "tail_type": "Author"}]"#.to_string()),
        ]);
        let mut extractor = GraphExtractor::new(model, ExtractionSchema::default());

        let docs = extractor
            .convert_to_graph_documents(&[chunk(0, "a"), chunk(1, "b")])
            .await
            .unwrap();

        assert_eq!(docs[1].relationships[0].target.id, "Jane Austen");
    }

    #[tokio::test]
    async fn test_one_call_per_chunk_in_order() {
        let model = ScriptedModel::new(vec![Ok("[]".into()), Ok("[]".into()), Ok("[]".into())]);
        let mut extractor = GraphExtractor::new(model, ExtractionSchema::default());

        let chunks = [chunk(0, "first"), chunk(1, "second"), chunk(2, "third")];
        let docs = extractor.convert_to_graph_documents(&chunks).await.unwrap();

        assert_eq!(docs.len(), 3);
        let prompts = extractor.llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("first"));
        assert!(prompts[2].contains("third"));
    }

    #[tokio::test]
    async fn test_model_failure_aborts_remaining_chunks() {
        let model = ScriptedModel::new(vec![
            Ok("[]".into()),
            Err(anyhow::anyhow!("connection refused")),
            Ok("[]".into()),
        ]);
        let mut extractor = GraphExtractor::new(model, ExtractionSchema::default());

        let chunks = [chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];
        let err = extractor.convert_to_graph_documents(&chunks).await.unwrap_err();

        assert!(format!("{err:#}").contains("connection refused"));
        assert_eq!(extractor.llm.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_untyped_entities_get_default_type() {
        let model = ScriptedModel::new(vec![Ok(
            r#"[{"head": "Dune", "relation": "WRITTEN_BY", "tail": "Frank Herbert", "tail_type": "  "}]"#.to_string(),
        )]);
        let schema = ExtractionSchema {
            allowed_nodes: vec![],
            allowed_relationships: vec![],
            strict_mode: true,
        };
        let mut extractor = GraphExtractor::new(model, schema);

        let doc = extractor.extract_chunk(&chunk(0, "...")).await.unwrap();

        assert_eq!(
            doc.nodes,
            vec![Node::new("Dune", DEFAULT_NODE_TYPE), Node::new("Frank Herbert", DEFAULT_NODE_TYPE)]
        );
        assert_eq!(doc.relationships[0].source.node_type, DEFAULT_NODE_TYPE);
        assert!(doc.nodes.iter().all(|n| !n.node_type.is_empty()));
    }

    #[tokio::test]
    async fn test_triple_without_relation_is_skipped() {
        let model = ScriptedModel::new(vec![Ok(r#"[
            {"head": "Dune", "head_type": "Book", "relation": "", "tail": "Arrakis", "tail_type": "Planet"},
            {"head": "Dune", "head_type": "Book", "relation": "WRITTEN_BY", "tail": "Frank Herbert", "tail_type": "Author"}
        ]"#
        .to_string())]);
        let schema = ExtractionSchema {
            strict_mode: false,
            ..ExtractionSchema::default()
        };
        let mut extractor = GraphExtractor::new(model, schema);

        let doc = extractor.extract_chunk(&chunk(0, "...")).await.unwrap();

        assert_eq!(doc.relationships.len(), 1);
        assert_eq!(doc.nodes.len(), 2);
        assert!(!doc.nodes.iter().any(|n| n.id == "Arrakis"));
    }

    #[tokio::test]
    async fn test_malformed_output_is_error() {
        let model = ScriptedModel::new(vec![Ok("no json here".into())]);
        let mut extractor = GraphExtractor::new(model, ExtractionSchema::default());

        assert!(extractor.extract_chunk(&chunk(0, "a")).await.is_err());
    }
}
