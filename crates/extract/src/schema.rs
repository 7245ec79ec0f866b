use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: Node,
    pub target: Node,
    #[serde(rename = "type")]
    pub rel_type: String,
}

/// Nodes and relationships extracted from a single chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
    pub source: ingest::Chunk,
}

/// One `head -[relation]-> tail` statement as the model writes it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTriple {
    #[serde(default)]
    pub head: String,
    #[serde(default)]
    pub head_type: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub tail: String,
    #[serde(default)]
    pub tail_type: String,
}

/// Allowed node and relationship types.
///
/// An empty list allows any type. With `strict_mode` on, extracted items with
/// a type outside the lists are dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionSchema {
    pub allowed_nodes: Vec<String>,
    pub allowed_relationships: Vec<String>,
    pub strict_mode: bool,
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self {
            allowed_nodes: vec!["Author".into(), "Book".into(), "Publisher".into()],
            allowed_relationships: vec!["WRITTEN_BY".into(), "PUBLISHED_BY".into()],
            strict_mode: true,
        }
    }
}

impl ExtractionSchema {
    /// Returns the allow-list spelling of `node_type`, or `None` when it is
    /// not allowed. With an empty allow-list the input is returned as is.
    pub fn resolve_node_type<'a>(&'a self, node_type: &'a str) -> Option<&'a str> {
        resolve(&self.allowed_nodes, node_type)
    }

    pub fn resolve_relationship_type<'a>(&'a self, rel_type: &'a str) -> Option<&'a str> {
        resolve(&self.allowed_relationships, rel_type)
    }
}

fn resolve<'a>(allowed: &'a [String], value: &'a str) -> Option<&'a str> {
    if allowed.is_empty() {
        return Some(value);
    }
    allowed
        .iter()
        .find(|a| a.eq_ignore_ascii_case(value))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let schema = ExtractionSchema::default();

        assert_eq!(schema.resolve_node_type("author"), Some("Author"));
        assert_eq!(schema.resolve_node_type("BOOK"), Some("Book"));
        assert_eq!(schema.resolve_node_type("Person"), None);
        assert_eq!(schema.resolve_relationship_type("written_by"), Some("WRITTEN_BY"));
        assert_eq!(schema.resolve_relationship_type("EDITED_BY"), None);
    }

    #[test]
    fn test_empty_allow_list_accepts_anything() {
        let schema = ExtractionSchema {
            allowed_nodes: vec![],
            allowed_relationships: vec![],
            strict_mode: true,
        };

        assert_eq!(schema.resolve_node_type("Person"), Some("Person"));
        assert_eq!(schema.resolve_relationship_type("KNOWS"), Some("KNOWS"));
    }
}
