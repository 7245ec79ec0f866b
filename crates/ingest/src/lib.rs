pub mod chunk;
pub mod chunker;
pub mod reader;
pub mod tokenizer;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig};
pub use reader::{FileReader, LoadError};
pub use tokenizer::{BpeTokenizer, Tokenizer};

use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

/// A source file loaded fully into memory.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub source: String,
    pub text: String,
}

/// Generate a stable document ID from a canonical file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Load a file. The document ID derives from the canonical path, so every
/// spelling of the same file yields the same document and chunk IDs.
pub async fn load_document(file_path: &Path) -> Result<Document, LoadError> {
    let text = FileReader::read_file(file_path).await?;
    let canonical = tokio::fs::canonicalize(file_path)
        .await
        .map_err(|source| LoadError::Io {
            path: file_path.to_path_buf(),
            source,
        })?;
    let source = file_path.to_string_lossy().to_string();
    let doc_id = generate_doc_id(&canonical.to_string_lossy());

    info!(source = %source, bytes = text.len(), "Loaded document");

    Ok(Document {
        doc_id,
        source,
        text,
    })
}

impl<T: Tokenizer> Chunker<T> {
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk_text(&document.doc_id, &document.text, &document.source)
    }
}
