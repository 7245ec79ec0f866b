use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct FileReader;

impl FileReader {
    pub async fn read_file(path: &Path) -> Result<String, LoadError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match extension {
            "txt" | "md" => fs::read_to_string(path).await.map_err(|source| {
                if source.kind() == ErrorKind::NotFound {
                    LoadError::NotFound(path.to_path_buf())
                } else {
                    LoadError::Io {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            }),
            _ => Err(LoadError::UnsupportedFormat(extension.to_string())),
        }
    }
}
