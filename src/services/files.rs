use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{generate_id, NewSource, SourceType};

const MAX_CONCURRENT_READS: usize = 4;

/// A file picked by the user, read and ready to become a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Lower-case file extension (`txt`, `md` or `pdf`).
    #[serde(rename = "type")]
    pub file_type: String,
    pub content: String,
}

pub fn pdf_placeholder(file_name: &str) -> String {
    format!("[PDF Content Placeholder for {file_name}] - PDF parsing to be implemented.")
}

impl FileDescriptor {
    /// Read a supported document. Returns `Ok(None)` for unsupported extensions.
    pub async fn read(path: &Path) -> Result<Option<Self>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let content = match extension.as_str() {
            "txt" | "md" => tokio::fs::read_to_string(path).await?,
            // Text extraction from PDFs is not supported yet.
            "pdf" => pdf_placeholder(&name),
            _ => return Ok(None),
        };
        let size = tokio::fs::metadata(path).await?.len();

        Ok(Some(Self {
            name,
            path: path.to_path_buf(),
            size,
            file_type: extension,
            content,
        }))
    }

    pub fn source_type(&self) -> SourceType {
        if self.file_type == "pdf" {
            SourceType::Pdf
        } else {
            SourceType::Text
        }
    }

    /// Build a new source with a fresh id from this file.
    pub fn into_new_source(self) -> NewSource {
        NewSource {
            id: generate_id(),
            source_type: self.source_type(),
            name: self.name,
            content: self.content,
        }
    }
}

/// Read several files concurrently, keeping the caller's order. Files that
/// cannot be read or have an unsupported type are logged and skipped.
pub async fn read_files(paths: Vec<PathBuf>) -> Vec<FileDescriptor> {
    stream::iter(paths)
        .map(|path| async move {
            match FileDescriptor::read(&path).await {
                Ok(Some(file)) => Some(file),
                Ok(None) => {
                    tracing::warn!("Skipping unsupported file {}", path.display());
                    None
                }
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                    None
                }
            }
        })
        .buffered(MAX_CONCURRENT_READS)
        .filter_map(|file| async { file })
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_and_markdown_are_read_fully() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("alpha.txt");
        let md = dir.path().join("Notes.MD");
        std::fs::write(&txt, "Alpha").unwrap();
        std::fs::write(&md, "# Heading\nbody").unwrap();

        let files = read_files(vec![txt.clone(), md]).await;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "alpha.txt");
        assert_eq!(files[0].content, "Alpha");
        assert_eq!(files[0].size, 5);
        assert_eq!(files[0].path, txt);
        assert_eq!(files[1].file_type, "md");
        assert_eq!(files[1].source_type(), SourceType::Text);
    }

    #[tokio::test]
    async fn test_pdf_gets_placeholder_content() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, b"%PDF-1.7 binary").unwrap();

        let file = FileDescriptor::read(&pdf).await.unwrap().unwrap();
        assert_eq!(file.content, pdf_placeholder("paper.pdf"));

        let source = file.into_new_source();
        assert_eq!(source.source_type, SourceType::Pdf);
        assert_eq!(source.name, "paper.pdf");
        assert!(!source.id.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_and_missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("report.docx");
        std::fs::write(&docx, "zip").unwrap();
        let missing = dir.path().join("gone.txt");

        assert!(FileDescriptor::read(&docx).await.unwrap().is_none());
        assert!(read_files(vec![docx, missing]).await.is_empty());
    }
}
