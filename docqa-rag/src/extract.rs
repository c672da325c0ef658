//! Turning uploaded files into [`Document`]s.
//!
//! Only plain text is handled here; richer formats plug in through
//! [`TextExtractor`].

use std::path::Path;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Produces the plain text of one document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the text of the file at `path`.
    ///
    /// Failures are reported as [`RagError::Extraction`] naming the file.
    async fn extract(&self, path: &Path) -> Result<Document>;
}

/// Reads UTF-8 text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

/// The name a document is reported under: its file name, else the full path.
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<Document> {
        let name = document_name(path);
        let bytes = tokio::fs::read(path).await.map_err(|e| RagError::Extraction {
            document: name.clone(),
            message: format!("failed to read file: {e}"),
        })?;
        let text = String::from_utf8(bytes).map_err(|e| RagError::Extraction {
            document: name.clone(),
            message: format!("not valid UTF-8 text: {e}"),
        })?;
        Ok(Document::new(name, text))
    }
}
