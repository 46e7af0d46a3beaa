use std::collections::BTreeMap;
use std::path::Path;

use docrag_core::{RagError, RagResult};

/// Extensions read as plain UTF-8 text.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// A file's text plus the metadata its fragments are tagged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    /// File name, used as the source name.
    pub source: String,
    /// Full file text.
    pub content: String,
    /// `file_path`, and `file_type` as the dotted extension (`.md`).
    pub metadata: BTreeMap<String, String>,
}

/// Read a `.txt` or `.md` file.
///
/// Anything else (PDF included) needs an external extractor and is rejected
/// with [`RagError::Ingestion`], as are unreadable or non-UTF-8 files.
pub async fn load_document(path: &Path) -> RagResult<LoadedDocument> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(RagError::Ingestion(format!(
            "unsupported file type '.{extension}' for {} (supported: .txt, .md)",
            path.display()
        )));
    }

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::Ingestion(format!("invalid file name: {}", path.display())))?;

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RagError::Ingestion(format!("cannot read {}: {e}", path.display())))?;

    // Dotted, as written in the file name: "Notes.MD" -> ".MD"
    let file_type = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let mut metadata = BTreeMap::new();
    metadata.insert("file_path".to_string(), path.display().to_string());
    metadata.insert("file_type".to_string(), file_type);

    Ok(LoadedDocument {
        source,
        content,
        metadata,
    })
}
