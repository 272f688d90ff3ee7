pub mod chunk;
pub mod chunker;
pub mod normalizer;
pub mod numerals;
pub mod profile;
pub mod reader;
pub mod tokenizer;

pub use chunk::Chunk;
pub use chunker::{ChunkPlanner, ChunkerConfig};
pub use normalizer::{TextNormalizer, has_preamble_heading};
pub use profile::ModelProfile;
pub use reader::{DocumentReader, OcrCommand, ReadError};
pub use tokenizer::{SegmentTokenizer, TokenizedText, Tokenizer};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// A document after OCR cleanup, ready for chunk planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedDocument {
    pub doc_id: String,
    pub name: String,
    pub text: String,
    pub has_preamble_heading: bool,
}

impl PreparedDocument {
    pub fn from_text(name: &str, raw: &str, normalizer: &TextNormalizer) -> Self {
        let text = normalizer.normalize(raw);
        Self {
            doc_id: generate_doc_id(name),
            name: name.to_string(),
            has_preamble_heading: has_preamble_heading(&text),
            text,
        }
    }
}

/// Read and normalize one input file.
pub async fn prepare_file(
    path: &Path,
    reader: &DocumentReader,
    normalizer: &TextNormalizer,
) -> Result<PreparedDocument, ReadError> {
    let raw = reader.read_file(path).await?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let doc = PreparedDocument::from_text(&name, &raw, normalizer);
    tracing::info!(
        doc = %doc.name,
        chars = doc.text.chars().count(),
        preamble = doc.has_preamble_heading,
        "prepared document"
    );
    Ok(doc)
}
