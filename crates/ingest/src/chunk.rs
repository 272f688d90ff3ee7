use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub index: usize,
    pub text: String,
    pub tokens: (usize, usize), // [start, end) token positions in the normalized text
    pub offset: (usize, usize), // [start, end) character positions
    /// Trailing token window carried into the next call.
    pub tail: String,
}

impl Chunk {
    pub fn new(
        doc_id: String,
        index: usize,
        text: String,
        tokens: (usize, usize),
        offset: (usize, usize),
        tail: String,
    ) -> Self {
        // Generate stable chunk_id from content
        let chunk_id = Self::generate_chunk_id(&doc_id, &text, offset);

        Self {
            doc_id,
            chunk_id,
            index,
            text,
            tokens,
            offset,
            tail,
        }
    }

    fn generate_chunk_id(doc_id: &str, text: &str, offset: (usize, usize)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(text.as_bytes());
        hasher.update(offset.0.to_string().as_bytes());
        hasher.update(offset.1.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.1 - self.tokens.0
    }
}
