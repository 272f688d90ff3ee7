use serde::{Deserialize, Serialize};

/// Token limits of the generation model a document is planned against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelProfile {
    pub name: String,
    pub max_context: usize,
    pub max_completion: usize,
    /// Upper bound on the Pass 1 head chunk.
    pub pass1_cap: usize,
    /// Upper bound on a Pass 2 chunk before the overlap is reserved.
    pub pass2_cap: usize,
}

impl ModelProfile {
    pub fn for_model(name: &str) -> Self {
        let (max_context, max_completion, pass2_cap) = match name {
            "gpt-3.5-turbo" => (4_096, 3_000, 2_000),
            "gpt-3.5-turbo-16k" => (16_384, 12_000, 3_000),
            n if n.starts_with("gpt-4-turbo") || n.starts_with("gpt-4o") => (128_000, 4_000, 3_000),
            n if n.starts_with("gpt-4") => (8_192, 4_000, 3_000),
            n if n.starts_with("llama3") => (8_192, 4_000, 3_000),
            _ => (16_384, 12_000, 3_000),
        };

        Self {
            name: name.to_string(),
            max_context,
            max_completion,
            pass1_cap: 8_000,
            pass2_cap,
        }
    }

    pub fn is_small(&self) -> bool {
        self.max_context <= 4_096
    }

    /// Completion budget kept free when sizing the Pass 1 head chunk.
    pub fn pass1_reply_reserve(&self) -> usize {
        if self.is_small() { 1_000 } else { 500 }
    }

    /// Completion budget kept free when sizing Pass 2 chunks.
    pub fn pass2_reply_reserve(&self) -> usize {
        if self.is_small() { 1_500 } else { 500 }
    }
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self::for_model("llama3")
    }
}
