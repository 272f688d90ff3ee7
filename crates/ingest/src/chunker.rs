use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::profile::ModelProfile;
use crate::tokenizer::{SegmentTokenizer, TokenizedText, Tokenizer};

/// Sentence-terminal marks tried when a window has no newline.
const CUT_PUNCTUATION: [char; 6] = ['۔', '؟', '.', '!', ';', '؛'];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub overlap_tokens: usize,
    pub hard_ceiling: usize,
    pub floor: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            overlap_tokens: 256,
            hard_ceiling: 5_000,
            floor: 100,
        }
    }
}

/// Sizes prompts against a model profile and cuts text into chunks.
#[derive(Clone)]
pub struct ChunkPlanner {
    profile: ModelProfile,
    config: ChunkerConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl ChunkPlanner {
    pub fn new(profile: ModelProfile, config: ChunkerConfig) -> Self {
        Self::with_tokenizer(profile, config, Arc::new(SegmentTokenizer::default()))
    }

    pub fn with_tokenizer(
        profile: ModelProfile,
        config: ChunkerConfig,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            profile,
            config,
            tokenizer,
        }
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// Token cost of a chat prompt given as `(role, content)` pairs,
    /// including the per-message role wrapper.
    pub fn prompt_tokens(&self, messages: &[(&str, &str)]) -> usize {
        let body: usize = messages
            .iter()
            .map(|(role, content)| 4 + self.count_tokens(role) + self.count_tokens(content))
            .sum();
        body + 2
    }

    /// Completion budget left once `prompt_tokens` are spent.
    pub fn completion_budget(&self, prompt_tokens: usize) -> Option<usize> {
        let remain = self.profile.max_context.checked_sub(prompt_tokens)?;
        if remain == 0 {
            return None;
        }
        Some(remain.min(self.profile.max_completion))
    }

    /// Token size of the Pass 1 head chunk for a prompt with `overhead` tokens.
    pub fn pass1_limit(&self, overhead: usize) -> usize {
        let available = self
            .profile
            .max_context
            .saturating_sub(overhead + self.profile.pass1_reply_reserve());
        available.min(self.profile.pass1_cap)
    }

    /// New-text tokens per Pass 2 chunk, after reserving the overlap window.
    pub fn pass2_limit(&self, overhead: usize) -> usize {
        let available = self
            .profile
            .max_context
            .saturating_sub(overhead + self.profile.pass2_reply_reserve())
            .min(self.profile.pass2_cap);
        let limit = available.clamp(self.config.floor, self.config.hard_ceiling);
        limit
            .saturating_sub(self.config.overlap_tokens)
            .max(self.config.floor)
    }

    /// Bounded head of the document for skeleton extraction.
    pub fn head_chunk(&self, doc_id: &str, text: &str, overhead: usize) -> Option<Chunk> {
        let tokenized = TokenizedText::new(text, self.tokenizer.as_ref());
        if tokenized.is_empty() {
            return None;
        }

        let end = tokenized.len().min(self.pass1_limit(overhead));
        if end == 0 {
            return None;
        }
        let head = tokenized.decode(0, end);
        tracing::debug!(tokens = end, total = tokenized.len(), "planned pass 1 head chunk");

        Some(Chunk::new(
            doc_id.to_string(),
            0,
            head.to_string(),
            (0, end),
            (0, head.chars().count()),
            String::new(),
        ))
    }

    /// Ordered Pass 2 chunks; their texts concatenate back to `text`.
    pub fn plan(&self, doc_id: &str, text: &str, overhead: usize) -> Vec<Chunk> {
        let limit = self.pass2_limit(overhead);
        tracing::debug!(
            limit,
            overlap = self.config.overlap_tokens,
            "planning pass 2 chunks"
        );
        self.split(doc_id, text, limit)
    }

    /// Split `text` into chunks of at most `limit` tokens, cutting at the last
    /// newline (else sentence punctuation) inside each window.
    pub fn split(&self, doc_id: &str, text: &str, limit: usize) -> Vec<Chunk> {
        let tokenized = TokenizedText::new(text, self.tokenizer.as_ref());
        let total = tokenized.len();
        let limit = limit.max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut char_cursor = 0;

        while start < total {
            let window_end = (start + limit).min(total);
            let mut end = window_end;

            if window_end < total {
                let window = tokenized.decode(start, window_end);
                if let Some(cut) = cut_point(window) {
                    let absolute = tokenized.byte_start(start) + cut;
                    let cut_end = tokenized.tokens_ending_by(start, window_end, absolute);
                    if cut_end > start {
                        end = cut_end;
                    }
                }
            }

            let body = tokenized.decode(start, end);
            let tail_start = end.saturating_sub(self.config.overlap_tokens).max(start);
            let tail = tokenized.decode(tail_start, end);
            let chars = body.chars().count();

            chunks.push(Chunk::new(
                doc_id.to_string(),
                chunks.len(),
                body.to_string(),
                (start, end),
                (char_cursor, char_cursor + chars),
                tail.to_string(),
            ));

            char_cursor += chars;
            start = end;
        }

        chunks
    }

    /// Last `overlap_tokens` tokens of `text`.
    pub fn tail_of(&self, text: &str) -> String {
        let tokenized = TokenizedText::new(text, self.tokenizer.as_ref());
        let end = tokenized.len();
        let start = end.saturating_sub(self.config.overlap_tokens);
        tokenized.decode(start, end).to_string()
    }

    /// Two halves of `text` cut near the middle at a safe boundary.
    pub fn bisect(&self, text: &str) -> Option<(String, String)> {
        let tokenized = TokenizedText::new(text, self.tokenizer.as_ref());
        if tokenized.len() < 2 {
            return None;
        }

        let mid = tokenized.len() / 2;
        let first_half = tokenized.decode(0, mid);
        let mut split = mid;
        if let Some(cut) = cut_point(first_half) {
            let cut_end = tokenized.tokens_ending_by(0, mid, cut);
            // Only accept boundaries that keep the halves roughly balanced
            if cut_end >= mid / 2 && cut_end > 0 {
                split = cut_end;
            }
        }

        Some((
            tokenized.decode(0, split).to_string(),
            tokenized.decode(split, tokenized.len()).to_string(),
        ))
    }
}

/// Byte index just past the preferred cut in `window`, if it is not the end.
fn cut_point(window: &str) -> Option<usize> {
    let cut = window.rfind('\n').or_else(|| {
        CUT_PUNCTUATION
            .iter()
            .filter_map(|p| window.rfind(*p).map(|pos| (pos, p.len_utf8())))
            .max_by_key(|(pos, _)| *pos)
            .map(|(pos, _)| pos)
    })?;

    let width = window[cut..].chars().next().map(char::len_utf8).unwrap_or(1);
    let after = cut + width;
    if after < window.len() { Some(after) } else { None }
}
