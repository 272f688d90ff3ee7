use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Splits text into tokens for budget accounting.
///
/// Tokens are byte spans that tile the input exactly, so any token range
/// decodes back to the original substring.
pub trait Tokenizer: Send + Sync {
    fn spans(&self, text: &str) -> Vec<Range<usize>>;

    fn count(&self, text: &str) -> usize {
        self.spans(text).len()
    }
}

/// Word-boundary tokenizer; long words are split into fixed-width pieces,
/// which tracks subword vocabularies closely enough for Arabic text.
#[derive(Debug, Clone)]
pub struct SegmentTokenizer {
    max_chars: usize,
}

impl SegmentTokenizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }
}

impl Default for SegmentTokenizer {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Tokenizer for SegmentTokenizer {
    fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();

        for (offset, segment) in text.split_word_bound_indices() {
            if segment.chars().all(char::is_whitespace) || segment.chars().count() <= self.max_chars {
                spans.push(offset..offset + segment.len());
                continue;
            }

            let mut piece_start = offset;
            for (n, (idx, _)) in segment.char_indices().enumerate() {
                if n > 0 && n % self.max_chars == 0 {
                    spans.push(piece_start..offset + idx);
                    piece_start = offset + idx;
                }
            }
            spans.push(piece_start..offset + segment.len());
        }

        spans
    }
}

/// A text together with its token spans.
pub struct TokenizedText<'a> {
    text: &'a str,
    spans: Vec<Range<usize>>,
}

impl<'a> TokenizedText<'a> {
    pub fn new(text: &'a str, tokenizer: &dyn Tokenizer) -> Self {
        Self {
            text,
            spans: tokenizer.spans(text),
        }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Text covered by tokens `start..end`.
    pub fn decode(&self, start: usize, end: usize) -> &'a str {
        if start >= end || start >= self.spans.len() {
            return "";
        }
        let end = end.min(self.spans.len());
        &self.text[self.spans[start].start..self.spans[end - 1].end]
    }

    pub fn byte_start(&self, token: usize) -> usize {
        self.spans
            .get(token)
            .map(|s| s.start)
            .unwrap_or(self.text.len())
    }

    /// Number of tokens (from `from`) that end at or before `byte`.
    pub fn tokens_ending_by(&self, from: usize, to: usize, byte: usize) -> usize {
        let window = &self.spans[from..to];
        from + window.partition_point(|span| span.end <= byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_tile_input() {
        let tokenizer = SegmentTokenizer::default();
        let text = "المادة 12: يعاقب بالحبس\nمن سنة";
        let spans = tokenizer.spans(text);

        let mut rebuilt = String::new();
        let mut cursor = 0;
        for span in &spans {
            assert_eq!(span.start, cursor);
            rebuilt.push_str(&text[span.clone()]);
            cursor = span.end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_long_words_are_split() {
        let tokenizer = SegmentTokenizer::new(3);
        // "abcdefg" -> abc, def, g
        assert_eq!(tokenizer.count("abcdefg"), 3);
        assert_eq!(tokenizer.count("ab cd"), 3);
    }

    #[test]
    fn test_decode_ranges() {
        let tokenizer = SegmentTokenizer::default();
        let tokenized = TokenizedText::new("one two", &tokenizer);
        assert_eq!(tokenized.len(), 3);
        assert_eq!(tokenized.decode(0, 1), "one");
        assert_eq!(tokenized.decode(1, 3), " two");
        assert_eq!(tokenized.decode(2, 9), "two");
    }
}
