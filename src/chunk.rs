//! Sentence-boundary text chunker.
//!
//! Splits cleaned text into [`Chunk`]s that respect a `max_tokens` limit.
//! Splitting occurs on sentence boundaries (`.`, `!`, `?` followed by
//! whitespace) to preserve semantic coherence; a sentence that alone exceeds
//! the limit falls back to a word-level greedy pack so no chunk ever exceeds
//! the limit because of one oversized sentence.
//!
//! Token counting is injected as a plain `Fn(&str) -> usize` so the chunker
//! stays a pure, unit-testable function; [`token_count`] is the default
//! counter backed by the cl100k_base encoding.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::models::Chunk;

/// Counting function contract: `count(s) >= 0`, monotonic in string length
/// for ASCII text.
pub type TokenCounter = dyn Fn(&str) -> usize + Send + Sync;

static CL100K: OnceLock<CoreBPE> = OnceLock::new();

/// Count tokens using the cl100k_base encoding (the encoding used by the
/// `text-embedding-3-*` models).
pub fn token_count(text: &str) -> usize {
    let bpe = CL100K.get_or_init(|| {
        // Built from vocabulary data embedded in the crate; construction
        // only fails if that bundled data is invalid.
        tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary")
    });
    bpe.encode_with_special_tokens(text).len()
}

/// Result of chunking one source text: the admitted chunks plus the number
/// of candidates dropped for being shorter than `min_chars`.
#[derive(Debug, Clone, Default)]
pub struct Chunked {
    pub chunks: Vec<Chunk>,
    pub dropped_short: usize,
}

/// Normalize whitespace: collapse runs of blank lines to a single blank
/// line, strip trailing whitespace per line, and collapse runs of spaces.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for raw in text.lines() {
        let line = collapse_spaces(raw.trim_end());
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(&line);
    }

    out
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut prev_space = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

/// Split cleaned text on sentence boundaries: after `.`, `!`, or `?` when
/// followed by whitespace. Returns trimmed, non-empty sentences in order.
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if (b == b'.' || b == b'!' || b == b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace()
        {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            start = i;
            continue;
        }
        i += 1;
    }

    if start < text.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
    }

    sentences
}

/// Split `text` into token-bounded chunks for `unit_id`.
///
/// Every admitted chunk satisfies `count(text) <= max_tokens` (except a
/// single atomic word that cannot be split further) and
/// `text.trim().len() > min_chars`. Pure function of its inputs; chunk
/// order follows the original text and `sequence_index` is contiguous
/// starting at 0.
pub fn chunk_text(
    unit_id: &str,
    text: &str,
    max_tokens: usize,
    min_chars: usize,
    count: &TokenCounter,
) -> Chunked {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return Chunked::default();
    }

    let mut pieces: Vec<String> = Vec::new();

    if count(&cleaned) <= max_tokens {
        pieces.push(cleaned);
    } else {
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for sentence in split_sentences(&cleaned) {
            let sentence_tokens = count(sentence);

            if sentence_tokens > max_tokens {
                // Oversized sentence: flush the running chunk, then pack
                // the sentence word by word.
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                    current_tokens = 0;
                }
                for word in sentence.split_whitespace() {
                    let word_tokens = count(word);
                    if current_tokens + word_tokens > max_tokens && !current.is_empty() {
                        pieces.push(std::mem::take(&mut current));
                        current_tokens = 0;
                    }
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(word);
                    current_tokens += word_tokens;
                }
                // Leftover words stay in `current` so following sentences
                // can join them.
            } else if current_tokens + sentence_tokens > max_tokens {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                current.push_str(sentence);
                current_tokens = sentence_tokens;
            } else {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(sentence);
                current_tokens += sentence_tokens;
            }
        }

        if !current.is_empty() {
            pieces.push(current);
        }
    }

    let mut chunked = Chunked::default();
    for piece in pieces {
        let trimmed = piece.trim();
        if trimmed.len() <= min_chars {
            chunked.dropped_short += 1;
            continue;
        }
        chunked.chunks.push(Chunk {
            text: trimmed.to_string(),
            token_count: count(trimmed),
            sequence_index: chunked.chunks.len(),
            source_unit_id: unit_id.to_string(),
        });
    }

    chunked
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Word-count token counter: predictable in tests, monotonic for ASCII.
    fn words(s: &str) -> usize {
        s.split_whitespace().count()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let c = chunk_text("doc1", "Hello, chunker world!", 500, 10, &words);
        assert_eq!(c.chunks.len(), 1);
        assert_eq!(c.chunks[0].text, "Hello, chunker world!");
        assert_eq!(c.chunks[0].sequence_index, 0);
        assert_eq!(c.chunks[0].source_unit_id, "doc1");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        let c = chunk_text("doc1", "", 500, 10, &words);
        assert!(c.chunks.is_empty());
        assert_eq!(c.dropped_short, 0);

        let c = chunk_text("doc1", "  \n\n  \n", 500, 10, &words);
        assert!(c.chunks.is_empty());
    }

    #[test]
    fn test_clean_text_normalizes_whitespace() {
        let text = "line one   with  spaces   \n\n\n\n\nline two\t\twith tabs  \n";
        assert_eq!(
            clean_text(text),
            "line one with spaces\n\nline two with tabs"
        );
    }

    #[test]
    fn test_split_sentences_boundaries() {
        let s = split_sentences("First one. Second two! Third three? Trailing tail");
        assert_eq!(
            s,
            vec!["First one.", "Second two!", "Third three?", "Trailing tail"]
        );
    }

    #[test]
    fn test_abbreviation_period_without_space_not_split() {
        // "3.14" has no whitespace after the period, so it stays intact.
        let s = split_sentences("Pi is 3.14 exactly. Next sentence.");
        assert_eq!(s, vec!["Pi is 3.14 exactly.", "Next sentence."]);
    }

    #[test]
    fn test_chunk_bound_scenario_1800_tokens() {
        // 180 sentences of 10 words each = 1800 "tokens" with the word
        // counter; max_tokens = 500 must yield at least 4 chunks, none
        // exceeding the limit.
        let text = (0..180)
            .map(|i| format!("sentence {} has exactly ten words in it padded out.", i))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(words(&text), 1800);

        let c = chunk_text("doc1", &text, 500, 10, &words);
        assert!(c.chunks.len() >= 4, "expected >= 4 chunks, got {}", c.chunks.len());
        let total: usize = c.chunks.iter().map(|ch| ch.token_count).sum();
        assert!(total <= 1800);
        for ch in &c.chunks {
            assert!(ch.token_count <= 500, "chunk exceeds limit: {}", ch.token_count);
        }
    }

    #[test]
    fn test_oversized_sentence_word_split() {
        // One sentence of 1200 words, no sentence boundary: must hard-split
        // at the word level into pieces within the limit.
        let text = (0..1200).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let c = chunk_text("doc1", &text, 500, 10, &words);
        assert!(c.chunks.len() >= 3);
        for ch in &c.chunks {
            assert!(ch.token_count <= 500);
        }
    }

    #[test]
    fn test_short_chunks_dropped_and_counted() {
        // Second sentence alone is under min_chars once it lands in its own
        // chunk.
        let text = "This opening sentence carries more than enough characters to stay. No!";
        let c = chunk_text("doc1", text, 10, 10, &words);
        assert_eq!(c.dropped_short, 1);
        assert_eq!(c.chunks.len(), 1);
    }

    #[test]
    fn test_sequence_indices_contiguous() {
        let text = (0..60)
            .map(|i| format!("sentence number {} right here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let c = chunk_text("doc1", &text, 20, 5, &words);
        assert!(c.chunks.len() > 1);
        for (i, ch) in c.chunks.iter().enumerate() {
            assert_eq!(ch.sequence_index, i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota kappa lambda.";
        let a = chunk_text("doc1", text, 6, 5, &words);
        let b = chunk_text("doc1", text, 6, 5, &words);
        assert_eq!(a.chunks.len(), b.chunks.len());
        for (x, y) in a.chunks.iter().zip(b.chunks.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.token_count, y.token_count);
        }
    }

    #[test]
    fn test_default_counter_nonzero() {
        assert!(token_count("hello world") > 0);
        assert_eq!(token_count(""), 0);
    }
}
