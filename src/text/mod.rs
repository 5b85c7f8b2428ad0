//! Incremental sentence segmentation for streaming delivery.
//!
//! Groups a raw token stream into punctuation-terminated sentences so the
//! transport can emit complete units instead of single tokens.

use once_cell::sync::Lazy;
use regex::Regex;

/// A sentence boundary is a `.`, `!`, `?` or newline immediately followed by
/// whitespace. A bare newline with no trailing whitespace does not terminate
/// a sentence.
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?\n]\s+").expect("sentence boundary pattern"));

/// Stateful buffer turning a token stream into complete sentences.
///
/// Restartable only by constructing a new instance.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one token and drain every sentence it completed.
    ///
    /// A single token can complete several short sentences; any trailing
    /// incomplete fragment stays in the buffer.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);

        let mut sentences = Vec::new();
        while let Some((start, end)) = SENTENCE_BOUNDARY
            .find(&self.buffer)
            .map(|m| (m.start(), m.end()))
        {
            // The terminator is a single ASCII byte, so start + 1 lands on a
            // char boundary even in Vietnamese text.
            let sentence = self.buffer[..start + 1].trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            self.buffer.drain(..end);
        }
        sentences
    }

    /// Drain and return whatever remains, trimmed. Must be called exactly
    /// once at end of stream so no trailing content is lost.
    pub fn flush(&mut self) -> Option<String> {
        let remaining = self.buffer.trim().to_string();
        self.buffer.clear();
        if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        }
    }

    /// True when no partial sentence is pending.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
