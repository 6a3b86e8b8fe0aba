//! Section-aware text chunker.
//!
//! Splits normalized text into bounded, overlapping passages that carry
//! the nearest preceding heading as section metadata.
//!
//! # Algorithm
//!
//! 1. Split on blank-line paragraph boundaries.
//! 2. Short paragraphs that end with a colon, are fully upper-case, or
//!    match a section-title shape are headings: they update the current
//!    section and are never emitted as chunk content.
//! 3. Body paragraphs are sentence-split and their words accumulated
//!    into a running buffer.
//! 4. When appending a sentence would push the buffer past `chunk_size`
//!    words, the buffer is flushed (kept only if it has at least
//!    `min_words` words) and reseeded with its last `overlap` words.
//! 5. The trailing buffer is flushed under the same minimum-length rule.
//! 6. The chunk list is deduplicated by SHA-256 content hash, first
//!    occurrence wins.
//!
//! # Known behavior
//!
//! A single sentence longer than `chunk_size` is never split mid-sentence:
//! it is appended whole and the length check fires at the next sentence
//! boundary, so that one chunk transiently exceeds `chunk_size`. Trailing
//! fragments that never reach `min_words` are dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::config::ChunkingConfig;
use crate::models::ChunkCandidate;

/// A sentence ends at `.`, `!`, or `?` followed by whitespace.
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Digits, dots, whitespace, capitals, and dashes only — the shape of
/// numbered section titles like "3.2 FEE STRUCTURE - 2024".
static HEADING_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\.\sA-Z\-]{1,60}$").unwrap());

const HEADING_MAX_CHARS: usize = 120;

/// Classify a paragraph as a heading.
pub fn is_heading(paragraph: &str) -> bool {
    let p = paragraph.trim();
    if p.is_empty() || p.chars().count() >= HEADING_MAX_CHARS {
        return false;
    }
    p.ends_with(':') || is_all_upper(p) || HEADING_SHAPE.is_match(p)
}

/// True when the string has at least one cased character and none of
/// them are lowercase.
fn is_all_upper(s: &str) -> bool {
    let mut has_cased = false;
    for c in s.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

/// Split a paragraph into sentences, keeping terminal punctuation.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(paragraph) {
        // The punctuation class is single-byte, so start + 1 lands just
        // past the terminator.
        let boundary = m.start() + 1;
        sentences.push(&paragraph[last..boundary]);
        last = m.end();
    }
    if last < paragraph.len() {
        sentences.push(&paragraph[last..]);
    }
    sentences
}

/// Chunk normalized text into section-tagged passages.
///
/// Returns candidates in document order; ids are assigned later by the
/// index builder.
pub fn chunk_with_sections(text: &str, params: &ChunkingConfig) -> Vec<ChunkCandidate> {
    let mut chunks: Vec<ChunkCandidate> = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut current_section: Option<String> = None;

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        if is_heading(para) {
            current_section = Some(para.to_string());
            continue;
        }

        for sentence in split_sentences(para) {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }

            if buffer.len() + words.len() > params.chunk_size && !buffer.is_empty() {
                push_chunk(&mut chunks, &buffer, &current_section, params.min_words);

                if params.overlap > 0 {
                    let keep_from = buffer.len().saturating_sub(params.overlap);
                    buffer.drain(..keep_from);
                } else {
                    buffer.clear();
                }
            }

            buffer.extend(words.iter().map(|w| w.to_string()));
        }
    }

    if !buffer.is_empty() {
        push_chunk(&mut chunks, &buffer, &current_section, params.min_words);
    }

    dedup_chunks(chunks)
}

fn push_chunk(
    chunks: &mut Vec<ChunkCandidate>,
    buffer: &[String],
    section: &Option<String>,
    min_words: usize,
) {
    let text = buffer.join(" ");
    let text = text.trim();
    if text.split_whitespace().count() >= min_words {
        chunks.push(ChunkCandidate {
            text: text.to_string(),
            section: section.clone(),
        });
    }
}

/// Drop exact-duplicate chunk texts, preserving first occurrence order.
fn dedup_chunks(chunks: Vec<ChunkCandidate>) -> Vec<ChunkCandidate> {
    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let mut unique = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let mut hasher = Sha256::new();
        hasher.update(chunk.text.trim().as_bytes());
        let hash: [u8; 32] = hasher.finalize().into();
        if seen.insert(hash) {
            unique.push(chunk);
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(chunk_size: usize, overlap: usize, min_words: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
            min_words,
        }
    }

    fn word_count(s: &str) -> usize {
        s.split_whitespace().count()
    }

    #[test]
    fn test_heading_classification() {
        assert!(is_heading("Admission Process:"));
        assert!(is_heading("FEE STRUCTURE"));
        assert!(is_heading("3.2 PLACEMENTS - 2024"));
        assert!(!is_heading("The college offers several programs."));
        assert!(!is_heading(""));
        // Long lines are body text even when they end with a colon.
        let long = format!("{}:", "x".repeat(150));
        assert!(!is_heading(&long));
    }

    #[test]
    fn test_headings_not_emitted_and_tag_chunks() {
        let text = "ADMISSIONS\n\nStudents apply online through the portal. \
                    Applications close in June each year.";
        let chunks = chunk_with_sections(text, &params(50, 0, 3));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section.as_deref(), Some("ADMISSIONS"));
        assert!(!chunks[0].text.contains("ADMISSIONS"));
    }

    #[test]
    fn test_section_none_before_first_heading() {
        let text = "Intro paragraph with enough words to flush on its own. \
                    A second intro sentence forces that flush now.\n\nHOSTEL:\n\n\
                    Hostel rooms are allotted by rank and category every year.";
        let chunks = chunk_with_sections(text, &params(10, 0, 3));
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].section, None);
        assert_eq!(chunks.last().unwrap().section.as_deref(), Some("HOSTEL:"));
    }

    #[test]
    fn test_chunk_size_bound_at_flush() {
        let sentences: Vec<String> = (0..30)
            .map(|i| format!("Sentence number {} has exactly six words.", i))
            .collect();
        let text = sentences.join(" ");
        let chunks = chunk_with_sections(&text, &params(20, 0, 1));
        assert!(chunks.len() > 1);
        // Every flushed chunk stays within chunk_size plus one sentence.
        for chunk in &chunks {
            assert!(word_count(&chunk.text) <= 20 + 7);
        }
    }

    #[test]
    fn test_overlap_words_repeat() {
        let sentences: Vec<String> = (0..12)
            .map(|i| format!("Alpha beta gamma delta sentence {}.", i))
            .collect();
        let text = sentences.join(" ");
        let overlap = 4;
        let chunks = chunk_with_sections(&text, &params(18, overlap, 1));
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            let a: Vec<&str> = pair[0].text.split_whitespace().collect();
            let b: Vec<&str> = pair[1].text.split_whitespace().collect();
            assert_eq!(a[a.len() - overlap..], b[..overlap]);
        }
    }

    #[test]
    fn test_dedup_identical_paragraphs() {
        let para = "The institute was established in 1998 and offers engineering programs.";
        let text = format!("{}\n\n{}", para, para);
        // chunk_size equals one paragraph, so each copy flushes as its
        // own chunk and dedup collapses them.
        let chunks = chunk_with_sections(&text, &params(11, 0, 3));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, para);
    }

    #[test]
    fn test_short_trailing_fragment_dropped() {
        let text = "First sentence carries plenty of words to satisfy the minimum easily. Tiny end.";
        let chunks = chunk_with_sections(text, &params(12, 0, 6));
        // The trailing "Tiny end." buffer never reaches min_words.
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("First sentence"));
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let mut words = vec!["Start"];
        words.extend(std::iter::repeat("filler").take(30));
        let long = format!("{}.", words.join(" "));
        let text = format!("{} Short tail sentence follows here.", long);
        let chunks = chunk_with_sections(&text, &params(10, 0, 1));
        // The 31-word sentence lands in a single chunk, unsplit.
        assert!(chunks.iter().any(|c| word_count(&c.text) > 10));
        assert!(chunks[0].text.contains("filler filler"));
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_with_sections("", &params(100, 10, 5)).is_empty());
    }

    #[test]
    fn test_sentence_split_keeps_punctuation() {
        let sentences = split_sentences("One here. Two there! Three maybe? Four");
        assert_eq!(
            sentences,
            vec!["One here.", "Two there!", "Three maybe?", "Four"]
        );
    }

    #[test]
    fn test_sentence_split_no_break_without_whitespace() {
        let sentences = split_sentences("Visit www.college.edu for details.");
        assert_eq!(sentences.len(), 1);
    }
}
