//! Naive extractive summaries.
//!
//! A summary is the first few sentences of a document that are longer than
//! ten characters. Sentences end at `.`, `!` or `?` followed by whitespace.
//! When no sentence qualifies, the first 200 characters are returned.

use std::path::Path;

use serde::Serialize;

use crate::error::{IoContext, Result};

pub const DEFAULT_MAX_SENTENCES: usize = 4;

const MIN_SENTENCE_CHARS: usize = 10;
const FALLBACK_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub filename: String,
    pub summary: String,
}

pub fn summarize_text(text: &str, max_sentences: usize) -> String {
    let picked: Vec<&str> = split_sentences(text.trim())
        .into_iter()
        .filter(|s| s.trim().chars().count() > MIN_SENTENCE_CHARS)
        .take(max_sentences)
        .collect();

    if picked.is_empty() {
        return text.chars().take(FALLBACK_CHARS).collect();
    }
    picked.join(" ")
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }
        out.push(&text[start..end]);
        // swallow the whitespace run
        start = end;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            start = j + w.len_utf8();
            chars.next();
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Summarize one file; non-UTF-8 bytes are replaced rather than rejected.
pub fn summarize_file(path: &Path, max_sentences: usize) -> Result<String> {
    let bytes = std::fs::read(path).at(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(summarize_text(&text, max_sentences))
}
