//! Overlapping word-window text chunker.
//!
//! Splits document text on whitespace and emits windows of `chunk_words`
//! words, each window starting `chunk_words - overlap_words` words after the
//! previous one. The final window may be shorter. Each chunk receives a fresh
//! UUID v4 id; the `doc_id` is the caller-supplied document name.
//!
//! Text without any words produces no chunks.

use uuid::Uuid;

use crate::models::Chunk;

/// Split `text` into overlapping word windows belonging to `doc_id`.
///
/// `overlap_words` must be smaller than `chunk_words` (enforced by
/// [`Config::validate`](crate::config::Config::validate)); a larger value is
/// clamped so the window always advances.
pub fn chunk_text(doc_id: &str, text: &str, chunk_words: usize, overlap_words: usize) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || chunk_words == 0 {
        return Vec::new();
    }

    let step = chunk_words.saturating_sub(overlap_words).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_words).min(words.len());
        chunks.push(make_chunk(doc_id, &words[start..end].join(" ")));
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(doc_id: &str, text: &str) -> Chunk {
    Chunk::new(Uuid::new_v4().to_string(), doc_id, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1.txt", "Hello,   world!\n", 400, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].doc_id, "doc1.txt");
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("doc1.txt", "", 400, 50).is_empty());
        assert!(chunk_text("doc1.txt", " \n\t ", 400, 50).is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let chunks = chunk_text("doc", &words(10), 4, 1);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["w0 w1 w2 w3", "w3 w4 w5 w6", "w6 w7 w8 w9"]
        );
    }

    #[test]
    fn test_last_window_shorter() {
        let chunks = chunk_text("doc", &words(11), 4, 1);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].text, "w9 w10");
    }

    #[test]
    fn test_default_sizes() {
        let chunks = chunk_text("doc", &words(1000), 400, 50);
        // windows start at 0, 350, 700
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].text.starts_with("w350 "));
        assert_eq!(chunks[2].text.split(' ').count(), 300);
    }

    #[test]
    fn test_ids_unique() {
        let chunks = chunk_text("doc", &words(50), 5, 0);
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn test_overlap_clamped() {
        let chunks = chunk_text("doc", &words(5), 2, 7);
        assert_eq!(chunks.len(), 4);
    }
}
