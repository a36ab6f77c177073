//! Fixed-stride sliding-window chunker.
//!
//! Splits extracted document text into overlapping windows of at most
//! `max_chars` characters. Windows start every `max_chars - overlap`
//! characters, so neighbouring chunks share `overlap` characters of context.
//!
//! Lengths are counted in Unicode scalar values, never bytes, so a window
//! boundary can not split a multi-byte character.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 1);
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::models::NewChunk;

/// Split `text` into overlapping windows.
///
/// - Carriage returns are removed first.
/// - `max_chars <= 0` disables windowing: the whole trimmed text is one chunk.
/// - `overlap` is clamped into `[0, max_chars - 1]`, so the window always advances.
/// - Each window is trimmed; windows that are blank after trimming are dropped.
pub fn chunk_text(text: &str, max_chars: i64, overlap: i64) -> Vec<String> {
    let text = text.replace('\r', "");

    if max_chars <= 0 {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let overlap = overlap.clamp(0, max_chars - 1);
    let step = (max_chars - overlap).max(1) as usize;
    let max_chars = max_chars as usize;

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let length = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < length {
        let end = (start + max_chars).min(length);
        let piece = text[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end >= length {
            break;
        }
        start += step;
    }

    chunks
}

/// Attach ordering and content hashes to chunk texts for storage.
pub fn make_chunks(document_id: i64, pieces: Vec<String>) -> Vec<NewChunk> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(order, content)| NewChunk {
            document_id,
            order: order as i64,
            hash: hash_text(&content),
            content,
        })
        .collect()
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000, 150);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(chunk_text("", 1000, 150).is_empty());
        assert!(chunk_text("   \n\r\n  ", 1000, 150).is_empty());
    }

    #[test]
    fn test_windows_overlap_by_requested_amount() {
        let text: String = ('a'..='z').collect();
        let chunks = chunk_text(&text, 10, 3);
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "hijklmnopq");
        // Every window but the last is full width
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.chars().count(), 10);
        }
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(7).collect();
            let head: String = pair[1].chars().take(3).collect();
            assert_eq!(tail, head);
        }
        assert!(chunks.last().unwrap().ends_with('z'));
    }

    #[test]
    fn test_stops_after_window_reaching_end() {
        // 10 chars, window 6, step 4: [0,6) [4,10) and nothing after
        let chunks = chunk_text("0123456789", 6, 2);
        assert_eq!(chunks, vec!["012345", "456789"]);
    }

    #[test]
    fn test_carriage_returns_removed() {
        let chunks = chunk_text("line one\r\nline two", 1000, 0);
        assert_eq!(chunks, vec!["line one\nline two"]);
    }

    #[test]
    fn test_non_positive_max_chars_returns_whole_text() {
        assert_eq!(chunk_text("  whole text  ", 0, 150), vec!["whole text"]);
        assert_eq!(chunk_text("abc", -5, 0), vec!["abc"]);
        assert!(chunk_text("   ", 0, 0).is_empty());
    }

    #[test]
    fn test_overlap_clamped() {
        // overlap >= max_chars is clamped to max_chars - 1, so step is 1
        let chunks = chunk_text("abcde", 3, 99);
        assert_eq!(chunks, vec!["abc", "bcd", "cde"]);
        // negative overlap behaves as zero
        let chunks = chunk_text("abcdef", 3, -4);
        assert_eq!(chunks, vec!["abc", "def"]);
    }

    #[test]
    fn test_whitespace_windows_dropped_and_trimmed() {
        let chunks = chunk_text("abc      def", 4, 0);
        assert_eq!(chunks, vec!["abc", "def"]);
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "héllo wörld ünïcode";
        let chunks = chunk_text(text, 5, 0);
        assert_eq!(chunks[0], "héllo");
        assert_eq!(chunks[1], "wörl");
        let rejoined: usize = chunk_text(text, 5, 0).iter().map(|c| c.chars().count()).sum();
        assert!(rejoined <= text.chars().count());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta iota kappa";
        assert_eq!(chunk_text(text, 12, 4), chunk_text(text, 12, 4));
    }

    #[test]
    fn test_make_chunks_orders_and_hashes() {
        let chunks = make_chunks(7, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].order, 0);
        assert_eq!(chunks[1].order, 1);
        assert_eq!(chunks[1].document_id, 7);
        assert_eq!(chunks[0].hash, hash_text("one"));
        assert_ne!(chunks[0].hash, chunks[1].hash);
    }
}
