//! Recursive, overlap-preserving text chunker.
//!
//! Chunks are cut at the strongest separator available inside each window
//! (paragraph break, then line break, then space) and fall back to hard
//! character slicing. Lengths are counted in characters, not bytes.

use docrag_core::{RagError, RagResult};

/// Separators tried in priority order. The empty string is the
/// character-level fallback.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Splits document text into bounded, overlapping chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Chunker {
    /// Create a chunker. `chunk_size` must be positive and larger than
    /// `chunk_overlap`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> RagResult<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        })
    }

    /// Replace the separator priority list. Chainable builder method.
    pub fn with_separators<S: Into<String>>(mut self, separators: Vec<S>) -> Self {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Maximum chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by adjacent chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered chunks.
    ///
    /// Every chunk is at most `chunk_size` characters. Each chunk after the
    /// first begins with the last `chunk_overlap` characters of its
    /// predecessor in the text. Chunks made only of whitespace are dropped,
    /// so across a whitespace run longer than `chunk_size` two emitted
    /// neighbours are not adjacent in the text; the characters they share are
    /// then whitespace only.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, including the end of the text.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            if total - start <= self.chunk_size {
                push_chunk(&mut chunks, &text[bounds[start]..]);
                break;
            }
            let end = self.find_break(text, &bounds, start, start + self.chunk_size);
            push_chunk(&mut chunks, &text[bounds[start]..bounds[end]]);
            start = end - self.chunk_overlap;
        }
        chunks
    }

    /// Pick the end (exclusive, in chars) of the chunk starting at `start`.
    ///
    /// The end must lie strictly after `start + chunk_overlap` so the next
    /// chunk starts further into the text.
    fn find_break(&self, text: &str, bounds: &[usize], start: usize, window_end: usize) -> usize {
        let window = &text[bounds[start]..bounds[window_end]];
        let min_end = start + self.chunk_overlap;

        for separator in &self.separators {
            if separator.is_empty() {
                break;
            }
            if let Some(pos) = window.rfind(separator.as_str()) {
                let end_byte = bounds[start] + pos + separator.len();
                let end = bounds.binary_search(&end_byte).unwrap_or_else(|i| i);
                if end > min_end {
                    return end;
                }
            }
        }
        window_end
    }
}

fn push_chunk(chunks: &mut Vec<String>, piece: &str) {
    if !piece.trim().is_empty() {
        chunks.push(piece.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    fn assert_overlap(chunks: &[String], overlap: usize) {
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].chars().collect();
                chars[chars.len() - overlap..].iter().collect()
            };
            let head: String = pair[1].chars().take(overlap).collect();
            assert_eq!(tail, head, "adjacent chunks must share {overlap} chars");
        }
    }

    fn words(n_chars: usize) -> String {
        let vocab = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];
        let mut out = String::new();
        let mut i = 0;
        while out.len() < n_chars {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(vocab[i % vocab.len()]);
            i += 1;
        }
        out.truncate(n_chars);
        out
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = Chunker::new(0, 0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(Chunker::new(100, 100).unwrap_err().is_configuration());
        assert!(Chunker::new(100, 150).unwrap_err().is_configuration());
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::default();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_long_whitespace_run_dropped() {
        let chunker = Chunker::new(10, 2).unwrap();
        let text = format!("alpha{}omega", " ".repeat(40));
        let chunks = chunker.split(&text);

        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        assert!(chunks.first().unwrap().starts_with("alpha"));
        assert!(chunks.last().unwrap().ends_with("omega"));
        assert_overlap(&chunks, 2);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.split("Short text.");
        assert_eq!(chunks, vec!["Short text.".to_string()]);
    }

    #[test]
    fn test_hard_slicing_without_overlap() {
        let chunker = Chunker::new(100, 0).unwrap();
        let text = "x".repeat(250);
        let chunks = chunker.split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(char_len(&chunks[0]), 100);
        assert_eq!(char_len(&chunks[1]), 100);
        assert_eq!(char_len(&chunks[2]), 50);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_word_text_without_overlap_yields_three_chunks() {
        let chunker = Chunker::new(100, 0).unwrap();
        let text = words(250);
        let chunks = chunker.split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_long_text_bounds_and_overlap() {
        let chunker = Chunker::new(500, 50).unwrap();
        let text = words(1200);
        let chunks = chunker.split(&text);

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 500);
        }
        assert_overlap(&chunks, 50);
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let chunker = Chunker::new(60, 0).unwrap();
        let text = format!("{}\n\n{}", "a ".repeat(20).trim_end(), "b ".repeat(30).trim_end());
        let chunks = chunker.split(&text);
        assert!(chunks[0].ends_with("\n\n"));
        assert!(!chunks[0].contains('b'));
    }

    #[test]
    fn test_prefers_line_over_space() {
        let chunker = Chunker::new(30, 0).unwrap();
        let text = "one two three\nfour five six seven eight nine";
        let chunks = chunker.split(text);
        assert_eq!(chunks[0], "one two three\n");
    }

    #[test]
    fn test_separator_inside_overlap_is_skipped() {
        // The only space sits inside the overlap region, so the chunker must
        // slice at the window end instead of making no progress.
        let chunker = Chunker::new(10, 5).unwrap();
        let text = "ab cdefghijklmnopqrstuvwxyz";
        let chunks = chunker.split(text);
        assert_eq!(chunks[0], "ab cdefghi");
        assert_overlap(&chunks, 5);
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let chunker = Chunker::new(4, 1).unwrap();
        let text = "çğıöşüÇĞİÖ";
        let chunks = chunker.split(text);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 4);
        }
        assert_overlap(&chunks, 1);
        assert_eq!(chunks[0], "çğıö");
    }

    #[test]
    fn test_overlap_property_across_sizes() {
        let text = format!("{}\n{}\n\n{}", words(333), words(120), words(700));
        for (size, overlap) in [(50, 0), (64, 8), (100, 20), (200, 199), (300, 50)] {
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks = chunker.split(&text);
            assert!(chunks.len() >= 2, "size {size} should split the text");
            for chunk in &chunks {
                assert!(char_len(chunk) <= size);
            }
            assert_overlap(&chunks, overlap);
        }
    }

    #[test]
    fn test_custom_separators() {
        let chunker = Chunker::new(12, 0).unwrap().with_separators(vec![";", ""]);
        let chunks = chunker.split("aaaa;bbbb;cccc;dddd");
        assert_eq!(chunks[0], "aaaa;bbbb;");
    }
}
