//! Text chunking with configurable size and overlap.

/// A span of text cut from a document, before it gets an id or hash.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    /// Position within the document
    pub index: u32,

    /// Trimmed span text
    pub text: String,

    /// Character offset of the span start
    pub start: usize,

    /// Character offset one past the span end
    pub end: usize,
}

/// Chunk text into overlapping segments.
///
/// Sizes are counted in characters, so multi-byte text is never split
/// inside a code point. Consecutive spans share `overlap` characters; the
/// last span always reaches the end of the text.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<ChunkSpan> {
    if text.trim().is_empty() || chunk_size == 0 {
        return vec![];
    }

    // Byte offset of every char, plus the end of the string.
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    let char_len = offsets.len() - 1;

    let step = if chunk_size > overlap {
        chunk_size - overlap
    } else {
        chunk_size
    };

    let mut spans = Vec::new();
    let mut index = 0u32;
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(char_len);
        let slice = text[offsets[start]..offsets[end]].trim();

        if !slice.is_empty() {
            spans.push(ChunkSpan {
                index,
                text: slice.to_string(),
                start,
                end,
            });
            index += 1;
        }

        if end >= char_len {
            break;
        }
        start += step;
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        spans.len(),
        chunk_size,
        overlap
    );

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_basic() {
        let text = "a".repeat(1000);
        let chunks = chunk_text(&text, 200, 50);

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].start, 150);
    }

    #[test]
    fn test_chunk_text_no_overlap() {
        let text = "a".repeat(300);
        let chunks = chunk_text(&text, 100, 0);

        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 100, 10).is_empty());
        assert!(chunk_text("   \n ", 100, 10).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("The Eiffel Tower is in Paris.", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The Eiffel Tower is in Paris.");
    }

    #[test]
    fn test_last_chunk_reaches_end() {
        let text = "abcdefghijklmnopqrstuvwxyz".repeat(10);
        let chunks = chunk_text(&text, 50, 10);

        let last = chunks.last().unwrap();
        assert_eq!(last.end, 260);
        assert!(text.ends_with(&last.text));
    }

    #[test]
    fn test_boundary_fact_survives_in_one_chunk() {
        // A 20-char fact straddling the first boundary at char 50.
        let text = format!("{}{}{}", "x".repeat(40), "FACT:water-boils-100", "y".repeat(60));
        let chunks = chunk_text(&text, 50, 25);

        assert!(chunks.iter().any(|c| c.text.contains("FACT:water-boils-100")));
    }

    #[test]
    fn test_utf8_safety() {
        let text = "Gamedex é um aplicativo 🎮 brasileiro para gerenciar jogos!".repeat(5);
        let chunks = chunk_text(&text, 17, 4);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 17);
        }
    }
}
