/// Fixed-size, overlapping character-window chunker.
///
/// Windows are measured in `char`s (Unicode scalar values), never bytes, so a
/// chunk boundary can not split a multi-byte code point.
use thiserror::Error;

/// Errors raised by the chunker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunking configuration: {0}")]
    InvalidConfiguration(String),
}

/// A window of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based position of the chunk within its document.
    pub index: usize,
    /// Character offset of the first character of the chunk.
    pub start: usize,
    pub text: String,
}

/// Step between consecutive window starts for the given parameters.
///
/// `overlap` is clamped to `[0, max_chars - 1]`, so the step is always at
/// least 1.
#[must_use]
pub fn window_step(max_chars: usize, overlap: usize) -> usize {
    let overlap = overlap.min(max_chars.saturating_sub(1));
    max_chars.saturating_sub(overlap).max(1)
}

/// Split `text` into overlapping windows of at most `max_chars` characters.
pub fn chunk_windows(
    text: &str,
    max_chars: usize,
    overlap: usize,
) -> Result<Vec<TextChunk>, ChunkError> {
    if max_chars == 0 {
        return Err(ChunkError::InvalidConfiguration(
            "max_chars must be > 0".to_string(),
        ));
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;

    if char_count <= max_chars {
        return Ok(vec![TextChunk {
            index: 0,
            start: 0,
            text: text.to_string(),
        }]);
    }

    let step = window_step(max_chars, overlap);
    let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
    let mut start = 0;

    while start < char_count {
        let end = (start + max_chars).min(char_count);
        if end > start {
            chunks.push(TextChunk {
                index: chunks.len(),
                start,
                text: text[bounds[start]..bounds[end]].to_string(),
            });
        }
        if end >= char_count {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Split `text` into overlapping windows, returning only the chunk strings.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    Ok(chunk_windows(text, max_chars, overlap)?
        .into_iter()
        .map(|c| c.text)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the source text from the windows by dropping each chunk's
    /// overlap with its predecessor.
    fn reassemble(chunks: &[TextChunk]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for c in chunks {
            let skip = covered - c.start;
            out.extend(c.text.chars().skip(skip));
            covered = c.start + c.text.chars().count();
        }
        out
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 1200, 200).unwrap().is_empty());
    }

    #[test]
    fn test_zero_max_chars_is_rejected() {
        let err = chunk_text("abc", 0, 0).unwrap_err();
        assert!(matches!(err, ChunkError::InvalidConfiguration(_)));
        // Rejected even when there is nothing to split.
        assert!(chunk_text("", 0, 0).is_err());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "a".repeat(500);
        let chunks = chunk_text(&text, 1200, 200).unwrap();
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn test_exact_length_single_chunk() {
        let text = "x".repeat(1200);
        assert_eq!(chunk_text(&text, 1200, 200).unwrap().len(), 1);
    }

    #[test]
    fn test_three_thousand_chars() {
        let text: String = (0..3000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_windows(&text, 1200, 200).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[1].start, 1000);
        assert_eq!(chunks[2].start, 2000);
        assert_eq!(chunks[1].text, text[1000..2200]);
        assert_eq!(chunks[2].text, text[2000..]);
        assert!(text.ends_with(&chunks[2].text));
    }

    #[test]
    fn test_final_chunk_not_repeated() {
        // 2200 chars: second window [1000, 2200) reaches the end exactly.
        let text = "b".repeat(2200);
        let chunks = chunk_windows(&text, 1200, 200).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].start + chunks[1].text.len(), 2200);
    }

    #[test]
    fn test_reassembles_source() {
        let text: String = (0..977).map(|i| char::from(b'A' + (i % 23) as u8)).collect();
        for (max_chars, overlap) in [(1, 0), (10, 3), (64, 63), (100, 0), (300, 500)] {
            let chunks = chunk_windows(&text, max_chars, overlap).unwrap();
            assert_eq!(reassemble(&chunks), text, "max={max_chars} overlap={overlap}");
            assert!(chunks.iter().all(|c| !c.text.is_empty()));
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "日本語のテキストを分割します。".repeat(20);
        let chunks = chunk_windows(&text, 50, 10).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 50);
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_termination_bounds() {
        let text = "z".repeat(257);

        let unit = chunk_windows(&text, 1, 0).unwrap();
        assert_eq!(unit.len(), 257);

        // overlap = max_chars - 1 gives step 1
        let dense = chunk_windows(&text, 8, 7).unwrap();
        assert_eq!(dense.len(), 257 - 8 + 1);
        assert!(dense.len() <= text.len().div_ceil(window_step(8, 7)));
    }

    #[test]
    fn test_overlap_clamped() {
        assert_eq!(window_step(10, 0), 10);
        assert_eq!(window_step(10, 9), 1);
        assert_eq!(window_step(10, 50), 1);
        assert_eq!(window_step(1, 0), 1);
    }

    #[test]
    fn test_indices_contiguous() {
        let text = "q".repeat(5000);
        let chunks = chunk_windows(&text, 700, 100).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta. ".repeat(200);
        let a = chunk_text(&text, 333, 44).unwrap();
        let b = chunk_text(&text, 333, 44).unwrap();
        assert_eq!(a, b);
    }
}
