//! Boundary-aware text chunker.
//!
//! Splits page text into [`Chunk`]s that respect a configurable
//! `target_chars` limit. Splitting prefers paragraph boundaries
//! (`\n\n`), falls back to sentence boundaries, and hard-splits at the
//! nearest space only when a single sentence exceeds the target.
//!
//! Overlap is expressed as a fraction of `target_chars`; each chunk
//! after the first within a text unit is prefixed with the word-aligned
//! tail of its predecessor so context survives the cut.
//!
//! Image units are never merged or split: each maps to exactly one
//! image chunk carrying the raw bytes and caption.
//!
//! Chunking is deterministic given fixed parameters: same input, same
//! chunk texts, positions, and hashes.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, ContentUnit, Document, Modality, UnitKind};

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkParams {
    /// Target chunk size in characters.
    pub target_chars: usize,
    /// Overlap between adjacent text chunks, as a fraction of
    /// `target_chars`. Clamped to `[0.0, 0.5]`.
    pub overlap: f64,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            target_chars: 1000,
            overlap: 0.2,
        }
    }
}

/// Split a document's content units into retrieval-sized chunks.
///
/// Position indices are contiguous from 0 across all units, in unit
/// order, so `(document_id, page, position)` is a stable ordering key.
/// No chunk ever spans two units, so none crosses a page or document
/// boundary.
pub fn chunk_units(doc: &Document, units: &[ContentUnit], params: &ChunkParams) -> Vec<Chunk> {
    let overlap = params.overlap.clamp(0.0, 0.5);
    let overlap_chars = (params.target_chars as f64 * overlap) as usize;

    let mut chunks = Vec::new();
    let mut position: i64 = 0;

    for unit in units {
        match &unit.kind {
            UnitKind::Text(text) => {
                let segments = split_text(text, params.target_chars);
                for text in apply_overlap(&segments, overlap_chars) {
                    chunks.push(make_text_chunk(doc, unit.page, position, &text));
                    position += 1;
                }
            }
            UnitKind::Image { bytes, caption } => {
                chunks.push(make_image_chunk(doc, unit.page, position, bytes, caption));
                position += 1;
            }
        }
    }

    chunks
}

/// Split text into segments of at most `target_chars`, without overlap.
///
/// Paragraphs are accumulated greedily; an oversized paragraph falls
/// back to sentence accumulation; an oversized sentence is hard-split
/// at the nearest space or newline before the limit.
pub fn split_text(text: &str, target_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > target_chars && !buf.is_empty() {
            segments.push(std::mem::take(&mut buf));
        }

        if trimmed.len() > target_chars {
            if !buf.is_empty() {
                segments.push(std::mem::take(&mut buf));
            }
            split_long_paragraph(trimmed, target_chars, &mut segments, &mut buf);
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() {
        segments.push(buf);
    }

    segments
}

/// Accumulate an oversized paragraph sentence by sentence into `buf`,
/// flushing into `segments` whenever the target would be exceeded.
fn split_long_paragraph(para: &str, target_chars: usize, segments: &mut Vec<String>, buf: &mut String) {
    for sentence in split_sentences(para) {
        if sentence.len() > target_chars {
            if !buf.is_empty() {
                segments.push(std::mem::take(buf));
            }
            hard_split(sentence, target_chars, segments);
            continue;
        }

        let would_be = if buf.is_empty() {
            sentence.len()
        } else {
            buf.len() + 1 + sentence.len()
        };
        if would_be > target_chars && !buf.is_empty() {
            segments.push(std::mem::take(buf));
        }
        if !buf.is_empty() {
            buf.push(' ');
        }
        buf.push_str(sentence);
    }
    if !buf.is_empty() {
        segments.push(std::mem::take(buf));
    }
}

/// Split on sentence-ending punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?')
            && bytes
                .get(i + 1)
                .map(|b| b.is_ascii_whitespace())
                .unwrap_or(true)
        {
            let piece = text[start..=i].trim();
            if !piece.is_empty() {
                out.push(piece);
            }
            start = i + 1;
        }
        i += 1;
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Fixed-width split at the nearest space or newline, snapping back to
/// a valid UTF-8 char boundary.
fn hard_split(text: &str, target_chars: usize, segments: &mut Vec<String>) {
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = snap_to_char_boundary(remaining, remaining.len().min(target_chars));
        let split_at = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let split_at = snap_to_char_boundary(remaining, split_at);
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            segments.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Prefix each segment after the first with the word-aligned tail of
/// its predecessor. With `overlap_chars == 0` this is the identity.
fn apply_overlap(segments: &[String], overlap_chars: usize) -> Vec<String> {
    if overlap_chars == 0 || segments.len() < 2 {
        return segments.to_vec();
    }

    let mut out = Vec::with_capacity(segments.len());
    out.push(segments[0].clone());
    for pair in segments.windows(2) {
        let tail = word_aligned_tail(&pair[0], overlap_chars);
        if tail.is_empty() {
            out.push(pair[1].clone());
        } else {
            out.push(format!("{} {}", tail, pair[1]));
        }
    }
    out
}

/// The last `max_chars` characters of `text`, moved forward to the
/// start of the next word so the overlap never begins mid-word.
fn word_aligned_tail(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let start = snap_to_char_boundary(text, text.len() - max_chars);
    match text[start..].find(char::is_whitespace) {
        Some(ws) => text[start + ws..].trim_start(),
        None => text[start..].trim_start(),
    }
}

fn make_text_chunk(doc: &Document, page: u32, position: i64, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: doc.id.clone(),
        filename: doc.filename.clone(),
        page,
        position,
        modality: Modality::Text,
        text: text.to_string(),
        image: None,
        hash: sha256_hex(text.as_bytes()),
    }
}

fn make_image_chunk(
    doc: &Document,
    page: u32,
    position: i64,
    bytes: &[u8],
    caption: &Option<String>,
) -> Chunk {
    let caption = caption
        .clone()
        .unwrap_or_else(|| format!("Image on page {} of {}", page, doc.filename));
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: doc.id.clone(),
        filename: doc.filename.clone(),
        page,
        position,
        modality: Modality::Image,
        text: caption,
        image: Some(bytes.to_vec()),
        hash: sha256_hex(bytes),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc() -> Document {
        Document {
            id: "doc1".to_string(),
            filename: "paper.pdf".to_string(),
            page_count: 3,
            ingested_at: Utc::now(),
        }
    }

    fn text_unit(page: u32, text: &str) -> ContentUnit {
        ContentUnit {
            document_id: "doc1".to_string(),
            page,
            kind: UnitKind::Text(text.to_string()),
        }
    }

    fn image_unit(page: u32, bytes: &[u8]) -> ContentUnit {
        ContentUnit {
            document_id: "doc1".to_string(),
            page,
            kind: UnitKind::Image {
                bytes: bytes.to_vec(),
                caption: Some("a diagram".to_string()),
            },
        }
    }

    #[test]
    fn small_text_single_chunk() {
        let params = ChunkParams::default();
        let chunks = chunk_units(&doc(), &[text_unit(1, "Hello, world.")], &params);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world.");
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].modality, Modality::Text);
    }

    #[test]
    fn positions_contiguous_across_units() {
        let params = ChunkParams {
            target_chars: 30,
            overlap: 0.0,
        };
        let units = vec![
            text_unit(1, "First page sentence one. First page sentence two."),
            image_unit(2, b"img"),
            text_unit(3, "Third page text."),
        ];
        let chunks = chunk_units(&doc(), &units, &params);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i as i64, "position gap at {}", i);
        }
    }

    #[test]
    fn image_units_map_one_to_one() {
        let params = ChunkParams {
            target_chars: 5,
            overlap: 0.2,
        };
        let chunks = chunk_units(&doc(), &[image_unit(2, b"pixels")], &params);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].modality, Modality::Image);
        assert_eq!(chunks[0].text, "a diagram");
        assert_eq!(chunks[0].image.as_deref(), Some(b"pixels".as_ref()));
    }

    #[test]
    fn image_without_caption_gets_fallback() {
        let unit = ContentUnit {
            document_id: "doc1".to_string(),
            page: 4,
            kind: UnitKind::Image {
                bytes: vec![1, 2, 3],
                caption: None,
            },
        };
        let chunks = chunk_units(&doc(), &[unit], &ChunkParams::default());
        assert_eq!(chunks[0].text, "Image on page 4 of paper.pdf");
    }

    #[test]
    fn roundtrip_without_overlap() {
        let text = "Alpha paragraph here.\n\nBeta paragraph follows it.\n\nGamma closes.";
        let segments = split_text(text, 30);
        assert!(segments.len() > 1);
        let rebuilt = segments.join("\n\n");
        let normalized = text.split("\n\n").collect::<Vec<_>>().join("\n\n");
        // Every paragraph survives in order; only separators may differ.
        for para in normalized.split("\n\n") {
            assert!(rebuilt.contains(para.trim()), "lost paragraph: {}", para);
        }
    }

    #[test]
    fn overlap_prefix_comes_from_previous_chunk() {
        let text = "One two three four five. Six seven eight nine ten. \
                    Eleven twelve thirteen fourteen fifteen.";
        let params = ChunkParams {
            target_chars: 40,
            overlap: 0.25,
        };
        let chunks = chunk_units(&doc(), &[text_unit(1, text)], &params);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prefix = pair[1].text.split(' ').next().unwrap();
            assert!(
                pair[0].text.contains(prefix),
                "overlap prefix {:?} not found in previous chunk {:?}",
                prefix,
                pair[0].text
            );
        }
    }

    #[test]
    fn sentence_boundaries_preferred_over_hard_split() {
        let text = "Short one. Another short sentence. A third short sentence here.";
        let segments = split_text(text, 30);
        for seg in &segments {
            assert!(
                seg.ends_with('.'),
                "segment should end on a sentence boundary: {:?}",
                seg
            );
        }
    }

    #[test]
    fn oversized_sentence_hard_splits_within_target() {
        let text = "word ".repeat(100);
        let segments = split_text(&text, 40);
        assert!(segments.len() > 1);
        for seg in &segments {
            assert!(seg.len() <= 40, "segment too long: {}", seg.len());
        }
    }

    #[test]
    fn multibyte_utf8_does_not_panic() {
        let text = "┌──────────────────┐ naïve café über séance ─────";
        let segments = split_text(text, 10);
        assert!(!segments.is_empty());
    }

    #[test]
    fn deterministic_given_same_input() {
        let text = "Alpha one two.\n\nBeta three four.\n\nGamma five six.";
        let params = ChunkParams {
            target_chars: 20,
            overlap: 0.2,
        };
        let a = chunk_units(&doc(), &[text_unit(1, text)], &params);
        let b = chunk_units(&doc(), &[text_unit(1, text)], &params);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_eq!(x.position, y.position);
        }
    }

    #[test]
    fn whitespace_only_text_yields_no_chunks() {
        let chunks = chunk_units(&doc(), &[text_unit(1, "   \n\n  ")], &ChunkParams::default());
        assert!(chunks.is_empty());
    }
}
