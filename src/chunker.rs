//! Content-aware text chunker.
//!
//! Splits a document into overlapping chunks sized for embedding. Each
//! content kind carries an ordered hierarchy of split points; the splitter
//! walks the hierarchy recursively, so a markdown file breaks on headings
//! before it ever breaks mid-sentence, and a CSV breaks on rows before
//! cells. Output is deterministic for a given input and parameters.

/// Broad shape of a document's content, chosen from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Markdown,
    /// JSON / XML / HTML.
    Structured,
    /// CSV and friends.
    Tabular,
    /// PDF / DOCX extractions: long runs of prose with page artifacts.
    LongDocument,
    Prose,
}

impl ContentKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "md" => ContentKind::Markdown,
            "json" | "xml" | "html" => ContentKind::Structured,
            "csv" => ContentKind::Tabular,
            "pdf" | "doc" | "docx" => ContentKind::LongDocument,
            _ => ContentKind::Prose,
        }
    }

    /// Split points in priority order. The first separator that yields at
    /// least one piece within the size budget wins at each level.
    fn separators(&self) -> &'static [&'static str] {
        match self {
            ContentKind::Markdown => &[
                "\n# ", "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "\n---", "\n```",
                "\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ",
            ],
            ContentKind::Structured => &["\n\n", "\n", "; ", ", ", " "],
            ContentKind::Tabular => &["\r\n", "\n", ",", " "],
            ContentKind::LongDocument => {
                &["\n\n\n", "\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " "]
            }
            ContentKind::Prose => &["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " "],
        }
    }
}

/// Chunker parameters, all measured in characters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub target_size: usize,
    pub overlap: usize,
    pub min_size: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 100,
            min_size: 100,
        }
    }
}

/// Split `text` into ordered chunk texts.
///
/// Every chunk except possibly the last holds between `min_size` and
/// `target_size + overlap` characters; adjacent chunks share an overlap
/// tail. Whitespace-only input produces no chunks.
pub fn chunk_text(text: &str, kind: ContentKind, params: &ChunkParams) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if char_len(trimmed) <= params.target_size {
        return vec![trimmed.to_string()];
    }

    let pieces = split_recursive(trimmed, kind.separators(), params.target_size);
    merge_pieces(&pieces, params)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursively split `text` until every piece fits the budget.
fn split_recursive<'a>(text: &'a str, separators: &[&str], target: usize) -> Vec<&'a str> {
    if char_len(text) <= target {
        return vec![text];
    }

    for (level, sep) in separators.iter().enumerate() {
        if !text.contains(sep) {
            continue;
        }
        let parts: Vec<&str> = text.split_inclusive(sep).collect();
        if parts.len() < 2 {
            continue;
        }
        let mut out = Vec::new();
        for part in parts {
            if char_len(part) > target {
                out.extend(split_recursive(part, &separators[level + 1..], target));
            } else {
                out.push(part);
            }
        }
        return out;
    }

    // No separator applies: hard split at character boundaries.
    hard_split(text, target)
}

fn hard_split(text: &str, target: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    for (idx, _) in text.char_indices() {
        if count == target {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Greedily pack pieces into chunks up to the target size, carrying an
/// overlap tail from each emitted chunk into the next. The carried tail
/// alone never becomes a chunk of its own.
fn merge_pieces(pieces: &[&str], params: &ChunkParams) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    // Chars at the start of `current` that are carried overlap, not new content.
    let mut carried = 0usize;

    for piece in pieces {
        if piece.trim().is_empty() {
            continue;
        }
        let piece_len = char_len(piece);
        let has_new_content = current_len > carried;
        if has_new_content && current_len + piece_len > params.target_size {
            let emitted = current.trim().to_string();
            let tail = overlap_tail(&current, params.overlap);
            if !emitted.is_empty() {
                chunks.push(emitted);
            }
            carried = char_len(&tail);
            current_len = carried;
            current = tail;
        }
        current.push_str(piece);
        current_len += piece_len;
    }

    // Only the content beyond the carried overlap is genuinely unemitted.
    let fragment: String = current.chars().skip(carried).collect();
    let fragment = fragment.trim();
    if !fragment.is_empty() {
        if char_len(fragment) < params.min_size && !chunks.is_empty() {
            // A trailing scrap folds into the previous chunk.
            if let Some(last) = chunks.last_mut() {
                last.push_str(current[find_char_offset(&current, carried)..].trim_end());
            }
        } else {
            chunks.push(current.trim().to_string());
        }
    }

    chunks
}

/// Byte offset of the `n`-th character.
fn find_char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

fn overlap_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(overlap);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(target: usize, overlap: usize, min: usize) -> ChunkParams {
        ChunkParams {
            target_size: target,
            overlap,
            min_size: min,
        }
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", ContentKind::Prose, &ChunkParams::default());
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(chunk_text("   \n\n ", ContentKind::Prose, &ChunkParams::default()).is_empty());
    }

    #[test]
    fn paragraphs_split_before_sentences() {
        let text = "First paragraph here, long enough to matter.\n\nSecond paragraph follows with more words.\n\nThird paragraph closes the document nicely.";
        let chunks = chunk_text(text, ContentKind::Prose, &params(60, 10, 5));
        assert!(chunks.len() > 1);
        assert!(chunks[0].starts_with("First paragraph"));
    }

    #[test]
    fn markdown_prefers_heading_boundaries() {
        let text = "# Intro\nSome intro prose that runs on a little.\n# Details\nDetail prose that also runs on for a while here.";
        let chunks = chunk_text(text, ContentKind::Markdown, &params(60, 0, 5));
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().any(|c| c.contains("Intro")));
        assert!(chunks.iter().any(|c| c.contains("Details")));
    }

    #[test]
    fn tabular_splits_on_rows() {
        let rows: Vec<String> = (0..30).map(|i| format!("row{i},alpha,beta,gamma")).collect();
        let text = rows.join("\n");
        let chunks = chunk_text(&text, ContentKind::Tabular, &params(80, 0, 5));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.contains("row"));
        }
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let text = (0..40)
            .map(|i| format!("Sentence number {i} goes here."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, ContentKind::Prose, &params(120, 30, 10));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<String>();
            let tail: String = tail.chars().rev().collect();
            assert!(
                pair[1].contains(tail.trim()),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn unbroken_text_hard_splits() {
        let text = "x".repeat(500);
        let chunks = chunk_text(&text, ContentKind::Prose, &params(100, 0, 10));
        assert!(chunks.len() >= 5);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn deterministic() {
        let text = (0..25)
            .map(|i| format!("Paragraph number {i}.\n"))
            .collect::<Vec<_>>()
            .join("\n");
        let a = chunk_text(&text, ContentKind::Prose, &params(80, 20, 10));
        let b = chunk_text(&text, ContentKind::Prose, &params(80, 20, 10));
        assert_eq!(a, b);
    }

    #[test]
    fn trailing_fragment_folds_into_previous() {
        let text = format!("{}\n\nok", "Long opening paragraph with plenty of content to fill the first chunk completely, running on and on.");
        let chunks = chunk_text(&text, ContentKind::Prose, &params(90, 0, 20));
        assert!(chunks.last().unwrap().contains("ok"));
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(ContentKind::from_extension("MD"), ContentKind::Markdown);
        assert_eq!(ContentKind::from_extension("json"), ContentKind::Structured);
        assert_eq!(ContentKind::from_extension("csv"), ContentKind::Tabular);
        assert_eq!(ContentKind::from_extension("pdf"), ContentKind::LongDocument);
        assert_eq!(ContentKind::from_extension("txt"), ContentKind::Prose);
    }

    #[test]
    fn korean_text_splits_on_char_boundaries() {
        let text = "데이터베이스 시스템은 정보를 저장합니다. ".repeat(30);
        let chunks = chunk_text(&text, ContentKind::Prose, &params(100, 10, 10));
        assert!(chunks.len() > 1);
        // Reaching here without a panic means no split landed mid-codepoint.
        for chunk in &chunks {
            assert!(!chunk.is_empty());
        }
    }
}
