//! Paragraph chunking.
//!
//! Raw document text is split on blank lines; each paragraph is trimmed and
//! fragments shorter than a minimum length (headers, stray whitespace) are
//! dropped. [`ParagraphChunker`] can additionally cap chunk length by
//! splitting oversized paragraphs at sentence, then word, boundaries.
//!
//! All lengths are counted in characters, not bytes.

/// A strategy for splitting raw text into passages.
///
/// Implementations are pure: the same input always yields the same chunks.
pub trait Chunker: Send + Sync {
    /// Split `text` into passages ready for embedding.
    ///
    /// Returns an empty `Vec` for empty or whitespace-only input.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Split `text` into trimmed paragraphs of at least `min_length` characters.
///
/// The returned iterator borrows from `text` and is cheap to clone, so the
/// sequence can be restarted at will.
///
/// # Example
///
/// ```rust
/// use analyst_rag::chunking::chunk;
///
/// let text = "# Intro\n\nHumanoid robots entered pilot production in 2024.\n\n";
/// let chunks: Vec<&str> = chunk(text, 20).collect();
/// assert_eq!(chunks, vec!["Humanoid robots entered pilot production in 2024."]);
/// ```
pub fn chunk(text: &str, min_length: usize) -> impl Iterator<Item = &str> + Clone {
    Paragraphs::new(text).filter(move |p| char_len(p) >= min_length)
}

/// Iterator over the blank-line-delimited paragraphs of a text.
///
/// A line containing only whitespace counts as blank. Yielded paragraphs are
/// trimmed and never empty.
#[derive(Debug, Clone)]
pub struct Paragraphs<'a> {
    rest: &'a str,
}

impl<'a> Paragraphs<'a> {
    /// Iterate over the paragraphs of `text`.
    pub fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl<'a> Iterator for Paragraphs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while !self.rest.is_empty() {
            let mut end = 0;
            let mut next_start = self.rest.len();
            for line in self.rest.split_inclusive('\n') {
                if line.trim().is_empty() {
                    next_start = end + line.len();
                    break;
                }
                end += line.len();
            }

            let paragraph = self.rest[..end].trim();
            self.rest = &self.rest[next_start..];
            if !paragraph.is_empty() {
                return Some(paragraph);
            }
        }
        None
    }
}

/// Splits text on blank lines and drops short fragments.
///
/// With [`with_max_length`](ParagraphChunker::with_max_length) set, a
/// paragraph longer than the cap is split at sentence boundaries (`. `,
/// `! `, `? `), then line breaks, then words, and the pieces are greedily
/// re-merged up to the cap. A single word longer than the cap is kept whole.
///
/// # Example
///
/// ```rust
/// use analyst_rag::chunking::{Chunker, ParagraphChunker};
///
/// let chunker = ParagraphChunker::new(10).with_max_length(40);
/// let chunks = chunker.chunk("First sentence here. Second sentence here. Third one too.");
/// assert!(chunks.iter().all(|c| c.chars().count() <= 40));
/// ```
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    min_length: usize,
    max_length: Option<usize>,
}

impl ParagraphChunker {
    /// Create a chunker that drops paragraphs shorter than `min_length` characters.
    pub fn new(min_length: usize) -> Self {
        Self { min_length, max_length: None }
    }

    /// Cap chunk length at `max_length` characters.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// The configured minimum chunk length.
    pub fn min_length(&self) -> usize {
        self.min_length
    }
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let separators = [". ", "! ", "? ", "\n", " "];
        Paragraphs::new(text)
            .flat_map(|paragraph| match self.max_length {
                Some(max) if char_len(paragraph) > max => {
                    split_and_merge(paragraph, max, &separators)
                }
                _ => vec![paragraph.to_string()],
            })
            .filter(|piece| char_len(piece) >= self.min_length)
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split text by the first separator, then merge segments into pieces that
/// respect `max`. A piece still over `max` is split with the next separator.
fn split_and_merge(text: &str, max: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= max {
        return vec![text.to_string()];
    }
    let Some((separator, remaining)) = separators.split_first() else {
        return vec![text.to_string()];
    };

    let mut pieces = Vec::new();
    let mut current = String::new();
    for segment in split_keeping_separator(text, separator) {
        if !current.is_empty() && char_len(&current) + char_len(segment) > max {
            push_piece(&mut pieces, &current, max, remaining);
            current.clear();
        }
        current.push_str(segment);
    }
    push_piece(&mut pieces, &current, max, remaining);

    pieces
}

fn push_piece(pieces: &mut Vec<String>, piece: &str, max: usize, separators: &[&str]) {
    let piece = piece.trim();
    if piece.is_empty() {
        return;
    }
    if char_len(piece) > max {
        pieces.extend(split_and_merge(piece, max, separators));
    } else {
        pieces.push(piece.to_string());
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}
