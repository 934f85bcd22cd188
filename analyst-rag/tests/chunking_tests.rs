//! Paragraph splitting, fragment filtering and length capping.

use analyst_rag::chunking::{Chunker, ParagraphChunker, Paragraphs, chunk};
use proptest::prelude::*;

#[test]
fn drops_headers_and_keeps_paragraphs() {
    let text = "# 2024 Outlook\n\n\
                Global shipments of service robots rose sharply last year.\n\n\
                ok\n\n\
                Component costs continued to fall across the supply chain.";

    let chunks: Vec<&str> = chunk(text, 20).collect();
    assert_eq!(
        chunks,
        [
            "Global shipments of service robots rose sharply last year.",
            "Component costs continued to fall across the supply chain.",
        ]
    );
}

#[test]
fn whitespace_only_lines_separate_paragraphs() {
    let text = "  first paragraph line one\nline two  \n \t \nsecond paragraph\n";
    let paragraphs: Vec<&str> = Paragraphs::new(text).collect();
    assert_eq!(paragraphs, ["first paragraph line one\nline two", "second paragraph"]);
}

#[test]
fn empty_and_blank_input_yield_nothing() {
    assert_eq!(chunk("", 0).count(), 0);
    assert_eq!(chunk("\n\n  \n\t\n", 0).count(), 0);
    assert!(ParagraphChunker::default().chunk("   ").is_empty());
}

#[test]
fn iterator_can_be_restarted() {
    let text = "alpha paragraph text here\n\nbeta paragraph text here";
    let chunks = chunk(text, 5);
    let first: Vec<&str> = chunks.clone().collect();
    let second: Vec<&str> = chunks.collect();
    assert_eq!(first, second);
}

#[test]
fn length_is_counted_in_characters() {
    // Eleven characters, thirty-three bytes.
    let text = "人形机器人市场规模扩大";
    assert_eq!(chunk(text, 11).count(), 1);
    assert_eq!(chunk(text, 12).count(), 0);
}

#[test]
fn long_paragraph_splits_at_sentences() {
    let chunker = ParagraphChunker::new(5).with_max_length(50);
    let text = "Demand grew strongly in the first half. Prices held steady. \
                Margins improved as volumes scaled. Exports doubled.";

    let chunks = chunker.chunk(text);

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.chars().count() <= 50), "{chunks:?}");
    assert!(chunks[0].starts_with("Demand grew strongly"));
    assert_eq!(chunks.join(" "), text);
}

#[test]
fn oversized_word_is_kept_whole() {
    let chunker = ParagraphChunker::new(1).with_max_length(10);
    let chunks = chunker.chunk("supercalifragilistic short");
    assert_eq!(chunks, ["supercalifragilistic", "short"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every chunk is trimmed, non-empty and at least `min_length` characters.
    #[test]
    fn chunks_respect_minimum_length(
        paragraphs in proptest::collection::vec("[a-z ]{0,40}", 0..12),
        min_length in 0usize..30,
    ) {
        let text = paragraphs.join("\n\n");
        for piece in chunk(&text, min_length) {
            prop_assert!(!piece.is_empty());
            prop_assert_eq!(piece, piece.trim());
            prop_assert!(piece.chars().count() >= min_length);
        }
    }

    /// With a cap, no chunk made of short words exceeds it.
    #[test]
    fn capped_chunks_fit(
        words in proptest::collection::vec("[a-z]{1,8}", 1..60),
        max_length in 10usize..80,
    ) {
        let text = words.join(" ");
        let chunker = ParagraphChunker::new(1).with_max_length(max_length);
        for piece in chunker.chunk(&text) {
            prop_assert!(piece.chars().count() <= max_length, "{piece:?} > {max_length}");
        }
    }
}
