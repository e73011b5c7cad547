use proptest::prelude::*;

use docrag_core::chunker::{chunk_text, compute_char_window, CharWindow};

/// Rebuild the text from chunk spans, taking only the part of each chunk
/// that the previous one did not already cover.
fn stitch(chunks: &[docrag_core::types::Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for c in chunks {
        assert!(c.start_offset <= covered, "gap before chunk {}", c.chunk_index);
        out.extend(c.text.chars().skip(covered - c.start_offset));
        covered = c.end_offset;
    }
    out
}

proptest! {
    #[test]
    fn overlap_is_always_below_max(target in 1usize..5_000, overlap in 0usize..5_000, cpt in 0.01f64..20.0) {
        let w = compute_char_window(target, overlap, cpt);
        prop_assert!(w.max_chars >= 1);
        prop_assert!(w.overlap_chars < w.max_chars);
    }

    #[test]
    fn chunks_cover_the_whole_document(text in "[a-zа-я0-9 .,\n]{1,400}", max in 1usize..60, overlap in 0usize..60) {
        prop_assume!(!text.trim().is_empty());
        let window = CharWindow { max_chars: max, overlap_chars: overlap.min(max - 1) };
        let chunks = chunk_text("p.txt", &text, window);
        let stitched = stitch(&chunks);
        // Only a whitespace tail may be dropped.
        prop_assert!(text.starts_with(&stitched));
        prop_assert!(text[stitched.len()..].trim().is_empty());
        for (i, c) in chunks.iter().enumerate() {
            prop_assert_eq!(c.chunk_index, i);
            prop_assert!(c.char_len() <= max);
        }
    }

    #[test]
    fn short_text_is_a_single_chunk(text in "[a-z]{1,50}") {
        let window = CharWindow { max_chars: 50, overlap_chars: 10 };
        let chunks = chunk_text("s.txt", &text, window);
        prop_assert_eq!(chunks.len(), 1);
        prop_assert_eq!(&chunks[0].text, &text);
    }
}
