//! Property tests for sentence-window chunking.

use passage_rag::{Chunker, SentenceWindowChunker, normalize_whitespace};
use proptest::prelude::*;

/// Mixed Latin/Cyrillic prose with sentence terminators and irregular whitespace.
fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Zа-яё .!?\n\t]{0,400}"
}

/// A chunk size with a valid overlap.
fn arb_window() -> impl Strategy<Value = (usize, usize)> {
    (8usize..120).prop_flat_map(|size| (Just(size), 1..size))
}

/// *For any* text and valid window, every span SHALL be non-empty, trimmed,
/// at most `chunk_size` characters, and equal to the normalised text at its
/// recorded char offsets.
mod prop_spans_locate_text {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn spans_are_exact_and_bounded(text in arb_text(), (size, overlap) in arb_window()) {
            let chunker = SentenceWindowChunker::new(size, overlap).unwrap();
            let normalized: Vec<char> = normalize_whitespace(&text).chars().collect();

            for span in chunker.chunk(&text) {
                prop_assert!(!span.text.is_empty());
                prop_assert_eq!(span.text.trim(), span.text.as_str());
                prop_assert!(span.text.chars().count() <= size);
                prop_assert!(span.char_start < span.char_end);
                prop_assert!(span.char_end <= normalized.len());
                let located: String = normalized[span.char_start..span.char_end].iter().collect();
                prop_assert_eq!(&located, &span.text);
            }
        }
    }
}

/// *For any* text and valid window, span starts SHALL strictly advance and spans
/// SHALL together cover every non-whitespace character of the normalised text.
mod prop_spans_cover_text {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn spans_are_ordered_and_cover_all_content(
            text in arb_text(),
            (size, overlap) in arb_window(),
        ) {
            let chunker = SentenceWindowChunker::new(size, overlap).unwrap();
            let normalized: Vec<char> = normalize_whitespace(&text).chars().collect();
            let spans = chunker.chunk(&text);

            for pair in spans.windows(2) {
                prop_assert!(pair[0].char_start < pair[1].char_start);
                prop_assert!(pair[0].char_end <= pair[1].char_end);
            }

            let mut covered = vec![false; normalized.len()];
            for span in &spans {
                covered[span.char_start..span.char_end].iter_mut().for_each(|c| *c = true);
            }
            for (i, c) in normalized.iter().enumerate() {
                prop_assert!(c.is_whitespace() || covered[i], "char {} not covered", i);
            }
        }
    }
}

/// *For any* text no longer than the window, chunking SHALL yield exactly one
/// span holding the whole normalised text, or none if it is blank.
mod prop_short_text_single_span {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn short_text_is_one_span(text in "[a-z .!?\n]{0,60}") {
            let chunker = SentenceWindowChunker::new(64, 8).unwrap();
            let normalized = normalize_whitespace(&text);
            let spans = chunker.chunk(&text);

            if normalized.is_empty() {
                prop_assert!(spans.is_empty());
            } else {
                prop_assert_eq!(spans.len(), 1);
                prop_assert_eq!(&spans[0].text, &normalized);
                prop_assert_eq!(spans[0].char_start, 0);
            }
        }
    }
}
