use sha2::{Digest, Sha256};

use crate::models::{Chunk, ChunkingOptions, SourceDocument};

/// Collapses all whitespace runs into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Deterministic chunk identity: a function of the parent document and
/// the chunk's ordinal position only, so re-chunking the same document
/// yields stable ids.
pub fn make_chunk_id(source_id: &str, ordinal: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update((ordinal as u64).to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Splits a document into bounded, overlapping chunks.
///
/// Paragraphs are packed greedily until the next one would exceed
/// `max_tokens`; each subsequent chunk starts with the previous chunk's
/// trailing `overlap_tokens` tokens. A paragraph that cannot fit whole
/// is windowed at token granularity with the same overlap. A document
/// shorter than `min_tokens` becomes exactly one chunk. Identical input
/// always yields identical boundaries and ids.
pub fn chunk_document(document: &SourceDocument, options: &ChunkingOptions) -> Vec<Chunk> {
    let max = options.max_tokens.max(1);
    let overlap = options.overlap_tokens.min(max.saturating_sub(1));

    let units: Vec<Vec<&str>> = document
        .raw_text
        .split("\n\n")
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>())
        .filter(|tokens| !tokens.is_empty())
        .collect();

    let total_tokens: usize = units.iter().map(Vec::len).sum();
    if total_tokens == 0 {
        return Vec::new();
    }

    if total_tokens <= options.min_tokens {
        let text = units
            .iter()
            .flat_map(|unit| unit.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        return vec![build_chunk(document, 0, text)];
    }

    let mut emitted: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut carry_len = 0usize;

    for unit in &units {
        if current.len() + unit.len() > max && current.len() > carry_len {
            carry_and_emit(&mut emitted, &mut current, &mut carry_len, overlap);
        }

        if current.len() + unit.len() <= max {
            current.extend(unit.iter().copied());
            continue;
        }

        // The paragraph exceeds a whole chunk even after the carry, so
        // window it token by token.
        let mut offset = 0;
        while offset < unit.len() {
            let take = (max - current.len()).min(unit.len() - offset);
            current.extend(unit[offset..offset + take].iter().copied());
            offset += take;
            if offset < unit.len() {
                carry_and_emit(&mut emitted, &mut current, &mut carry_len, overlap);
            }
        }
    }

    // A trailing buffer holding only carried overlap would duplicate
    // the previous chunk's tail, so it is not emitted.
    if current.len() > carry_len {
        emitted.push(current);
    }

    emitted
        .into_iter()
        .enumerate()
        .map(|(ordinal, tokens)| build_chunk(document, ordinal, tokens.join(" ")))
        .collect()
}

fn carry_and_emit<'a>(
    emitted: &mut Vec<Vec<&'a str>>,
    current: &mut Vec<&'a str>,
    carry_len: &mut usize,
    overlap: usize,
) {
    let finished = std::mem::take(current);
    let tail_start = finished.len().saturating_sub(overlap);
    *current = finished[tail_start..].to_vec();
    *carry_len = current.len();
    emitted.push(finished);
}

fn build_chunk(document: &SourceDocument, ordinal: usize, text: String) -> Chunk {
    Chunk {
        chunk_id: make_chunk_id(&document.source_id, ordinal),
        text,
        ordinal,
        source_id: document.source_id.clone(),
        category: document.category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, OriginKind};
    use chrono::Utc;

    fn document(raw_text: &str) -> SourceDocument {
        SourceDocument {
            source_id: "doc-1".to_string(),
            origin_kind: OriginKind::StructuredSeed,
            raw_text: raw_text.to_string(),
            fetched_at: Utc::now(),
            category: Category::Wages,
            page_breaks: Vec::new(),
        }
    }

    fn tokens_of(chunk: &Chunk) -> Vec<&str> {
        chunk.text.split_whitespace().collect()
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn nine_hundred_tokens_become_four_overlapping_chunks() {
        let words: Vec<String> = (0..900).map(|index| format!("w{index}")).collect();
        let doc = document(&words.join(" "));
        let options = ChunkingOptions {
            max_tokens: 300,
            overlap_tokens: 50,
            min_tokens: 40,
        };

        let chunks = chunk_document(&doc, &options);
        assert_eq!(chunks.len(), 4);

        for (expected_ordinal, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, expected_ordinal);
        }

        let sizes: Vec<usize> = chunks.iter().map(|chunk| tokens_of(chunk).len()).collect();
        assert_eq!(sizes, vec![300, 300, 300, 150]);

        for window in chunks.windows(2) {
            let previous = tokens_of(&window[0]);
            let next = tokens_of(&window[1]);
            assert_eq!(&previous[previous.len() - 50..], &next[..50]);
        }
    }

    #[test]
    fn rechunking_identical_input_is_idempotent() {
        let doc = document("Paragraph one has some words.\n\nParagraph two has more words.");
        let options = ChunkingOptions::default();

        let first = chunk_document(&doc, &options);
        let second = chunk_document(&doc, &options);

        assert_eq!(first.len(), second.len());
        for (left, right) in first.iter().zip(second.iter()) {
            assert_eq!(left.chunk_id, right.chunk_id);
            assert_eq!(left.text, right.text);
        }
    }

    #[test]
    fn chunk_id_ignores_content_drift_elsewhere() {
        assert_eq!(make_chunk_id("doc-1", 0), make_chunk_id("doc-1", 0));
        assert_ne!(make_chunk_id("doc-1", 0), make_chunk_id("doc-1", 1));
        assert_ne!(make_chunk_id("doc-1", 0), make_chunk_id("doc-2", 0));
    }

    #[test]
    fn short_document_becomes_one_chunk() {
        let doc = document("just a handful of words here");
        let options = ChunkingOptions {
            max_tokens: 300,
            overlap_tokens: 50,
            min_tokens: 40,
        };

        let chunks = chunk_document(&doc, &options);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "just a handful of words here");
    }

    #[test]
    fn paragraphs_pack_greedily_without_splitting_when_they_fit() {
        let paragraph: String = (0..100)
            .map(|index| format!("p{index}"))
            .collect::<Vec<_>>()
            .join(" ");
        let doc = document(&format!("{paragraph}\n\n{paragraph}\n\n{paragraph}"));
        let options = ChunkingOptions {
            max_tokens: 250,
            overlap_tokens: 0,
            min_tokens: 10,
        };

        let chunks = chunk_document(&doc, &options);
        let sizes: Vec<usize> = chunks.iter().map(|chunk| tokens_of(chunk).len()).collect();
        assert_eq!(sizes, vec![200, 100]);
    }

    #[test]
    fn chunks_cover_the_document_without_gaps() {
        let words: Vec<String> = (0..730).map(|index| format!("t{index}")).collect();
        let text = words
            .chunks(90)
            .map(|paragraph| paragraph.join(" "))
            .collect::<Vec<_>>()
            .join("\n\n");
        let doc = document(&text);
        let options = ChunkingOptions {
            max_tokens: 200,
            overlap_tokens: 30,
            min_tokens: 20,
        };

        let chunks = chunk_document(&doc, &options);
        assert!(chunks.len() > 1);

        let mut reconstructed: Vec<String> = Vec::new();
        let mut previous_len = 0usize;
        for chunk in &chunks {
            let tokens = tokens_of(chunk);
            let skip = if reconstructed.is_empty() {
                0
            } else {
                30.min(previous_len)
            };
            reconstructed.extend(tokens[skip..].iter().map(|token| token.to_string()));
            previous_len = tokens.len();
        }

        assert_eq!(reconstructed, words);
    }
}
