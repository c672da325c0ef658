//! Property tests for chunking, retrieval ordering, and index persistence.

use docqa_rag::{
    BoundaryChunker, Chunk, ChunkParams, Chunker, EmbeddingSpace, FileIndexStore,
    FixedSizeChunker, IndexStore, IndexedEntry, VectorIndex, reconstruct,
};
use proptest::prelude::*;

/// Generate a valid `(max_size, overlap)` pair.
fn arb_params() -> impl Strategy<Value = ChunkParams> {
    (2usize..80).prop_flat_map(|max| (Just(max), 1..max)).prop_map(|(max, overlap)| {
        ChunkParams::new(max, overlap).expect("strategy yields valid params")
    })
}

/// Text mixing words, sentence ends, line and paragraph breaks, and multi-byte chars.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => "[a-z]{1,9}",
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => Just("é".to_string()),
            1 => Just("日本".to_string()),
        ],
        0..120,
    )
    .prop_map(|parts| parts.concat())
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn arb_entries(dim: usize) -> impl Strategy<Value = Vec<IndexedEntry>> {
    proptest::collection::vec(("[a-z ]{1,30}", arb_normalized_embedding(dim)), 0..20).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(position, (text, embedding))| IndexedEntry {
                    chunk: Chunk { document_id: "doc".to_string(), position, text },
                    embedding,
                })
                .collect()
        },
    )
}

fn chunkers(params: ChunkParams) -> [Box<dyn Chunker>; 2] {
    [Box::new(FixedSizeChunker::new(params)), Box::new(BoundaryChunker::new(params))]
}

/// *For any* text and valid parameters, every chunk holds at most `max_size`
/// characters, consecutive chunks share exactly `overlap` characters, and
/// removing the overlaps reproduces the source text.
mod prop_chunk_invariants {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_are_bounded_overlapping_and_lossless(text in arb_text(), params in arb_params()) {
            for chunker in chunkers(params) {
                let chunks = chunker.split(&text);

                prop_assert_eq!(chunks.is_empty(), text.is_empty());
                for chunk in &chunks {
                    prop_assert!(chunk.chars().count() <= params.max_size());
                }
                for pair in chunks.windows(2) {
                    let prev: Vec<char> = pair[0].chars().collect();
                    let tail: String = prev[prev.len() - params.overlap()..].iter().collect();
                    prop_assert!(pair[1].starts_with(&tail));
                }
                prop_assert_eq!(reconstruct(&chunks, params.overlap()), text.clone());
            }
        }

        #[test]
        fn chunking_is_deterministic(text in arb_text(), params in arb_params()) {
            for chunker in chunkers(params) {
                prop_assert_eq!(chunker.split(&text), chunker.split(&text));
            }
        }
    }
}

/// *For any* index and query, results are ordered by descending cosine
/// similarity and there are exactly `min(k, len)` of them.
mod prop_query_ordering {
    use super::*;

    const DIM: usize = 12;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_descend_and_are_bounded_by_k(
            entries in arb_entries(DIM),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let count = entries.len();
            let index = VectorIndex::build(EmbeddingSpace::new("test", DIM), entries).unwrap();
            let results = index.query(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(count));
            for pair in results.windows(2) {
                prop_assert!(
                    pair[0].score >= pair[1].score,
                    "scores not descending: {} < {}",
                    pair[0].score,
                    pair[1].score
                );
            }
        }
    }
}

/// *For any* index, loading what was persisted answers every query with the
/// same chunks in the same order.
mod prop_persist_load {
    use super::*;

    const DIM: usize = 6;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn loaded_index_answers_like_the_original(
            entries in arb_entries(DIM),
            query in arb_normalized_embedding(DIM),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let store = FileIndexStore::new(dir.path().join("index.json"));
            let index = VectorIndex::build(EmbeddingSpace::new("test", DIM), entries).unwrap();

            let loaded = rt.block_on(async {
                store.persist(&index).await.unwrap();
                store.load().await.unwrap()
            });

            prop_assert_eq!(loaded.space(), index.space());
            prop_assert_eq!(loaded.entries(), index.entries());

            let k = index.len().max(1);
            let chunks = |index: &VectorIndex| -> Vec<Chunk> {
                index.query(&query, k).unwrap().into_iter().map(|r| r.chunk).collect()
            };
            let (before, after) = (chunks(&index), chunks(&loaded));
            prop_assert_eq!(before, after);
        }
    }
}
