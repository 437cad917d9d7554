//! Property-based tests for persistence operations
//!
//! Tests for:
//! - Chunking: reassembly correctness, count, order independence
//! - Completeness: any removed chunk is reported missing
//! - Fold records: fold count always equals the number of accepted writes

use super::chunks::{reassemble, split_parameters, ParameterManifest};
use super::chunk_storage::StorageError;
use super::fold_records::{Category, FoldRecord, FoldRecordStore};
use super::memory::MemoryStore;
use proptest::prelude::*;

// ============================================================================
// CHUNKING PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: Split then reassemble produces identical data
    #[test]
    fn chunking_reassembly_matches(
        data in prop::collection::vec(any::<u8>(), 1..20_000),
        chunk_size in 1usize..4096,
    ) {
        let chunks = split_parameters(&data, chunk_size);
        let manifest = ParameterManifest::describe("p", &data, chunks.len() as u32);

        let reassembled = reassemble("p", &chunks, Some(&manifest)).unwrap();
        prop_assert_eq!(reassembled, data, "Reassembly must match original exactly");
    }

    /// Property: Chunk count is ceil(len / chunk_size)
    #[test]
    fn chunking_count_correct(
        len in 0usize..50_000,
        chunk_size in 1usize..8192,
    ) {
        let data = vec![42u8; len];
        let chunks = split_parameters(&data, chunk_size);

        prop_assert_eq!(chunks.len(), len.div_ceil(chunk_size));
        prop_assert!(chunks.iter().all(|c| c.bytes.len() <= chunk_size));
    }

    /// Property: Arrival order does not affect reassembly
    #[test]
    fn chunking_order_independent(
        data in prop::collection::vec(any::<u8>(), 1..5_000),
        chunk_size in 1usize..512,
        seed in any::<u64>(),
    ) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut chunks = split_parameters(&data, chunk_size);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        chunks.shuffle(&mut rng);

        prop_assert_eq!(reassemble("p", &chunks, None).unwrap(), data);
    }

    /// Property: Removing any non-final chunk is detected and reported
    #[test]
    fn chunking_gap_detected(
        data in prop::collection::vec(any::<u8>(), 64..5_000),
        chunk_size in 1usize..32,
        remove_seed in any::<usize>(),
    ) {
        let mut chunks = split_parameters(&data, chunk_size);
        prop_assume!(chunks.len() >= 2);

        // Keep the last chunk so the gap is internal
        let removed = remove_seed % (chunks.len() - 1);
        chunks.remove(removed);

        match reassemble("p", &chunks, None) {
            Err(StorageError::IncompleteParameters { missing, .. }) => {
                prop_assert_eq!(missing, vec![removed as u32]);
            }
            other => prop_assert!(false, "expected IncompleteParameters, got {:?}", other),
        }
    }
}

// ============================================================================
// FOLD RECORD PROPERTY TESTS
// ============================================================================

proptest! {
    /// Property: num_folds equals the number of successful writes, and stale
    /// writes never change the stored record
    #[test]
    fn fold_count_matches_accepted_writes(
        ops in prop::collection::vec(any::<bool>(), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = MemoryStore::new();
            let mut accepted = 0u64;

            for (i, use_stale) in ops.iter().enumerate() {
                let current = store.get(Category::Talk).await.unwrap();
                let expected = if *use_stale && current.num_folds > 0 {
                    current.num_folds - 1
                } else {
                    current.num_folds
                };
                let next = current.folded(vec![i as u8]);

                match store.compare_and_set(Category::Talk, expected, next).await {
                    Ok(()) => accepted += 1,
                    Err(StorageError::Conflict { .. }) => {
                        let after = store.get(Category::Talk).await.unwrap();
                        assert_eq!(after, current, "Conflict must leave record unchanged");
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }

            let record = store.get(Category::Talk).await.unwrap();
            assert_eq!(record.num_folds, accepted);
            assert_eq!(record.proof_bytes.is_some(), accepted > 0);
            assert!(record.validate().is_ok());
        });
    }

    /// Property: a finalized record accepts no further writes
    #[test]
    fn finalized_record_is_immutable(
        folds in 1u64..10,
        attempts in prop::collection::vec(any::<u64>(), 1..10),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = MemoryStore::new();
            let mut record = FoldRecord::empty(Category::Attendee);
            for i in 0..folds {
                let next = record.folded(vec![i as u8]);
                store.compare_and_set(Category::Attendee, i, next.clone()).await.unwrap();
                record = next;
            }
            let finalized = record.finalized_with(vec![0xff]);
            store.compare_and_set(Category::Attendee, folds, finalized.clone()).await.unwrap();

            for expected in attempts {
                let result = store
                    .compare_and_set(Category::Attendee, expected % (folds + 1), finalized.folded(vec![1]))
                    .await;
                assert!(result.is_err());
            }
            assert_eq!(store.get(Category::Attendee).await.unwrap(), finalized);
        });
    }
}
