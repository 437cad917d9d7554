//! Integration tests for the fold lifecycle through the public API.
//!
//! These tests drive the full pipeline:
//! - Parameters imported as chunks → reconstructed → loaded once
//! - Attestations folded in acceptance order → finalized → verified
//! - Two controllers sharing one store (two processes on one database)
//!
//! ## Test Strategy
//!
//! Uses the in-memory store and the reference hash-chain engine.

use foldvault::controller::{ControllerConfig, FoldController, FoldError, FoldState};
use foldvault::engine::{Attestation, HashChainEngine};
use foldvault::persistence::{import_parameters, Category, FoldRecordStore, MemoryStore};
use foldvault::worker::{WorkerBridge, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;

// === Test Fixtures ===

const PURPOSE: &str = "membership";

fn test_params() -> Vec<u8> {
    HashChainEngine::parameters_from_seed(&[3u8; 32], 2048)
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    import_parameters(&store, PURPOSE, &test_params(), 500)
        .await
        .unwrap();
    store
}

fn controller_over(store: &MemoryStore, config: ControllerConfig) -> FoldController {
    let worker = WorkerBridge::new(Arc::new(HashChainEngine::new()), WorkerConfig::default());
    FoldController::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        worker,
        config,
    )
}

async fn attestation(controller: &FoldController, category: Category, message: &str) -> Attestation {
    let handle = controller.engine_handle().await.unwrap();
    HashChainEngine::new()
        .issue_attestation(&handle, category, message.as_bytes())
        .unwrap()
}

// === Lifecycle ===

#[tokio::test]
async fn test_attendee_scenario() {
    let store = seeded_store().await;
    let controller = controller_over(&store, ControllerConfig::default());

    assert_eq!(
        controller.finalize(Category::Attendee).await,
        Err(FoldError::NothingToFinalize(Category::Attendee))
    );
    assert_eq!(controller.state(Category::Attendee).await.unwrap(), FoldState::Empty);

    let tap = attestation(&controller, Category::Attendee, "checkpoint-a").await;
    let summary = controller.fold(Category::Attendee, tap).await.unwrap();
    assert_eq!(summary.num_folds, 1);
    assert!(!summary.finalized);

    let summary = controller.finalize(Category::Attendee).await.unwrap();
    assert!(summary.finalized);
    assert_eq!(summary.num_folds, 1);

    let before = store.get(Category::Attendee).await.unwrap();
    let late = attestation(&controller, Category::Attendee, "checkpoint-b").await;
    assert_eq!(
        controller.fold(Category::Attendee, late).await,
        Err(FoldError::AlreadyFinalized(Category::Attendee))
    );
    assert_eq!(store.get(Category::Attendee).await.unwrap(), before);

    assert!(controller.verify(Category::Attendee).await.unwrap());
}

#[tokio::test]
async fn test_categories_are_independent() {
    let store = seeded_store().await;
    let controller = controller_over(&store, ControllerConfig::default());

    for message in ["opening", "closing"] {
        let talk = attestation(&controller, Category::Talk, message).await;
        controller.fold(Category::Talk, talk).await.unwrap();
    }
    let speaker = attestation(&controller, Category::Speaker, "panel").await;
    controller.fold(Category::Speaker, speaker).await.unwrap();
    controller.finalize(Category::Speaker).await.unwrap();

    assert_eq!(controller.status(Category::Talk).await.num_folds, 2);
    assert!(!controller.status(Category::Talk).await.finalized);
    assert!(controller.status(Category::Speaker).await.finalized);
    assert_eq!(controller.status(Category::Attendee).await.num_folds, 0);

    let reports = controller.verify_all().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|(_, result)| result.as_ref().is_ok_and(|r| r.valid)));
}

#[tokio::test]
async fn test_many_concurrent_folds_are_all_applied() {
    let store = seeded_store().await;
    let controller = controller_over(&store, ControllerConfig::default());

    let mut attestations = Vec::new();
    for i in 0..8 {
        attestations.push(attestation(&controller, Category::Talk, &format!("tap-{}", i)).await);
    }

    let folds = attestations
        .into_iter()
        .map(|a| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.fold(Category::Talk, a).await })
        })
        .collect::<Vec<_>>();
    for fold in folds {
        assert!(fold.await.unwrap().is_ok());
    }

    assert_eq!(store.get(Category::Talk).await.unwrap().num_folds, 8);
    assert!(controller.verify(Category::Talk).await.unwrap());
}

#[tokio::test]
async fn test_two_controllers_share_one_store() {
    let store = seeded_store().await;
    let config = ControllerConfig {
        max_fold_attempts: 20,
        retry_backoff: Duration::from_millis(1),
        max_retry_backoff: Duration::from_millis(5),
        ..ControllerConfig::default()
    };
    let first = controller_over(&store, config.clone());
    let second = controller_over(&store, config);

    let mut left = Vec::new();
    let mut right = Vec::new();
    for i in 0..5 {
        left.push(attestation(&first, Category::Speaker, &format!("left-{}", i)).await);
        right.push(attestation(&second, Category::Speaker, &format!("right-{}", i)).await);
    }

    let (a, b) = tokio::join!(
        first.fold_all(Category::Speaker, left),
        second.fold_all(Category::Speaker, right)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.is_complete(), "first batch stopped: {:?}", a.error);
    assert!(b.is_complete(), "second batch stopped: {:?}", b.error);

    assert_eq!(store.get(Category::Speaker).await.unwrap().num_folds, 10);
    assert!(first.verify(Category::Speaker).await.unwrap());
}

#[tokio::test]
async fn test_finalized_by_other_controller_is_already_finalized() {
    let store = seeded_store().await;
    let first = controller_over(&store, ControllerConfig::default());
    let second = controller_over(&store, ControllerConfig::default());

    let tap = attestation(&first, Category::Talk, "only").await;
    first.fold(Category::Talk, tap).await.unwrap();
    first.finalize(Category::Talk).await.unwrap();

    let result = second.finalize(Category::Talk).await;
    assert_eq!(result, Err(FoldError::AlreadyFinalized(Category::Talk)));
}

// === Parameters ===

#[tokio::test]
async fn test_gap_in_parameters_fails_every_time() {
    let store = seeded_store().await;
    store.remove_chunk(PURPOSE, 1);
    let controller = controller_over(&store, ControllerConfig::default());

    for _ in 0..2 {
        let result = controller.engine_handle().await;
        assert_eq!(
            result.unwrap_err(),
            FoldError::IncompleteParameters {
                purpose: PURPOSE.to_string(),
                missing: vec![1],
            }
        );
    }
}

#[tokio::test]
async fn test_corrupt_parameters_detected() {
    let store = seeded_store().await;
    use foldvault::persistence::ParameterStore;
    store.put_chunk(PURPOSE, 2, &[0u8; 500]).await.unwrap();

    let controller = controller_over(&store, ControllerConfig::default());
    assert!(matches!(
        controller.engine_handle().await,
        Err(FoldError::CorruptParameters { .. })
    ));
}

#[tokio::test]
async fn test_unknown_parameter_header_is_init_fault() {
    let store = MemoryStore::new();
    import_parameters(&store, PURPOSE, b"not proving parameters", 8)
        .await
        .unwrap();

    let controller = controller_over(&store, ControllerConfig::default());
    let result = controller
        .fold(Category::Talk, Attestation::new(Category::Talk, vec![1]))
        .await;
    assert!(matches!(result, Err(FoldError::EngineInitFault(_))));
    assert_eq!(store.get(Category::Talk).await.unwrap().num_folds, 0);
}
