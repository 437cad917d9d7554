//! Integration tests for durable state across restarts.
//!
//! Every test opens a SQLite database in a temp directory, works on it,
//! drops the controller and opens the same file again:
//! - Fold records and proofs survive a restart
//! - Finalization survives a restart and still blocks folds
//! - Two store handles on one file race through compare-and-set

use foldvault::config::FolderConfig;
use foldvault::controller::{FoldController, FoldError};
use foldvault::engine::HashChainEngine;
use foldvault::persistence::{
    import_parameters, Category, FoldRecord, FoldRecordStore, SqliteStore, StorageError,
};
use tempfile::TempDir;

async fn prepared() -> (FolderConfig, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = FolderConfig::new(dir.path().join("foldvault.db"));

    let store = SqliteStore::open(&config.storage.database_path)
        .await
        .unwrap();
    let params = HashChainEngine::parameters_from_seed(&[11u8; 32], 3000);
    import_parameters(&store, &config.controller.parameter_purpose, &params, 1024)
        .await
        .unwrap();
    store.close().await;

    (config, dir)
}

async fn fold_message(controller: &FoldController, category: Category, message: &str) {
    let handle = controller.engine_handle().await.unwrap();
    let attestation = HashChainEngine::new()
        .issue_attestation(&handle, category, message.as_bytes())
        .unwrap();
    controller.fold(category, attestation).await.unwrap();
}

#[tokio::test]
async fn test_folds_survive_restart() {
    let (config, _dir) = prepared().await;

    {
        let controller = FoldController::open(&config).await.unwrap();
        fold_message(&controller, Category::Talk, "morning").await;
        fold_message(&controller, Category::Talk, "afternoon").await;
    }

    let controller = FoldController::open(&config).await.unwrap();
    assert_eq!(controller.status(Category::Talk).await.num_folds, 2);
    assert!(controller.verify(Category::Talk).await.unwrap());

    fold_message(&controller, Category::Talk, "evening").await;
    assert_eq!(controller.status(Category::Talk).await.num_folds, 3);
    assert!(controller.verify(Category::Talk).await.unwrap());
}

#[tokio::test]
async fn test_finalization_survives_restart() {
    let (config, _dir) = prepared().await;

    {
        let controller = FoldController::open(&config).await.unwrap();
        fold_message(&controller, Category::Attendee, "door").await;
        controller.finalize(Category::Attendee).await.unwrap();
    }

    let controller = FoldController::open(&config).await.unwrap();
    let summary = controller.status(Category::Attendee).await;
    assert!(summary.finalized);
    assert_eq!(summary.num_folds, 1);
    assert_eq!(
        controller.finalize(Category::Attendee).await,
        Err(FoldError::AlreadyFinalized(Category::Attendee))
    );
    assert!(controller.verify(Category::Attendee).await.unwrap());
}

#[tokio::test]
async fn test_two_handles_race_on_compare_and_set() {
    let (config, _dir) = prepared().await;
    let a = SqliteStore::open(&config.storage.database_path)
        .await
        .unwrap();
    let b = SqliteStore::open(&config.storage.database_path)
        .await
        .unwrap();

    let base = a.get(Category::Speaker).await.unwrap();
    assert_eq!(base, FoldRecord::empty(Category::Speaker));

    a.compare_and_set(Category::Speaker, 0, base.folded(vec![1]))
        .await
        .unwrap();
    let stale = b
        .compare_and_set(Category::Speaker, 0, base.folded(vec![2]))
        .await;
    assert!(matches!(
        stale,
        Err(StorageError::Conflict {
            expected: 0,
            actual: 1,
            ..
        })
    ));

    let stored = b.get(Category::Speaker).await.unwrap();
    assert_eq!(stored.proof_bytes, Some(vec![1]));
}
