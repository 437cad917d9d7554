use foldvault::config::FolderConfig;
use foldvault::controller::FoldController;
use foldvault::engine::Attestation;
use foldvault::persistence::Category;
use foldvault::serialization::read_cbor_file;
use std::path::PathBuf;

/// Fold attestation files into a category's proof, in the order given
///
/// Stops at the first attestation that fails; the ones before it stay folded.
pub async fn execute(
    config: &FolderConfig,
    category: Category,
    files: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut attestations = Vec::with_capacity(files.len());
    for file in files {
        let attestation: Attestation = read_cbor_file(file)
            .map_err(|e| format!("Failed to read attestation '{}': {}", file.display(), e))?;
        attestations.push(attestation);
    }

    let controller = FoldController::open(config).await?;
    let outcome = controller.fold_all(category, attestations).await?;

    println!(
        "🧩 Folded {} of {} attestation(s) into {}",
        outcome.folded,
        files.len(),
        category
    );
    println!("   Total folds: {}", outcome.summary.num_folds);

    match outcome.error {
        None => Ok(()),
        Some(e) => {
            let file = files
                .get(outcome.folded)
                .map(|f| f.display().to_string())
                .unwrap_or_default();
            println!("❌ {}: {} ({})", file, e.user_message(), e);
            Err(e.into())
        }
    }
}
