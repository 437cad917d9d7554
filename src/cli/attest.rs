use foldvault::config::FolderConfig;
use foldvault::controller::FoldController;
use foldvault::engine::HashChainEngine;
use foldvault::persistence::Category;
use foldvault::serialization::write_cbor_file;
use std::path::Path;

/// Issue an attestation with the loaded parameters
///
/// Stands in for the external attestation source (e.g. a checkpoint tap) so
/// the fold pipeline can be exercised end to end.
pub async fn execute(
    config: &FolderConfig,
    category: Category,
    message: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = FoldController::open(config).await?;
    let handle = controller.engine_handle().await?;

    let attestation =
        HashChainEngine::new().issue_attestation(&handle, category, message.as_bytes())?;
    write_cbor_file(output, &attestation)?;

    println!("✍️  Attestation for {} written to {}", category, output.display());
    Ok(())
}
