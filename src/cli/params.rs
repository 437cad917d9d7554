use foldvault::config::FolderConfig;
use foldvault::controller::FoldController;
use foldvault::engine::HashChainEngine;
use foldvault::persistence::{import_parameters, ParameterStore, SqliteStore};
use std::path::Path;

/// Default size of a generated parameter blob (1 MiB)
pub const DEFAULT_GENERATED_SIZE: usize = 1024 * 1024;

/// Generate a fresh parameter blob for the reference engine
pub fn generate(output: &Path, size: usize) -> Result<(), Box<dyn std::error::Error>> {
    let blob = HashChainEngine::generate_parameters(size);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, &blob)
        .map_err(|e| format!("Failed to write '{}': {}", output.display(), e))?;

    println!("🔑 Generated {} bytes of parameters", blob.len());
    println!("   Written to: {}", output.display());
    println!();
    println!("⚠️  The blob contains the attestation key. Keep it private.");

    Ok(())
}

/// Split a parameter blob into chunks and store it
pub async fn import(config: &FolderConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let blob = std::fs::read(file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;

    let store = SqliteStore::open(&config.storage.database_path).await?;
    let manifest = import_parameters(
        &store,
        &config.controller.parameter_purpose,
        &blob,
        config.parameters.chunk_size,
    )
    .await?;
    store.close().await;

    println!("📦 Imported parameters '{}'", manifest.purpose);
    println!("   Chunks: {}", manifest.total_chunks);
    println!("   Bytes: {}", blob.len());
    println!("   SHA-256: {}", manifest.digest_hex());

    Ok(())
}

/// Check that stored parameters are complete and loadable
pub async fn check(config: &FolderConfig) -> Result<(), Box<dyn std::error::Error>> {
    let purpose = &config.controller.parameter_purpose;
    println!("🔍 Checking parameters '{}'...", purpose);
    println!();

    let store = SqliteStore::open(&config.storage.database_path).await?;
    let stats = store.stats(purpose).await?;
    store.close().await;

    print!("  Chunks: ");
    match stats.expected_chunks {
        Some(expected) => println!("{} of {} ({} bytes)", stats.chunks, expected, stats.bytes),
        None => println!("{} ({} bytes, no manifest)", stats.chunks, stats.bytes),
    }

    let controller = FoldController::open(config).await?;
    print!("  Engine: ");
    match controller.engine_handle().await {
        Ok(handle) => {
            println!("✅ Loaded ({})", hex::encode(handle.params_digest()));
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", e);
            Err(e.into())
        }
    }
}
