use foldvault::config::FolderConfig;
use foldvault::controller::FoldController;
use foldvault::persistence::Category;

/// Irreversibly finalize a category's proof
///
/// Finalizing an already finalized category is reported but not an error.
pub async fn execute(
    config: &FolderConfig,
    category: Category,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = FoldController::open(config).await?;

    match controller.finalize(category).await {
        Ok(summary) => {
            println!("🔒 {} finalized after {} fold(s)", category, summary.num_folds);
            println!("   No further attestations can be folded into this proof.");
            Ok(())
        }
        Err(e) if e.is_idempotent_success() => {
            println!("ℹ️  {}", e.user_message());
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", e.user_message());
            Err(e.into())
        }
    }
}
