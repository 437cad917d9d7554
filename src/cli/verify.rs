use foldvault::config::FolderConfig;
use foldvault::controller::{FoldController, FoldResult, VerifyReport};
use foldvault::persistence::Category;

/// Verify stored proofs
///
/// With no category, every category holding a proof is verified. Fails if
/// any proof does not verify or could not be checked.
pub async fn execute(
    config: &FolderConfig,
    category: Option<Category>,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = FoldController::open(config).await?;

    let reports = match category {
        Some(category) => vec![(category, controller.verify_category(category).await)],
        None => controller.verify_all().await?,
    };

    println!("🔍 Verifying proofs...");
    println!();
    if reports.is_empty() {
        println!("  No proofs stored yet");
        return Ok(());
    }

    let mut all_ok = true;
    for (category, result) in &reports {
        all_ok &= print_result(*category, result);
    }

    println!();
    if all_ok {
        println!("✅ All proofs verified");
        Ok(())
    } else {
        Err("Verification failed".into())
    }
}

fn print_result(category: Category, result: &FoldResult<VerifyReport>) -> bool {
    match result {
        Ok(VerifyReport { valid, summary }) => {
            let flag = if summary.finalized { ", finalized" } else { "" };
            if *valid {
                println!("  {}: ✅ valid ({} folds{})", category, summary.num_folds, flag);
            } else {
                println!("  {}: ❌ INVALID ({} folds{})", category, summary.num_folds, flag);
            }
            *valid
        }
        Err(e) => {
            println!("  {}: ❌ {}", category, e.user_message());
            false
        }
    }
}
