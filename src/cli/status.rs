use foldvault::config::FolderConfig;
use foldvault::controller::{FoldController, FoldState};
use foldvault::persistence::{Category, FoldSummary};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CategoryStatus {
    #[serde(flatten)]
    summary: FoldSummary,
    state: FoldState,
}

/// Show fold counts and finalization state for every category
pub async fn execute(config: &FolderConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let controller = FoldController::open(config).await?;

    let mut statuses = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        let summary = controller.status(category).await;
        statuses.push(CategoryStatus {
            summary,
            state: FoldState::of(&summary),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("📊 Foldvault Status");
    println!();
    println!("  Database: {}", config.storage.database_path.display());
    println!();
    for status in &statuses {
        println!(
            "  {:<9} {:>5} fold(s)  {}",
            status.summary.category, status.summary.num_folds, status.state
        );
        println!("            {}", status.state.description());
    }

    Ok(())
}
