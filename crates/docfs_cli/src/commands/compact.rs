//! Compact command implementation.

use super::{load_model, persistence, CommandResult};
use std::path::Path;

/// Compacts every flat entity set file.
pub async fn run(path: &Path, model_path: Option<&Path>) -> CommandResult<()> {
    let model = load_model(path, model_path).await?;
    let results = persistence(path, model).compact().await?;

    if results.is_empty() {
        println!("No flat entity sets to compact.");
    }
    for result in results {
        if result.rewritten {
            println!(
                "{}: {} records -> {}",
                result.entity_set, result.input_records, result.output_records
            );
        } else {
            println!("{}: already compact", result.entity_set);
        }
    }
    Ok(())
}
