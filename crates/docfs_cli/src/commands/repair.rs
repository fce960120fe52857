//! Repair command implementation.

use super::CommandResult;
use docfs_core::persistence::repair::repair;
use docfs_core::{RepairReport, RetryPolicy};
use std::path::Path;

/// Runs the repair pass only.
pub async fn run(path: &Path) -> CommandResult<()> {
    let report = repair(path, &RetryPolicy::default()).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RepairReport) {
    if report.is_clean() {
        println!("No interrupted writes found.");
        return;
    }
    for (label, paths) in [
        ("Discarded", &report.discarded),
        ("Promoted", &report.promoted),
        ("Removed", &report.removed_files),
        ("Malformed", &report.malformed),
    ] {
        for path in paths {
            println!("{label:<10} {}", path.display());
        }
    }
}
