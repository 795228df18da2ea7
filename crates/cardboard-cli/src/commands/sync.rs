use cardboard_core::{Settings, SyncEngine, SyncOutcome};

use crate::cli::SyncSelection;
use crate::commands::common::format_outcome_lines;
use crate::error::CliError;

/// Run the selected targets in order. A failed target does not stop the rest.
pub async fn run_sync(
    selection: SyncSelection,
    as_json: bool,
    settings: &Settings,
) -> Result<(), CliError> {
    let engine = SyncEngine::from_settings(settings).await?;
    let targets = selection.targets();

    let mut outcomes: Vec<SyncOutcome> = Vec::with_capacity(targets.len());
    let mut failed = 0;
    for target in &targets {
        match engine.sync(*target).await {
            Ok(outcome) => {
                if !as_json {
                    for line in format_outcome_lines(&outcome) {
                        println!("{line}");
                    }
                }
                outcomes.push(outcome);
            }
            Err(error) if targets.len() > 1 => {
                tracing::error!(pipeline = %target, "Sync failed: {}", error);
                failed += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }
    if failed > 0 {
        return Err(CliError::RunsFailed {
            failed,
            total: targets.len(),
        });
    }
    Ok(())
}
