use cardboard_core::Settings;

use crate::commands::common::{format_run_line, open_database};
use crate::error::CliError;

pub async fn run_status(as_json: bool, settings: &Settings) -> Result<(), CliError> {
    let db = open_database(settings).await?;
    let status = db.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "Database:     {}",
        status.database_path.as_deref().unwrap_or(":memory:")
    );
    println!("Games:        {}", status.games);
    println!("Accessories:  {}", status.accessories);
    println!("Hot games:    {}", status.hot_games);
    println!("Hot persons:  {}", status.hot_persons);
    println!("Plays:        {}", status.plays);
    println!("Fingerprints: {}", status.fingerprints);

    if status.last_runs.is_empty() {
        println!("No sync runs recorded.");
    } else {
        println!("Last runs:");
        for run in &status.last_runs {
            println!("  {}", format_run_line(run));
        }
    }
    Ok(())
}
