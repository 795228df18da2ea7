use std::path::PathBuf;

use cardboard_core::db::RunRecord;
use cardboard_core::services::DatabaseService;
use cardboard_core::{CollectionEntity, HotGame, HotPerson, Settings, SyncOutcome};

use crate::error::CliError;

const TITLE_WIDTH: usize = 40;

/// Settings from the environment, with `--db-path` taking precedence.
pub fn load_settings(db_path: Option<PathBuf>) -> Result<Settings, CliError> {
    let mut settings = Settings::from_env()?;
    if let Some(path) = db_path {
        settings.database_path = path;
    }
    Ok(settings)
}

pub async fn open_database(settings: &Settings) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(&settings.database_path).await?)
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// One summary line followed by a line per changed or failed entity.
pub fn format_outcome_lines(outcome: &SyncOutcome) -> Vec<String> {
    let mut lines = vec![outcome.to_string()];
    let groups = [
        ('+', &outcome.inserted_labels),
        ('~', &outcome.updated_labels),
        ('-', &outcome.deleted_labels),
        ('!', &outcome.failed_labels),
    ];
    for (marker, labels) in groups {
        lines.extend(labels.iter().map(|label| format!("  {marker} {label}")));
    }
    lines
}

pub fn format_entity_lines(entities: &[CollectionEntity]) -> Vec<String> {
    entities
        .iter()
        .map(|entity| {
            let title = truncate(&entity.title, TITLE_WIDTH);
            let year = entity
                .year_published
                .map_or_else(|| "----".to_string(), |year| year.to_string());
            let rating = entity
                .my_rating
                .map_or_else(String::new, |rating| format!("  rated {rating}"));
            format!(
                "{:>8}  {title:<40}  {year}  plays {}{rating}",
                entity.entity_id, entity.num_plays
            )
        })
        .collect()
}

pub fn format_hot_lines(games: &[HotGame], persons: &[HotPerson]) -> Vec<String> {
    let mut lines = Vec::with_capacity(games.len() + persons.len() + 2);
    lines.push("Hot games".to_string());
    lines.extend(games.iter().map(|game| {
        format!(
            "{:>3}. {:<40}  {}",
            game.rank,
            truncate(&game.name, TITLE_WIDTH),
            game.url
        )
    }));
    lines.push("Hot persons".to_string());
    lines.extend(persons.iter().map(|person| {
        format!(
            "{:>3}. {:<40}  {}",
            person.rank,
            truncate(&person.name, TITLE_WIDTH),
            person.url
        )
    }));
    lines
}

pub fn format_run_line(run: &RunRecord) -> String {
    let summary = format!(
        "{:<12} {:<16} {}  +{} ~{} -{} ={} !{}",
        run.target,
        run.status,
        run.finished_at,
        run.inserted,
        run.updated,
        run.deleted,
        run.skipped,
        run.failed
    );
    match &run.error {
        Some(error) => format!("{summary}  ({error})"),
        None => summary,
    }
}
