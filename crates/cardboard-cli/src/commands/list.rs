use serde::Serialize;

use cardboard_core::{HotGame, HotPerson, Settings};

use crate::cli::ListKind;
use crate::commands::common::{format_entity_lines, format_hot_lines, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct HotListing {
    games: Vec<HotGame>,
    persons: Vec<HotPerson>,
}

pub async fn run_list(
    kind: ListKind,
    limit: usize,
    as_json: bool,
    settings: &Settings,
) -> Result<(), CliError> {
    let db = open_database(settings).await?;

    if let Some(collection_kind) = kind.collection_kind() {
        let entities = db.list_collection(collection_kind, Some(limit)).await?;
        if as_json {
            println!("{}", serde_json::to_string_pretty(&entities)?);
        } else if entities.is_empty() {
            println!("No {collection_kind} mirrored yet.");
        } else {
            for line in format_entity_lines(&entities) {
                println!("{line}");
            }
        }
        return Ok(());
    }

    let hot = HotListing {
        games: db.list_hot_games(Some(limit)).await?,
        persons: db.list_hot_persons(Some(limit)).await?,
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&hot)?);
    } else {
        for line in format_hot_lines(&hot.games, &hot.persons) {
            println!("{line}");
        }
    }
    Ok(())
}
