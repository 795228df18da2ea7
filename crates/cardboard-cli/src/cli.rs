use std::path::PathBuf;

use cardboard_core::{CollectionKind, SyncTarget};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "cardboard")]
#[command(about = "Mirror a BoardGameGeek collection into a local database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file (overrides CARDBOARD_DATABASE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync pipeline, or all of them in order
    Sync {
        /// What to sync
        #[arg(value_enum)]
        target: SyncSelection,
        /// Output outcomes as JSON
        #[arg(long)]
        json: bool,
    },
    /// List mirrored rows
    List {
        /// Which table to list
        #[arg(long, value_enum, default_value_t = ListKind::Games)]
        kind: ListKind,
        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show row counts and the latest run of every target
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncSelection {
    Collection,
    Accessories,
    Hotness,
    Plays,
    All,
}

impl SyncSelection {
    /// Targets in run order. Plays come last so they see the fresh collection.
    pub fn targets(self) -> Vec<SyncTarget> {
        match self {
            Self::Collection => vec![SyncTarget::Collection],
            Self::Accessories => vec![SyncTarget::Accessories],
            Self::Hotness => vec![SyncTarget::Hotness],
            Self::Plays => vec![SyncTarget::Plays],
            Self::All => SyncTarget::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ListKind {
    Games,
    Accessories,
    Hot,
}

impl ListKind {
    pub const fn collection_kind(self) -> Option<CollectionKind> {
        match self {
            Self::Games => Some(CollectionKind::Games),
            Self::Accessories => Some(CollectionKind::Accessories),
            Self::Hot => None,
        }
    }
}
