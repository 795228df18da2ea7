//! Database layer for cardboard

mod collection_repository;
mod connection;
mod fingerprint_repository;
mod hotness_repository;
mod migrations;
mod play_repository;
mod run_repository;
mod snapshot;
mod values;

pub use collection_repository::{CollectionRepository, LibSqlCollectionRepository};
pub use connection::Database;
pub use fingerprint_repository::LibSqlFingerprintRepository;
pub use hotness_repository::{LibSqlHotGameRepository, LibSqlHotPersonRepository};
pub use play_repository::{LibSqlPlayRepository, PlayUpsert};
pub use run_repository::{LibSqlRunRepository, RunRecord};
pub use snapshot::{ChangeSet, Keyed, SnapshotStore};
