//! Data models for cardboard

mod collection;
mod hotness;
mod outcome;
mod play;

pub use collection::{
    CollectionEntity, CollectionKind, CollectionStatus, CurrencySource, PurchaseInfo,
};
pub use hotness::{HotGame, HotPerson};
pub use outcome::{RunStatus, SyncOutcome, SyncTarget};
pub use play::Play;
