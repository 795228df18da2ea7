//! cardboard-core - Core library for cardboard
//!
//! Mirrors a BoardGameGeek collection, the trending lists and the user's
//! logged plays into a local libSQL database. Shared by the CLI and the API.

pub mod bgg;
pub mod config;
pub mod convert;
pub mod db;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod models;
pub mod services;
pub mod session;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use models::{
    CollectionEntity, CollectionKind, HotGame, HotPerson, Play, SyncOutcome, SyncTarget,
};
