//! Services shared by the engine and the binaries.

mod database;

pub use database::{DatabaseService, StoreStatus};
