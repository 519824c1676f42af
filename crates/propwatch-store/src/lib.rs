pub mod alerts;
pub mod error;
pub mod memory;
pub mod roster;
pub mod sqlite;
pub mod warehouse;

pub use alerts::{AlertStore, MemoryAlertStore};
pub use error::StoreError;
pub use roster::{CachedRosterSource, RosterSource};
pub use sqlite::SqliteStore;
pub use warehouse::{FileWarehouse, Warehouse};
