pub mod db;
pub mod lock;
pub mod repositories;
pub mod sqlite_store;

pub use db::Database;
pub use sqlite_store::SqliteStore;
