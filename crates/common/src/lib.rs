pub mod chain;
pub mod logger;
pub mod models;
pub mod store;
