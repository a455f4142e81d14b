pub mod config;
pub mod database;
pub mod error;
pub mod query_analysis;
pub mod replication;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;
