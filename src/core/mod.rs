pub mod types;
pub mod config;
pub mod error;
pub mod master;
pub mod partition;
pub mod stats;
pub mod transaction;
