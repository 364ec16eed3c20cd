//! SQLite initialization for the local cache

pub mod init;

pub use init::*;
