//! # Reel Common Library
//!
//! Shared code for the Reel catalog crates including:
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - SQLite initialization for the local key/value cache
//! - Timestamp and UUID helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
