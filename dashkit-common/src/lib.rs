//! # dashkit Common Library
//!
//! Shared code for the dashkit crates:
//! - Error types
//! - Bootstrap configuration loading (TOML + environment)
//! - Event types and the EventBus
//! - Database initialization (SQLite schema for tiles and layouts)

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
