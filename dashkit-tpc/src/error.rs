//! Error types for dashkit-tpc
//!
//! Skips that the TPCreator handles locally (no match, too many derived
//! tiles, missing master) are logged, not returned. Only the variants below
//! leave the crate.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for dashkit-tpc
#[derive(Error, Debug)]
pub enum TpcError {
    /// Error raised by the shared dashkit layer
    #[error(transparent)]
    Common(#[from] dashkit_common::Error),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON column encode/decode errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored id column that is not a UUID
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// A mod found nothing to do; `apply_mods` turns this into a `None` result
    #[error("Layout modification impossible")]
    ModificationImpossible,

    /// Optimistic layout commit lost the race on every attempt
    #[error("Layout of dashboard {dashboard_id} (owner {owner_id}) still conflicting after {attempts} attempts")]
    RetryExhausted {
        attempts: usize,
        owner_id: Uuid,
        dashboard_id: Uuid,
    },

    /// Master/derived precondition violated by the caller
    #[error("Tile role violation: {0}")]
    RoleViolation(String),

    /// Tile configuration rejected at creation
    #[error("Invalid tile config: {0}")]
    InvalidTileConfig(String),
}

/// Convenience Result type using dashkit-tpc Error
pub type Result<T> = std::result::Result<T, TpcError>;
