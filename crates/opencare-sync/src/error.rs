//! # Sync Error Types
//!
//! ## Error Flow
//! ```text
//! transport impl ──► SyncError::ConnectionFailed / Timeout (retryable)
//! opencare-db    ──► SyncError::Database             (usually fatal)
//! config layer   ──► SyncError::InvalidConfig / ConfigLoadFailed
//! ```
//!
//! The worker uses [`SyncError::is_retryable`] to decide whether a failed
//! cycle is just "offline right now" (wait for the next tick) or something
//! that deserves a louder log line.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Network Errors
    // =========================================================================
    /// Could not reach the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// The server rejected the request outright (auth, 5xx, ...).
    #[error("Server error: {0}")]
    ServerError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a server response.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// A local database operation failed mid-sync.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The worker is shutting down.
    #[error("Sync worker is shutting down")]
    ShuttingDown,

    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<opencare_db::DbError> for SyncError {
    fn from(err: opencare_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for the worker loop)
// =============================================================================

impl SyncError {
    /// Returns true if the operation can simply be retried on the next
    /// cycle. Pending rows stay pending across a retryable failure, so
    /// nothing is lost by waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) | SyncError::ServerError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem that a
    /// retry will never fix.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
