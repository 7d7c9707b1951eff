//! Error types for the collaborative editing engine.

use thiserror::Error;

/// Errors surfaced by the engine and its boundary adapters.
///
/// Conditions a misbehaving peer can trigger (out-of-range remote edits,
/// presence without a heartbeat, empty undo stacks) are never errors: they
/// are logged and degraded in place.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("Operation on {field:?} out of range: position {position} + deleted {deleted} exceeds length {len}")]
    OutOfRange {
        field: String,
        position: usize,
        deleted: usize,
        len: usize,
    },

    #[error("Failed to encode or decode message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid replay script: {0}")]
    Script(String),

    #[error("Broadcast channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, CollabError>;
