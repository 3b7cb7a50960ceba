//! Error types for framelink.

use thiserror::Error;

/// Main error type for all framelink operations.
#[derive(Debug, Error)]
pub enum FramelinkError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema serialization error (MessagePack encode).
    #[error("schema encode error: {0}")]
    SchemaEncode(#[from] rmp_serde::encode::Error),

    /// Schema deserialization error (MessagePack decode).
    #[error("schema decode error: {0}")]
    SchemaDecode(#[from] rmp_serde::decode::Error),

    /// Framing violation (malformed header, bad declared length, etc.).
    /// Always fatal for the owning connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encode was given a structured message for a command with no
    /// registered schema.
    #[error("no schema registered for command {0}")]
    SchemaNotFound(u16),

    /// Encode was given a message whose concrete type does not match the
    /// schema registered for its command.
    #[error("message type does not match schema for command {0}")]
    SchemaMismatch(u16),
}

/// Result type alias using FramelinkError.
pub type Result<T> = std::result::Result<T, FramelinkError>;
