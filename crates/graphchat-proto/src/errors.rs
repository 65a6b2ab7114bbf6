//! Error types for wire decoding.

use thiserror::Error;

/// Convenience alias for results carrying a [`ProtocolError`].
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding Graph payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload was not valid JSON or did not match the expected shape
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A field the client cannot work without was absent
    #[error("missing field: {field}")]
    MissingField {
        /// Wire name of the missing field
        field: &'static str,
    },

    /// Notification resource path did not name a chat thread
    #[error("unrecognized resource path: {0}")]
    UnknownResource(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
