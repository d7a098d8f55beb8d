//! Common error types for PeerMatch

use thiserror::Error;

/// Validation errors raised while building domain types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Difficulty outside the closed set
    #[error("Invalid difficulty: {0}. Must be one of: easy, medium, hard")]
    InvalidDifficulty(String),

    /// Topic failed validation
    #[error("Invalid topic '{topic}': {message}")]
    InvalidTopic { topic: String, message: String },

    /// User id failed validation
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),
}

/// Result type alias using the common Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid topic error
    pub fn invalid_topic(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            message: message.into(),
        }
    }
}
