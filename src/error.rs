//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error: {0}")]
    AiProvider(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Generation produced no image")]
    EmptyResult,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// True for failures while opening or reading the remote stream.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::AiProvider(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(Error::AiProvider("status 500".to_string()).is_transport());
        assert!(!Error::EmptyResult.is_transport());
        assert!(!Error::Configuration("GEMINI_API_KEY not set".to_string()).is_transport());
        assert!(!Error::InvalidInput("bad".to_string()).is_transport());
    }

    #[test]
    fn test_empty_result_message() {
        assert_eq!(Error::EmptyResult.to_string(), "Generation produced no image");
    }
}
