//! WolfHA Error Types

use thiserror::Error;

/// Result type alias for WolfHA operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfHA error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Wire protocol errors
    #[error("Malformed datagram: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("User data is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    // Membership errors
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Errors caused by a bad inbound datagram; these are dropped, never fatal
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Error::Decode(_) | Error::Json(_) | Error::PayloadTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_classification() {
        assert!(Error::Decode("missing ip".into()).is_malformed_input());
        assert!(Error::PayloadTooLarge { size: 10, limit: 5 }.is_malformed_input());
        assert!(!Error::Network("bind failed".into()).is_malformed_input());
        assert!(!Error::ShuttingDown.is_malformed_input());
    }

    #[test]
    fn test_display() {
        let err = Error::PayloadTooLarge { size: 9000, limit: 8192 };
        assert_eq!(err.to_string(), "User data is 9000 bytes, limit is 8192");
    }
}
