//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid startup configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_problem() {
        let err = Error::Config("window size must be non-zero".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: window size must be non-zero"
        );
    }
}
