//! Configuration errors.
//!
//! Other modules define their own error enums next to the code that raises
//! them.

use thiserror::Error;

/// Configuration that could not be read or used.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// A value parsed but is not usable.
    #[error("invalid value for {field}: {message}")]
    Invalid {
        /// Dotted key of the offending setting.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;
