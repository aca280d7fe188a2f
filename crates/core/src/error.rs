//! Error types shared by the configuration and platform layers.
//!
//! GPU failures have their own type, `renderer_rhi::RhiError`.

use thiserror::Error;

/// Errors raised before any GPU object exists: reading configuration and
/// creating the window.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or handle retrieval failed
    #[error("Window error: {0}")]
    Window(String),

    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML or has a field of the wrong type
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config value out of range
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the core [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = Error::Config("max_objects must be at least 1".into());
        assert_eq!(err.to_string(), "Config error: max_objects must be at least 1");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
