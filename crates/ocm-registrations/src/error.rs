//! Registration error types.

/// Errors that can occur while registering handlers by name.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// No registered handler accepted the requested name.
    #[error("no registration handler found for {name}")]
    NoHandlerFound { name: String },

    /// The handler configuration could not be decoded.
    #[error("invalid handler config: {detail}")]
    InvalidConfig { detail: String },

    /// A registration path is malformed.
    #[error("invalid registration path {path:?}")]
    InvalidPath { path: String },

    /// A handler accepted the name but failed to register.
    #[error("registering {name}: {source}")]
    Handler {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RegistrationError {
    /// Wrap a handler specific failure.
    pub fn handler(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        RegistrationError::Handler {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Result type alias for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;
