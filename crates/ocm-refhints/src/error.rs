//! Reference hint error types.

/// Errors that can occur while building or decoding reference hints.
#[derive(Debug, thiserror::Error)]
pub enum HintError {
    /// Attribute names must consist of ASCII letters and digits only.
    #[error("invalid hint attribute name {name:?}")]
    InvalidAttribute { name: String },

    /// A hint specification could not be interpreted.
    #[error("invalid reference hint: {detail}")]
    Invalid { detail: String },
}

/// Result type alias for hint operations.
pub type Result<T> = std::result::Result<T, HintError>;
