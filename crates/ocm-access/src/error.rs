//! Access error types.

use ocm_blob::BlobError;
use ocm_refhints::HintError;
use ocm_registrations::RegistrationError;

/// Errors that can occur while resolving, fetching, or uploading artifacts.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Blob handling failure (closed views, digest mismatch, ...).
    #[error(transparent)]
    Blob(BlobError),

    /// Malformed reference hint.
    #[error(transparent)]
    Hint(#[from] HintError),

    /// Handler registration failure.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Malformed access specification, coordinate, or locator.
    #[error("invalid {kind}: {detail}")]
    Invalid { kind: &'static str, detail: String },

    /// Access specification type without registered decoder.
    #[error("unknown access method type {type_name:?}")]
    UnknownType { type_name: String },

    /// Capability not implemented by a technology.
    #[error("{operation} not supported by {by}")]
    NotSupported { operation: String, by: String },

    /// Artifact, file, or package absent at its origin.
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    /// Transient failure that may succeed when repeated.
    #[error("{0}")]
    Retriable(Box<AccessError>),

    /// Failure reported by a transport.
    #[error("transport {scheme}: {detail}")]
    Transport { scheme: String, detail: String },

    /// Upload into a target repository failed.
    #[error("upload to {target} failed: {detail}")]
    Upload { target: String, detail: String },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error with the location it happened at.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AccessError {
    /// Mark an error as transient.
    pub fn retriable(err: AccessError) -> Self {
        match err {
            AccessError::Retriable(_) => err,
            other => AccessError::Retriable(Box::new(other)),
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, AccessError::Retriable(_))
    }

    /// Strip a [`AccessError::Retriable`] marker.
    pub fn into_permanent(self) -> Self {
        match self {
            AccessError::Retriable(inner) => inner.into_permanent(),
            other => other,
        }
    }

    pub fn invalid(kind: &'static str, detail: impl Into<String>) -> Self {
        AccessError::Invalid {
            kind,
            detail: detail.into(),
        }
    }

    pub fn not_supported(operation: impl Into<String>, by: impl Into<String>) -> Self {
        AccessError::NotSupported {
            operation: operation.into(),
            by: by.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        AccessError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AccessError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the error means the requested content does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            AccessError::NotFound { .. } => true,
            AccessError::Blob(b) => b.is_not_found(),
            AccessError::Retriable(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// Whether the error means an already closed resource was used.
    pub fn is_closed(&self) -> bool {
        matches!(self, AccessError::Blob(b) if b.is_closed())
    }
}

/// Blob errors carrying an access error through a byte stream are unwrapped.
impl From<BlobError> for AccessError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Io { context, source } => {
                let carries_access_error = source
                    .get_ref()
                    .map(|inner| inner.is::<AccessError>())
                    .unwrap_or(false);
                if carries_access_error {
                    if let Some(inner) = source.into_inner() {
                        if let Ok(access) = inner.downcast::<AccessError>() {
                            return *access;
                        }
                    }
                    return AccessError::invalid("stream", context);
                }
                AccessError::Blob(BlobError::Io { context, source })
            }
            other => AccessError::Blob(other),
        }
    }
}

/// Convert an access error for use behind a [`ocm_blob::DataAccess`].
pub(crate) fn into_blob_error(err: AccessError, context: impl Into<String>) -> BlobError {
    match err {
        AccessError::Blob(b) => b,
        AccessError::NotFound { kind, name } => BlobError::NotFound { kind, name },
        other => BlobError::io(context, std::io::Error::new(std::io::ErrorKind::Other, other)),
    }
}

/// Result type alias for access operations.
pub type Result<T> = std::result::Result<T, AccessError>;
