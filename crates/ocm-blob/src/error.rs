//! Blob access error types.

use std::path::PathBuf;

/// Errors that can occur while accessing, digesting, or caching blobs.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Operation on a view or resource that has already been released.
    #[error("closed")]
    Closed,

    /// A blob, digest, or file is not available.
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    /// Content did not match the expected digest.
    #[error("digest mismatch: expected {expected}, found {found}")]
    DigestMismatch { expected: String, found: String },

    /// Exclusive release requested while other views are still open.
    #[error("resource still in use by {references} other reference(s)")]
    StillInUse { references: usize },

    /// Malformed digest, algorithm name, or blob parameter.
    #[error("invalid blob parameter: {detail}")]
    Invalid { detail: String },

    /// I/O failure with the location it happened at.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl BlobError {
    /// Shorthand for a missing blob identified by digest or name.
    pub fn blob_not_found(name: impl Into<String>) -> Self {
        BlobError::NotFound {
            kind: "blob",
            name: name.into(),
        }
    }

    /// Shorthand for a missing file.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        BlobError::NotFound {
            kind: "file",
            name: path.into().display().to_string(),
        }
    }

    /// Wrap an I/O error with a textual location.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BlobError::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O error that occurred at a filesystem path.
    ///
    /// `NotFound` I/O errors are mapped to [`BlobError::NotFound`].
    pub fn at_path(path: &std::path::Path, action: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return BlobError::file_not_found(path);
        }
        BlobError::Io {
            context: format!("{action} {}", path.display()),
            source,
        }
    }

    /// Recover an error that travelled through a reader, or wrap the I/O
    /// error with `context`.
    pub fn from_io(context: impl Into<String>, err: std::io::Error) -> Self {
        if err
            .get_ref()
            .map(|inner| inner.is::<BlobError>())
            .unwrap_or(false)
        {
            if let Some(inner) = err.into_inner() {
                if let Ok(blob_err) = inner.downcast::<BlobError>() {
                    return *blob_err;
                }
            }
            return BlobError::Invalid {
                detail: "unrecoverable nested error".to_string(),
            };
        }
        BlobError::io(context, err)
    }

    /// Whether this is a [`BlobError::Closed`] error.
    pub fn is_closed(&self) -> bool {
        matches!(self, BlobError::Closed)
    }

    /// Whether this is a [`BlobError::NotFound`] error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound { .. })
    }
}

/// Result type alias for blob operations.
pub type Result<T> = std::result::Result<T, BlobError>;

/// Convert a [`BlobError`] into an [`std::io::Error`] for use inside readers.
pub(crate) fn into_io(err: BlobError) -> std::io::Error {
    match err {
        BlobError::Io { source, .. } => source,
        other => std::io::Error::new(std::io::ErrorKind::Other, other),
    }
}
