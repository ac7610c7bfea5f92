//! Raw byte sources.
//!
//! A [`DataAccess`] knows how to produce bytes but nothing about digests,
//! mime types, or ownership. [`crate::BlobAccess`] layers those on top.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BlobError, Result};

/// A boxed byte stream handed out by [`DataAccess::reader`].
pub type BlobReader = Box<dyn Read + Send>;

/// A factory producing a fresh stream for every call.
pub type ReaderFactory = Box<dyn Fn() -> Result<BlobReader> + Send + Sync>;

/// A source of bytes.
pub trait DataAccess: Send + Sync {
    /// The full content.
    fn get(&self) -> Result<Vec<u8>> {
        let mut reader = self.reader()?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| BlobError::from_io(format!("reading {}", self.origin()), e))?;
        Ok(buf)
    }

    /// A new, independent stream over the content.
    fn reader(&self) -> Result<BlobReader>;

    /// Free resources held by this source.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Diagnostic description of where the bytes come from.
    fn origin(&self) -> String;

    /// Check that the source is still usable.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Path of the backing file, if any.
    fn file_location(&self) -> Option<&Path> {
        None
    }
}

/// In-memory content.
#[derive(Clone)]
pub struct BytesAccess {
    data: Arc<[u8]>,
}

impl BytesAccess {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        BytesAccess {
            data: Arc::from(data.into()),
        }
    }
}

impl DataAccess for BytesAccess {
    fn get(&self) -> Result<Vec<u8>> {
        Ok(self.data.to_vec())
    }

    fn reader(&self) -> Result<BlobReader> {
        Ok(Box::new(std::io::Cursor::new(Arc::clone(&self.data))))
    }

    fn origin(&self) -> String {
        format!("{} bytes of memory", self.data.len())
    }
}

impl fmt::Debug for BytesAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytesAccess")
            .field("len", &self.data.len())
            .finish()
    }
}

/// Content of a file that is owned by someone else.
#[derive(Debug, Clone)]
pub struct FileAccess {
    path: PathBuf,
}

impl FileAccess {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileAccess { path: path.into() }
    }
}

impl DataAccess for FileAccess {
    fn get(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| BlobError::at_path(&self.path, "reading", e))
    }

    fn reader(&self) -> Result<BlobReader> {
        let file =
            fs::File::open(&self.path).map_err(|e| BlobError::at_path(&self.path, "opening", e))?;
        Ok(Box::new(file))
    }

    fn origin(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn validate(&self) -> Result<()> {
        validate_file(&self.path)
    }

    fn file_location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Content of a temporary file that is deleted on close.
#[derive(Debug, Clone)]
pub struct TempFileAccess {
    inner: FileAccess,
}

impl TempFileAccess {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TempFileAccess {
            inner: FileAccess::new(path),
        }
    }
}

impl DataAccess for TempFileAccess {
    fn get(&self) -> Result<Vec<u8>> {
        self.inner.get()
    }

    fn reader(&self) -> Result<BlobReader> {
        self.inner.reader()
    }

    fn close(&self) -> Result<()> {
        tracing::debug!(path = %self.inner.path.display(), "removing temporary blob file");
        match fs::remove_file(&self.inner.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::at_path(&self.inner.path, "removing", e)),
        }
    }

    fn origin(&self) -> String {
        format!("temporary file {}", self.inner.path.display())
    }

    fn validate(&self) -> Result<()> {
        self.inner.validate()
    }

    fn file_location(&self) -> Option<&Path> {
        self.inner.file_location()
    }
}

/// Content produced on demand by a factory.
pub struct ReaderFactoryAccess {
    origin: String,
    factory: ReaderFactory,
}

impl ReaderFactoryAccess {
    pub fn new<F>(origin: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<BlobReader> + Send + Sync + 'static,
    {
        ReaderFactoryAccess {
            origin: origin.into(),
            factory: Box::new(factory),
        }
    }
}

impl DataAccess for ReaderFactoryAccess {
    fn reader(&self) -> Result<BlobReader> {
        (self.factory)()
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }
}

impl fmt::Debug for ReaderFactoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderFactoryAccess")
            .field("origin", &self.origin)
            .finish()
    }
}

fn validate_file(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(BlobError::Invalid {
            detail: format!("{} is not a regular file", path.display()),
        }),
        Err(e) => Err(BlobError::at_path(path, "checking", e)),
    }
}
