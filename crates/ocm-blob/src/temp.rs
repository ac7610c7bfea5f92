//! Temporary files under a configurable cache root.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::blob::BlobAccess;
use crate::data::TempFileAccess;
use crate::digest::{DigestAlgorithm, Hasher};
use crate::error::{BlobError, Result};

/// Where temporary and cached content is placed.
///
/// Constructed by the embedding application and passed along explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheAttr {
    root: PathBuf,
}

impl Default for CacheAttr {
    fn default() -> Self {
        CacheAttr {
            root: std::env::temp_dir(),
        }
    }
}

impl CacheAttr {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheAttr { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new unique temporary file under the cache root.
    pub fn create_temp_file(&self, prefix: &str) -> Result<TempFile> {
        fs::create_dir_all(&self.root).map_err(|e| BlobError::at_path(&self.root, "creating", e))?;
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(&self.root)
            .map_err(|e| BlobError::at_path(&self.root, "creating temporary file in", e))?;
        tracing::trace!(path = %file.path().display(), "created temporary file");
        Ok(TempFile {
            file,
            hasher: DigestAlgorithm::CANONICAL.hasher(),
            size: 0,
        })
    }
}

/// A temporary file being written.
///
/// Dropping an unsealed file removes it.
#[derive(Debug)]
pub struct TempFile {
    file: NamedTempFile,
    hasher: Hasher,
    size: u64,
}

impl TempFile {
    /// Path of the file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Finish writing and turn the file into a blob that deletes the file on
    /// its last close. Digest and size are known from the write.
    pub fn seal(mut self, mime_type: impl Into<String>) -> Result<BlobAccess> {
        self.file
            .flush()
            .map_err(|e| BlobError::at_path(self.file.path(), "flushing", e))?;
        let digest = self.hasher.finish();
        let size = self.size;
        let (_, path) = self
            .file
            .keep()
            .map_err(|e| BlobError::io("keeping temporary file", e.error))?;
        tracing::debug!(path = %path.display(), %digest, size, "sealed temporary file");
        Ok(BlobAccess::for_data_access(
            Some(digest),
            Some(size),
            mime_type,
            TempFileAccess::new(path),
        ))
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.file.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    #[test]
    fn sealed_file_has_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let attr = CacheAttr::new(dir.path().join("cache"));
        let mut tmp = attr.create_temp_file("blob-").unwrap();
        tmp.write_all(b"test").unwrap();
        let blob = tmp.seal("text/plain").unwrap();
        assert!(blob.digest_known());
        assert_eq!(blob.digest().unwrap(), Digest::from_bytes(b"test"));
        assert_eq!(blob.size().unwrap(), 4);

        let path = blob.file_location().unwrap().to_path_buf();
        assert!(path.starts_with(attr.root()));
        assert!(path.exists());
        blob.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn unsealed_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let attr = CacheAttr::new(dir.path());
        let mut tmp = attr.create_temp_file("partial-").unwrap();
        tmp.write_all(b"half").unwrap();
        let path = tmp.path().to_path_buf();
        assert!(path.exists());
        drop(tmp);
        assert!(!path.exists());
    }

    #[test]
    fn default_root_is_os_temp() {
        assert_eq!(CacheAttr::default().root(), std::env::temp_dir());
    }
}
