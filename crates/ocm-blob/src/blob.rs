//! Reference counted blob handles.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::data::{
    BlobReader, BytesAccess, DataAccess, FileAccess, ReaderFactoryAccess, TempFileAccess,
};
use crate::digest::{Digest, DigestAlgorithm, DigestReader};
use crate::error::{BlobError, Result};
use crate::refcount::{RefMgmt, Release, View};

/// Size value used on the wire when the size of a blob is unknown.
pub const BLOB_UNKNOWN_SIZE: i64 = -1;

/// Mime type for content of unknown type.
pub const MIME_OCTET: &str = "application/octet-stream";

#[derive(Debug, Default)]
struct Meta {
    digest: Option<Digest>,
    size: Option<u64>,
}

/// The shared resource behind all views of one blob.
struct Backing {
    access: Box<dyn DataAccess>,
    meta: Mutex<Meta>,
}

impl Release for Backing {
    fn release_resource(&self) -> Result<()> {
        self.access.close()
    }
}

/// A view onto a byte sequence with a memoized digest and size.
///
/// Every view must be closed once. [`BlobAccess::dup`] hands out further
/// views onto the same backing resource without copying bytes; the resource
/// is freed when the last view is closed. Dropping a view closes it.
pub struct BlobAccess {
    view: View<Backing>,
    mime_type: String,
}

impl BlobAccess {
    /// Blob over an in-memory buffer.
    pub fn for_data(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::for_data_access(None, Some(size), mime_type, BytesAccess::new(data))
    }

    /// Blob over a string.
    pub fn for_string(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::for_data(mime_type, data.into().into_bytes())
    }

    /// Blob over a file owned by the caller. Closing does not delete it.
    pub fn for_file(mime_type: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::for_data_access(None, None, mime_type, FileAccess::new(path))
    }

    /// Blob over a temporary file. The last close deletes the file.
    pub fn for_temporary_file(mime_type: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::for_data_access(None, None, mime_type, TempFileAccess::new(path))
    }

    /// Blob over a stream factory, called once per reader.
    pub fn for_reader_factory<F>(
        mime_type: impl Into<String>,
        origin: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Result<BlobReader> + Send + Sync + 'static,
    {
        Self::for_data_access(
            None,
            None,
            mime_type,
            ReaderFactoryAccess::new(origin, factory),
        )
    }

    /// Blob over an arbitrary data access with optionally known metadata.
    pub fn for_data_access(
        digest: Option<Digest>,
        size: Option<u64>,
        mime_type: impl Into<String>,
        access: impl DataAccess + 'static,
    ) -> Self {
        let backing = Backing {
            access: Box::new(access),
            meta: Mutex::new(Meta { digest, size }),
        };
        BlobAccess {
            view: RefMgmt::new(backing),
            mime_type: mime_type.into(),
        }
    }

    /// A new view sharing the resource but reporting a different mime type.
    pub fn with_mime_type(&self, mime_type: impl Into<String>) -> Result<Self> {
        Ok(BlobAccess {
            view: self.view.dup()?,
            mime_type: mime_type.into(),
        })
    }

    /// A new view onto the same resource.
    pub fn dup(&self) -> Result<Self> {
        self.with_mime_type(self.mime_type.clone())
    }

    fn backing(&self) -> Result<&Backing> {
        self.view.resource()
    }

    /// The full content.
    pub fn get(&self) -> Result<Vec<u8>> {
        let backing = self.backing()?;
        let data = backing.access.get()?;
        let mut meta = backing.meta.lock();
        if meta.size.is_none() {
            meta.size = Some(data.len() as u64);
        }
        Ok(data)
    }

    /// An independent stream over the content.
    pub fn reader(&self) -> Result<BlobReader> {
        self.backing()?.access.reader()
    }

    /// The mime type of this view.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The content digest, streaming the content once if it is not known.
    pub fn digest(&self) -> Result<Digest> {
        if let Some(digest) = self.known_digest() {
            return Ok(digest);
        }
        Ok(self.compute()?.0)
    }

    /// The content size, streaming the content once if it is not known.
    pub fn size(&self) -> Result<u64> {
        if let Some(size) = self.known_size() {
            return Ok(size);
        }
        Ok(self.compute()?.1)
    }

    /// Whether the digest is available without reading the content.
    pub fn digest_known(&self) -> bool {
        self.known_digest().is_some()
    }

    /// The digest if already known.
    pub fn known_digest(&self) -> Option<Digest> {
        self.view.resource_unchecked().meta.lock().digest.clone()
    }

    /// The size if already known.
    pub fn known_size(&self) -> Option<u64> {
        self.view.resource_unchecked().meta.lock().size
    }

    /// The size as a signed wire value, [`BLOB_UNKNOWN_SIZE`] if not known.
    pub fn size_or_unknown(&self) -> i64 {
        self.known_size()
            .and_then(|s| i64::try_from(s).ok())
            .unwrap_or(BLOB_UNKNOWN_SIZE)
    }

    fn compute(&self) -> Result<(Digest, u64)> {
        let backing = self.backing()?;
        let reader = backing.access.reader()?;
        let algorithm = backing
            .meta
            .lock()
            .digest
            .as_ref()
            .map(Digest::algorithm)
            .unwrap_or(DigestAlgorithm::CANONICAL);
        let mut digester = DigestReader::with_algorithm(reader, algorithm);
        std::io::copy(&mut digester, &mut std::io::sink())
            .map_err(|e| BlobError::from_io(format!("digesting {}", backing.access.origin()), e))?;
        let (digest, size) = digester.finish();
        tracing::debug!(origin = %backing.access.origin(), %digest, size, "computed blob digest");

        let mut meta = backing.meta.lock();
        let digest = meta.digest.get_or_insert(digest).clone();
        let size = *meta.size.get_or_insert(size);
        Ok((digest, size))
    }

    /// Check the state of the backing resource.
    pub fn validate(&self) -> Result<()> {
        self.backing()?.access.validate()
    }

    /// Diagnostic description of the content source.
    pub fn origin(&self) -> String {
        self.view.resource_unchecked().access.origin()
    }

    /// Path of the backing file, if the blob is file backed.
    pub fn file_location(&self) -> Option<&Path> {
        self.view.resource_unchecked().access.file_location()
    }

    /// Whether this view has been closed.
    pub fn is_closed(&self) -> bool {
        self.view.is_closed()
    }

    /// Close this view. The last close frees the backing resource.
    pub fn close(&self) -> Result<()> {
        self.view.release()
    }

    /// Close this view, requiring it to be the last open one.
    pub fn finalize(&self) -> Result<()> {
        self.view.finalize()
    }
}

/// A blob can be used as the data source of another blob.
impl DataAccess for BlobAccess {
    fn get(&self) -> Result<Vec<u8>> {
        BlobAccess::get(self)
    }

    fn reader(&self) -> Result<BlobReader> {
        BlobAccess::reader(self)
    }

    fn close(&self) -> Result<()> {
        BlobAccess::close(self)
    }

    fn origin(&self) -> String {
        BlobAccess::origin(self)
    }

    fn validate(&self) -> Result<()> {
        BlobAccess::validate(self)
    }

    fn file_location(&self) -> Option<&Path> {
        BlobAccess::file_location(self)
    }
}

impl fmt::Debug for BlobAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobAccess")
            .field("mime_type", &self.mime_type)
            .field("origin", &self.origin())
            .field("view", &self.view)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SHA256_TEST: &str =
        "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn dup_survives_close_of_original() {
        let blob = BlobAccess::for_string(MIME_OCTET, "test");
        let dup = blob.dup().unwrap();
        blob.close().unwrap();
        let err = blob.close().unwrap_err();
        assert_eq!(err.to_string(), "closed");
        assert_eq!(dup.get().unwrap(), b"test");
        dup.close().unwrap();
    }

    #[test]
    fn reads_after_close_fail() {
        let blob = BlobAccess::for_string(MIME_OCTET, "test");
        blob.close().unwrap();
        assert!(blob.get().unwrap_err().is_closed());
        assert!(blob.reader().err().unwrap().is_closed());
        assert!(blob.dup().unwrap_err().is_closed());
        assert!(blob.validate().unwrap_err().is_closed());
    }

    #[test]
    fn digest_is_stable_and_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let blob = BlobAccess::for_reader_factory(MIME_OCTET, "counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(&b"test"[..]) as BlobReader)
        });
        assert!(!blob.digest_known());
        assert_eq!(blob.known_size(), None);
        assert_eq!(blob.size_or_unknown(), BLOB_UNKNOWN_SIZE);

        assert_eq!(blob.digest().unwrap().to_string(), SHA256_TEST);
        assert_eq!(blob.size().unwrap(), 4);
        assert_eq!(blob.digest().unwrap().to_string(), SHA256_TEST);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(blob.digest_known());
    }

    #[test]
    fn dup_shares_memoized_digest() {
        let blob = BlobAccess::for_string(MIME_OCTET, "test");
        let dup = blob.dup().unwrap();
        blob.digest().unwrap();
        assert!(dup.digest_known());
    }

    #[test]
    fn temporary_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"test").unwrap();

        let blob = BlobAccess::for_temporary_file(MIME_OCTET, &path);
        assert!(path.exists());
        let dup = blob.dup().unwrap();
        blob.close().unwrap();
        assert!(path.exists());
        assert_eq!(dup.get().unwrap(), b"test");
        dup.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn vanished_temporary_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"test").unwrap();
        let blob = BlobAccess::for_temporary_file(MIME_OCTET, &path);
        std::fs::remove_file(&path).unwrap();
        assert!(blob.validate().unwrap_err().is_not_found());
        assert!(blob.get().unwrap_err().is_not_found());
        blob.close().unwrap();
    }

    #[test]
    fn file_blob_is_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kept");
        std::fs::write(&path, b"keep").unwrap();
        let blob = BlobAccess::for_file("text/plain", &path);
        assert_eq!(blob.file_location(), Some(path.as_path()));
        blob.close().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn finalize_with_open_dup_fails() {
        let blob = BlobAccess::for_string(MIME_OCTET, "x");
        let dup = blob.with_mime_type("text/plain").unwrap();
        assert_eq!(dup.mime_type(), "text/plain");
        assert!(matches!(
            blob.finalize(),
            Err(BlobError::StillInUse { .. })
        ));
        dup.close().unwrap();
        blob.finalize().unwrap();
    }

    #[test]
    fn blob_as_data_access() {
        let inner = BlobAccess::for_string(MIME_OCTET, "nested");
        let outer = BlobAccess::for_data_access(None, None, "text/plain", inner);
        assert_eq!(outer.get().unwrap(), b"nested");
        assert_eq!(outer.size().unwrap(), 6);
        outer.close().unwrap();
    }

    #[test]
    fn concurrent_close_of_dups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared");
        std::fs::write(&path, b"shared").unwrap();
        let blob = BlobAccess::for_temporary_file(MIME_OCTET, &path);
        let dups: Vec<_> = (0..8).map(|_| blob.dup().unwrap()).collect();
        blob.close().unwrap();
        std::thread::scope(|s| {
            for d in &dups {
                s.spawn(move || {
                    assert_eq!(d.get().unwrap(), b"shared");
                    d.close().unwrap();
                });
            }
        });
        assert!(!path.exists());
    }
}
