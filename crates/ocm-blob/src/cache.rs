//! Digest-indexed disk cache for blob content.
//!
//! Content is stored under `<root>/<algorithm>.<hex>`. New content is first
//! streamed to a `TMP<uuid>` file in the same directory, digested, and then
//! renamed to its digest name. If an entry for that digest already exists
//! the new copy is discarded and the existing entry is kept.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::blob::BlobAccess;
use crate::data::{BlobReader, DataAccess, FileAccess};
use crate::digest::{Digest, DigestReader, VerifyingReader};
use crate::error::{BlobError, Result};
use crate::temp::CacheAttr;

const TMP_PREFIX: &str = "TMP";

/// A directory of blobs named by their digest.
#[derive(Debug)]
pub struct BlobCache {
    root: PathBuf,
}

impl BlobCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| BlobError::at_path(&root, "creating", e))?;
        Ok(BlobCache { root })
    }

    /// Open a cache in the `blobs` subdirectory of a cache attribute root.
    pub fn in_cache_root(attr: &CacheAttr) -> Result<Self> {
        Self::new(attr.root().join("blobs"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the entry for `digest` would have.
    pub fn path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.file_name())
    }

    /// Whether an entry for `digest` exists.
    pub fn contains(&self, digest: &Digest) -> bool {
        self.path(digest).is_file()
    }

    /// Store the content of a blob. Returns its digest and size.
    pub fn add_blob(&self, blob: &BlobAccess) -> Result<(Digest, u64)> {
        if let Some(digest) = blob.known_digest() {
            if self.contains(&digest) {
                tracing::debug!(%digest, "blob already cached");
                return Ok((digest, blob.size()?));
            }
            return self.add_verified(blob.reader()?, &digest);
        }
        self.add_reader(blob.reader()?)
    }

    /// Store the content of a stream. Returns its digest and size.
    pub fn add_reader(&self, reader: impl Read) -> Result<(Digest, u64)> {
        let mut digester = DigestReader::new(reader);
        let tmp = self.write_tmp(&mut digester)?;
        let (digest, size) = digester.finish();
        self.commit(tmp, &digest)?;
        Ok((digest, size))
    }

    /// Store the content of a stream that must match `expected`.
    pub fn add_verified(&self, reader: impl Read, expected: &Digest) -> Result<(Digest, u64)> {
        let mut verifier = VerifyingReader::new(reader, expected.clone());
        let tmp = self.write_tmp(&mut verifier)?;
        let size = verifier.finish()?;
        self.commit(tmp, expected)?;
        Ok((expected.clone(), size))
    }

    fn write_tmp(&self, reader: &mut impl Read) -> Result<NamedTempFile> {
        let prefix = format!("{TMP_PREFIX}{}", Uuid::new_v4().simple());
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .rand_bytes(0)
            .tempfile_in(&self.root)
            .map_err(|e| BlobError::at_path(&self.root, "creating cache file in", e))?;
        std::io::copy(reader, tmp.as_file_mut())
            .map_err(|e| BlobError::from_io(format!("writing {}", tmp.path().display()), e))?;
        Ok(tmp)
    }

    fn commit(&self, tmp: NamedTempFile, digest: &Digest) -> Result<()> {
        let target = self.path(digest);
        if target.exists() {
            tracing::debug!(%digest, "discarding duplicate cache entry");
            return Ok(());
        }
        match tmp.persist_noclobber(&target) {
            Ok(_) => {
                tracing::debug!(%digest, "added cache entry");
                Ok(())
            }
            Err(e) if target.exists() => {
                tracing::debug!(%digest, error = %e.error, "lost race for cache entry");
                Ok(())
            }
            Err(e) => Err(BlobError::at_path(&target, "storing", e.error)),
        }
    }

    /// A blob over a cached entry. The entry stays in the cache after close.
    pub fn get_blob(&self, digest: &Digest, mime_type: impl Into<String>) -> Result<BlobAccess> {
        let path = self.path(digest);
        let meta = fs::metadata(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlobError::blob_not_found(digest.to_string()),
            _ => BlobError::at_path(&path, "checking", e),
        })?;
        tracing::trace!(%digest, "cache hit");
        Ok(BlobAccess::for_data_access(
            Some(digest.clone()),
            Some(meta.len()),
            mime_type,
            FileAccess::new(path),
        ))
    }

    /// Remove an entry. Removing a missing entry is not an error.
    pub fn remove(&self, digest: &Digest) -> Result<()> {
        let path = self.path(digest);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::at_path(&path, "removing", e)),
        }
    }

    /// Digests of all entries, sorted.
    pub fn list(&self) -> Result<Vec<Digest>> {
        let entries =
            fs::read_dir(&self.root).map_err(|e| BlobError::at_path(&self.root, "listing", e))?;
        let mut digests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BlobError::at_path(&self.root, "listing", e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(TMP_PREFIX) {
                continue;
            }
            if let Ok(digest) = Digest::from_file_name(name) {
                digests.push(digest);
            }
        }
        digests.sort();
        Ok(digests)
    }
}

/// Where [`CachedDataAccess`] materializes remote content.
#[derive(Debug, Clone)]
pub enum CacheTarget {
    /// Shared digest-indexed cache.
    Cache(Arc<BlobCache>),
    /// Private temporary file under a cache root.
    Temp(CacheAttr),
}

/// Wraps a remote source and downloads its content once, on first use.
pub struct CachedDataAccess {
    remote: Box<dyn DataAccess>,
    target: CacheTarget,
    expected: Option<Digest>,
    local: Mutex<Option<BlobAccess>>,
}

impl CachedDataAccess {
    pub fn new(
        remote: impl DataAccess + 'static,
        target: CacheTarget,
        expected: Option<Digest>,
    ) -> Self {
        CachedDataAccess {
            remote: Box::new(remote),
            target,
            expected,
            local: Mutex::new(None),
        }
    }

    /// Whether the content has already been materialized locally.
    pub fn is_materialized(&self) -> bool {
        self.local.lock().is_some()
    }

    fn with_local<T>(&self, f: impl FnOnce(&BlobAccess) -> Result<T>) -> Result<T> {
        let mut local = self.local.lock();
        if local.is_none() {
            *local = Some(self.materialize()?);
        }
        match local.as_ref() {
            Some(blob) => f(blob),
            None => Err(BlobError::Closed),
        }
    }

    fn materialize(&self) -> Result<BlobAccess> {
        match &self.target {
            CacheTarget::Cache(cache) => {
                if let Some(expected) = &self.expected {
                    if cache.contains(expected) {
                        return cache.get_blob(expected, "");
                    }
                }
                tracing::debug!(origin = %self.remote.origin(), "fetching into blob cache");
                let reader = self.remote.reader()?;
                let (digest, _) = match &self.expected {
                    Some(expected) => cache.add_verified(reader, expected)?,
                    None => cache.add_reader(reader)?,
                };
                cache.get_blob(&digest, "")
            }
            CacheTarget::Temp(attr) => {
                tracing::debug!(origin = %self.remote.origin(), "fetching into temporary file");
                let mut tmp = attr.create_temp_file("cached-")?;
                let reader = self.remote.reader()?;
                match &self.expected {
                    Some(expected) => {
                        let mut verifier = VerifyingReader::new(reader, expected.clone());
                        std::io::copy(&mut verifier, &mut tmp).map_err(|e| {
                            BlobError::from_io(format!("fetching {}", self.remote.origin()), e)
                        })?;
                        verifier.finish()?;
                    }
                    None => {
                        let mut reader = reader;
                        std::io::copy(&mut reader, &mut tmp).map_err(|e| {
                            BlobError::from_io(format!("fetching {}", self.remote.origin()), e)
                        })?;
                    }
                }
                tmp.seal("")
            }
        }
    }
}

impl DataAccess for CachedDataAccess {
    fn get(&self) -> Result<Vec<u8>> {
        self.with_local(|blob| blob.get())
    }

    fn reader(&self) -> Result<BlobReader> {
        self.with_local(|blob| blob.reader())
    }

    fn close(&self) -> Result<()> {
        let local = self.local.lock().take();
        let released = match local {
            Some(blob) => blob.close(),
            None => Ok(()),
        };
        self.remote.close()?;
        released
    }

    fn origin(&self) -> String {
        format!("cached {}", self.remote.origin())
    }

    fn validate(&self) -> Result<()> {
        match self.local.lock().as_ref() {
            Some(blob) => blob.validate(),
            None => self.remote.validate(),
        }
    }
}

/// A blob whose remote content is downloaded once on first read.
pub fn cached_blob_access(
    mime_type: impl Into<String>,
    remote: impl DataAccess + 'static,
    target: CacheTarget,
    expected: Option<Digest>,
) -> BlobAccess {
    BlobAccess::for_data_access(
        expected.clone(),
        None,
        mime_type,
        CachedDataAccess::new(remote, target, expected),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BytesAccess, ReaderFactoryAccess};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_remote(data: &'static [u8]) -> (ReaderFactoryAccess, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let remote = ReaderFactoryAccess::new("remote", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(data) as BlobReader)
        });
        (remote, calls)
    }

    #[test]
    fn add_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(dir.path()).unwrap();
        let (digest, size) = cache.add_reader(&b"content"[..]).unwrap();
        assert_eq!(digest, Digest::from_bytes(b"content"));
        assert_eq!(size, 7);
        assert!(cache.contains(&digest));

        let blob = cache.get_blob(&digest, "text/plain").unwrap();
        assert_eq!(blob.get().unwrap(), b"content");
        assert!(blob.digest_known());
        blob.close().unwrap();
        assert!(cache.contains(&digest));
    }

    #[test]
    fn duplicate_content_is_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(dir.path()).unwrap();
        let (d1, _) = cache.add_reader(&b"same"[..]).unwrap();
        let blob = BlobAccess::for_string("text/plain", "same");
        let (d2, _) = cache.add_blob(&blob).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(cache.list().unwrap(), vec![d1]);
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn verification_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(dir.path()).unwrap();
        let expected = Digest::from_bytes(b"right");
        let err = cache.add_verified(&b"wrong"[..], &expected).unwrap_err();
        assert!(matches!(err, BlobError::DigestMismatch { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(dir.path()).unwrap();
        let digest = Digest::from_bytes(b"absent");
        assert!(cache.get_blob(&digest, "").unwrap_err().is_not_found());
        cache.remove(&digest).unwrap();
    }

    #[test]
    fn cached_access_fetches_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(BlobCache::new(dir.path()).unwrap());
        let (remote, calls) = counting_remote(b"remote data");
        let blob = cached_blob_access("text/plain", remote, CacheTarget::Cache(cache.clone()), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(blob.get().unwrap(), b"remote data");
        assert_eq!(blob.get().unwrap(), b"remote data");
        assert_eq!(blob.digest().unwrap(), Digest::from_bytes(b"remote data"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        blob.close().unwrap();
        assert!(cache.contains(&Digest::from_bytes(b"remote data")));
    }

    #[test]
    fn cached_access_uses_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(BlobCache::new(dir.path()).unwrap());
        let (digest, _) = cache.add_reader(&b"known"[..]).unwrap();
        let (remote, calls) = counting_remote(b"known");
        let blob = cached_blob_access("", remote, CacheTarget::Cache(cache), Some(digest));
        assert_eq!(blob.get().unwrap(), b"known");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cached_access_into_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let attr = CacheAttr::new(dir.path());
        let access = CachedDataAccess::new(
            BytesAccess::new("temp data"),
            CacheTarget::Temp(attr),
            Some(Digest::from_bytes(b"temp data")),
        );
        assert!(!access.is_materialized());
        assert_eq!(access.get().unwrap(), b"temp data");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        access.close().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn cached_access_rejects_tampered_content() {
        let dir = tempfile::tempdir().unwrap();
        let attr = CacheAttr::new(dir.path());
        let blob = cached_blob_access(
            "",
            BytesAccess::new("tampered"),
            CacheTarget::Temp(attr),
            Some(Digest::from_bytes(b"original")),
        );
        assert!(matches!(
            blob.get(),
            Err(BlobError::DigestMismatch { .. })
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
