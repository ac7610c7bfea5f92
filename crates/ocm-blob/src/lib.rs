//! Content-addressed blob access for OCM artifacts.
//!
//! This crate provides:
//! - **BlobAccess**: reference counted views onto one byte source
//! - **Digest**: content digests and digest-verifying readers
//! - **TempFile**: temporary files under an explicit cache root
//! - **BlobCache**: a digest-indexed disk cache for remote content

pub mod blob;
pub mod cache;
pub mod data;
pub mod digest;
pub mod error;
pub mod refcount;
pub mod temp;

pub use blob::{BlobAccess, BLOB_UNKNOWN_SIZE, MIME_OCTET};
pub use cache::{cached_blob_access, BlobCache, CacheTarget, CachedDataAccess};
pub use data::{BlobReader, DataAccess, ReaderFactory};
pub use digest::{Digest, DigestAlgorithm, DigestReader, MultiHasher, VerifyingReader};
pub use error::{BlobError, Result};
pub use temp::{CacheAttr, TempFile};
