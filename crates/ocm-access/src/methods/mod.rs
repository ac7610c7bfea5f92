//! Built-in access method technologies.
//!
//! Each technology contributes an access spec type. Remote content is read
//! through the context's transports and materialized once into the blob
//! cache (or a temporary file) on first use.

pub mod docker;
pub mod git;
pub mod localblob;
pub mod maven;
pub mod npm;
pub mod oci;
pub mod s3;
pub mod wget;

use ocm_blob::{cached_blob_access, BlobAccess, BlobReader, Digest, VerifyingReader};
use ocm_blob::data::ReaderFactoryAccess;
use ocm_refhints::{ReferenceHint, ReferenceHints};

use crate::context::Context;
use crate::error::{into_blob_error, Result};
use crate::spec::AccessSpecScheme;
use crate::transport::Locator;

pub use docker::DockerDaemonAccessSpec;
pub use git::GitAccessSpec;
pub use localblob::LocalBlobAccessSpec;
pub use maven::MavenAccessSpec;
pub use npm::NpmAccessSpec;
pub use oci::{OciArtifactAccessSpec, OciBlobAccessSpec};
pub use s3::S3AccessSpec;
pub use wget::WgetAccessSpec;

/// Type version of all built-in access spec types.
pub const V1: &str = "v1";

/// A scheme with all built-in access spec types.
pub fn default_scheme() -> AccessSpecScheme {
    let scheme = AccessSpecScheme::new();
    scheme.register_type::<LocalBlobAccessSpec>(localblob::TYPE, V1, &[]);
    scheme.register_type::<MavenAccessSpec>(maven::TYPE, V1, &[maven::LEGACY_TYPE]);
    scheme.register_type::<NpmAccessSpec>(npm::TYPE, V1, &[]);
    scheme.register_type::<S3AccessSpec>(s3::TYPE, V1, &[s3::LEGACY_TYPE]);
    scheme.register_type::<GitAccessSpec>(git::TYPE, V1, &[git::GITHUB_TYPE]);
    scheme.register_type::<OciArtifactAccessSpec>(oci::ARTIFACT_TYPE, V1, &[oci::LEGACY_ARTIFACT_TYPE]);
    scheme.register_type::<OciBlobAccessSpec>(oci::BLOB_TYPE, V1, &[]);
    scheme.register_type::<WgetAccessSpec>(wget::TYPE, V1, &[]);
    scheme.register_type::<DockerDaemonAccessSpec>(docker::TYPE, V1, &[]);
    scheme
}

/// The type name a freshly constructed spec carries.
pub(crate) fn versioned(kind: &str) -> String {
    format!("{kind}/{V1}")
}

/// The implicit hint a technology derives from its own reference.
pub(crate) fn implicit_hint(hint_type: &str, reference: impl Into<String>) -> ReferenceHints {
    match ReferenceHint::new(hint_type, reference, true) {
        Ok(hint) => hint.into(),
        Err(err) => {
            tracing::warn!(%hint_type, %err, "cannot derive implicit hint");
            ReferenceHints::new()
        }
    }
}

/// A lazily fetched blob over content opened by `open`.
///
/// With `expected` the content is verified and cached under that digest.
pub(crate) fn remote_blob<F>(
    ctx: &Context,
    mime_type: impl Into<String>,
    origin: impl Into<String>,
    expected: Option<Digest>,
    open: F,
) -> BlobAccess
where
    F: Fn(&Context) -> Result<BlobReader> + Send + Sync + 'static,
{
    let origin = origin.into();
    let context = ctx.clone();
    let what = format!("fetching {origin}");
    let access = ReaderFactoryAccess::new(origin, move || {
        open(&context).map_err(|e| into_blob_error(e, what.clone()))
    });
    cached_blob_access(mime_type, access, ctx.cache_target(), expected)
}

/// A lazily fetched blob over the content at `locator`.
///
/// `verify` checks the content against a digest of any algorithm while
/// streaming; the cached copy is still indexed by its canonical digest.
pub(crate) fn transport_blob(
    ctx: &Context,
    locator: Locator,
    mime_type: impl Into<String>,
    verify: Option<Digest>,
) -> BlobAccess {
    let origin = locator.to_string();
    remote_blob(ctx, mime_type, origin, None, move |ctx| {
        let reader = ctx.fetch(&locator)?;
        let reader: BlobReader = match &verify {
            Some(expected) => Box::new(VerifyingReader::new(reader, expected.clone())),
            None => reader,
        };
        Ok(reader)
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::AccessError;
    use crate::transport::Transport;

    #[test]
    fn all_types_registered() {
        let scheme = default_scheme();
        for name in [
            "localBlob",
            "maven/v1",
            "mvn",
            "npm",
            "s3/v1",
            "git",
            "gitHub/v1",
            "ociArtifact",
            "ociRegistry",
            "ociBlob/v1",
            "wget",
            "dockerdaemon/v1",
        ] {
            assert!(scheme.is_known(name), "{name}");
        }
    }

    struct FlakyTransport {
        failures: std::sync::atomic::AtomicUsize,
    }

    impl Transport for FlakyTransport {
        fn fetch(&self, _locator: &Locator) -> Result<BlobReader> {
            use std::sync::atomic::Ordering;
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(AccessError::retriable(AccessError::Transport {
                    scheme: "flaky".into(),
                    detail: "timeout".into(),
                }));
            }
            Ok(Box::new(std::io::Cursor::new(b"remote".to_vec())))
        }

        fn exists(&self, _locator: &Locator) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn transport_blob_retries_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = Arc::new(FlakyTransport {
            failures: std::sync::atomic::AtomicUsize::new(2),
        });
        let ctx = Context::builder()
            .cache_dir(dir.path())
            .retry_policy(crate::retry::RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            })
            .transport("flaky", flaky)
            .build()
            .unwrap();
        let blob = transport_blob(&ctx, Locator::new("flaky", "x"), "text/plain", None);
        assert_eq!(blob.get().unwrap(), b"remote");
        assert_eq!(blob.get().unwrap(), b"remote");
        assert_eq!(blob.digest().unwrap(), Digest::from_bytes(b"remote"));
        assert_eq!(ctx.blob_cache().unwrap().list().unwrap().len(), 1);
    }

    #[test]
    fn transport_blob_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        std::fs::write(dir.path().join("f"), b"content").unwrap();
        let wrong = Digest::from_bytes_with(ocm_blob::DigestAlgorithm::Sha1, b"other");
        let blob = transport_blob(&ctx, Locator::file(dir.path().join("f")), "", Some(wrong));
        let err = AccessError::from(blob.get().unwrap_err());
        assert!(matches!(err, AccessError::Blob(ocm_blob::BlobError::DigestMismatch { .. })));
        let right = Digest::from_bytes_with(ocm_blob::DigestAlgorithm::Sha1, b"content");
        let blob = transport_blob(&ctx, Locator::file(dir.path().join("f")), "", Some(right));
        assert_eq!(blob.get().unwrap(), b"content");
    }
}
