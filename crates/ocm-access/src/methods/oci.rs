//! OCI artifacts and single OCI blobs.
//!
//! Both read through the transport registered for scheme `oci`. An
//! artifact is delivered as an artifact set archive; a blob is addressed as
//! `<repository>@<digest>` and verified against its digest.

use ocm_blob::{Digest, BLOB_UNKNOWN_SIZE};
use ocm_refhints::ReferenceHints;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::mime;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};
use crate::transport::Locator;

pub const ARTIFACT_TYPE: &str = "ociArtifact";
pub const LEGACY_ARTIFACT_TYPE: &str = "ociRegistry";
pub const BLOB_TYPE: &str = "ociBlob";

/// Transport scheme for OCI registries.
pub const SCHEME: &str = "oci";

/// Reference hint type for OCI image references.
pub const HINT_TYPE: &str = "oci";

/// Media type of an artifact set archive holding one image.
pub const MIME_ARTIFACT_SET: &str = "application/vnd.oci.image.manifest.v1+tar+gzip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciArtifactAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    /// `host[:port]/repository[:tag][@digest]`.
    pub image_reference: String,
}

impl OciArtifactAccessSpec {
    pub fn new(image_reference: impl Into<String>) -> Self {
        OciArtifactAccessSpec {
            type_name: super::versioned(ARTIFACT_TYPE),
            image_reference: image_reference.into(),
        }
    }

    /// The reference without its registry host.
    pub fn repository_reference(&self) -> &str {
        match self.image_reference.split_once('/') {
            Some((host, rest)) if host.contains(['.', ':']) || host == "localhost" => rest,
            _ => &self.image_reference,
        }
    }
}

impl AccessSpec for OciArtifactAccessSpec {
    fn kind(&self) -> &str {
        ARTIFACT_TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!("OCI artifact {}", self.image_reference)
    }

    fn reference_hint(&self, _cv: &ComponentVersion) -> Option<String> {
        Some(self.repository_reference().to_string())
    }

    fn reference_hints(&self, _cv: &ComponentVersion) -> ReferenceHints {
        super::implicit_hint(HINT_TYPE, self.repository_reference())
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        if self.image_reference.is_empty() {
            return Err(AccessError::invalid("oci artifact access", "imageReference is required"));
        }
        let ctx = cv.context().clone();
        let locator = Locator::new(SCHEME, &self.image_reference);
        Ok(AccessMethod::new(self.clone_box(), MIME_ARTIFACT_SET, false, move || {
            Ok(super::transport_blob(&ctx, locator.clone(), MIME_ARTIFACT_SET, None))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}

fn unknown_size() -> i64 {
    BLOB_UNKNOWN_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciBlobAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    /// Repository holding the blob.
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    pub digest: Digest,
    #[serde(default = "unknown_size")]
    pub size: i64,
}

impl OciBlobAccessSpec {
    pub fn new(
        reference: impl Into<String>,
        media_type: impl Into<String>,
        digest: Digest,
        size: i64,
    ) -> Self {
        OciBlobAccessSpec {
            type_name: super::versioned(BLOB_TYPE),
            reference: reference.into(),
            media_type: media_type.into(),
            digest,
            size,
        }
    }

    pub fn locator(&self) -> Locator {
        Locator::new(SCHEME, format!("{}@{}", self.reference, self.digest))
    }
}

impl AccessSpec for OciBlobAccessSpec {
    fn kind(&self) -> &str {
        BLOB_TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!("OCI blob {} in repository {}", self.digest, self.reference)
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        if self.reference.is_empty() {
            return Err(AccessError::invalid("oci blob access", "ref is required"));
        }
        let media_type = if self.media_type.is_empty() {
            mime::MIME_OCTET.to_string()
        } else {
            self.media_type.clone()
        };
        let ctx = cv.context().clone();
        let locator = self.locator();
        let digest = self.digest.clone();
        let blob_mime = media_type.clone();
        Ok(AccessMethod::new(self.clone_box(), media_type, false, move || {
            let locator = locator.clone();
            let origin = locator.to_string();
            Ok(super::remote_blob(
                &ctx,
                blob_mime.clone(),
                origin,
                Some(digest.clone()),
                move |ctx| ctx.fetch(&locator),
            ))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::testing;
    use crate::retry::RetryPolicy;
    use crate::transport::Transport;
    use ocm_blob::{BlobError, BlobReader};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Registry {
        content: Vec<u8>,
        fetches: AtomicUsize,
    }

    impl Transport for Registry {
        fn fetch(&self, _locator: &Locator) -> Result<BlobReader> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(std::io::Cursor::new(self.content.clone())))
        }

        fn exists(&self, _locator: &Locator) -> Result<bool> {
            Ok(true)
        }
    }

    fn registry_context(dir: &std::path::Path, content: &[u8]) -> (Context, Arc<Registry>) {
        let registry = Arc::new(Registry {
            content: content.to_vec(),
            fetches: AtomicUsize::new(0),
        });
        let ctx = Context::builder()
            .cache_dir(dir.join("cache"))
            .retry_policy(RetryPolicy::no_retry())
            .transport(SCHEME, registry.clone())
            .build()
            .unwrap();
        (ctx, registry)
    }

    #[test]
    fn artifact_hint_and_legacy_type() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let cv = testing::component_version(&ctx, dir.path());
        let spec = OciArtifactAccessSpec::new("ghcr.io/acme/app:1.0");
        assert_eq!(spec.reference_hints(&cv).serialize(false), "oci::acme/app:1.0");
        assert_eq!(
            spec.encode().unwrap(),
            json!({"type": "ociArtifact/v1", "imageReference": "ghcr.io/acme/app:1.0"})
        );

        let legacy = ctx
            .decode_access_spec(json!({"type": "ociRegistry", "imageReference": "acme/app:1.0"}))
            .unwrap();
        assert_eq!(legacy.kind(), ARTIFACT_TYPE);
        assert_eq!(legacy.type_name(), "ociRegistry");
        assert_eq!(legacy.reference_hint(&cv).as_deref(), Some("acme/app:1.0"));
    }

    #[test]
    fn blob_verified_and_cached_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, registry) = registry_context(dir.path(), b"layer");
        let cv = testing::component_version(&ctx, dir.path());
        let spec = OciBlobAccessSpec::new("ghcr.io/acme/app", "", Digest::from_bytes(b"layer"), 5);
        assert_eq!(
            spec.locator().to_string(),
            format!("oci://ghcr.io/acme/app@{}", Digest::from_bytes(b"layer"))
        );

        let method = spec.access_method(&cv).unwrap();
        assert_eq!(method.mime_type(), mime::MIME_OCTET);
        assert_eq!(method.get().unwrap(), b"layer");

        // second method finds the content in the cache
        let again = spec.access_method(&cv).unwrap();
        assert_eq!(again.get().unwrap(), b"layer");
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blob_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = registry_context(dir.path(), b"tampered");
        let cv = testing::component_version(&ctx, dir.path());
        let spec = OciBlobAccessSpec::new("r", "", Digest::from_bytes(b"layer"), 5);
        let err = spec.access_method(&cv).unwrap().get().unwrap_err();
        assert!(matches!(err, AccessError::Blob(BlobError::DigestMismatch { .. })), "{err}");
        assert!(ctx.blob_cache().unwrap().list().unwrap().is_empty());
    }

    #[test]
    fn blob_size_defaults_to_unknown() {
        let digest = Digest::from_bytes(b"x");
        let spec: OciBlobAccessSpec = serde_json::from_value(json!({
            "type": "ociBlob",
            "ref": "r",
            "digest": digest.to_string(),
        }))
        .unwrap();
        assert_eq!(spec.size, BLOB_UNKNOWN_SIZE);
        assert_eq!(spec.digest, digest);
    }
}
