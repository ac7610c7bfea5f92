//! Objects in an S3 bucket.
//!
//! Content is read through the transport registered for scheme `s3` with
//! location `<bucket>/<key>`; region and object version travel as locator
//! attributes. Credentials are the transport's business.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::mime;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};
use crate::transport::Locator;

pub const TYPE: &str = "s3";
pub const LEGACY_TYPE: &str = "S3";

/// Transport scheme used for S3 objects.
pub const SCHEME: &str = "s3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3AccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl S3AccessSpec {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        S3AccessSpec {
            type_name: super::versioned(TYPE),
            region: None,
            bucket: bucket.into(),
            key: key.into(),
            version: None,
            media_type: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn locator(&self) -> Locator {
        let mut locator = Locator::new(SCHEME, format!("{}/{}", self.bucket, self.key));
        if let Some(region) = self.region.as_deref().filter(|r| !r.is_empty()) {
            locator = locator.with_attribute("region", region);
        }
        if let Some(version) = self.version.as_deref().filter(|v| !v.is_empty()) {
            locator = locator.with_attribute("version", version);
        }
        locator
    }
}

impl AccessSpec for S3AccessSpec {
    fn kind(&self) -> &str {
        TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!("S3 key {} in bucket {}", self.key, self.bucket)
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        if self.bucket.is_empty() || self.key.is_empty() {
            return Err(AccessError::invalid("s3 access", "bucket and key are required"));
        }
        let media_type = match self.media_type.as_deref() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => mime::MIME_OCTET.to_string(),
        };
        let ctx = cv.context().clone();
        let locator = self.locator();
        let blob_mime = media_type.clone();
        Ok(AccessMethod::new(self.clone_box(), media_type, false, move || {
            Ok(super::transport_blob(&ctx, locator.clone(), blob_mime.clone(), None))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::transport::Transport;
    use ocm_blob::BlobReader;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<Locator>>,
    }

    impl Transport for RecordingTransport {
        fn fetch(&self, locator: &Locator) -> Result<BlobReader> {
            self.seen.lock().push(locator.clone());
            Ok(Box::new(std::io::Cursor::new(b"object".to_vec())))
        }

        fn exists(&self, _locator: &Locator) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn decodes_minimal_record() {
        let spec: S3AccessSpec =
            serde_json::from_value(json!({"type": "s3", "bucket": "b", "key": "k"})).unwrap();
        assert_eq!(spec.type_name(), "s3");
        assert_eq!(spec.region, None);
        assert_eq!(spec.locator().to_string(), "s3://b/k");
    }

    #[test]
    fn fetches_through_s3_transport() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let ctx = Context::builder()
            .cache_dir(dir.path().join("cache"))
            .retry_policy(RetryPolicy::no_retry())
            .transport(SCHEME, transport.clone())
            .build()
            .unwrap();
        let cv = crate::methods::testing::component_version(&ctx, dir.path());

        let spec = S3AccessSpec::new("bucket", "path/obj.bin")
            .with_region("eu-west-1")
            .with_version("7");
        let method = spec.access_method(&cv).unwrap();
        assert_eq!(method.mime_type(), mime::MIME_OCTET);
        assert!(transport.seen.lock().is_empty());
        assert_eq!(method.get().unwrap(), b"object");

        let seen = transport.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].location, "bucket/path/obj.bin");
        assert_eq!(seen[0].attribute("region"), Some("eu-west-1"));
        assert_eq!(seen[0].attribute("version"), Some("7"));
    }
}
