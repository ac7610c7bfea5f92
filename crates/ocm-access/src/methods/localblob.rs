//! Blobs stored with the component version itself.

use std::sync::Arc;

use ocm_refhints::{parse_hints, ReferenceHints};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};

pub const TYPE: &str = "localBlob";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBlobAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    /// Key of the blob in the component version's blob store.
    pub local_reference: String,
    pub media_type: String,
    /// Reference hints for re-uploading the blob, in hint notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_name: Option<String>,
    /// An equivalent spec usable without the component version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_access: Option<Value>,
}

impl LocalBlobAccessSpec {
    pub fn new(local_reference: impl Into<String>, media_type: impl Into<String>) -> Self {
        LocalBlobAccessSpec {
            type_name: super::versioned(TYPE),
            local_reference: local_reference.into(),
            media_type: media_type.into(),
            reference_name: None,
            global_access: None,
        }
    }

    pub fn with_reference_name(mut self, hints: impl Into<String>) -> Self {
        self.reference_name = Some(hints.into());
        self
    }

    pub fn with_global_access(mut self, global: &dyn AccessSpec) -> Result<Self> {
        self.global_access = Some(global.encode()?);
        Ok(self)
    }
}

impl AccessSpec for LocalBlobAccessSpec {
    fn kind(&self) -> &str {
        TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        match &self.reference_name {
            Some(name) => format!("Local blob {}[{name}]", self.local_reference),
            None => format!("Local blob {}", self.local_reference),
        }
    }

    fn is_local(&self, _ctx: &Context) -> bool {
        true
    }

    fn global_access_spec(&self, ctx: &Context) -> Option<Box<dyn AccessSpec>> {
        let raw = self.global_access.clone()?;
        match ctx.scheme().decode(raw) {
            Ok(spec) => Some(spec),
            Err(err) => {
                tracing::warn!(reference = %self.local_reference, %err, "ignoring invalid global access");
                None
            }
        }
    }

    fn reference_hint(&self, _cv: &ComponentVersion) -> Option<String> {
        self.reference_name.clone().filter(|n| !n.is_empty())
    }

    fn reference_hints(&self, _cv: &ComponentVersion) -> ReferenceHints {
        match self.reference_name.as_deref() {
            Some(name) if !name.is_empty() => parse_hints(name, true),
            _ => ReferenceHints::new(),
        }
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        if self.local_reference.is_empty() {
            return Err(AccessError::invalid("local blob access", "localReference is required"));
        }
        let cv = Arc::clone(cv);
        let reference = self.local_reference.clone();
        let media_type = self.media_type.clone();
        Ok(AccessMethod::new(self.clone_box(), self.media_type.clone(), true, move || {
            cv.get_local_blob(&reference, &media_type)
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::{testing, MavenAccessSpec};
    use ocm_blob::BlobAccess;
    use serde_json::json;

    #[test]
    fn resolves_from_component_version() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let cv = testing::component_version(&ctx, dir.path());
        let reference = cv
            .add_local_blob(&BlobAccess::for_string("text/plain", "local content"))
            .unwrap();

        let spec = LocalBlobAccessSpec::new(&reference, "text/plain");
        assert!(spec.is_local(&ctx));
        assert!(spec.global_access_spec(&ctx).is_none());
        let method = spec.access_method(&cv).unwrap();
        assert!(method.is_local());
        assert_eq!(method.mime_type(), "text/plain");
        assert_eq!(method.get().unwrap(), b"local content");
        method.close().unwrap();

        let missing = LocalBlobAccessSpec::new(
            ocm_blob::Digest::from_bytes(b"absent").file_name(),
            "text/plain",
        );
        assert!(missing.access_method(&cv).unwrap().get().unwrap_err().is_not_found());
    }

    #[test]
    fn global_access_and_hints() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let cv = testing::component_version(&ctx, dir.path());
        let global = MavenAccessSpec::new("https://repo.acme.org", "org.acme", "lib", "1.0");
        let spec = LocalBlobAccessSpec::new("sha256.00", "application/x-tgz")
            .with_reference_name("maven::org.acme:lib:1.0")
            .with_global_access(&global)
            .unwrap();

        let decoded = spec.global_access_spec(&ctx).unwrap();
        assert_eq!(decoded.kind(), "maven");
        assert_eq!(decoded.encode().unwrap(), global.encode().unwrap());

        let hints = spec.reference_hints(&cv);
        assert_eq!(hints.get_reference(&["maven"]), Some("org.acme:lib:1.0"));
        assert!(hints.iter().all(|h| h.is_implicit()));

        let wire = spec.encode().unwrap();
        assert_eq!(wire["type"], json!("localBlob/v1"));
        assert_eq!(wire["referenceName"], json!("maven::org.acme:lib:1.0"));
        let back: LocalBlobAccessSpec = serde_json::from_value(wire).unwrap();
        assert_eq!(back, spec);
    }
}
