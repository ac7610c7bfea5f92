//! Plain downloads from a URL.
//!
//! The transport is chosen by the URL scheme, so any registered transport
//! (and `file://` out of the box) can serve a `wget` spec.

use ocm_refhints::ReferenceHints;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::mime;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};
use crate::transport::Locator;

pub const TYPE: &str = "wget";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WgetAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl WgetAccessSpec {
    pub fn new(url: impl Into<String>) -> Self {
        WgetAccessSpec {
            type_name: super::versioned(TYPE),
            url: url.into(),
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    fn mime_type(&self) -> String {
        match self.media_type.as_deref() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => mime::MIME_OCTET.to_string(),
        }
    }
}

impl AccessSpec for WgetAccessSpec {
    fn kind(&self) -> &str {
        TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!("Files from {}", self.url)
    }

    fn reference_hints(&self, _cv: &ComponentVersion) -> ReferenceHints {
        ReferenceHints::new()
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        if self.url.is_empty() {
            return Err(AccessError::invalid("wget access", "url is required"));
        }
        let locator = Locator::from_url(&self.url)?;
        let ctx = cv.context().clone();
        let mime_type = self.mime_type();
        let blob_mime = mime_type.clone();
        Ok(AccessMethod::new(self.clone_box(), mime_type, false, move || {
            Ok(super::transport_blob(&ctx, locator.clone(), blob_mime.clone(), None))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}
