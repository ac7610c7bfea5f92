//! Images held by the local docker daemon.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};
use crate::transport::Locator;

pub const TYPE: &str = "dockerdaemon";

/// Transport scheme of the docker daemon.
pub const SCHEME: &str = "docker";

/// Media type of an exported image archive.
pub const MIME_DOCKER_ARCHIVE: &str = "application/x-docker-image+tar";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerDaemonAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    pub image_name: String,
}

impl DockerDaemonAccessSpec {
    pub fn new(image_name: impl Into<String>) -> Self {
        DockerDaemonAccessSpec {
            type_name: super::versioned(TYPE),
            image_name: image_name.into(),
        }
    }
}

impl AccessSpec for DockerDaemonAccessSpec {
    fn kind(&self) -> &str {
        TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!("docker daemon image {}", self.image_name)
    }

    // The daemon is machine local, so the spec means nothing elsewhere.
    fn global_access_spec(&self, _ctx: &Context) -> Option<Box<dyn AccessSpec>> {
        None
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        if self.image_name.is_empty() {
            return Err(AccessError::invalid("docker daemon access", "imageName is required"));
        }
        let ctx = cv.context().clone();
        let locator = Locator::new(SCHEME, &self.image_name);
        Ok(AccessMethod::new(self.clone_box(), MIME_DOCKER_ARCHIVE, false, move || {
            Ok(super::transport_blob(&ctx, locator.clone(), MIME_DOCKER_ARCHIVE, None))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}
