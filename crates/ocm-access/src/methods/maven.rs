//! Maven artifacts in a Maven repository.

use ocm_refhints::ReferenceHints;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::Result;
use crate::maven::{Coordinates, Repository};
use crate::method::AccessMethod;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};

pub const TYPE: &str = "maven";
pub const LEGACY_TYPE: &str = "mvn";

/// Reference hint type for Maven coordinates.
pub const HINT_TYPE: &str = "maven";

/// A package, file set, or single file of a GAV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MavenAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    /// Base URL of the repository (`https://...`, `file://...`).
    pub repo_url: String,
    #[serde(flatten)]
    pub coordinates: Coordinates,
}

impl MavenAccessSpec {
    pub fn new(
        repo_url: impl Into<String>,
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::for_coordinates(repo_url, Coordinates::new(group_id, artifact_id, version))
    }

    pub fn for_coordinates(repo_url: impl Into<String>, coordinates: Coordinates) -> Self {
        MavenAccessSpec {
            type_name: super::versioned(TYPE),
            repo_url: repo_url.into(),
            coordinates,
        }
    }
}

impl AccessSpec for MavenAccessSpec {
    fn kind(&self) -> &str {
        TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!(
            "Maven package {} in repository {}",
            self.coordinates, self.repo_url
        )
    }

    fn reference_hint(&self, _cv: &ComponentVersion) -> Option<String> {
        Some(self.coordinates.reference())
    }

    fn reference_hints(&self, _cv: &ComponentVersion) -> ReferenceHints {
        super::implicit_hint(HINT_TYPE, self.coordinates.reference())
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        let ctx = cv.context().clone();
        let repository = Repository::from_url(&self.repo_url)?;
        let coordinates = self.coordinates.clone();
        let mime_type = coordinates.mime_type();
        let blob_mime = mime_type.clone();
        Ok(AccessMethod::new(self.clone_box(), mime_type, false, move || {
            if !coordinates.is_file() {
                return repository.package(&ctx, &coordinates);
            }
            let repository = repository.clone();
            let file = coordinates.clone();
            let origin = format!("{} in {}", file, repository.url());
            Ok(super::remote_blob(&ctx, blob_mime.clone(), origin, None, move |ctx| {
                repository.download(ctx, &file)
            }))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}
