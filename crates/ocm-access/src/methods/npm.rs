//! npm packages in an npm registry.
//!
//! The version document at `<registry>/<package>/<version>` names the
//! tarball and its published checksums. The tarball is verified against
//! every checksum given.

use std::collections::BTreeMap;
use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ocm_blob::{BlobReader, Digest, DigestAlgorithm, VerifyingReader};
use ocm_refhints::ReferenceHints;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ComponentVersion, Context};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::mime;
use crate::spec::{encode_spec, AccessSpec, AccessSpecClone};
use crate::transport::Locator;

pub const TYPE: &str = "npm";
pub const HINT_TYPE: &str = "npm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpmAccessSpec {
    #[serde(rename = "type")]
    type_name: String,
    /// Base URL of the registry.
    pub registry: String,
    pub package: String,
    pub version: String,
}

impl NpmAccessSpec {
    pub fn new(
        registry: impl Into<String>,
        package: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        NpmAccessSpec {
            type_name: super::versioned(TYPE),
            registry: registry.into(),
            package: package.into(),
            version: version.into(),
        }
    }

    /// `package@version`.
    pub fn reference(&self) -> String {
        format!("{}@{}", self.package, self.version)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("registry", &self.registry),
            ("package", &self.package),
            ("version", &self.version),
        ] {
            if value.is_empty() {
                return Err(AccessError::invalid("npm access", format!("{name} is required")));
            }
        }
        Ok(())
    }

    fn version_locator(&self) -> Result<Locator> {
        Ok(Locator::from_url(&self.registry)?
            .join(&self.package)
            .join(&self.version))
    }
}

/// The `dist` section of a version document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Dist {
    #[serde(default)]
    pub tarball: String,
    #[serde(default)]
    pub shasum: String,
    #[serde(default)]
    pub integrity: String,
}

impl Dist {
    /// Digests the tarball must match.
    pub fn checksums(&self) -> Result<Vec<Digest>> {
        let mut checks = Vec::new();
        if !self.integrity.is_empty() {
            checks.push(parse_integrity(&self.integrity)?);
        }
        if !self.shasum.is_empty() {
            checks.push(Digest::new(DigestAlgorithm::Sha1, self.shasum.to_ascii_lowercase())?);
        }
        Ok(checks)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VersionDocument {
    #[serde(default)]
    name: String,
    #[serde(default)]
    dist: Dist,
}

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    #[serde(default)]
    versions: BTreeMap<String, VersionDocument>,
}

/// Decode a subresource integrity value (`sha512-<base64>`). Of several
/// space separated entries the first supported one is used.
pub fn parse_integrity(integrity: &str) -> Result<Digest> {
    for entry in integrity.split_whitespace() {
        let Some((algorithm, encoded)) = entry.split_once('-') else {
            continue;
        };
        let Ok(algorithm) = algorithm.parse::<DigestAlgorithm>() else {
            continue;
        };
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| AccessError::invalid("npm integrity", format!("{entry}: {e}")))?;
        return Ok(Digest::new(algorithm, hex::encode(raw))?);
    }
    Err(AccessError::invalid("npm integrity", integrity))
}

/// Read the version document, falling back to the project document for
/// registries that do not serve single versions.
fn package_version(ctx: &Context, spec: &NpmAccessSpec) -> Result<Dist> {
    let locator = spec.version_locator()?;
    tracing::debug!(%locator, "querying npm registry");
    let mut data = Vec::new();
    ctx.fetch(&locator)?
        .read_to_end(&mut data)
        .map_err(|e| AccessError::io(format!("reading {locator}"), e))?;
    if let Ok(doc) = serde_json::from_slice::<VersionDocument>(&data) {
        if !doc.dist.tarball.is_empty() {
            tracing::debug!(name = %doc.name, tarball = %doc.dist.tarball, "found npm package");
            return Ok(doc.dist);
        }
    }
    let project: ProjectDocument = serde_json::from_slice(&data)
        .map_err(|e| AccessError::invalid("npm metadata", format!("{locator}: {e}")))?;
    project
        .versions
        .get(&spec.version)
        .filter(|v| !v.dist.tarball.is_empty())
        .map(|v| v.dist.clone())
        .ok_or_else(|| AccessError::not_found("npm package version", spec.reference()))
}

impl AccessSpec for NpmAccessSpec {
    fn kind(&self) -> &str {
        TYPE
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn describe(&self, _ctx: &Context) -> String {
        format!("NPM package {} in registry {}", self.reference(), self.registry)
    }

    fn reference_hint(&self, _cv: &ComponentVersion) -> Option<String> {
        Some(self.reference())
    }

    fn reference_hints(&self, _cv: &ComponentVersion) -> ReferenceHints {
        super::implicit_hint(HINT_TYPE, self.reference())
    }

    fn access_method(&self, cv: &ComponentVersion) -> Result<AccessMethod> {
        self.validate()?;
        let ctx = cv.context().clone();
        let spec = self.clone();
        Ok(AccessMethod::new(self.clone_box(), mime::MIME_TGZ, false, move || {
            let dist = package_version(&ctx, &spec)?;
            let tarball = Locator::from_url(&dist.tarball)?;
            let checks = dist.checksums()?;
            if checks.is_empty() {
                tracing::warn!(package = %spec.reference(), "no checksum published");
            }
            let origin = tarball.to_string();
            Ok(super::remote_blob(&ctx, mime::MIME_TGZ, origin, None, move |ctx| {
                let mut reader: BlobReader = ctx.fetch(&tarball)?;
                for expected in &checks {
                    reader = Box::new(VerifyingReader::new(reader, expected.clone()));
                }
                Ok(reader)
            }))
        }))
    }

    fn encode(&self) -> Result<Value> {
        encode_spec(self)
    }
}
