//! Uploading OCI artifacts and blobs into an OCI registry.
//!
//! The target namespace is taken from the `oci` reference hint of the blob,
//! below an optional namespace prefix of the configured registry. Artifact
//! set archives are stored as artifacts and described by an `ociArtifact`
//! access spec; other blobs are stored as plain OCI blobs of the namespace.

use std::fmt;
use std::sync::Arc;

use ocm_blob::{BlobAccess, Digest};
use ocm_refhints::{ReferenceHint, ReferenceHints};
use ocm_registrations::{
    HandlerConfig, HandlerInfo, RegistrationError, RegistrationHandler, Result as RegistrationResult,
};
use serde::Deserialize;

use crate::context::Context;
use crate::error::{AccessError, Result};
use crate::methods::oci::{HINT_TYPE, SCHEME};
use crate::methods::{OciArtifactAccessSpec, OciBlobAccessSpec};
use crate::mime;
use crate::spec::AccessSpec;
use crate::transport::Locator;
use crate::upload::{BlobHandler, BlobHandlerOptions, BlobHandlerRegistry, UploadResult};

/// Registration path of the handler.
pub const REGISTRATION_NAME: &str = "ocm/ociArtifacts";

/// Handler config: a registry reference `host[:port][/prefix]`, or a table
/// with `ociRef`, or with `repository` (base URL) and `namespacePrefix`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OciUploadConfig {
    Ref(String),
    Table {
        #[serde(rename = "ociRef", default)]
        oci_ref: Option<String>,
        #[serde(default)]
        repository: Option<String>,
        #[serde(rename = "namespacePrefix", default)]
        namespace_prefix: Option<String>,
    },
}

/// Registry host and namespace prefix uploads go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciTarget {
    host: String,
    prefix: String,
}

fn strip_url_scheme(s: &str) -> &str {
    s.strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(s)
}

fn join_namespace(prefix: &str, name: &str) -> String {
    match (prefix.trim_matches('/'), name.trim_matches('/')) {
        ("", name) => name.to_string(),
        (prefix, "") => prefix.to_string(),
        (prefix, name) => format!("{prefix}/{name}"),
    }
}

fn invalid_config(detail: impl Into<String>) -> AccessError {
    AccessError::invalid("oci upload config", detail)
}

impl OciTarget {
    /// Parse `host[:port][/prefix]`. Tags and digests are not allowed.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = strip_url_scheme(reference.trim());
        let (host, prefix) = reference.split_once('/').unwrap_or((reference, ""));
        if !(host.contains(['.', ':']) || host == "localhost") {
            return Err(invalid_config(format!("{reference:?} names no registry host")));
        }
        let last = prefix.rsplit('/').next().unwrap_or_default();
        if prefix.contains('@') || last.contains(':') {
            return Err(invalid_config(format!(
                "{reference:?} must not carry a tag or digest"
            )));
        }
        Ok(OciTarget {
            host: host.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &OciUploadConfig) -> Result<Self> {
        match config {
            OciUploadConfig::Ref(reference) => Self::parse(reference),
            OciUploadConfig::Table {
                oci_ref: Some(reference),
                namespace_prefix,
                ..
            } => {
                let mut target = Self::parse(reference)?;
                if let Some(extra) = namespace_prefix {
                    target.prefix = join_namespace(&target.prefix, extra);
                }
                Ok(target)
            }
            OciUploadConfig::Table {
                oci_ref: None,
                repository: Some(base),
                namespace_prefix,
            } => {
                let host = strip_url_scheme(base.trim()).trim_end_matches('/');
                if host.is_empty() {
                    return Err(invalid_config("empty repository"));
                }
                Ok(OciTarget {
                    host: host.to_string(),
                    prefix: join_namespace(namespace_prefix.as_deref().unwrap_or_default(), ""),
                })
            }
            OciUploadConfig::Table { .. } => Err(invalid_config("ociRef or repository required")),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn namespace(&self, name: &str) -> Result<String> {
        let namespace = join_namespace(&self.prefix, name);
        if namespace.is_empty() {
            return Err(AccessError::invalid("oci reference hint", "empty namespace"));
        }
        Ok(namespace)
    }
}

impl fmt::Display for OciTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.host)
        } else {
            write!(f, "{}/{}", self.host, self.prefix)
        }
    }
}

/// Split a hint reference `name[:tag][@digest]`.
fn split_reference(reference: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, digest) = match reference.rsplit_once('@') {
        Some((rest, digest)) => (rest, Some(digest)),
        None => (reference, None),
    };
    match rest.rsplit_once(':') {
        Some((name, tag)) if !name.is_empty() && !tag.contains('/') => (name, Some(tag), digest),
        _ => (rest, None, digest),
    }
}

/// Uploads into one OCI registry.
#[derive(Debug, Clone)]
pub struct OciBlobHandler {
    target: OciTarget,
}

impl OciBlobHandler {
    pub fn new(target: OciTarget) -> Self {
        OciBlobHandler { target }
    }
}

impl BlobHandler for OciBlobHandler {
    fn store_blob(
        &self,
        blob: &BlobAccess,
        artifact_type: &str,
        hints: &ReferenceHints,
        _global: Option<&dyn AccessSpec>,
        ctx: &Context,
    ) -> Result<Option<UploadResult>> {
        let Some(reference) = hints.get_reference(&[HINT_TYPE]) else {
            tracing::debug!(%artifact_type, "no oci hint, skipping oci upload");
            return Ok(None);
        };
        let (name, tag, requested) = split_reference(reference);
        let namespace = self.target.namespace(name)?;
        let digest = blob.digest()?;
        if let Some(requested) = requested {
            let requested = Digest::parse(requested)?;
            if requested != digest {
                return Err(AccessError::Upload {
                    target: self.target.to_string(),
                    detail: format!("corrupted digest: hint requests {requested}, but found {digest}"),
                });
            }
        }

        let tag = tag.map(|t| format!(":{t}")).unwrap_or_default();
        let repository = format!("{}/{namespace}", self.target.host);
        let spec: Box<dyn AccessSpec> = if mime::is_artifact_archive(blob.mime_type()) {
            let image = format!("{repository}{tag}@{digest}");
            ctx.store(&Locator::new(SCHEME, &image), blob)?;
            tracing::info!(%image, "uploaded oci artifact");
            Box::new(OciArtifactAccessSpec::new(image))
        } else {
            let spec = OciBlobAccessSpec::new(&repository, blob.mime_type(), digest, blob.size_or_unknown());
            ctx.store(&spec.locator(), blob)?;
            tracing::info!(%repository, digest = %spec.digest, "uploaded oci blob");
            Box::new(spec)
        };
        let hint = ReferenceHint::new(HINT_TYPE, format!("{namespace}{tag}"), false)?;
        Ok(Some(UploadResult {
            spec,
            hint: Some(hint),
        }))
    }
}

/// Registers [`OciBlobHandler`]s configured with a target registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct OciRegistrationHandler;

impl RegistrationHandler<BlobHandlerRegistry, BlobHandlerOptions> for OciRegistrationHandler {
    fn register_by_name(
        &self,
        residual: &str,
        target: &BlobHandlerRegistry,
        config: &HandlerConfig,
        opts: &BlobHandlerOptions,
    ) -> RegistrationResult<bool> {
        if !residual.is_empty() {
            return Ok(false);
        }
        let Some(config) = config.decode::<OciUploadConfig>()? else {
            return Err(RegistrationError::InvalidConfig {
                detail: "oci target registry required".into(),
            });
        };
        let oci_target =
            OciTarget::from_config(&config).map_err(|e| RegistrationError::handler(REGISTRATION_NAME, e))?;
        tracing::info!(registry = %oci_target, "registering oci upload handler");
        target.register(Arc::new(OciBlobHandler::new(oci_target)), opts);
        Ok(true)
    }

    fn handler_infos(&self, _target: &BlobHandlerRegistry) -> Vec<HandlerInfo> {
        vec![HandlerInfo::leaf("", "uploading OCI artifacts").with_description(
            "Uploads artifacts with an oci reference hint into the registry \
             given by the config, a reference host[:port][/prefix] or \
             {\"ociRef\": ...} or {\"repository\": ..., \"namespacePrefix\": ...}.",
        )]
    }
}
