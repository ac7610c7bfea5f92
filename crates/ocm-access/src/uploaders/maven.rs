//! Uploading Maven artifacts into a Maven repository.
//!
//! The target coordinates come from the `maven` reference hint of the
//! blob. A gzipped tar archive with package coordinates is uploaded entry
//! by entry; anything else must name a single file.

use std::sync::Arc;

use flate2::read::GzDecoder;
use ocm_blob::BlobAccess;
use ocm_refhints::{ReferenceHint, ReferenceHints};
use ocm_registrations::{
    HandlerConfig, HandlerInfo, RegistrationError, RegistrationHandler, Result as RegistrationResult,
};
use serde::Deserialize;

use crate::context::Context;
use crate::error::{AccessError, Result};
use crate::maven::{is_resource, Coordinates, Repository};
use crate::methods::maven::HINT_TYPE;
use crate::methods::MavenAccessSpec;
use crate::mime;
use crate::spec::AccessSpec;
use crate::upload::{BlobHandler, BlobHandlerOptions, BlobHandlerRegistry, UploadResult};

/// Registration path of the handler.
pub const REGISTRATION_NAME: &str = "ocm/mavenPackage";

/// Artifact type handled when registered without one.
pub const ARTIFACT_TYPE: &str = "mavenPackage";

/// Handler config: the repository URL, as bare string or `{"url": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RepositoryConfig {
    Url(String),
    Table { url: String },
}

impl RepositoryConfig {
    pub fn url(&self) -> &str {
        match self {
            RepositoryConfig::Url(url) | RepositoryConfig::Table { url } => url,
        }
    }
}

/// Uploads into one Maven repository.
#[derive(Debug, Clone)]
pub struct MavenBlobHandler {
    repository: Repository,
}

impl MavenBlobHandler {
    pub fn new(repository: Repository) -> Self {
        MavenBlobHandler { repository }
    }

    fn upload_file(&self, ctx: &Context, coords: &Coordinates, blob: &BlobAccess) -> Result<()> {
        self.repository.upload(ctx, coords, blob).map_err(|e| match e {
            AccessError::Upload { .. } => e,
            other => AccessError::Upload {
                target: self.repository.url(),
                detail: format!("{coords}: {other}"),
            },
        })
    }

    fn upload_archive(&self, ctx: &Context, coords: &Coordinates, blob: &BlobAccess) -> Result<usize> {
        let mut archive = tar::Archive::new(GzDecoder::new(blob.reader()?));
        let entries = archive
            .entries()
            .map_err(|e| AccessError::io("reading maven package", e))?;
        let mut uploaded = 0;
        for entry in entries {
            let mut entry = entry.map_err(|e| AccessError::io("reading maven package", e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry
                .path()
                .map_err(|e| AccessError::io("reading maven package entry", e))?
                .into_owned();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if !is_resource(&name) {
                tracing::debug!(%name, "skipping checksum file");
                continue;
            }
            let mut file = coords.clone();
            file.set_classifier_extension_by(&name)?;
            let mut staged = ctx.cache_attr().create_temp_file("maven-upload-")?;
            std::io::copy(&mut entry, &mut staged)
                .map_err(|e| AccessError::io(format!("extracting {name}"), e))?;
            let staged = staged.seal(file.mime_type())?;
            let result = self.upload_file(ctx, &file, &staged);
            staged.close()?;
            result?;
            uploaded += 1;
        }
        Ok(uploaded)
    }
}

impl BlobHandler for MavenBlobHandler {
    fn store_blob(
        &self,
        blob: &BlobAccess,
        artifact_type: &str,
        hints: &ReferenceHints,
        _global: Option<&dyn AccessSpec>,
        ctx: &Context,
    ) -> Result<Option<UploadResult>> {
        let Some(reference) = hints.get_reference(&[HINT_TYPE]) else {
            tracing::debug!(%artifact_type, "no maven hint, skipping maven upload");
            return Ok(None);
        };
        let coords = Coordinates::parse(reference)?;
        if coords.is_file() {
            self.upload_file(ctx, &coords, blob)?;
        } else if mime::is_tgz(blob.mime_type()) {
            let uploaded = self.upload_archive(ctx, &coords, blob)?;
            if uploaded == 0 {
                return Err(AccessError::Upload {
                    target: self.repository.url(),
                    detail: format!("package {} contains no files", coords.gav()),
                });
            }
            tracing::info!(gav = %coords.gav(), files = uploaded, "uploaded maven package");
        } else {
            tracing::debug!(
                coords = %coords,
                mime_type = blob.mime_type(),
                "maven hint names no single file and blob is no archive"
            );
            return Ok(None);
        }

        let hint = ReferenceHint::new(HINT_TYPE, coords.reference(), false)?;
        let spec = MavenAccessSpec::for_coordinates(self.repository.url(), coords);
        Ok(Some(UploadResult {
            spec: Box::new(spec),
            hint: Some(hint),
        }))
    }
}

/// Registers [`MavenBlobHandler`]s configured with a repository URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct MavenRegistrationHandler;

impl RegistrationHandler<BlobHandlerRegistry, BlobHandlerOptions> for MavenRegistrationHandler {
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
        let Some(config) = config.decode::<RepositoryConfig>()? else {
            return Err(RegistrationError::InvalidConfig {
                detail: "maven repository URL required".into(),
            });
        };
        let repository = Repository::from_url(config.url())
            .map_err(|e| RegistrationError::handler(REGISTRATION_NAME, e))?;
        let mut opts = opts.clone();
        if opts.artifact_type.is_none() {
            opts.artifact_type = Some(ARTIFACT_TYPE.to_string());
        }
        tracing::info!(repository = %repository.url(), "registering maven upload handler");
        target.register(Arc::new(MavenBlobHandler::new(repository)), &opts);
        Ok(true)
    }

    fn handler_infos(&self, _target: &BlobHandlerRegistry) -> Vec<HandlerInfo> {
        vec![HandlerInfo::leaf("", "uploading maven artifacts").with_description(
            "Uploads maven packages and files into the repository given by \
             the config, a URL string or {\"url\": ...}.",
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::testing;
    use crate::transport::Locator;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;

    fn tgz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn handler(dir: &std::path::Path) -> MavenBlobHandler {
        MavenBlobHandler::new(Repository::new(Locator::file(dir.join("repo"))))
    }

    #[test]
    fn config_forms() {
        let s: RepositoryConfig = HandlerConfig::from("file:///srv/maven").decode().unwrap().unwrap();
        assert_eq!(s.url(), "file:///srv/maven");
        let t: RepositoryConfig = HandlerConfig::from(json!({"url": "https://m/r"}))
            .decode()
            .unwrap()
            .unwrap();
        assert_eq!(t.url(), "https://m/r");
    }

    #[test]
    fn package_upload_writes_files_and_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let blob = BlobAccess::for_data(
            mime::MIME_TGZ,
            tgz(&[
                ("lib-1.0.jar", &b"jar bytes"[..]),
                ("lib-1.0.pom", &b"<project/>"[..]),
                ("lib-1.0-sources.jar", &b"sources"[..]),
                ("lib-1.0.jar.sha1", &b"ignored"[..]),
            ]),
        );
        let hints: ReferenceHints = ReferenceHint::new(HINT_TYPE, "org.acme:lib:1.0", true).unwrap().into();
        let result = handler(dir.path())
            .store_blob(&blob, ARTIFACT_TYPE, &hints, None, &ctx)
            .unwrap()
            .unwrap();

        let gav = dir.path().join("repo/org/acme/lib/1.0");
        assert_eq!(std::fs::read(gav.join("lib-1.0.jar")).unwrap(), b"jar bytes");
        assert_eq!(std::fs::read(gav.join("lib-1.0-sources.jar")).unwrap(), b"sources");
        for ext in ["sha1", "md5", "sha256"] {
            assert!(gav.join(format!("lib-1.0.pom.{ext}")).exists(), "{ext}");
        }
        assert_ne!(std::fs::read(gav.join("lib-1.0.jar.sha1")).unwrap(), b"ignored");

        assert_eq!(result.hint.unwrap().serialize(false), "maven::org.acme:lib:1.0");
        assert_eq!(result.spec.kind(), "maven");
        let encoded = result.spec.encode().unwrap();
        assert_eq!(encoded["groupId"], json!("org.acme"));
        assert!(encoded["repoUrl"].as_str().unwrap().starts_with("file://localhost/"));
    }

    #[test]
    fn single_file_upload_and_download() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let cv = testing::component_version(&ctx, dir.path());
        let blob = BlobAccess::for_string(mime::MIME_JAR, "single");
        let hints: ReferenceHints =
            ReferenceHint::new(HINT_TYPE, "org.acme:lib:1.0::jar", true).unwrap().into();
        let result = handler(dir.path())
            .store_blob(&blob, ARTIFACT_TYPE, &hints, None, &ctx)
            .unwrap()
            .unwrap();
        let method = result.spec.access_method(&cv).unwrap();
        assert_eq!(method.get().unwrap(), b"single");
    }

    #[test]
    fn not_applicable_without_hint_or_archive() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let blob = BlobAccess::for_string(mime::MIME_JAR, "x");
        let h = handler(dir.path());
        assert!(h
            .store_blob(&blob, ARTIFACT_TYPE, &ReferenceHints::new(), None, &ctx)
            .unwrap()
            .is_none());
        let package_hint: ReferenceHints = ReferenceHint::new(HINT_TYPE, "org.acme:lib:1.0", true).unwrap().into();
        assert!(h
            .store_blob(&blob, ARTIFACT_TYPE, &package_hint, None, &ctx)
            .unwrap()
            .is_none());
    }

    #[test]
    fn registration_requires_config() {
        let target = BlobHandlerRegistry::new();
        let opts = BlobHandlerOptions::default();
        let err = MavenRegistrationHandler
            .register_by_name("", &target, &HandlerConfig::None, &opts)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidConfig { .. }));
        assert!(!MavenRegistrationHandler
            .register_by_name("sub", &target, &HandlerConfig::from("file:///x"), &opts)
            .unwrap());
        assert!(MavenRegistrationHandler
            .register_by_name("", &target, &HandlerConfig::from("file:///x"), &opts)
            .unwrap());
        assert_eq!(target.len(), 1);
    }
}
