//! Downloading tar archives as directory trees.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ocm_registrations::{HandlerConfig, HandlerInfo, RegistrationHandler, Result as RegistrationResult};
use serde::Deserialize;

use crate::context::Context;
use crate::download::{write_blob, DownloadHandler, DownloadHandlerOptions, DownloadHandlerRegistry};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::mime;

/// Registration path of the handler.
pub const REGISTRATION_NAME: &str = "ocm/dirtree";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirTreeConfig {
    /// Write a gzipped archive instead of extracting it.
    #[serde(default)]
    pub as_archive: bool,
}

/// Extracts tar and tgz blobs into a directory.
#[derive(Debug, Clone, Default)]
pub struct DirTreeHandler {
    config: DirTreeConfig,
}

impl DirTreeHandler {
    pub fn new(config: DirTreeConfig) -> Self {
        DirTreeHandler { config }
    }
}

/// `Some(gzipped)` for tar archives.
fn tar_format(mime_type: &str) -> Option<bool> {
    if mime::is_tgz(mime_type) {
        Some(true)
    } else if mime_type == mime::MIME_TAR {
        Some(false)
    } else {
        None
    }
}

fn extract<R: Read>(mut archive: tar::Archive<R>, dir: &Path) -> Result<usize> {
    let entries = archive
        .entries()
        .map_err(|e| AccessError::io("reading archive", e))?;
    let mut files = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| AccessError::io("reading archive", e))?;
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(dir)
            .map_err(|e| AccessError::io(format!("extracting into {}", dir.display()), e))?;
        if is_file && unpacked {
            files += 1;
        }
    }
    Ok(files)
}

impl DownloadHandler for DirTreeHandler {
    fn download(
        &self,
        method: &AccessMethod,
        artifact_type: &str,
        path: &Path,
        _ctx: &Context,
    ) -> Result<Option<PathBuf>> {
        let Some(gzipped) = tar_format(method.mime_type()) else {
            tracing::debug!(%artifact_type, mime_type = method.mime_type(), "no tar archive");
            return Ok(None);
        };
        if self.config.as_archive {
            if gzipped {
                return write_blob(method, path).map(Some);
            }
            let file = fs::File::create(path)
                .map_err(|e| AccessError::io(format!("creating {}", path.display()), e))?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            std::io::copy(&mut method.reader()?, &mut encoder)
                .and_then(|_| encoder.finish())
                .map_err(|e| AccessError::io(format!("writing {}", path.display()), e))?;
            return Ok(Some(path.to_path_buf()));
        }

        fs::create_dir_all(path)
            .map_err(|e| AccessError::io(format!("creating {}", path.display()), e))?;
        let reader = method.reader()?;
        let files = if gzipped {
            extract(tar::Archive::new(GzDecoder::new(reader)), path)?
        } else {
            extract(tar::Archive::new(reader), path)?
        };
        tracing::info!(path = %path.display(), files, "archive extracted");
        Ok(Some(path.to_path_buf()))
    }
}

/// Registers [`DirTreeHandler`]s; the config is optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirTreeRegistrationHandler;

impl RegistrationHandler<DownloadHandlerRegistry, DownloadHandlerOptions> for DirTreeRegistrationHandler {
    fn register_by_name(
        &self,
        residual: &str,
        target: &DownloadHandlerRegistry,
        config: &HandlerConfig,
        opts: &DownloadHandlerOptions,
    ) -> RegistrationResult<bool> {
        if !residual.is_empty() {
            return Ok(false);
        }
        let config = config.decode::<DirTreeConfig>()?.unwrap_or_default();
        target.register(Arc::new(DirTreeHandler::new(config)), opts);
        Ok(true)
    }

    fn handler_infos(&self, _target: &DownloadHandlerRegistry) -> Vec<HandlerInfo> {
        vec![HandlerInfo::leaf("", "directory tree of a tar archive").with_description(
            "Extracts tar and tgz archives into a directory, or with \
             {\"asArchive\": true} writes them as a gzipped archive.",
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::{testing, LocalBlobAccessSpec};
    use crate::spec::AccessSpec;
    use ocm_blob::BlobAccess;
    use serde_json::json;

    fn tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, data).unwrap();
        encoder.finish().unwrap()
    }

    fn method(dir: &Path, ctx: &Context, mime_type: &str, data: Vec<u8>) -> AccessMethod {
        let cv = testing::component_version(ctx, dir);
        let reference = cv.add_local_blob(&BlobAccess::for_data(mime_type, data)).unwrap();
        LocalBlobAccessSpec::new(reference, mime_type).access_method(&cv).unwrap()
    }

    const FILES: &[(&str, &[u8])] = &[("testfile", b"testdata\n"), ("dir/nestedfile", b"other test data\n")];

    #[test]
    fn extracts_tgz_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let m = method(dir.path(), &ctx, mime::MIME_TGZ, gzip(&tar(FILES)));
        let target = dir.path().join("result");
        let written = DirTreeHandler::default()
            .download(&m, "directoryTree", &target, &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(written, target);
        assert_eq!(fs::read(target.join("testfile")).unwrap(), b"testdata\n");
        assert_eq!(fs::read(target.join("dir/nestedfile")).unwrap(), b"other test data\n");
    }

    #[test]
    fn plain_tar_as_archive_is_gzipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let raw = tar(FILES);
        let m = method(dir.path(), &ctx, mime::MIME_TAR, raw.clone());
        let target = dir.path().join("target.tgz");
        DirTreeHandler::new(DirTreeConfig { as_archive: true })
            .download(&m, "directoryTree", &target, &ctx)
            .unwrap()
            .unwrap();
        let mut unpacked = Vec::new();
        GzDecoder::new(fs::File::open(&target).unwrap())
            .read_to_end(&mut unpacked)
            .unwrap();
        assert_eq!(unpacked, raw);
    }

    #[test]
    fn other_media_types_do_not_apply() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let m = method(dir.path(), &ctx, mime::MIME_JSON, b"{}".to_vec());
        assert!(DirTreeHandler::default()
            .download(&m, "blob", &dir.path().join("x"), &ctx)
            .unwrap()
            .is_none());
    }

    #[test]
    fn registration_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let opts = DownloadHandlerOptions::default().for_artifact_type("directoryTree");
        ctx.register_download_handler_by_name(REGISTRATION_NAME, &HandlerConfig::from(json!({"asArchive": true})), &opts)
            .unwrap();
        assert_eq!(ctx.download_handlers().len(), 1);

        let archive = gzip(&tar(FILES));
        let m = method(dir.path(), &ctx, mime::MIME_TGZ, archive.clone());
        let target = dir.path().join("out.tgz");
        ctx.download(&m, "directoryTree", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), archive);

        let target = dir.path().join("blob.bin");
        ctx.download(&m, "other", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), archive);

        let registry = DownloadHandlerRegistry::new();
        assert!(!DirTreeRegistrationHandler
            .register_by_name("sub", &registry, &HandlerConfig::None, &opts)
            .unwrap());
        assert!(DirTreeRegistrationHandler
            .register_by_name("", &registry, &HandlerConfig::None, &opts)
            .unwrap());
    }
}
