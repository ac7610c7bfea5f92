//! Download handlers: writing the artifact behind an access method to the
//! local filesystem.
//!
//! Handlers are looked up like blob handlers (see [`crate::handlers`]) by
//! the artifact type and the mime type of the access method. A handler
//! returning `Ok(None)` does not apply. When no handler accepts the
//! artifact, its raw content is written to the target path.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::Context;
use crate::error::{AccessError, Result};
use crate::handlers::{HandlerOptions, HandlerTable};
use crate::method::AccessMethod;

/// Where a download handler applies.
pub type DownloadHandlerOptions = HandlerOptions;

/// Writes artifacts of some format to the filesystem.
pub trait DownloadHandler: Send + Sync {
    /// Write the artifact to `path`, returning the path actually written.
    /// `Ok(None)` means the handler does not apply.
    fn download(
        &self,
        method: &AccessMethod,
        artifact_type: &str,
        path: &Path,
        ctx: &Context,
    ) -> Result<Option<PathBuf>>;
}

/// Registered download handlers of a context.
#[derive(Default)]
pub struct DownloadHandlerRegistry {
    table: HandlerTable<dyn DownloadHandler>,
}

impl DownloadHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn DownloadHandler>, opts: &DownloadHandlerOptions) {
        tracing::debug!(
            artifact_type = opts.artifact_type.as_deref().unwrap_or("*"),
            mime_type = opts.mime_type.as_deref().unwrap_or("*"),
            priority = opts.priority,
            "registered download handler"
        );
        self.table.register(handler, opts);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handlers applicable to a download, in the order they are tried.
    pub fn lookup(&self, artifact_type: &str, mime_type: &str) -> Vec<Arc<dyn DownloadHandler>> {
        self.table.lookup(artifact_type, mime_type)
    }

    /// Download the artifact behind `method` to `path`.
    ///
    /// A failing handler does not stop the search. Its error is returned
    /// only if no other handler accepts the artifact.
    pub fn download(
        &self,
        method: &AccessMethod,
        artifact_type: &str,
        path: &Path,
        ctx: &Context,
    ) -> Result<PathBuf> {
        let mime_type = method.mime_type().to_string();
        let mut first_error = None;
        for handler in self.lookup(artifact_type, &mime_type) {
            match handler.download(method, artifact_type, path, ctx) {
                Ok(Some(written)) => {
                    tracing::info!(%artifact_type, path = %written.display(), "artifact downloaded");
                    return Ok(written);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%artifact_type, %mime_type, %err, "download handler failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        tracing::debug!(%artifact_type, %mime_type, "no download handler applied, writing blob");
        write_blob(method, path)
    }
}

impl fmt::Debug for DownloadHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandlerRegistry")
            .field("handlers", &self.table.options())
            .finish()
    }
}

/// Write the raw content of `method` to the file `path`.
pub fn write_blob(method: &AccessMethod, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AccessError::io(format!("creating {}", parent.display()), e))?;
    }
    let mut reader = method.reader()?;
    let mut file = fs::File::create(path)
        .map_err(|e| AccessError::io(format!("creating {}", path.display()), e))?;
    let written = std::io::copy(&mut reader, &mut file).map_err(|e| {
        AccessError::from(ocm_blob::BlobError::from_io(format!("writing {}", path.display()), e))
    })?;
    tracing::debug!(path = %path.display(), bytes = written, "blob written");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::{testing, LocalBlobAccessSpec};
    use crate::spec::AccessSpec;
    use ocm_blob::BlobAccess;

    struct Fixed {
        accept: bool,
    }

    impl DownloadHandler for Fixed {
        fn download(
            &self,
            _method: &AccessMethod,
            _artifact_type: &str,
            path: &Path,
            _ctx: &Context,
        ) -> Result<Option<PathBuf>> {
            if !self.accept {
                return Ok(None);
            }
            fs::write(path, b"handled").map_err(|e| AccessError::io("writing", e))?;
            Ok(Some(path.to_path_buf()))
        }
    }

    struct Broken;

    impl DownloadHandler for Broken {
        fn download(
            &self,
            _method: &AccessMethod,
            _artifact_type: &str,
            _path: &Path,
            _ctx: &Context,
        ) -> Result<Option<PathBuf>> {
            Err(AccessError::invalid("download", "broken"))
        }
    }

    fn local_method(dir: &Path, content: &str) -> AccessMethod {
        let ctx = testing::context(dir);
        let cv = testing::component_version(&ctx, dir);
        let reference = cv.add_local_blob(&BlobAccess::for_string("text/plain", content)).unwrap();
        LocalBlobAccessSpec::new(reference, "text/plain").access_method(&cv).unwrap()
    }

    #[test]
    fn falls_back_to_raw_content() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let method = local_method(dir.path(), "raw");
        let registry = DownloadHandlerRegistry::new();
        registry.register(Arc::new(Fixed { accept: false }), &DownloadHandlerOptions::default());
        let target = dir.path().join("out/raw.txt");
        let written = registry.download(&method, "blob", &target, &ctx).unwrap();
        assert_eq!(written, target);
        assert_eq!(fs::read(&target).unwrap(), b"raw");
    }

    #[test]
    fn accepting_handler_wins_over_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let method = local_method(dir.path(), "raw");
        let registry = DownloadHandlerRegistry::new();
        let opts = DownloadHandlerOptions::default();
        registry.register(Arc::new(Broken), &opts.clone().with_priority(200));
        registry.register(Arc::new(Fixed { accept: true }), &opts);
        let target = dir.path().join("handled.txt");
        registry.download(&method, "blob", &target, &ctx).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"handled");

        let failing = DownloadHandlerRegistry::new();
        failing.register(Arc::new(Broken), &opts);
        let err = failing
            .download(&method, "blob", &dir.path().join("x"), &ctx)
            .unwrap_err();
        assert!(matches!(err, AccessError::Invalid { .. }));
    }

    #[test]
    fn artifact_type_selects_handler() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context(dir.path());
        let method = local_method(dir.path(), "raw");
        let registry = DownloadHandlerRegistry::new();
        registry.register(
            Arc::new(Fixed { accept: true }),
            &DownloadHandlerOptions::default().for_artifact_type("helmChart"),
        );
        let target = dir.path().join("plain.txt");
        registry.download(&method, "blob", &target, &ctx).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"raw");
        registry.download(&method, "helmChart", &target, &ctx).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"handled");
    }
}
