//! The access context and component version boundary.
//!
//! A [`Context`] bundles everything access methods and upload handlers need
//! at runtime: the access spec scheme, transports, the cache root, the blob
//! and download handler registries, and the retry policy. It is built explicitly by the
//! embedding application and cheap to clone.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ocm_blob::{BlobAccess, BlobCache, BlobReader, CacheAttr, CacheTarget, Digest};
use ocm_refhints::ReferenceHints;
use ocm_registrations::{HandlerConfig, HandlerRegistrationRegistry};

use crate::config::AccessConfig;
use crate::download::{DownloadHandlerOptions, DownloadHandlerRegistry};
use crate::error::{AccessError, Result};
use crate::method::AccessMethod;
use crate::retry::{retry, RetryPolicy};
use crate::spec::{AccessSpec, AccessSpecScheme};
use crate::transport::{Locator, Transport, TransportRegistry};
use crate::upload::{BlobHandlerOptions, BlobHandlerRegistry, UploadResult};

/// Registry of named blob handler registrations.
pub type UploadRegistrations = HandlerRegistrationRegistry<BlobHandlerRegistry, BlobHandlerOptions>;

/// Registry of named download handler registrations.
pub type DownloadRegistrations =
    HandlerRegistrationRegistry<DownloadHandlerRegistry, DownloadHandlerOptions>;

struct ContextInner {
    scheme: AccessSpecScheme,
    cache_attr: CacheAttr,
    blob_cache: Option<Arc<BlobCache>>,
    transports: TransportRegistry,
    blob_handlers: BlobHandlerRegistry,
    registrations: Arc<UploadRegistrations>,
    download_handlers: DownloadHandlerRegistry,
    download_registrations: Arc<DownloadRegistrations>,
    retry: RetryPolicy,
}

/// Shared runtime state for access and upload operations.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A context with all built-in technologies, the `file` transport, a
    /// blob cache under the OS temp dir, and the default retry policy.
    pub fn new() -> Result<Self> {
        ContextBuilder::default().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Build a context from configuration and apply its upload and download
    /// registrations.
    pub fn from_config(config: &AccessConfig) -> Result<Self> {
        let mut builder = ContextBuilder::default()
            .blob_cache(config.cache.blob_cache)
            .retry_policy(config.retry);
        if let Some(dir) = &config.cache.dir {
            builder = builder.cache_dir(dir.clone());
        }
        let ctx = builder.build()?;
        for upload in &config.upload {
            let opts = upload.options();
            ctx.register_blob_handler_by_name(&upload.name, &upload.config, &opts)?;
        }
        for download in &config.download {
            let opts = download.options();
            ctx.register_download_handler_by_name(&download.name, &download.config, &opts)?;
        }
        Ok(ctx)
    }

    pub fn scheme(&self) -> &AccessSpecScheme {
        &self.inner.scheme
    }

    pub fn cache_attr(&self) -> &CacheAttr {
        &self.inner.cache_attr
    }

    pub fn blob_cache(&self) -> Option<&Arc<BlobCache>> {
        self.inner.blob_cache.as_ref()
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.inner.transports
    }

    pub fn blob_handlers(&self) -> &BlobHandlerRegistry {
        &self.inner.blob_handlers
    }

    pub fn registrations(&self) -> &Arc<UploadRegistrations> {
        &self.inner.registrations
    }

    pub fn download_handlers(&self) -> &DownloadHandlerRegistry {
        &self.inner.download_handlers
    }

    pub fn download_registrations(&self) -> &Arc<DownloadRegistrations> {
        &self.inner.download_registrations
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Where remote content is materialized.
    pub fn cache_target(&self) -> CacheTarget {
        match &self.inner.blob_cache {
            Some(cache) => CacheTarget::Cache(Arc::clone(cache)),
            None => CacheTarget::Temp(self.inner.cache_attr.clone()),
        }
    }

    /// Decode a serialized access specification.
    pub fn decode_access_spec(&self, value: serde_json::Value) -> Result<Box<dyn AccessSpec>> {
        self.inner.scheme.decode(value)
    }

    fn transport(&self, locator: &Locator) -> Result<Arc<dyn Transport>> {
        self.inner.transports.get(&locator.scheme)
    }

    /// Open the content at `locator`, retrying transient failures.
    pub fn fetch(&self, locator: &Locator) -> Result<BlobReader> {
        let transport = self.transport(locator)?;
        tracing::debug!(%locator, "fetching");
        retry(&self.inner.retry, || transport.fetch(locator))
    }

    pub fn exists(&self, locator: &Locator) -> Result<bool> {
        let transport = self.transport(locator)?;
        retry(&self.inner.retry, || transport.exists(locator))
    }

    pub fn list(&self, locator: &Locator) -> Result<Vec<String>> {
        let transport = self.transport(locator)?;
        retry(&self.inner.retry, || transport.list(locator))
    }

    /// Write a blob to `locator`. Each attempt reopens the blob.
    pub fn store(&self, locator: &Locator, blob: &BlobAccess) -> Result<u64> {
        let transport = self.transport(locator)?;
        tracing::debug!(%locator, "storing");
        retry(&self.inner.retry, || {
            let mut reader = blob.reader()?;
            transport.store(locator, &mut reader)
        })
    }

    /// Write a stream to `locator`. Streams cannot be reopened, so no retry.
    pub fn store_reader(&self, locator: &Locator, content: &mut dyn Read) -> Result<u64> {
        self.transport(locator)?.store(locator, content)
    }

    /// Apply a named registration, such as `ocm/mavenPackage`, to the blob
    /// handler registry.
    pub fn register_blob_handler_by_name(
        &self,
        name: &str,
        config: &HandlerConfig,
        opts: &BlobHandlerOptions,
    ) -> Result<()> {
        tracing::info!(%name, "registering blob handler");
        self.inner
            .registrations
            .register_by_name(name, &self.inner.blob_handlers, config, opts)?;
        Ok(())
    }

    /// Upload a blob through the first applicable blob handler.
    pub fn store_blob(
        &self,
        blob: &BlobAccess,
        artifact_type: &str,
        hints: &ReferenceHints,
        global: Option<&dyn AccessSpec>,
    ) -> Result<Option<UploadResult>> {
        self.inner
            .blob_handlers
            .store_blob(blob, artifact_type, hints, global, self)
    }

    /// Apply a named registration, such as `ocm/dirtree`, to the download
    /// handler registry.
    pub fn register_download_handler_by_name(
        &self,
        name: &str,
        config: &HandlerConfig,
        opts: &DownloadHandlerOptions,
    ) -> Result<()> {
        tracing::info!(%name, "registering download handler");
        self.inner.download_registrations.register_by_name(
            name,
            &self.inner.download_handlers,
            config,
            opts,
        )?;
        Ok(())
    }

    /// Write the artifact behind `method` to `path` through the first
    /// applicable download handler, or as raw blob.
    pub fn download(&self, method: &AccessMethod, artifact_type: &str, path: &Path) -> Result<PathBuf> {
        self.inner
            .download_handlers
            .download(method, artifact_type, path, self)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cache_root", &self.inner.cache_attr.root())
            .field("blob_cache", &self.inner.blob_cache.is_some())
            .field("transports", &self.inner.transports)
            .field("retry", &self.inner.retry)
            .finish()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    cache_dir: Option<PathBuf>,
    blob_cache: bool,
    retry: RetryPolicy,
    transports: Vec<(String, Arc<dyn Transport>)>,
    registrations: Option<Arc<UploadRegistrations>>,
    download_registrations: Option<Arc<DownloadRegistrations>>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        ContextBuilder {
            cache_dir: None,
            blob_cache: true,
            retry: RetryPolicy::default(),
            transports: Vec::new(),
            registrations: None,
            download_registrations: None,
        }
    }
}

impl ContextBuilder {
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Whether remote content goes into a shared digest-indexed cache
    /// instead of private temporary files.
    pub fn blob_cache(mut self, enabled: bool) -> Self {
        self.blob_cache = enabled;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Add a transport, replacing a built-in one for the same scheme.
    pub fn transport(mut self, scheme: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.transports.push((scheme.into(), transport));
        self
    }

    /// Use `base` as the base registry for named registrations instead of
    /// the built-in one.
    pub fn registrations(mut self, base: Arc<UploadRegistrations>) -> Self {
        self.registrations = Some(base);
        self
    }

    /// Same as [`ContextBuilder::registrations`] for download handlers.
    pub fn download_registrations(mut self, base: Arc<DownloadRegistrations>) -> Self {
        self.download_registrations = Some(base);
        self
    }

    pub fn build(self) -> Result<Context> {
        let cache_attr = match self.cache_dir {
            Some(dir) => CacheAttr::new(dir),
            None => CacheAttr::default(),
        };
        let blob_cache = if self.blob_cache {
            Some(Arc::new(BlobCache::in_cache_root(&cache_attr)?))
        } else {
            None
        };
        let transports = TransportRegistry::with_defaults();
        for (scheme, transport) in self.transports {
            transports.register(scheme, transport);
        }
        let base = self
            .registrations
            .unwrap_or_else(crate::uploaders::default_registrations);
        let download_base = self
            .download_registrations
            .unwrap_or_else(crate::downloaders::default_registrations);
        Ok(Context {
            inner: Arc::new(ContextInner {
                scheme: crate::methods::default_scheme(),
                cache_attr,
                blob_cache,
                transports,
                blob_handlers: BlobHandlerRegistry::new(),
                registrations: Arc::new(UploadRegistrations::derived(base)),
                download_handlers: DownloadHandlerRegistry::new(),
                download_registrations: Arc::new(DownloadRegistrations::derived(download_base)),
                retry: self.retry,
            }),
        })
    }
}

/// The component version an access spec belongs to.
///
/// Only the parts needed to resolve access specs are modelled: the context
/// and the store for blobs embedded in the component version itself.
pub trait ComponentVersionAccess: Send + Sync {
    fn context(&self) -> &Context;

    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Open a blob stored with the component version.
    fn get_local_blob(&self, local_reference: &str, media_type: &str) -> Result<BlobAccess>;

    /// Store a blob with the component version, returning its local reference.
    fn add_local_blob(&self, blob: &BlobAccess) -> Result<String>;
}

/// Shared handle to a component version.
pub type ComponentVersion = Arc<dyn ComponentVersionAccess>;

/// A component version whose local blobs live in a directory, named by
/// digest as in a common transport archive.
pub struct DirectoryComponentVersion {
    ctx: Context,
    name: String,
    version: String,
    blobs: BlobCache,
}

impl DirectoryComponentVersion {
    /// Open the component version at `root`. Blobs go to `<root>/blobs`.
    pub fn new(
        ctx: &Context,
        name: impl Into<String>,
        version: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let blobs = BlobCache::new(root.into().join("blobs"))?;
        Ok(DirectoryComponentVersion {
            ctx: ctx.clone(),
            name: name.into(),
            version: version.into(),
            blobs,
        })
    }

    pub fn into_shared(self) -> ComponentVersion {
        Arc::new(self)
    }
}

impl ComponentVersionAccess for DirectoryComponentVersion {
    fn context(&self) -> &Context {
        &self.ctx
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn get_local_blob(&self, local_reference: &str, media_type: &str) -> Result<BlobAccess> {
        let digest = Digest::from_file_name(local_reference)
            .or_else(|_| Digest::parse(local_reference))
            .map_err(|e| AccessError::invalid("local reference", format!("{local_reference}: {e}")))?;
        Ok(self.blobs.get_blob(&digest, media_type)?)
    }

    fn add_local_blob(&self, blob: &BlobAccess) -> Result<String> {
        let (digest, size) = self.blobs.add_blob(blob)?;
        tracing::debug!(component = %self.name, version = %self.version, %digest, size, "added local blob");
        Ok(digest.file_name())
    }
}

impl fmt::Debug for DirectoryComponentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryComponentVersion")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("blobs", &self.blobs.root())
            .finish()
    }
}
