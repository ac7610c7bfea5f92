//! Access specifications, access methods, upload and download handlers for
//! OCM artifacts.
//!
//! An access specification is the serialized record saying where the bytes
//! of an artifact live. Resolved against a component version it yields an
//! [`AccessMethod`], a lazily fetched [`BlobAccess`](ocm_blob::BlobAccess).
//! Network protocols stay behind the [`Transport`] trait; only local files
//! are served out of the box.
//!
//! - [`spec`] / [`method`]: the spec trait, scheme, and live methods
//! - [`methods`]: built-in technologies (`localBlob`, `maven`, `npm`, ...)
//! - [`upload`] / [`uploaders`]: blob handlers for storing artifacts
//! - [`download`] / [`downloaders`]: handlers writing artifacts to disk
//! - [`context`]: the explicit runtime context and component versions
//! - [`config`]: TOML configuration of a context

pub mod config;
pub mod context;
pub mod download;
pub mod downloaders;
pub mod error;
pub mod handlers;
pub mod maven;
pub mod method;
pub mod methods;
pub mod mime;
pub mod retry;
pub mod spec;
pub mod transport;
pub mod upload;
pub mod uploaders;

pub use config::{AccessConfig, CacheConfig, HandlerRegistration};
pub use context::{
    ComponentVersion, ComponentVersionAccess, Context, ContextBuilder, DirectoryComponentVersion,
    DownloadRegistrations, UploadRegistrations,
};
pub use download::{DownloadHandler, DownloadHandlerOptions, DownloadHandlerRegistry};
pub use error::{AccessError, Result};
pub use handlers::{HandlerOptions, DEFAULT_PRIORITY};
pub use method::AccessMethod;
pub use retry::{retry, RetryPolicy};
pub use spec::{AccessSpec, AccessSpecScheme, UnknownAccessSpec};
pub use transport::{FileTransport, Locator, Transport, TransportRegistry};
pub use upload::{BlobHandler, BlobHandlerOptions, BlobHandlerRegistry, UploadResult};
