//! Blob handlers: uploading blobs into technology specific repositories.
//!
//! Handlers are looked up as described in [`crate::handlers`]. The first
//! handler returning a result wins. A handler returning `Ok(None)` does not
//! apply and the next one is asked.

use std::fmt;
use std::sync::Arc;

use ocm_blob::BlobAccess;
use ocm_refhints::{ReferenceHint, ReferenceHints};

use crate::context::Context;
use crate::error::Result;
use crate::handlers::{HandlerOptions, HandlerTable};
use crate::spec::AccessSpec;

pub use crate::handlers::DEFAULT_PRIORITY;

/// Where a blob handler applies.
pub type BlobHandlerOptions = HandlerOptions;

/// Outcome of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadResult {
    /// Global access to the uploaded blob.
    pub spec: Box<dyn AccessSpec>,
    /// Hint naming the uploaded artifact in the target technology.
    pub hint: Option<ReferenceHint>,
}

/// Uploads blobs into some repository.
pub trait BlobHandler: Send + Sync {
    /// Store `blob`. `Ok(None)` means the handler does not apply.
    fn store_blob(
        &self,
        blob: &BlobAccess,
        artifact_type: &str,
        hints: &ReferenceHints,
        global: Option<&dyn AccessSpec>,
        ctx: &Context,
    ) -> Result<Option<UploadResult>>;
}

/// Registered blob handlers of a context.
#[derive(Default)]
pub struct BlobHandlerRegistry {
    table: HandlerTable<dyn BlobHandler>,
}

impl BlobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn BlobHandler>, opts: &BlobHandlerOptions) {
        tracing::debug!(
            artifact_type = opts.artifact_type.as_deref().unwrap_or("*"),
            mime_type = opts.mime_type.as_deref().unwrap_or("*"),
            priority = opts.priority,
            "registered blob handler"
        );
        self.table.register(handler, opts);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handlers applicable to an upload, in the order they are tried.
    pub fn lookup(&self, artifact_type: &str, mime_type: &str) -> Vec<Arc<dyn BlobHandler>> {
        self.table.lookup(artifact_type, mime_type)
    }

    /// Offer `blob` to the applicable handlers until one stores it.
    pub fn store_blob(
        &self,
        blob: &BlobAccess,
        artifact_type: &str,
        hints: &ReferenceHints,
        global: Option<&dyn AccessSpec>,
        ctx: &Context,
    ) -> Result<Option<UploadResult>> {
        let mime_type = blob.mime_type().to_string();
        let handlers = self.lookup(artifact_type, &mime_type);
        tracing::debug!(%artifact_type, %mime_type, candidates = handlers.len(), "dispatching upload");
        for handler in handlers {
            if let Some(result) = handler.store_blob(blob, artifact_type, hints, global, ctx)? {
                tracing::info!(%artifact_type, spec = %result.spec.type_name(), "blob uploaded");
                return Ok(Some(result));
            }
        }
        tracing::debug!(%artifact_type, %mime_type, "no blob handler applied");
        Ok(None)
    }
}

impl fmt::Debug for BlobHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandlerRegistry")
            .field("handlers", &self.table.options())
            .finish()
    }
}
