//! Live access methods.

use std::fmt;

use ocm_blob::{BlobAccess, BlobError, BlobReader};
use parking_lot::Mutex;

use crate::error::Result;
use crate::spec::AccessSpec;

type BlobFactory = Box<dyn Fn() -> Result<BlobAccess> + Send + Sync>;

enum MethodState {
    Pending,
    Fetched(BlobAccess),
    Closed,
}

/// The resolved counterpart of an access spec.
///
/// The blob is produced on the first call to [`get`](AccessMethod::get),
/// [`reader`](AccessMethod::reader) or [`blob`](AccessMethod::blob) and kept
/// until [`close`](AccessMethod::close). A failed fetch leaves the method
/// pending so a later call tries again.
pub struct AccessMethod {
    spec: Box<dyn AccessSpec>,
    mime_type: String,
    local: bool,
    factory: BlobFactory,
    state: Mutex<MethodState>,
}

impl AccessMethod {
    pub fn new<F>(spec: Box<dyn AccessSpec>, mime_type: impl Into<String>, local: bool, factory: F) -> Self
    where
        F: Fn() -> Result<BlobAccess> + Send + Sync + 'static,
    {
        AccessMethod {
            spec,
            mime_type: mime_type.into(),
            local,
            factory: Box::new(factory),
            state: Mutex::new(MethodState::Pending),
        }
    }

    fn with_blob<T>(&self, f: impl FnOnce(&BlobAccess) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        if let MethodState::Pending = *state {
            tracing::debug!(kind = %self.spec.kind(), "resolving access method");
            *state = MethodState::Fetched((self.factory)()?);
        }
        match &*state {
            MethodState::Fetched(blob) => f(blob),
            _ => Err(BlobError::Closed.into()),
        }
    }

    /// The full content.
    pub fn get(&self) -> Result<Vec<u8>> {
        self.with_blob(|blob| Ok(blob.get()?))
    }

    pub fn reader(&self) -> Result<BlobReader> {
        self.with_blob(|blob| Ok(blob.reader()?))
    }

    /// A new view onto the fetched blob. The caller must close it.
    pub fn blob(&self) -> Result<BlobAccess> {
        self.with_blob(|blob| Ok(blob.dup()?))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Whether the content is stored with the component version.
    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn spec(&self) -> &dyn AccessSpec {
        self.spec.as_ref()
    }

    /// Whether the blob has been produced.
    pub fn is_fetched(&self) -> bool {
        matches!(*self.state.lock(), MethodState::Fetched(_))
    }

    /// Release the fetched blob. Further use fails with a closed error.
    pub fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.lock(), MethodState::Closed);
        match previous {
            MethodState::Closed => Err(BlobError::Closed.into()),
            MethodState::Pending => Ok(()),
            MethodState::Fetched(blob) => Ok(blob.close()?),
        }
    }
}

impl fmt::Debug for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.state.lock() {
            MethodState::Pending => "pending",
            MethodState::Fetched(_) => "fetched",
            MethodState::Closed => "closed",
        };
        f.debug_struct("AccessMethod")
            .field("type", &self.spec.type_name())
            .field("mime_type", &self.mime_type)
            .field("local", &self.local)
            .field("state", &state)
            .finish()
    }
}
