//! Handler tables keyed by artifact type and mime type.
//!
//! Upload and download handlers are registered with an optional artifact
//! type, an optional mime type and a priority. A lookup returns them in the
//! order
//!
//! 1. artifact type and mime type match,
//! 2. artifact type matches, registered without mime type,
//! 3. mime type matches, registered without artifact type,
//! 4. generic handlers registered with neither,
//!
//! higher priority first within each group, then registration order.

use std::sync::Arc;

use parking_lot::RwLock;

/// Priority of handlers registered without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Where a handler applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOptions {
    pub artifact_type: Option<String>,
    pub mime_type: Option<String>,
    pub priority: i32,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        HandlerOptions {
            artifact_type: None,
            mime_type: None,
            priority: DEFAULT_PRIORITY,
        }
    }
}

impl HandlerOptions {
    pub fn for_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }

    pub fn for_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Lookup group for an artifact, `None` if not applicable.
    fn group(&self, artifact_type: &str, mime_type: &str) -> Option<u8> {
        let artifact = self.artifact_type.as_deref().filter(|a| !a.is_empty());
        let mime = self.mime_type.as_deref().filter(|m| !m.is_empty());
        match (artifact, mime) {
            (Some(a), Some(m)) if a == artifact_type && m == mime_type => Some(0),
            (Some(a), None) if a == artifact_type => Some(1),
            (None, Some(m)) if m == mime_type => Some(2),
            (None, None) => Some(3),
            _ => None,
        }
    }
}

struct Entry<H: ?Sized> {
    handler: Arc<H>,
    opts: HandlerOptions,
    seq: usize,
}

/// Handlers of one kind with their options.
pub(crate) struct HandlerTable<H: ?Sized> {
    entries: RwLock<Vec<Entry<H>>>,
}

impl<H: ?Sized> Default for HandlerTable<H> {
    fn default() -> Self {
        HandlerTable {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<H: ?Sized> HandlerTable<H> {
    pub(crate) fn register(&self, handler: Arc<H>, opts: &HandlerOptions) {
        let mut entries = self.entries.write();
        let seq = entries.len();
        entries.push(Entry {
            handler,
            opts: opts.clone(),
            seq,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn lookup(&self, artifact_type: &str, mime_type: &str) -> Vec<Arc<H>> {
        let entries = self.entries.read();
        let mut candidates: Vec<(u8, i32, usize, Arc<H>)> = entries
            .iter()
            .filter_map(|e| {
                e.opts
                    .group(artifact_type, mime_type)
                    .map(|g| (g, e.opts.priority, e.seq, Arc::clone(&e.handler)))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        candidates.into_iter().map(|(_, _, _, h)| h).collect()
    }

    pub(crate) fn options(&self) -> Vec<HandlerOptions> {
        self.entries.read().iter().map(|e| e.opts.clone()).collect()
    }
}
