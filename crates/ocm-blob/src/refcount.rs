//! Reference counted ownership of a single physical resource.
//!
//! A [`RefMgmt`] owns one resource (an open file, a temporary file, a memory
//! buffer, ...) together with an atomic reference counter. Consumers never
//! touch the resource directly; they hold [`View`]s. Each view is released
//! exactly once, and the resource is freed when the last view is released.
//!
//! Two release primitives exist:
//! - [`View::release`] drops this view's reference, last or not.
//! - [`View::finalize`] drops the reference only if it is provably the last
//!   one and fails with [`BlobError::StillInUse`] otherwise.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{BlobError, Result};

/// A resource that must be freed exactly once.
pub trait Release: Send + Sync {
    /// Free the underlying resource. Called once, by the last releasing view.
    fn release_resource(&self) -> Result<()>;
}

/// Shared base of all views onto one resource.
pub struct RefMgmt<T: Release> {
    refs: AtomicUsize,
    closed: AtomicBool,
    resource: T,
}

impl<T: Release> RefMgmt<T> {
    /// Wrap a resource and return the initial view onto it.
    pub fn new(resource: T) -> View<T> {
        let base = Arc::new(RefMgmt {
            refs: AtomicUsize::new(1),
            closed: AtomicBool::new(false),
            resource,
        });
        View {
            base,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether the resource has been freed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of open views.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<()> {
        let mut current = self.refs.load(Ordering::Acquire);
        loop {
            if current == 0 || self.is_closed() {
                return Err(BlobError::Closed);
            }
            match self.refs.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn unref(&self) -> Result<()> {
        let previous = self.refs.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            return self.free();
        }
        Ok(())
    }

    fn unref_last(&self) -> Result<()> {
        match self
            .refs
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => self.free(),
            Err(actual) => Err(BlobError::StillInUse {
                references: actual.saturating_sub(1),
            }),
        }
    }

    fn free(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(BlobError::Closed);
        }
        tracing::trace!("releasing shared resource");
        self.resource.release_resource()
    }
}

/// An ownership token onto a [`RefMgmt`] resource.
pub struct View<T: Release> {
    base: Arc<RefMgmt<T>>,
    closed: AtomicBool,
}

impl<T: Release> View<T> {
    /// Issue a new, independent view onto the same resource.
    pub fn dup(&self) -> Result<View<T>> {
        if self.is_closed() {
            return Err(BlobError::Closed);
        }
        self.base.acquire()?;
        Ok(View {
            base: Arc::clone(&self.base),
            closed: AtomicBool::new(false),
        })
    }

    /// Access the resource, failing if this view is closed.
    pub fn resource(&self) -> Result<&T> {
        if self.is_closed() || self.base.is_closed() {
            return Err(BlobError::Closed);
        }
        Ok(&self.base.resource)
    }

    /// Access the resource regardless of view state. Used for metadata that
    /// stays valid after release.
    pub(crate) fn resource_unchecked(&self) -> &T {
        &self.base.resource
    }

    /// Whether this view has been released.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the underlying resource has been freed.
    pub fn is_resource_closed(&self) -> bool {
        self.base.is_closed()
    }

    /// Number of open views onto the resource.
    pub fn ref_count(&self) -> usize {
        self.base.ref_count()
    }

    /// Release this view. Frees the resource if it was the last one.
    pub fn release(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(BlobError::Closed);
        }
        self.base.unref()
    }

    /// Release this view, requiring it to be the last one.
    ///
    /// On [`BlobError::StillInUse`] the view stays open.
    pub fn finalize(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BlobError::Closed);
        }
        let result = self.base.unref_last();
        if matches!(result, Err(BlobError::StillInUse { .. })) {
            self.closed.store(false, Ordering::Release);
        }
        result
    }
}

impl<T: Release> Drop for View<T> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.release() {
                tracing::debug!(error = %e, "releasing dropped view");
            }
        }
    }
}

impl<T: Release> fmt::Debug for View<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("closed", &self.is_closed())
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Counter(Arc<AtomicU32>);

    impl Release for Counter {
        fn release_resource(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted() -> (View<Counter>, Arc<AtomicU32>) {
        let freed = Arc::new(AtomicU32::new(0));
        (RefMgmt::new(Counter(Arc::clone(&freed))), freed)
    }

    #[test]
    fn last_release_frees_once() {
        let (view, freed) = counted();
        let dup = view.dup().unwrap();
        view.release().unwrap();
        assert_eq!(freed.load(Ordering::SeqCst), 0);
        dup.release().unwrap();
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_release_is_error() {
        let (view, freed) = counted();
        view.release().unwrap();
        assert!(view.release().unwrap_err().is_closed());
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dup_after_free_fails() {
        let (view, _) = counted();
        let dup = view.dup().unwrap();
        view.release().unwrap();
        dup.release().unwrap();
        assert!(dup.dup().unwrap_err().is_closed());
        assert!(view.resource().is_err());
    }

    #[test]
    fn finalize_requires_exclusive_ownership() {
        let (view, freed) = counted();
        let dup = view.dup().unwrap();
        assert!(matches!(
            view.finalize(),
            Err(BlobError::StillInUse { references: 1 })
        ));
        // The failed finalize leaves the view usable.
        assert!(view.resource().is_ok());
        dup.release().unwrap();
        view.finalize().unwrap();
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases() {
        let (view, freed) = counted();
        let dup = view.dup().unwrap();
        drop(view);
        assert_eq!(freed.load(Ordering::SeqCst), 0);
        drop(dup);
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_release_frees_exactly_once() {
        let (view, freed) = counted();
        let views: Vec<_> = (0..16).map(|_| view.dup().unwrap()).collect();
        view.release().unwrap();
        std::thread::scope(|s| {
            for v in &views {
                s.spawn(move || v.release().unwrap());
            }
        });
        assert_eq!(freed.load(Ordering::SeqCst), 1);
    }
}
