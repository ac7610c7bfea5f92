//! Built-in download handlers and their registration names.

pub mod dirtree;

use std::sync::Arc;

use crate::context::DownloadRegistrations;

pub use dirtree::{DirTreeConfig, DirTreeHandler, DirTreeRegistrationHandler};

/// Registrations of all built-in download handlers.
pub fn default_registrations() -> Arc<DownloadRegistrations> {
    let registrations = DownloadRegistrations::new();
    if let Err(err) = registrations
        .register_registration_handler(dirtree::REGISTRATION_NAME, Arc::new(DirTreeRegistrationHandler))
    {
        tracing::warn!(%err, "cannot register dirtree download handler");
    }
    Arc::new(registrations)
}
