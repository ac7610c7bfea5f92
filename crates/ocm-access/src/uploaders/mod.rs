//! Built-in upload handlers and their registration names.

pub mod maven;
pub mod oci;

use std::sync::Arc;

use crate::context::UploadRegistrations;

pub use maven::{MavenBlobHandler, MavenRegistrationHandler, RepositoryConfig};
pub use oci::{OciBlobHandler, OciRegistrationHandler, OciTarget, OciUploadConfig};

/// Registrations of all built-in upload handlers.
pub fn default_registrations() -> Arc<UploadRegistrations> {
    let registrations = UploadRegistrations::new();
    if let Err(err) = registrations
        .register_registration_handler(maven::REGISTRATION_NAME, Arc::new(MavenRegistrationHandler))
    {
        tracing::warn!(%err, "cannot register maven upload handler");
    }
    if let Err(err) = registrations
        .register_registration_handler(oci::REGISTRATION_NAME, Arc::new(OciRegistrationHandler))
    {
        tracing::warn!(%err, "cannot register oci upload handler");
    }
    Arc::new(registrations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{BlobHandlerOptions, BlobHandlerRegistry};
    use ocm_registrations::{HandlerConfig, RegistrationError};

    #[test]
    fn builtin_handlers_registered_by_name() {
        let registrations = default_registrations();
        let infos = registrations.handler_infos(&BlobHandlerRegistry::new());
        assert!(infos.iter().any(|i| i.name == maven::REGISTRATION_NAME));
        assert!(infos.iter().any(|i| i.name == oci::REGISTRATION_NAME));

        let target = BlobHandlerRegistry::new();
        registrations
            .register_by_name(
                "ocm/mavenPackage",
                &target,
                &HandlerConfig::from("file:///srv/maven"),
                &BlobHandlerOptions::default(),
            )
            .unwrap();
        assert_eq!(target.len(), 1);
        registrations
            .register_by_name(
                "ocm/ociArtifacts",
                &target,
                &HandlerConfig::from("ghcr.io/copy"),
                &BlobHandlerOptions::default(),
            )
            .unwrap();
        assert_eq!(target.len(), 2);

        let err = registrations
            .register_by_name(
                "ocm/npmPackage",
                &target,
                &HandlerConfig::from("x"),
                &BlobHandlerOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::NoHandlerFound { .. }));
    }
}
