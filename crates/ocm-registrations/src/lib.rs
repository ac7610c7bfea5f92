//! Hierarchical handler registration for OCM technology plugins.
//!
//! Plugins register under slash separated paths. A full handler name such
//! as `ocm/mavenPackage` is resolved against the registered prefixes, most
//! specific first, and the matching plugin interprets the rest of the name.

pub mod config;
pub mod error;
pub mod path;
pub mod registry;

pub use config::HandlerConfig;
pub use error::{RegistrationError, Result};
pub use path::NamePath;
pub use registry::{
    HandlerInfo, HandlerRegistrationRegistry, RegistrationHandler, RegistrationHandlerInfo,
};
