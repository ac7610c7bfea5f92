//! Hierarchical registry of registration handlers.
//!
//! Technology plugins register a [`RegistrationHandler`] under a path such as
//! `ocm` or `ocm/mavenPackage`. A request for a full name is offered to every
//! handler registered under a prefix of that name, most specific prefix
//! first, together with the residual part of the name. The first handler
//! that accepts wins.
//!
//! Registries can be layered: a derived registry consults its own entries
//! before the entries of its base for the same path.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::HandlerConfig;
use crate::error::{RegistrationError, Result};
use crate::path::NamePath;

/// Description of a handler name accepted by a registration handler.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandlerInfo {
    pub name: String,
    pub short_desc: String,
    pub description: String,
    /// Whether this entry groups further handler names.
    pub node: bool,
}

impl HandlerInfo {
    /// A concrete handler name.
    pub fn leaf(name: impl Into<String>, short_desc: impl Into<String>) -> Self {
        HandlerInfo {
            name: name.into(),
            short_desc: short_desc.into(),
            description: String::new(),
            node: false,
        }
    }

    /// A group of handler names.
    pub fn node(name: impl Into<String>, short_desc: impl Into<String>) -> Self {
        HandlerInfo {
            node: true,
            ..Self::leaf(name, short_desc)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A plugin able to register handlers on a target by name.
pub trait RegistrationHandler<T: ?Sized, O>: Send + Sync {
    /// Try to register the handler named by `residual` (the requested name
    /// below this handler's registration path) on `target`.
    ///
    /// Returns `Ok(false)` if the name is not handled here.
    fn register_by_name(
        &self,
        residual: &str,
        target: &T,
        config: &HandlerConfig,
        opts: &O,
    ) -> Result<bool>;

    /// Handler names known to this plugin, relative to its path.
    fn handler_infos(&self, _target: &T) -> Vec<HandlerInfo> {
        Vec::new()
    }
}

/// A registered handler together with its registration path.
pub struct RegistrationHandlerInfo<T: ?Sized, O> {
    pub path: NamePath,
    pub handler: Arc<dyn RegistrationHandler<T, O>>,
}

impl<T: ?Sized, O> Clone for RegistrationHandlerInfo<T, O> {
    fn clone(&self) -> Self {
        RegistrationHandlerInfo {
            path: self.path.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<T: ?Sized, O> fmt::Debug for RegistrationHandlerInfo<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandlerInfo")
            .field("path", &self.path.to_string())
            .finish()
    }
}

/// Registry of [`RegistrationHandler`]s keyed by path.
pub struct HandlerRegistrationRegistry<T: ?Sized, O> {
    entries: RwLock<Vec<RegistrationHandlerInfo<T, O>>>,
    base: Option<Arc<HandlerRegistrationRegistry<T, O>>>,
}

impl<T: ?Sized, O> Default for HandlerRegistrationRegistry<T, O> {
    fn default() -> Self {
        HandlerRegistrationRegistry {
            entries: RwLock::new(Vec::new()),
            base: None,
        }
    }
}

impl<T: ?Sized, O> HandlerRegistrationRegistry<T, O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry layered on top of `base`.
    pub fn derived(base: Arc<HandlerRegistrationRegistry<T, O>>) -> Self {
        HandlerRegistrationRegistry {
            entries: RwLock::new(Vec::new()),
            base: Some(base),
        }
    }

    pub fn base(&self) -> Option<&Arc<HandlerRegistrationRegistry<T, O>>> {
        self.base.as_ref()
    }

    /// Register a handler under `path`. Handlers registered under the same
    /// path are all kept, in registration order.
    pub fn register_registration_handler(
        &self,
        path: &str,
        handler: Arc<dyn RegistrationHandler<T, O>>,
    ) -> Result<()> {
        let path = NamePath::parse(path)?;
        tracing::debug!(path = %path, "registering registration handler");
        self.entries
            .write()
            .push(RegistrationHandlerInfo { path, handler });
        Ok(())
    }

    /// Handlers registered under prefixes of `path`, longest prefix first.
    /// For equal paths, entries of this registry precede those of its base.
    pub fn registration_handlers(&self, path: &str) -> Result<Vec<RegistrationHandlerInfo<T, O>>> {
        let path = NamePath::parse(path)?;
        let mut found = Vec::new();
        self.collect(&path, &mut found);
        // Stable sort keeps layering and registration order for equal lengths.
        found.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Ok(found)
    }

    fn collect(&self, path: &NamePath, found: &mut Vec<RegistrationHandlerInfo<T, O>>) {
        found.extend(
            self.entries
                .read()
                .iter()
                .filter(|e| e.path.is_prefix_of(path))
                .cloned(),
        );
        if let Some(base) = &self.base {
            base.collect(path, found);
        }
    }

    /// Offer `name` to all applicable handlers until one accepts.
    pub fn register_by_name(
        &self,
        name: &str,
        target: &T,
        config: &HandlerConfig,
        opts: &O,
    ) -> Result<()> {
        let path = NamePath::parse(name)?;
        for entry in self.registration_handlers(name)? {
            let residual = path
                .strip_prefix(&entry.path)
                .map(|p| p.to_string())
                .unwrap_or_default();
            if entry
                .handler
                .register_by_name(&residual, target, config, opts)?
            {
                tracing::debug!(name, handler = %entry.path, "registered handler by name");
                return Ok(());
            }
        }
        Err(RegistrationError::NoHandlerFound {
            name: name.to_string(),
        })
    }

    /// All handler names known to the registered handlers, with full paths.
    pub fn handler_infos(&self, target: &T) -> Vec<HandlerInfo> {
        let mut infos = Vec::new();
        let mut entries = self.entries.read().clone();
        let mut base = self.base.clone();
        while let Some(b) = base {
            entries.extend(b.entries.read().iter().cloned());
            base = b.base.clone();
        }
        for entry in entries {
            for mut info in entry.handler.handler_infos(target) {
                if !entry.path.is_empty() {
                    info.name = if info.name.is_empty() {
                        entry.path.to_string()
                    } else {
                        format!("{}/{}", entry.path, info.name)
                    };
                }
                infos.push(info);
            }
        }
        infos.sort();
        infos.dedup_by(|a, b| a.name == b.name);
        infos
    }
}

impl<T: ?Sized, O> fmt::Debug for HandlerRegistrationRegistry<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistrationRegistry")
            .field("entries", &*self.entries.read())
            .field("base", &self.base)
            .finish()
    }
}
