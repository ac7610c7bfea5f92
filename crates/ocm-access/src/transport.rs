//! Transports: pluggable byte movers addressed by [`Locator`].
//!
//! Access methods never speak a network protocol themselves. They build a
//! locator and ask the context's [`TransportRegistry`] for the transport
//! registered under the locator scheme. Only the `file` scheme is built in.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ocm_blob::BlobReader;
use parking_lot::RwLock;

use crate::error::{AccessError, Result};

pub const SCHEME_FILE: &str = "file";

/// Address of a piece of content within some transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub scheme: String,
    pub location: String,
    /// Transport specific parameters (region, media type, ...).
    pub attributes: BTreeMap<String, String>,
}

impl Locator {
    pub fn new(scheme: impl Into<String>, location: impl Into<String>) -> Self {
        Locator {
            scheme: scheme.into(),
            location: location.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Locator::new(SCHEME_FILE, path.as_ref().to_string_lossy())
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Interpret a URL or plain path.
    ///
    /// `file://[localhost]/p` and plain paths map to the `file` scheme with
    /// the path as location. Any other `scheme://...` keeps the full URL as
    /// location.
    pub fn from_url(url: &str) -> Result<Self> {
        if url.is_empty() {
            return Err(AccessError::invalid("locator", "empty URL"));
        }
        match url.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case(SCHEME_FILE) => {
                let path = rest.strip_prefix("localhost").unwrap_or(rest);
                if path.is_empty() {
                    return Err(AccessError::invalid("locator", format!("no path in {url}")));
                }
                Ok(Locator::new(SCHEME_FILE, path))
            }
            Some((scheme, _))
                if !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
            {
                Ok(Locator::new(scheme.to_ascii_lowercase(), url))
            }
            Some(_) => Err(AccessError::invalid("locator", format!("malformed URL {url}"))),
            None => Ok(Locator::new(SCHEME_FILE, url)),
        }
    }

    /// A locator for `segment` below this one, joined with `/`.
    pub fn join(&self, segment: &str) -> Locator {
        let location = if self.location.ends_with('/') {
            format!("{}{}", self.location, segment.trim_start_matches('/'))
        } else {
            format!("{}/{}", self.location, segment.trim_start_matches('/'))
        };
        Locator {
            scheme: self.scheme.clone(),
            location,
            attributes: self.attributes.clone(),
        }
    }

    /// Filesystem path for `file` locators.
    pub fn path(&self) -> Option<PathBuf> {
        (self.scheme == SCHEME_FILE).then(|| PathBuf::from(&self.location))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.contains("://") {
            f.write_str(&self.location)?;
        } else {
            write!(f, "{}://{}", self.scheme, self.location)?;
        }
        for (i, (k, v)) in self.attributes.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

/// Moves bytes to and from one kind of storage.
///
/// Implementations mark transient failures with
/// [`AccessError::retriable`] so callers can repeat them.
pub trait Transport: Send + Sync {
    /// Open the content at `locator`.
    fn fetch(&self, locator: &Locator) -> Result<BlobReader>;

    /// Write `content` to `locator`, returning the number of bytes stored.
    fn store(&self, locator: &Locator, _content: &mut dyn Read) -> Result<u64> {
        Err(AccessError::not_supported(
            format!("storing {locator}"),
            format!("{} transport", locator.scheme),
        ))
    }

    /// Whether content exists at `locator`.
    fn exists(&self, locator: &Locator) -> Result<bool>;

    /// Names of the entries directly below `locator`.
    fn list(&self, locator: &Locator) -> Result<Vec<String>> {
        Err(AccessError::not_supported(
            format!("listing {locator}"),
            format!("{} transport", locator.scheme),
        ))
    }
}

/// Transports keyed by scheme.
#[derive(Default)]
pub struct TransportRegistry {
    transports: RwLock<HashMap<String, Arc<dyn Transport>>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        TransportRegistry::default()
    }

    /// A registry with the built-in `file` transport.
    pub fn with_defaults() -> Self {
        let registry = TransportRegistry::new();
        registry.register(SCHEME_FILE, Arc::new(FileTransport));
        registry
    }

    /// Register a transport, replacing an earlier one for the same scheme.
    pub fn register(&self, scheme: impl Into<String>, transport: Arc<dyn Transport>) {
        let scheme = scheme.into();
        tracing::debug!(%scheme, "registering transport");
        self.transports.write().insert(scheme, transport);
    }

    pub fn get(&self, scheme: &str) -> Result<Arc<dyn Transport>> {
        self.transports
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| AccessError::not_supported(format!("scheme {scheme:?}"), "transport registry"))
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.transports.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    fn path(locator: &Locator) -> Result<PathBuf> {
        locator.path().ok_or_else(|| {
            AccessError::invalid("locator", format!("{locator} is not a file locator"))
        })
    }
}

impl Transport for FileTransport {
    fn fetch(&self, locator: &Locator) -> Result<BlobReader> {
        let path = Self::path(locator)?;
        match fs::File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AccessError::not_found("file", path.display().to_string()))
            }
            Err(e) => Err(AccessError::io(format!("opening {}", path.display()), e)),
        }
    }

    fn store(&self, locator: &Locator, content: &mut dyn Read) -> Result<u64> {
        let path = Self::path(locator)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AccessError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut file = fs::File::create(&path)
            .map_err(|e| AccessError::io(format!("creating {}", path.display()), e))?;
        std::io::copy(content, &mut file)
            .map_err(|e| AccessError::io(format!("writing {}", path.display()), e))
    }

    fn exists(&self, locator: &Locator) -> Result<bool> {
        Ok(Self::path(locator)?.exists())
    }

    fn list(&self, locator: &Locator) -> Result<Vec<String>> {
        let path = Self::path(locator)?;
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AccessError::not_found("directory", path.display().to_string()))
            }
            Err(e) => return Err(AccessError::io(format!("listing {}", path.display()), e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AccessError::io(format!("listing {}", path.display()), e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
