//! Slash separated registration paths.

use std::fmt;
use std::str::FromStr;

use crate::error::{RegistrationError, Result};

/// A registration path such as `ocm/mavenPackage`, split into segments.
///
/// The empty path is the root and is a prefix of every path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamePath {
    segments: Vec<String>,
}

impl NamePath {
    /// Split a path at `/`. Empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Ok(NamePath::default());
        }
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(RegistrationError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(NamePath { segments })
    }

    pub fn root() -> Self {
        NamePath::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Whether `self` is a segment-wise prefix of `other`.
    pub fn is_prefix_of(&self, other: &NamePath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// The part of `self` following `prefix`.
    pub fn strip_prefix(&self, prefix: &NamePath) -> Option<NamePath> {
        self.segments
            .strip_prefix(prefix.segments.as_slice())
            .map(|rest| NamePath {
                segments: rest.to_vec(),
            })
    }

    /// Append another path.
    pub fn join(&self, other: &NamePath) -> NamePath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        NamePath { segments }
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for NamePath {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        NamePath::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let p = NamePath::parse("a/b/c").unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p.first(), Some("a"));
        assert_eq!(p.to_string(), "a/b/c");
        assert!(NamePath::parse("").unwrap().is_empty());
        assert!(NamePath::parse("a//b").is_err());
        assert!(NamePath::parse("/a").is_err());
    }

    #[test]
    fn prefixes() {
        let abc = NamePath::parse("a/b/c").unwrap();
        let ab = NamePath::parse("a/b").unwrap();
        let ax: NamePath = "a/x".parse().unwrap();
        assert!(ab.is_prefix_of(&abc));
        assert!(NamePath::root().is_prefix_of(&abc));
        assert!(!ax.is_prefix_of(&abc));
        assert_eq!(abc.strip_prefix(&ab).unwrap().to_string(), "c");
        assert!(abc.strip_prefix(&ax).is_none());
        assert_eq!(ab.join(&ax).to_string(), "a/b/a/x");
    }
}
