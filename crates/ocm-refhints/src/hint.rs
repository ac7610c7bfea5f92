//! A single reference hint.
//!
//! A hint is a small set of string properties describing where an artifact
//! can be found in a technology specific registry. Property names consist of
//! ASCII letters and digits. Three names are reserved:
//!
//! - `type`: the technology of the hint (`oci`, `maven`, ...). Its value
//!   must not contain the separators `:`, `;`, `,`, `=` or `"`.
//! - `reference`: the default locator in the technology's own notation
//! - `implicit`: marks a hint derived by an access method rather than
//!   provided by the artifact author. It is never persisted.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{HintError, Result};

/// Property holding the hint type.
pub const HINT_TYPE: &str = "type";
/// Property holding the default locator.
pub const HINT_REFERENCE: &str = "reference";
/// Property marking an implicitly derived hint.
pub const HINT_IMPLICIT: &str = "implicit";
/// Value of [`HINT_IMPLICIT`] for implicit hints.
pub const IMPLICIT_TRUE: &str = "true";

/// A typed set of hint properties, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReferenceHint {
    props: BTreeMap<String, String>,
}

impl ReferenceHint {
    /// A hint with a reference and an optional type.
    ///
    /// An empty `hint_type` yields an untyped hint.
    pub fn new(hint_type: &str, reference: impl Into<String>, implicit: bool) -> Result<Self> {
        let mut hint = Self::untyped(reference, implicit);
        if !hint_type.is_empty() {
            hint.set_property(HINT_TYPE, hint_type)?;
        }
        Ok(hint)
    }

    /// A hint with a reference but no type.
    pub fn untyped(reference: impl Into<String>, implicit: bool) -> Self {
        let mut hint = Self::empty(implicit);
        hint.props.insert(HINT_REFERENCE.to_string(), reference.into());
        hint
    }

    pub(crate) fn empty(implicit: bool) -> Self {
        let mut hint = ReferenceHint::default();
        if implicit {
            hint.props
                .insert(HINT_IMPLICIT.to_string(), IMPLICIT_TRUE.to_string());
        }
        hint
    }

    /// Build a hint from raw properties, checking all names.
    pub fn from_properties<I, K, V>(props: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut hint = ReferenceHint::default();
        for (k, v) in props {
            hint.set_property(k, v)?;
        }
        Ok(hint)
    }

    /// The hint type, if any.
    pub fn hint_type(&self) -> Option<&str> {
        self.get_property(HINT_TYPE)
    }

    /// The default locator, if any.
    pub fn reference(&self) -> Option<&str> {
        self.get_property(HINT_REFERENCE)
    }

    /// Whether the hint was derived implicitly.
    pub fn is_implicit(&self) -> bool {
        self.get_property(HINT_IMPLICIT) == Some(IMPLICIT_TRUE)
    }

    pub fn get_property(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }

    /// Set a property. Names must be non-empty and alphanumeric, a type
    /// must be non-empty and free of separators.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(HintError::InvalidAttribute { name });
        }
        let value = value.into();
        if name == HINT_TYPE && !is_valid_type(&value) {
            return Err(HintError::Invalid {
                detail: format!("hint type {value:?} is empty or contains a separator"),
            });
        }
        self.props.insert(name, value);
        Ok(())
    }

    /// Builder variant of [`ReferenceHint::set_property`].
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.set_property(name, value)?;
        Ok(self)
    }

    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        self.props.remove(name)
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Properties in name order.
    pub fn properties(&self) -> btree_map::Iter<'_, String, String> {
        self.props.iter()
    }

    pub(crate) fn insert_unchecked(&mut self, name: String, value: String) {
        self.props.insert(name, value);
    }

    /// Render the hint in its string notation.
    ///
    /// The `implicit` property is only included when `implicit` is true.
    pub fn serialize(&self, implicit: bool) -> String {
        let skip_implicit = !implicit && self.props.contains_key(HINT_IMPLICIT);
        let count = self.props.len() - usize::from(skip_implicit);
        let hint_type = self.hint_type().unwrap_or("");
        let has_type = self.props.contains_key(HINT_TYPE);

        let mut out = String::new();
        if !hint_type.is_empty() {
            out.push_str(hint_type);
            out.push_str("::");
        }
        if let Some(reference) = self.reference() {
            let only_reference = if has_type { count == 2 } else { count == 1 };
            if only_reference {
                out.push_str(&escape_reference(reference));
                return out;
            }
        }

        let mut sep = "";
        for (k, v) in &self.props {
            if k == HINT_TYPE || (skip_implicit && k == HINT_IMPLICIT) {
                continue;
            }
            out.push_str(sep);
            out.push_str(k);
            out.push('=');
            out.push_str(&escape_value(v));
            sep = ",";
        }
        out
    }
}

impl fmt::Display for ReferenceHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize(false))
    }
}

/// Deserializes from a property map, checking names and the type.
impl<'de> Deserialize<'de> for ReferenceHint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let props = BTreeMap::<String, String>::deserialize(deserializer)?;
        ReferenceHint::from_properties(props).map_err(serde::de::Error::custom)
    }
}

impl<'a> IntoIterator for &'a ReferenceHint {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.props.iter()
    }
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_valid_type(hint_type: &str) -> bool {
    !hint_type.is_empty() && !hint_type.contains([':', ';', ',', '=', '"'])
}

/// Quote a value if it contains a character with syntactic meaning.
pub fn escape_value(v: &str) -> String {
    if v.contains(['"', ',', ';']) {
        quote(v)
    } else {
        v.to_string()
    }
}

/// A bare reference must additionally not look like a type prefix or an
/// attribute assignment.
fn escape_reference(v: &str) -> String {
    if v.is_empty() || v.contains("::") || v.contains('=') {
        quote(v)
    } else {
        escape_value(v)
    }
}

fn quote(v: &str) -> String {
    let mut out = String::with_capacity(v.len() + 2);
    out.push('"');
    for c in v.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
