//! Ordered lists of reference hints.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::hint::ReferenceHint;
use crate::parse::parse_hints;

/// An ordered list of hints.
///
/// [`ReferenceHints::add`] keeps at most one hint per type; plain
/// construction via [`ReferenceHints::push`] or `collect` keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReferenceHints {
    hints: Vec<ReferenceHint>,
}

impl ReferenceHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReferenceHint> {
        self.hints.iter()
    }

    /// Append a hint unconditionally.
    pub fn push(&mut self, hint: ReferenceHint) {
        self.hints.push(hint);
    }

    /// Append a hint unless a hint of the same type is already present.
    /// Returns whether the hint was added.
    pub fn add(&mut self, hint: ReferenceHint) -> bool {
        if self
            .hints
            .iter()
            .any(|h| h.hint_type() == hint.hint_type())
        {
            return false;
        }
        self.hints.push(hint);
        true
    }

    /// Add all hints, first type occurrence wins.
    pub fn add_all(&mut self, hints: impl IntoIterator<Item = ReferenceHint>) {
        for hint in hints {
            self.add(hint);
        }
    }

    /// Hints whose type is one of `types`. No types selects all hints.
    pub fn filter_by_type(&self, types: &[&str]) -> ReferenceHints {
        if types.is_empty() {
            return self.clone();
        }
        self.hints
            .iter()
            .filter(|h| matches_type(h, types))
            .cloned()
            .collect()
    }

    /// The first hint whose type is one of `types`.
    pub fn get_reference_hint(&self, types: &[&str]) -> Option<&ReferenceHint> {
        if types.is_empty() {
            return None;
        }
        self.hints.iter().find(|h| matches_type(h, types))
    }

    /// The `reference` of the first hint whose type is one of `types`.
    pub fn get_reference(&self, types: &[&str]) -> Option<&str> {
        self.get_reference_hint(types)
            .and_then(ReferenceHint::reference)
    }

    /// Render the list in string notation, hints separated by `;`.
    pub fn serialize(&self, implicit: bool) -> String {
        self.hints
            .iter()
            .map(|h| h.serialize(implicit))
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn matches_type(hint: &ReferenceHint, types: &[&str]) -> bool {
    let hint_type = hint.hint_type().unwrap_or("");
    types.iter().any(|t| *t == hint_type)
}

/// Join hint lists; the first occurrence of a hint type takes precedence.
pub fn join_unique<'a>(lists: impl IntoIterator<Item = &'a ReferenceHints>) -> ReferenceHints {
    let mut result = ReferenceHints::new();
    for list in lists {
        result.add_all(list.iter().cloned());
    }
    result
}

/// The `reference` of the first hint of one of the given types.
pub fn get_reference(hints: &ReferenceHints, types: &[&str]) -> Option<String> {
    hints.get_reference(types).map(str::to_string)
}

impl fmt::Display for ReferenceHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize(false))
    }
}

impl From<ReferenceHint> for ReferenceHints {
    fn from(hint: ReferenceHint) -> Self {
        ReferenceHints { hints: vec![hint] }
    }
}

impl From<Vec<ReferenceHint>> for ReferenceHints {
    fn from(hints: Vec<ReferenceHint>) -> Self {
        ReferenceHints { hints }
    }
}

impl FromIterator<ReferenceHint> for ReferenceHints {
    fn from_iter<I: IntoIterator<Item = ReferenceHint>>(iter: I) -> Self {
        ReferenceHints {
            hints: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ReferenceHints {
    type Item = ReferenceHint;
    type IntoIter = std::vec::IntoIter<ReferenceHint>;

    fn into_iter(self) -> Self::IntoIter {
        self.hints.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReferenceHints {
    type Item = &'a ReferenceHint;
    type IntoIter = std::slice::Iter<'a, ReferenceHint>;

    fn into_iter(self) -> Self::IntoIter {
        self.hints.iter()
    }
}

/// Accepts the list form or the string notation.
impl<'de> Deserialize<'de> for ReferenceHints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            List(Vec<ReferenceHint>),
            Notation(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::List(hints) => ReferenceHints { hints },
            Repr::Notation(s) => parse_hints(&s, false),
        })
    }
}
