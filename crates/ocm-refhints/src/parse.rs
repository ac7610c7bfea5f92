//! Parser for the reference hint notation.
//!
//! ```text
//! hints := hint { ";" hint }
//! hint  := [ type "::" ] ( attr "=" value { "," attr "=" value } | value )
//! value := plain | '"' { char | '\' char } '"'
//! ```
//!
//! A value without attribute name is stored as `reference`. The parser is a
//! single pass state machine; it never fails; malformed input degrades into
//! reference values.

use crate::hint::{is_valid_name, ReferenceHint, HINT_REFERENCE, HINT_TYPE};
use crate::list::ReferenceHints;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Beginning of a hint.
    Start,
    /// First token, may become a type, an attribute name or a value.
    TypeOrValue,
    /// One `:` seen after the first token.
    ColonInType,
    /// Beginning of an attribute or value after `::` or `,`.
    PropStart,
    /// Attribute name or plain value.
    Prop,
    /// After `=`.
    ValueStart,
    /// Unquoted value.
    PlainValue,
    /// Inside a quoted value.
    EscapedValue,
    /// After the closing quote of a value.
    EscapedEnd,
}

struct Parser {
    implicit: bool,
    hints: ReferenceHints,
    hint: ReferenceHint,
    token: String,
    name: Option<String>,
    state: State,
    escape: bool,
}

impl Parser {
    fn new(implicit: bool) -> Self {
        Parser {
            implicit,
            hints: ReferenceHints::new(),
            hint: ReferenceHint::empty(implicit),
            token: String::new(),
            name: None,
            state: State::Start,
            escape: false,
        }
    }

    /// Store the pending value under the pending attribute name.
    fn flush_value(&mut self) {
        let name = self
            .name
            .take()
            .unwrap_or_else(|| HINT_REFERENCE.to_string());
        let value = std::mem::take(&mut self.token);
        self.hint.insert_unchecked(name, value);
    }

    fn end_hint(&mut self) {
        let hint = std::mem::replace(&mut self.hint, ReferenceHint::empty(self.implicit));
        // A hint consisting of the implicit marker only carries no information.
        if hint.len() > usize::from(self.implicit) {
            self.hints.push(hint);
        }
        self.state = State::Start;
    }

    /// Interpret the current token as the start of a value.
    fn token_is_value(&mut self, c: char) {
        self.token.push(c);
        self.state = State::PlainValue;
    }

    /// Finish a value on a separator. Returns false for other characters.
    fn separator(&mut self, c: char) -> bool {
        match c {
            ',' => {
                self.flush_value();
                self.state = State::PropStart;
                true
            }
            ';' => {
                self.flush_value();
                self.end_hint();
                true
            }
            _ => false,
        }
    }

    fn step(&mut self, c: char) {
        match self.state {
            State::Start => match c {
                ';' => {}
                '"' => self.state = State::EscapedValue,
                ':' | '=' | ',' => self.token_is_value(c),
                _ => {
                    self.token.push(c);
                    self.state = State::TypeOrValue;
                }
            },
            State::TypeOrValue => match c {
                ':' => self.state = State::ColonInType,
                '=' if is_valid_name(&self.token) => {
                    self.name = Some(std::mem::take(&mut self.token));
                    self.state = State::ValueStart;
                }
                ',' | ';' => {
                    self.separator(c);
                }
                _ => self.token.push(c),
            },
            State::ColonInType => match c {
                ':' => {
                    let hint_type = std::mem::take(&mut self.token);
                    self.hint.insert_unchecked(HINT_TYPE.to_string(), hint_type);
                    self.state = State::PropStart;
                }
                _ => {
                    self.token.push(':');
                    if !self.separator(c) {
                        self.token_is_value(c);
                    }
                }
            },
            State::PropStart => match c {
                '"' => self.state = State::EscapedValue,
                ';' => self.end_hint(),
                ',' => {}
                _ if c.is_ascii_alphanumeric() => {
                    self.token.push(c);
                    self.state = State::Prop;
                }
                _ => self.token_is_value(c),
            },
            State::Prop => match c {
                '=' => {
                    self.name = Some(std::mem::take(&mut self.token));
                    self.state = State::ValueStart;
                }
                _ if c.is_ascii_alphanumeric() => self.token.push(c),
                _ => {
                    if !self.separator(c) {
                        self.token_is_value(c);
                    }
                }
            },
            State::ValueStart => match c {
                '"' => self.state = State::EscapedValue,
                _ => {
                    if !self.separator(c) {
                        self.token_is_value(c);
                    }
                }
            },
            State::PlainValue => {
                if !self.separator(c) {
                    self.token.push(c);
                }
            }
            State::EscapedValue => {
                if self.escape {
                    self.token.push(c);
                    self.escape = false;
                } else if c == '\\' {
                    self.escape = true;
                } else if c == '"' {
                    self.state = State::EscapedEnd;
                } else {
                    self.token.push(c);
                }
            }
            State::EscapedEnd => {
                if !self.separator(c) {
                    self.token_is_value(c);
                }
            }
        }
    }

    fn finish(mut self) -> ReferenceHints {
        match self.state {
            State::Start => {}
            State::PropStart => self.end_hint(),
            State::ColonInType => {
                self.token.push(':');
                self.flush_value();
                self.end_hint();
            }
            State::TypeOrValue
            | State::Prop
            | State::ValueStart
            | State::PlainValue
            | State::EscapedValue
            | State::EscapedEnd => {
                self.flush_value();
                self.end_hint();
            }
        }
        self.hints
    }
}

/// Parse a `;` separated list of hints.
///
/// With `implicit` set, every parsed hint is marked implicit.
pub fn parse_hints(s: &str, implicit: bool) -> ReferenceHints {
    let mut parser = Parser::new(implicit);
    for c in s.chars() {
        parser.step(c);
    }
    parser.finish()
}
