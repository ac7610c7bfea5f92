//! Reference hints for uploaded OCM artifacts.
//!
//! After a blob is uploaded into a technology specific registry, a reference
//! hint records the coordinates it can be found under again. Hints have a
//! compact string notation:
//!
//! ```text
//! oci::ghcr.io/acme/app:1.0;maven::reference=org.acme:lib:1.0,classifier=src
//! ```
//!
//! - [`hint`]: a single hint and its serialization
//! - [`parse`]: the notation parser
//! - [`list`]: ordered hint lists

pub mod error;
pub mod hint;
pub mod list;
pub mod parse;

pub use error::{HintError, Result};
pub use hint::{ReferenceHint, HINT_IMPLICIT, HINT_REFERENCE, HINT_TYPE, IMPLICIT_TRUE};
pub use list::{get_reference, join_unique, ReferenceHints};
pub use parse::parse_hints;
