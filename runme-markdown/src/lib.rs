//! Runme Markdown - notebook parser & printer
//!
//! Reads Markdown notebooks into the [`runme_core::Document`] model and
//! writes them back. Printing an unmodified document returns the input byte
//! for byte; identities assigned in between are the only bytes that change.
//!
//! Architecture:
//! ```text
//! Markdown Source (.md)
//!     ↓
//! Front Matter Split (--- YAML ---)
//!     ↓
//! Fence Scanner (``` / ~~~ blocks)
//!     ↓
//! Info String Parser (language {json attributes})
//!     ↓
//! Document (prose + cells, source bytes retained)
//!     ↓
//! Printer (source bytes + appended identities)
//! ```

pub mod parser;
pub mod printer;

pub use parser::parse;
pub use printer::render;

use runme_core::{Document, RunmeResult};

/// Parses, applies `edit`, and renders again.
///
/// Convenience for callers that only need the rewritten text.
pub fn rewrite<F>(text: &str, edit: F) -> RunmeResult<String>
where
    F: FnOnce(&mut Document),
{
    let mut document = parse(text)?;
    edit(&mut document);
    Ok(render(&document)?)
}
