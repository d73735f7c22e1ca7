//! Error types for Runme identity operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParseErrorKind {
    /// Front matter delimiters or shape are wrong.
    FrontMatter,
    /// Front matter body is not valid YAML.
    Yaml,
    /// A fenced code block was opened but never closed.
    UnterminatedFence,
    /// A fence info string carries an attribute list that cannot be read.
    Attributes,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParseErrorKind::FrontMatter => "front matter",
            ParseErrorKind::Yaml => "YAML",
            ParseErrorKind::UnterminatedFence => "unterminated fence",
            ParseErrorKind::Attributes => "attribute list",
        };
        f.write_str(label)
    }
}

/// The document text could not be turned into a model.
///
/// Lines and columns are 1-based.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error at {line}:{column}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            column,
            message: message.into(),
        }
    }
}

/// Attribute list mutations that would break key uniqueness.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttributeError {
    #[error("Duplicate attribute key: {key}")]
    DuplicateKey { key: String },

    #[error("Unsupported value for attribute {key}: {found}")]
    UnsupportedValue { key: String, found: String },
}

/// Front matter parsed as YAML but the `runme` section has the wrong shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrontMatterError {
    #[error("Front matter must be a mapping, found {found}")]
    NotMapping { found: String },

    #[error("Front matter key `runme` must be a mapping")]
    RunmeNotMapping,

    #[error("Front matter key `runme.id` must be a string")]
    IdNotString,
}

/// A freshly generated identity equals one already present in the document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Identity collision: {identity} already present after {attempts} attempts")]
pub struct IdentityCollisionError {
    pub identity: String,
    pub attempts: u32,
}

/// Internal invariant broken while rendering a mutated document.
///
/// These are programming errors, never caused by user input alone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationContractViolation {
    #[error("Cell {cell} has no language but needs an attribute list")]
    CellWithoutLanguage { cell: usize },

    #[error("Cell {cell} attribute list span {start}..{end} is out of bounds")]
    AttributeSpan { cell: usize, start: usize, end: usize },

    #[error("Front matter could not be rendered: {reason}")]
    FrontMatter { reason: String },
}

/// Unrecognized lifecycle setting value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid lifecycle identity setting: {0} (expected None, Doc, Cell or All)")]
pub struct LifecycleParseError(pub String);

/// Text could not be read as an identity token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid identity {value}: {reason}")]
pub struct IdentityParseError {
    pub value: String,
    pub reason: String,
}

/// Master error type for all Runme identity errors.
#[derive(Debug, Clone, Error)]
pub enum RunmeError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Identity error: {0}")]
    Collision(#[from] IdentityCollisionError),

    #[error("Serialization contract violation: {0}")]
    Contract(#[from] SerializationContractViolation),

    #[error("Config error: {0}")]
    Lifecycle(#[from] LifecycleParseError),

    #[error("Attribute error: {0}")]
    Attribute(#[from] AttributeError),
}

/// Result type alias for Runme operations.
pub type RunmeResult<T> = Result<T, RunmeError>;

// =============================================================================
// TESTS
// =============================================================================
