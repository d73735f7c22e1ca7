//! Runme Core - Notebook Model & Identities
//!
//! Pure data types shared by the parser, printer and save engine:
//! - Document model (front matter, prose, cells, attribute lists)
//! - Lifecycle identity setting
//! - Identity tokens and the generator seam
//! - Error taxonomy

pub mod document;
pub mod error;
pub mod identity;
pub mod lifecycle;

pub use document::{
    render_attribute_entry, AttributeValue, Attributes, Block, Cell, CellRef, CellSource,
    Document, FrontMatter, LineEnding, Prose, CELL_ID_ATTRIBUTE, CELL_NAME_ATTRIBUTE,
    FRONT_MATTER_DELIMITER, FRONT_MATTER_VERSION, ID_KEY, RELATIVE_PATH_KEY, RUNME_KEY,
    SESSION_DOCUMENT_KEY, SESSION_KEY, VERSION_KEY,
};
pub use error::{
    AttributeError, FrontMatterError, IdentityCollisionError, IdentityParseError,
    LifecycleParseError, ParseError, ParseErrorKind, RunmeError, RunmeResult,
    SerializationContractViolation,
};
pub use identity::{Identity, IdentityGenerator, Timestamp, UlidGenerator};
pub use lifecycle::LifecycleSetting;
