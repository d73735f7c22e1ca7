//! Notebook document model
//!
//! A parsed Markdown notebook: optional YAML front matter followed by an
//! ordered run of prose and fenced code cells. Every block keeps the exact
//! source bytes it was parsed from so an untouched document renders back
//! byte-for-byte. Identity assignment is append-only: new keys land after
//! existing ones and existing values are never replaced.

use crate::error::{AttributeError, FrontMatterError};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::HashMap;
use std::fmt;

/// Top-level front matter key holding Runme metadata.
pub const RUNME_KEY: &str = "runme";
/// Document identity key inside the `runme` mapping.
pub const ID_KEY: &str = "id";
/// Format version key inside the `runme` mapping.
pub const VERSION_KEY: &str = "version";
/// Format version written next to a new document identity.
pub const FRONT_MATTER_VERSION: &str = "v3";
/// Front matter opening and closing delimiter line.
pub const FRONT_MATTER_DELIMITER: &str = "---";
/// Cell identity attribute.
pub const CELL_ID_ATTRIBUTE: &str = "id";
/// Human readable cell name attribute.
pub const CELL_NAME_ATTRIBUTE: &str = "name";
/// Session binding inside the `runme` mapping of a session outputs document.
pub const SESSION_KEY: &str = "session";
/// Key of the notebook reference inside the session binding.
pub const SESSION_DOCUMENT_KEY: &str = "document";
/// Notebook path, relative to the workspace, inside the notebook reference.
pub const RELATIVE_PATH_KEY: &str = "relativePath";

// ============================================================================
// LINE ENDINGS
// ============================================================================

/// Line break style used for text the engine generates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Style of the first line break in `text`, `Lf` when there is none.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(idx) if idx > 0 && text.as_bytes()[idx - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    /// Rewrites the `\n` breaks of generated text into this style.
    pub fn apply(&self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::CrLf => text.replace('\n', "\r\n"),
        }
    }
}

// ============================================================================
// ATTRIBUTES
// ============================================================================

/// Scalar value of a cell attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl AttributeValue {
    /// Converts a decoded JSON value, rejecting anything but scalars.
    pub fn from_json(key: &str, value: serde_json::Value) -> Result<Self, AttributeError> {
        match value {
            serde_json::Value::Bool(b) => Ok(AttributeValue::Bool(b)),
            serde_json::Value::Number(n) => Ok(AttributeValue::Number(n)),
            serde_json::Value::String(s) => Ok(AttributeValue::String(s)),
            other => Err(AttributeError::UnsupportedValue {
                key: key.to_string(),
                found: json_kind(&other).to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            AttributeValue::Number(n) => serde_json::Value::Number(n.clone()),
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Renders one `"key":value` pair in compact JSON.
pub fn render_attribute_entry(key: &str, value: &AttributeValue) -> String {
    format!(
        "{}:{}",
        serde_json::Value::String(key.to_string()),
        value.to_json()
    )
}

/// Ordered, unique-key attribute list of a cell.
///
/// Entries read from the document come first, in source order. Entries added
/// afterwards are appended and tracked separately so the printer can splice
/// them into the original text without touching existing bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, AttributeValue)>,
    source_len: usize,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the attribute list as read from a fence info string.
    pub fn from_source<I>(entries: I) -> Result<Self, AttributeError>
    where
        I: IntoIterator<Item = (String, AttributeValue)>,
    {
        let mut attributes = Self::new();
        for (key, value) in entries {
            attributes.push(key, value)?;
        }
        attributes.source_len = attributes.entries.len();
        Ok(attributes)
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries that were present in the source text.
    pub fn source_entries(&self) -> &[(String, AttributeValue)] {
        &self.entries[..self.source_len]
    }

    /// Entries added since parsing, in insertion order.
    pub fn appended(&self) -> &[(String, AttributeValue)] {
        &self.entries[self.source_len..]
    }

    pub fn is_modified(&self) -> bool {
        self.entries.len() > self.source_len
    }

    /// Appends a new key at the end of the list.
    pub fn push(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<(), AttributeError> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(AttributeError::DuplicateKey { key });
        }
        self.entries.push((key, value.into()));
        Ok(())
    }

    /// Compact JSON object of all entries, e.g. `{"name":"foo","id":"01H..."}`.
    pub fn to_compact_json(&self) -> String {
        let body = self
            .entries
            .iter()
            .map(|(k, v)| render_attribute_entry(k, v))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{}}}", body)
    }
}

// ============================================================================
// BLOCKS
// ============================================================================

/// Verbatim text between cells. Never inspected or rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prose(String);

impl Prose {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Position of a cell among the document's cells (prose is not counted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef(pub usize);

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell #{}", self.0)
    }
}

/// Source pieces of a fenced code block, as cut out by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSource {
    /// Opening fence line without its line break.
    pub opening: String,
    /// Line break that ends the opening line.
    pub line_break: String,
    pub language: Option<String>,
    /// Byte range of the `{...}` attribute list within `opening`.
    pub attribute_span: Option<(usize, usize)>,
    pub attributes: Attributes,
    /// Everything between the opening and closing fence lines.
    pub body: String,
    /// Closing fence line including its line break, if any.
    pub closing: String,
}

/// Executable fenced code block.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    opening: String,
    line_break: String,
    language: Option<String>,
    attribute_span: Option<(usize, usize)>,
    attributes: Attributes,
    body: String,
    closing: String,
}

impl Cell {
    pub fn from_source(source: CellSource) -> Self {
        Self {
            opening: source.opening,
            line_break: source.line_break,
            language: source.language,
            attribute_span: source.attribute_span,
            attributes: source.attributes,
            body: source.body,
            closing: source.closing,
        }
    }

    pub fn opening(&self) -> &str {
        &self.opening
    }

    pub fn line_break(&self) -> &str {
        &self.line_break
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn attribute_span(&self) -> Option<(usize, usize)> {
        self.attribute_span
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn closing(&self) -> &str {
        &self.closing
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes
            .get(CELL_NAME_ATTRIBUTE)
            .and_then(AttributeValue::as_str)
    }

    /// Cell identity when it is a string value.
    pub fn identity(&self) -> Option<&str> {
        self.attributes
            .get(CELL_ID_ATTRIBUTE)
            .and_then(AttributeValue::as_str)
    }

    /// True when an `id` key exists, whatever its value type.
    pub fn has_identity(&self) -> bool {
        self.attributes.contains_key(CELL_ID_ATTRIBUTE)
    }

    /// Appends an attribute after all existing ones.
    pub fn push_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Result<(), AttributeError> {
        self.attributes.push(key, value)
    }

    /// Appends `id` unless the cell already has one. Returns whether it was added.
    pub fn assign_identity(&mut self, identity: &Identity) -> bool {
        if self.has_identity() {
            return false;
        }
        self.attributes
            .push(CELL_ID_ATTRIBUTE, identity.to_string())
            .is_ok()
    }
}

/// A top-level piece of a notebook.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Prose(Prose),
    Cell(Cell),
}

impl Block {
    pub fn as_cell(&self) -> Option<&Cell> {
        match self {
            Block::Cell(cell) => Some(cell),
            Block::Prose(_) => None,
        }
    }

    pub fn as_cell_mut(&mut self) -> Option<&mut Cell> {
        match self {
            Block::Cell(cell) => Some(cell),
            Block::Prose(_) => None,
        }
    }

    pub fn as_prose(&self) -> Option<&Prose> {
        match self {
            Block::Prose(prose) => Some(prose),
            Block::Cell(_) => None,
        }
    }
}

// ============================================================================
// FRONT MATTER
// ============================================================================

/// YAML front matter block.
///
/// Keeps the verbatim YAML body alongside the parsed mapping. The mapping
/// preserves declared key order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    opening: String,
    yaml: String,
    closing: String,
    mapping: Mapping,
    runme_in_source: bool,
    synthesized: bool,
    edited: bool,
}

impl FrontMatter {
    /// Wraps a parsed front matter block.
    ///
    /// `opening` and `closing` are the delimiter lines including their line
    /// breaks; `yaml` is the text between them.
    pub fn from_source(
        opening: impl Into<String>,
        yaml: impl Into<String>,
        closing: impl Into<String>,
        value: YamlValue,
    ) -> Result<Self, FrontMatterError> {
        let mapping = match value {
            YamlValue::Null => Mapping::new(),
            YamlValue::Mapping(mapping) => mapping,
            other => {
                return Err(FrontMatterError::NotMapping {
                    found: yaml_kind(&other).to_string(),
                })
            }
        };

        if let Some(runme) = mapping.get(RUNME_KEY) {
            let runme = runme.as_mapping().ok_or(FrontMatterError::RunmeNotMapping)?;
            if let Some(id) = runme.get(ID_KEY) {
                if id.as_str().is_none() {
                    return Err(FrontMatterError::IdNotString);
                }
            }
        }

        Ok(Self {
            opening: opening.into(),
            yaml: yaml.into(),
            closing: closing.into(),
            runme_in_source: mapping.contains_key(RUNME_KEY),
            mapping,
            synthesized: false,
            edited: false,
        })
    }

    /// Empty front matter for a document that had none.
    pub fn synthesized(line_ending: LineEnding) -> Self {
        let delimiter = format!("{}{}", FRONT_MATTER_DELIMITER, line_ending.as_str());
        Self {
            opening: delimiter.clone(),
            yaml: String::new(),
            closing: delimiter,
            mapping: Mapping::new(),
            runme_in_source: false,
            synthesized: true,
            edited: false,
        }
    }

    pub fn opening(&self) -> &str {
        &self.opening
    }

    /// YAML body exactly as it appeared between the delimiters.
    pub fn raw_yaml(&self) -> &str {
        &self.yaml
    }

    pub fn closing(&self) -> &str {
        &self.closing
    }

    /// Current mapping, including identities assigned since parsing.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// Whether the source YAML already had a top-level `runme` key.
    pub fn runme_in_source(&self) -> bool {
        self.runme_in_source
    }

    pub fn runme(&self) -> Option<&Mapping> {
        self.mapping.get(RUNME_KEY).and_then(YamlValue::as_mapping)
    }

    pub fn identity(&self) -> Option<&str> {
        self.runme()?.get(ID_KEY)?.as_str()
    }

    pub fn version(&self) -> Option<&str> {
        self.runme()?.get(VERSION_KEY)?.as_str()
    }

    /// `runme.session.document.relativePath` of a session outputs document.
    pub fn session_document_path(&self) -> Option<&str> {
        self.runme()?
            .get(SESSION_KEY)?
            .as_mapping()?
            .get(SESSION_DOCUMENT_KEY)?
            .as_mapping()?
            .get(RELATIVE_PATH_KEY)?
            .as_str()
    }

    /// `runme.session.id` of a session outputs document.
    pub fn session_id(&self) -> Option<&str> {
        self.runme()?
            .get(SESSION_KEY)?
            .as_mapping()?
            .get(ID_KEY)?
            .as_str()
    }

    /// Records which session and notebook a session outputs document belongs to.
    ///
    /// Replaces any previous `runme.session` binding.
    pub fn bind_session(&mut self, session_id: &str, relative_path: &str) {
        let mut document = Mapping::new();
        document.insert(YamlValue::from(RELATIVE_PATH_KEY), YamlValue::from(relative_path));
        let mut session = Mapping::new();
        session.insert(YamlValue::from(ID_KEY), YamlValue::from(session_id));
        session.insert(YamlValue::from(SESSION_DOCUMENT_KEY), YamlValue::Mapping(document));

        if let Some(runme) = self.runme_mut() {
            runme.insert(YamlValue::from(SESSION_KEY), YamlValue::Mapping(session));
            self.edited = true;
        }
    }

    /// The `runme` mapping, inserted when missing.
    fn runme_mut(&mut self) -> Option<&mut Mapping> {
        let entry = self
            .mapping
            .entry(YamlValue::from(RUNME_KEY))
            .or_insert_with(|| YamlValue::Mapping(Mapping::new()));
        if !entry.is_mapping() {
            *entry = YamlValue::Mapping(Mapping::new());
        }
        entry.as_mapping_mut()
    }

    /// Inserts `runme.id` (and `runme.version` when missing) unless an id exists.
    pub fn assign_identity(&mut self, identity: &Identity) -> bool {
        if self.identity().is_some() {
            return false;
        }
        let Some(runme) = self.runme_mut() else {
            return false;
        };
        runme.insert(
            YamlValue::from(ID_KEY),
            YamlValue::String(identity.to_string()),
        );
        if !runme.contains_key(VERSION_KEY) {
            runme.insert(
                YamlValue::from(VERSION_KEY),
                YamlValue::from(FRONT_MATTER_VERSION),
            );
        }
        self.edited = true;
        true
    }
}

fn yaml_kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "bool",
        YamlValue::Number(_) => "number",
        YamlValue::String(_) => "string",
        YamlValue::Sequence(_) => "sequence",
        YamlValue::Mapping(_) => "mapping",
        YamlValue::Tagged(_) => "tagged value",
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Parsed Markdown notebook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    front_matter: Option<FrontMatter>,
    blocks: Vec<Block>,
    line_ending: LineEnding,
}

impl Document {
    pub fn new(
        front_matter: Option<FrontMatter>,
        blocks: Vec<Block>,
        line_ending: LineEnding,
    ) -> Self {
        Self {
            front_matter,
            blocks,
            line_ending,
        }
    }

    pub fn front_matter(&self) -> Option<&FrontMatter> {
        self.front_matter.as_ref()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// `runme.id` from the front matter, if present.
    pub fn document_identity(&self) -> Option<&str> {
        self.front_matter.as_ref().and_then(FrontMatter::identity)
    }

    /// No front matter, no cells, and only whitespace prose.
    pub fn is_blank(&self) -> bool {
        self.front_matter.is_none()
            && self.blocks.iter().all(|block| match block {
                Block::Prose(prose) => prose.is_blank(),
                Block::Cell(_) => false,
            })
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.blocks
            .iter()
            .filter_map(Block::as_cell)
            .enumerate()
            .map(|(idx, cell)| (CellRef(idx), cell))
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = (CellRef, &mut Cell)> {
        self.blocks
            .iter_mut()
            .filter_map(Block::as_cell_mut)
            .enumerate()
            .map(|(idx, cell)| (CellRef(idx), cell))
    }

    pub fn cell_count(&self) -> usize {
        self.cells().count()
    }

    pub fn cell(&self, cell: CellRef) -> Option<&Cell> {
        self.blocks.iter().filter_map(Block::as_cell).nth(cell.0)
    }

    pub fn cell_mut(&mut self, cell: CellRef) -> Option<&mut Cell> {
        self.blocks
            .iter_mut()
            .filter_map(Block::as_cell_mut)
            .nth(cell.0)
    }

    pub fn cell_by_name(&self, name: &str) -> Option<(CellRef, &Cell)> {
        self.cells().find(|(_, cell)| cell.name() == Some(name))
    }

    pub fn cell_by_id(&self, id: &str) -> Option<(CellRef, &Cell)> {
        self.cells().find(|(_, cell)| cell.identity() == Some(id))
    }

    /// Every identity currently present: the document's first, then cells in order.
    pub fn identities(&self) -> Vec<&str> {
        self.document_identity()
            .into_iter()
            .chain(self.cells().filter_map(|(_, cell)| cell.identity()))
            .collect()
    }

    /// Cell identities that appear on more than one cell, in first-seen order.
    pub fn duplicate_cell_ids(&self) -> Vec<&str> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut order = Vec::new();
        for (_, cell) in self.cells() {
            if let Some(id) = cell.identity() {
                let count = counts.entry(id).or_insert(0);
                if *count == 0 {
                    order.push(id);
                }
                *count += 1;
            }
        }
        order.into_iter().filter(|id| counts[id] > 1).collect()
    }

    pub fn session_document_path(&self) -> Option<&str> {
        self.front_matter
            .as_ref()
            .and_then(FrontMatter::session_document_path)
    }

    /// Binds a session outputs document to its session and source notebook,
    /// creating front matter when there is none.
    pub fn bind_session(&mut self, session_id: &str, relative_path: &str) {
        let line_ending = self.line_ending;
        self.front_matter
            .get_or_insert_with(|| FrontMatter::synthesized(line_ending))
            .bind_session(session_id, relative_path);
    }

    /// Sets the document identity, creating front matter when there is none.
    /// An existing identity is never replaced.
    pub fn assign_document_identity(&mut self, identity: &Identity) -> bool {
        if self.document_identity().is_some() {
            return false;
        }
        let line_ending = self.line_ending;
        self.front_matter
            .get_or_insert_with(|| FrontMatter::synthesized(line_ending))
            .assign_identity(identity)
    }

    /// Appends `id` to a cell unless it already has one.
    pub fn assign_cell_identity(&mut self, cell: CellRef, identity: &Identity) -> bool {
        self.cell_mut(cell)
            .map(|cell| cell.assign_identity(identity))
            .unwrap_or(false)
    }
}

// =============================================================================
// TESTS
// =============================================================================
