//! Notebook printer
//!
//! Structural inverse of [`crate::parse`]. Untouched parts are emitted from
//! their stored source bytes; identities added since parsing are spliced in
//! without rewriting anything that was already there.

use crate::parser::fence::split_line_break;
use crate::parser::front_matter::is_blank_yaml;
use runme_core::{
    render_attribute_entry, Block, Cell, Document, FrontMatter, LineEnding,
    SerializationContractViolation, RUNME_KEY,
};
use serde_yaml::{Mapping, Value as YamlValue};

/// Renders a document back to Markdown text.
///
/// # Errors
/// Returns a [`SerializationContractViolation`] when the model cannot be
/// rendered, e.g. a new attribute list on a cell without a language.
pub fn render(document: &Document) -> Result<String, SerializationContractViolation> {
    let line_ending = document.line_ending();
    let mut out = String::new();

    if let Some(front_matter) = document.front_matter() {
        render_front_matter(front_matter, line_ending, &mut out)?;
        if front_matter.is_synthesized() && !starts_with_line_break(document.blocks()) {
            out.push_str(line_ending.as_str());
        }
    }

    let mut cell_index = 0;
    for block in document.blocks() {
        match block {
            Block::Prose(prose) => out.push_str(prose.as_str()),
            Block::Cell(cell) => {
                render_cell(cell_index, cell, &mut out)?;
                cell_index += 1;
            }
        }
    }

    Ok(out)
}

fn starts_with_line_break(blocks: &[Block]) -> bool {
    match blocks.first() {
        Some(Block::Prose(prose)) => {
            let text = prose.as_str();
            text.starts_with('\n') || text.starts_with("\r\n")
        }
        _ => false,
    }
}

fn render_front_matter(
    front_matter: &FrontMatter,
    line_ending: LineEnding,
    out: &mut String,
) -> Result<(), SerializationContractViolation> {
    out.push_str(front_matter.opening());
    if front_matter.is_edited() {
        out.push_str(&edited_yaml(front_matter, line_ending)?);
    } else {
        out.push_str(front_matter.raw_yaml());
    }
    out.push_str(front_matter.closing());
    Ok(())
}

/// YAML body of a front matter block that gained `runme` entries.
///
/// New entries are spliced into the source text so comments, quoting and
/// flow collections survive. When the splice does not read back as the
/// current mapping (flow style document, quoted `runme` key, changed
/// values) the whole mapping is re-emitted instead.
fn edited_yaml(
    front_matter: &FrontMatter,
    line_ending: LineEnding,
) -> Result<String, SerializationContractViolation> {
    let expected = YamlValue::Mapping(front_matter.mapping().clone());

    if let Some(spliced) = splice_runme(front_matter, line_ending) {
        if reads_back_as(&spliced, &expected) {
            return Ok(spliced);
        }
    }

    let emitted = line_ending.apply(&to_yaml(front_matter.mapping())?);
    if reads_back_as(&emitted, &expected) {
        Ok(emitted)
    } else {
        Err(SerializationContractViolation::FrontMatter {
            reason: "re-emitted front matter does not read back as its mapping".to_string(),
        })
    }
}

fn reads_back_as(yaml: &str, expected: &YamlValue) -> bool {
    serde_yaml::from_str::<YamlValue>(yaml).is_ok_and(|value| &value == expected)
}

fn to_yaml(mapping: &Mapping) -> Result<String, SerializationContractViolation> {
    serde_yaml::to_string(mapping).map_err(|e| SerializationContractViolation::FrontMatter {
        reason: e.to_string(),
    })
}

/// One line of a YAML body.
#[derive(Debug, Clone, Copy)]
struct YamlLine<'a> {
    offset: usize,
    raw: &'a str,
    content: &'a str,
}

impl YamlLine<'_> {
    fn indent(&self) -> usize {
        self.content.bytes().take_while(|b| *b == b' ').count()
    }

    /// Not blank and not a comment.
    fn is_significant(&self) -> bool {
        let trimmed = self.content.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    }
}

fn yaml_lines(yaml: &str) -> Vec<YamlLine<'_>> {
    let mut offset = 0;
    yaml.split_inclusive('\n')
        .map(|raw| {
            let (content, _) = split_line_break(raw);
            let line = YamlLine {
                offset,
                raw,
                content,
            };
            offset += raw.len();
            line
        })
        .collect()
}

/// Prefixes every non-blank line of generated YAML with `width` spaces.
fn indent_lines(text: &str, width: usize) -> String {
    let prefix = " ".repeat(width);
    text.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect()
}

/// Source text with the `runme` entries added since parsing, if they can be
/// placed without touching any other byte.
fn splice_runme(front_matter: &FrontMatter, line_ending: LineEnding) -> Option<String> {
    let raw = front_matter.raw_yaml();
    let current = front_matter.mapping().get(RUNME_KEY)?;
    let source = if is_blank_yaml(raw) {
        Mapping::new()
    } else {
        match serde_yaml::from_str::<YamlValue>(raw).ok()? {
            YamlValue::Null => Mapping::new(),
            YamlValue::Mapping(mapping) => mapping,
            _ => return None,
        }
    };

    let lines = yaml_lines(raw);
    let indent = lines
        .iter()
        .find(|line| line.is_significant())
        .map(YamlLine::indent)
        .unwrap_or(0);

    match source.get(RUNME_KEY) {
        None => append_runme_section(raw, &lines, indent, current, line_ending),
        Some(YamlValue::Mapping(existing)) => {
            let YamlValue::Mapping(current) = current else {
                return None;
            };
            insert_runme_entries(raw, &lines, indent, existing, current, line_ending)
        }
        Some(_) => None,
    }
}

/// Appends a `runme:` section at the top-level indentation, ahead of a
/// trailing `...` document end marker.
fn append_runme_section(
    raw: &str,
    lines: &[YamlLine<'_>],
    indent: usize,
    runme: &YamlValue,
    line_ending: LineEnding,
) -> Option<String> {
    let mut section = Mapping::new();
    section.insert(YamlValue::from(RUNME_KEY), runme.clone());
    let text = line_ending.apply(&indent_lines(&to_yaml(&section).ok()?, indent));

    let insert_at = lines
        .iter()
        .rev()
        .find(|line| !line.content.trim().is_empty())
        .filter(|line| line.content.trim_end() == "...")
        .map(|line| line.offset)
        .unwrap_or(raw.len());

    let mut out = String::with_capacity(raw.len() + text.len() + 2);
    out.push_str(&raw[..insert_at]);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push_str(line_ending.as_str());
    }
    out.push_str(&text);
    out.push_str(&raw[insert_at..]);
    Some(out)
}

/// Inserts new keys of a block-style `runme` mapping directly under its
/// `runme:` line, at the indentation of its first child.
fn insert_runme_entries(
    raw: &str,
    lines: &[YamlLine<'_>],
    indent: usize,
    existing: &Mapping,
    current: &Mapping,
    line_ending: LineEnding,
) -> Option<String> {
    if existing.iter().any(|(key, value)| current.get(key) != Some(value)) {
        return None;
    }
    let additions: Mapping = current
        .iter()
        .filter(|(key, _)| !existing.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if additions.is_empty() {
        return None;
    }

    let position = lines.iter().position(|line| {
        line.indent() == indent && is_runme_key_line(&line.content[indent..])
    })?;
    let child_indent = lines[position + 1..]
        .iter()
        .find(|line| line.is_significant())
        .map(YamlLine::indent)
        .filter(|child| *child > indent)?;

    let runme_line = lines[position];
    let insert_at = runme_line.offset + runme_line.raw.len();
    let text = line_ending.apply(&indent_lines(&to_yaml(&additions).ok()?, child_indent));

    let mut out = String::with_capacity(raw.len() + text.len() + 2);
    out.push_str(&raw[..insert_at]);
    if !runme_line.raw.ends_with('\n') {
        out.push_str(line_ending.as_str());
    }
    out.push_str(&text);
    out.push_str(&raw[insert_at..]);
    Some(out)
}

/// `runme:` with nothing after it but an optional comment.
fn is_runme_key_line(line: &str) -> bool {
    line.strip_prefix(RUNME_KEY)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(str::trim)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('#'))
}

fn render_cell(
    index: usize,
    cell: &Cell,
    out: &mut String,
) -> Result<(), SerializationContractViolation> {
    let attributes = cell.attributes();
    if !attributes.is_modified() {
        out.push_str(cell.opening());
    } else {
        out.push_str(&splice_attributes(index, cell)?);
    }
    out.push_str(cell.line_break());
    out.push_str(cell.body());
    out.push_str(cell.closing());
    Ok(())
}

/// Opening line with appended attributes inserted into (or after) the list.
fn splice_attributes(index: usize, cell: &Cell) -> Result<String, SerializationContractViolation> {
    let opening = cell.opening();
    let attributes = cell.attributes();
    let appended = attributes
        .appended()
        .iter()
        .map(|(key, value)| render_attribute_entry(key, value))
        .collect::<Vec<_>>()
        .join(",");

    match cell.attribute_span() {
        Some((start, end)) => {
            let valid = start < end
                && end <= opening.len()
                && opening.get(start..end).is_some_and(|list| list.ends_with('}'));
            if !valid {
                return Err(SerializationContractViolation::AttributeSpan {
                    cell: index,
                    start,
                    end,
                });
            }
            let insert_at = end - 1;
            let separator = if attributes.source_entries().is_empty() {
                ""
            } else {
                ","
            };
            Ok(format!(
                "{}{}{}{}",
                &opening[..insert_at],
                separator,
                appended,
                &opening[insert_at..]
            ))
        }
        None => {
            if cell.language().is_none() {
                return Err(SerializationContractViolation::CellWithoutLanguage { cell: index });
            }
            let trimmed = opening.trim_end().len();
            Ok(format!(
                "{} {{{}}}{}",
                &opening[..trimmed],
                appended,
                &opening[trimmed..]
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use runme_core::{CellRef, Identity};

    const CELL_ID: &str = "01HEXJ9KWG7BYSFYCNKVF0VWR6";
    const DOC_ID: &str = "01HEXJ9KWG7BYSFYCNKSRE4JZR";

    fn id(token: &str) -> Identity {
        token.parse().unwrap()
    }

    #[test]
    fn test_unmodified_round_trip() {
        let text = "---\nfoo:   bar # comment\n---\n\n# T\n\n```sh {\"name\": \"x\"}\necho\n```\n";
        assert_eq!(render(&parse(text).unwrap()).unwrap(), text);
    }

    #[test]
    fn test_cell_id_appended_after_name() {
        let text = "```js {\"name\":\"foo\"}\nconsole.log(1)\n```\n";
        let mut doc = parse(text).unwrap();
        assert!(doc.assign_cell_identity(CellRef(0), &id(CELL_ID)));
        assert_eq!(
            render(&doc).unwrap(),
            format!("```js {{\"name\":\"foo\",\"id\":\"{CELL_ID}\"}}\nconsole.log(1)\n```\n")
        );
    }

    #[test]
    fn test_cell_id_added_without_list() {
        let mut doc = parse("```js\nx\n```\n").unwrap();
        doc.assign_cell_identity(CellRef(0), &id(CELL_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("```js {{\"id\":\"{CELL_ID}\"}}\nx\n```\n")
        );
    }

    #[test]
    fn test_cell_id_added_to_empty_list_keeps_spacing() {
        let mut doc = parse("```js { }\nx\n```\n").unwrap();
        doc.assign_cell_identity(CellRef(0), &id(CELL_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("```js {{ \"id\":\"{CELL_ID}\"}}\nx\n```\n")
        );
    }

    #[test]
    fn test_cell_without_language_is_contract_violation() {
        let mut doc = parse("```\nplain\n```\n").unwrap();
        doc.assign_cell_identity(CellRef(0), &id(CELL_ID));
        let err = render(&doc).unwrap_err();
        assert_eq!(err, SerializationContractViolation::CellWithoutLanguage { cell: 0 });
    }

    #[test]
    fn test_document_id_appended_after_existing_keys() {
        let text = "---\nfoo:\n  bar: baz\n---\n\n## Doc\n";
        let mut doc = parse(text).unwrap();
        assert!(doc.assign_document_identity(&id(DOC_ID)));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\nfoo:\n  bar: baz\nrunme:\n  id: {DOC_ID}\n  version: v3\n---\n\n## Doc\n")
        );
    }

    #[test]
    fn test_document_id_synthesizes_front_matter() {
        let mut doc = parse("## Shebang\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\nrunme:\n  id: {DOC_ID}\n  version: v3\n---\n\n## Shebang\n")
        );

        let mut doc = parse("\n## Shebang\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\nrunme:\n  id: {DOC_ID}\n  version: v3\n---\n\n## Shebang\n")
        );
    }

    #[test]
    fn test_document_id_into_existing_runme_section() {
        let mut doc = parse("---\nrunme:\n  version: v3\n---\nbody\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\nrunme:\n  id: {DOC_ID}\n  version: v3\n---\nbody\n")
        );
    }

    #[test]
    fn test_document_id_keeps_comments_quotes_and_flow_values() {
        let text = "---\ntitle: \"Hello\"  # main title\ntags: [a, b]\nrunme:   # meta\n  # format\n  version: v3\n---\nbody\n";
        let mut doc = parse(text).unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\ntitle: \"Hello\"  # main title\ntags: [a, b]\nrunme:   # meta\n  id: {DOC_ID}\n  # format\n  version: v3\n---\nbody\n")
        );
    }

    #[test]
    fn test_document_id_follows_indented_top_level() {
        let mut doc = parse("---\n  title: x\n---\nbody\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\n  title: x\n  runme:\n    id: {DOC_ID}\n    version: v3\n---\nbody\n")
        );
    }

    #[test]
    fn test_document_id_goes_before_document_end_marker() {
        let mut doc = parse("---\ntitle: x\n...\n---\nbody\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        let out = render(&doc).unwrap();
        assert_eq!(
            out,
            format!("---\ntitle: x\nrunme:\n  id: {DOC_ID}\n  version: v3\n...\n---\nbody\n")
        );
        assert_eq!(parse(&out).unwrap().document_identity(), Some(DOC_ID));
    }

    #[test]
    fn test_flow_style_front_matter_is_re_emitted() {
        let mut doc = parse("---\n{title: Hello}\n---\nbody\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        let out = render(&doc).unwrap();
        assert_eq!(
            out,
            format!("---\ntitle: Hello\nrunme:\n  id: {DOC_ID}\n  version: v3\n---\nbody\n")
        );
        assert_eq!(parse(&out).unwrap().document_identity(), Some(DOC_ID));
    }

    #[test]
    fn test_flow_style_runme_section_is_re_emitted() {
        let mut doc = parse("---\nrunme: {version: v3}\n---\nbody\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\nrunme:\n  version: v3\n  id: {DOC_ID}\n---\nbody\n")
        );
    }

    #[test]
    fn test_comment_only_front_matter_gains_section() {
        let mut doc = parse("---\n# draft\n---\nbody\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\n# draft\nrunme:\n  id: {DOC_ID}\n  version: v3\n---\nbody\n")
        );
    }

    #[test]
    fn test_crlf_generated_lines() {
        let mut doc = parse("text\r\n").unwrap();
        doc.assign_document_identity(&id(DOC_ID));
        assert_eq!(
            render(&doc).unwrap(),
            format!("---\r\nrunme:\r\n  id: {DOC_ID}\r\n  version: v3\r\n---\r\n\r\ntext\r\n")
        );
    }
}
