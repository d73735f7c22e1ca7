//! Markdown notebook parser
//!
//! Turns raw text into a [`Document`]. Every byte of the input ends up in
//! exactly one place in the model (front matter, prose, or a cell part), so
//! printing an untouched model reproduces the input.

pub mod attributes;
pub mod fence;
pub mod front_matter;

use fence::split_line_break;
use runme_core::{
    Block, Cell, CellSource, Document, LineEnding, ParseError, ParseErrorKind, Prose,
};

/// A line of the input with its position.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    /// Full line including its line break.
    raw: &'a str,
    /// Line without its line break.
    content: &'a str,
    line_break: &'a str,
    /// Byte offset of the line in the document.
    offset: usize,
    /// 1-based line number.
    number: usize,
}

fn split_lines(text: &str, start: usize, first_number: usize) -> Vec<Line<'_>> {
    let mut offset = start;
    text[start..]
        .split_inclusive('\n')
        .enumerate()
        .map(|(idx, raw)| {
            let (content, line_break) = split_line_break(raw);
            let line = Line {
                raw,
                content,
                line_break,
                offset,
                number: first_number + idx,
            };
            offset += raw.len();
            line
        })
        .collect()
}

/// Parses a Markdown notebook.
///
/// # Errors
/// - Front matter that is unterminated, invalid YAML, or not a mapping
/// - A fenced code block without a closing fence
/// - A fence info string whose attribute list cannot be read
pub fn parse(text: &str) -> Result<Document, ParseError> {
    let line_ending = LineEnding::detect(text);

    let (front_matter, body_offset, first_line) = match front_matter::split(text)? {
        Some(split) => (
            Some(split.front_matter),
            split.body_offset,
            split.line_count + 1,
        ),
        None => (None, 0, 1),
    };

    let lines = split_lines(text, body_offset, first_line);
    let mut blocks = Vec::new();
    let mut prose_start = body_offset;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        let Some(open) = fence::opening(line.content) else {
            idx += 1;
            continue;
        };

        let close_idx = lines[idx + 1..]
            .iter()
            .position(|candidate| fence::is_closing(candidate.content, &open))
            .map(|pos| idx + 1 + pos)
            .ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::UnterminatedFence,
                    line.number,
                    open.indent + 1,
                    format!(
                        "code fence `{}` opened here is never closed",
                        open.marker.to_string().repeat(open.len)
                    ),
                )
            })?;

        let info_offset = open.info_offset();
        let info = attributes::parse_info(open.info).map_err(|e| {
            ParseError::new(
                ParseErrorKind::Attributes,
                line.number,
                info_offset + e.offset + 1,
                e.message,
            )
        })?;

        if prose_start < line.offset {
            blocks.push(Block::Prose(Prose::new(&text[prose_start..line.offset])));
        }

        let closing = lines[close_idx];
        let body_start = line.offset + line.raw.len();
        blocks.push(Block::Cell(Cell::from_source(CellSource {
            opening: line.content.to_string(),
            line_break: line.line_break.to_string(),
            language: info.language,
            attribute_span: info
                .attribute_span
                .map(|(start, end)| (info_offset + start, info_offset + end)),
            attributes: info.attributes,
            body: text[body_start..closing.offset].to_string(),
            closing: closing.raw.to_string(),
        })));

        prose_start = closing.offset + closing.raw.len();
        idx = close_idx + 1;
    }

    if prose_start < text.len() {
        blocks.push(Block::Prose(Prose::new(&text[prose_start..])));
    }

    Ok(Document::new(front_matter, blocks, line_ending))
}
