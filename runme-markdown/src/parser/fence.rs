//! Fence line recognition (CommonMark fenced code blocks)

/// Opening fence of a code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceOpen<'a> {
    /// Leading spaces before the marker (0..=3).
    pub indent: usize,
    /// Marker character, `` ` `` or `~`.
    pub marker: char,
    /// Marker run length (>= 3).
    pub len: usize,
    /// Everything after the marker run, untrimmed.
    pub info: &'a str,
}

impl FenceOpen<'_> {
    /// Byte offset of the info string within the line.
    pub fn info_offset(&self) -> usize {
        self.indent + self.len
    }
}

const MAX_INDENT: usize = 3;
const MIN_FENCE_LEN: usize = 3;

/// Recognizes an opening fence. `line` must not include its line break.
pub fn opening(line: &str) -> Option<FenceOpen<'_>> {
    let indent = leading_spaces(line)?;
    let rest = &line[indent..];
    let marker = rest.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let len = rest.chars().take_while(|c| *c == marker).count();
    if len < MIN_FENCE_LEN {
        return None;
    }
    let info = &rest[len..];
    // A backtick fence cannot carry backticks in its info string.
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some(FenceOpen {
        indent,
        marker,
        len,
        info,
    })
}

/// Whether `line` closes a block opened by `open`.
pub fn is_closing(line: &str, open: &FenceOpen<'_>) -> bool {
    let Some(indent) = leading_spaces(line) else {
        return false;
    };
    let rest = &line[indent..];
    let len = rest.chars().take_while(|c| *c == open.marker).count();
    if len < open.len {
        return false;
    }
    rest[len..].chars().all(|c| c == ' ' || c == '\t')
}

fn leading_spaces(line: &str) -> Option<usize> {
    let indent = line.bytes().take_while(|b| *b == b' ').count();
    (indent <= MAX_INDENT).then_some(indent)
}

/// Strips the line break (`\n` or `\r\n`) from a line.
pub fn split_line_break(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}
