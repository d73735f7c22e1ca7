//! YAML front matter extraction

use super::fence::split_line_break;
use runme_core::{FrontMatter, ParseError, ParseErrorKind, FRONT_MATTER_DELIMITER};
use serde_yaml::Value as YamlValue;

/// Front matter found at the top of a document.
#[derive(Debug)]
pub struct FrontMatterSplit {
    pub front_matter: FrontMatter,
    /// Byte offset where the body starts.
    pub body_offset: usize,
    /// Number of lines the block spans.
    pub line_count: usize,
}

/// Cuts a `---` delimited block off the start of `text`.
///
/// Returns `Ok(None)` when the document does not open with a delimiter line.
pub fn split(text: &str) -> Result<Option<FrontMatterSplit>, ParseError> {
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(None);
    };
    let (content, line_break) = split_line_break(first);
    if content != FRONT_MATTER_DELIMITER || line_break.is_empty() {
        return Ok(None);
    }

    let yaml_start = first.len();
    let mut offset = yaml_start;
    let mut line_count = 1;
    for line in lines {
        line_count += 1;
        let (content, _) = split_line_break(line);
        if content == FRONT_MATTER_DELIMITER {
            let yaml = &text[yaml_start..offset];
            let closing = line;
            let value = parse_yaml(yaml)?;
            let front_matter = FrontMatter::from_source(first, yaml, closing, value)
                .map_err(|e| ParseError::new(ParseErrorKind::FrontMatter, 1, 1, e.to_string()))?;
            return Ok(Some(FrontMatterSplit {
                front_matter,
                body_offset: offset + line.len(),
                line_count,
            }));
        }
        offset += line.len();
    }

    Err(ParseError::new(
        ParseErrorKind::FrontMatter,
        1,
        1,
        "front matter opened on line 1 is never closed",
    ))
}

/// Only blank lines and `#` comments.
pub(crate) fn is_blank_yaml(yaml: &str) -> bool {
    yaml.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

fn parse_yaml(yaml: &str) -> Result<YamlValue, ParseError> {
    if is_blank_yaml(yaml) {
        return Ok(YamlValue::Null);
    }
    serde_yaml::from_str(yaml).map_err(|e| {
        // YAML line 1 is document line 2.
        let (line, column) = e
            .location()
            .map(|loc| (loc.line() + 1, loc.column()))
            .unwrap_or((2, 1));
        ParseError::new(ParseErrorKind::Yaml, line, column.max(1), e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_front_matter() {
        assert!(split("# Title\n").unwrap().is_none());
        assert!(split("").unwrap().is_none());
        assert!(split("---").unwrap().is_none());
        assert!(split(" ---\nfoo: bar\n---\n").unwrap().is_none());
    }

    #[test]
    fn test_front_matter_with_body() {
        let text = "---\nfoo:\n  bar: baz\n---\n\n## Body\n";
        let split = split(text).unwrap().expect("front matter");
        assert_eq!(split.front_matter.raw_yaml(), "foo:\n  bar: baz\n");
        assert_eq!(split.front_matter.closing(), "---\n");
        assert_eq!(&text[split.body_offset..], "\n## Body\n");
        assert_eq!(split.line_count, 4);
    }

    #[test]
    fn test_empty_front_matter_is_empty_mapping() {
        let split = split("---\n---\n").unwrap().expect("front matter");
        assert!(split.front_matter.mapping().is_empty());
        assert_eq!(split.front_matter.raw_yaml(), "");
    }

    #[test]
    fn test_comment_only_front_matter_is_empty_mapping() {
        let split = split("---\n# draft\n\n---\n").unwrap().expect("front matter");
        assert!(split.front_matter.mapping().is_empty());
        assert_eq!(split.front_matter.raw_yaml(), "# draft\n\n");
    }

    #[test]
    fn test_crlf_delimiters() {
        let text = "---\r\nrunme:\r\n  id: 01HEXJ9KWG7BYSFYCNKSRE4JZR\r\n---\r\nbody";
        let split = split(text).unwrap().expect("front matter");
        assert_eq!(split.front_matter.identity(), Some("01HEXJ9KWG7BYSFYCNKSRE4JZR"));
        assert_eq!(split.front_matter.opening(), "---\r\n");
        assert_eq!(&text[split.body_offset..], "body");
    }

    #[test]
    fn test_closing_delimiter_at_eof() {
        let split = split("---\nfoo: 1\n---").unwrap().expect("front matter");
        assert_eq!(split.front_matter.closing(), "---");
    }

    #[test]
    fn test_unterminated_front_matter() {
        let err = split("---\nfoo: bar\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::FrontMatter);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = split("---\nfoo: [1, 2\n---\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Yaml);
        assert!(err.line >= 2);
    }

    #[test]
    fn test_runme_id_must_be_string() {
        let err = split("---\nrunme:\n  id: 42\n---\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::FrontMatter);
        assert!(err.message.contains("runme.id"));
    }
}
