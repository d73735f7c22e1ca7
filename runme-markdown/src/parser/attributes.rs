//! Fence info string parsing: `language [{"key":"value",...}]`

use runme_core::{AttributeValue, Attributes};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;

/// Language tag and attribute list read from a fence info string.
#[derive(Debug, Clone, PartialEq)]
pub struct FenceInfo {
    pub language: Option<String>,
    pub attributes: Attributes,
    /// Byte range of the `{...}` list relative to the info string.
    pub attribute_span: Option<(usize, usize)>,
}

/// Problem in an info string, positioned relative to its first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoError {
    pub offset: usize,
    pub message: String,
}

impl InfoError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Raw key/value pairs in source order, duplicates included.
struct SourcePairs(Vec<(String, serde_json::Value)>);

impl<'de> Deserialize<'de> for SourcePairs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = SourcePairs;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object of attributes")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    pairs.push((key, value));
                }
                Ok(SourcePairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

/// Splits an info string into language and attribute list.
///
/// The language is the first run of characters up to whitespace or `{`.
/// Only whitespace may separate it from the attribute list, and the list
/// must run to the end of the line.
pub fn parse_info(info: &str) -> Result<FenceInfo, InfoError> {
    let lang_start = info.len() - info.trim_start().len();
    let lang_len = info[lang_start..]
        .find(|c: char| c.is_whitespace() || c == '{')
        .unwrap_or(info.len() - lang_start);
    let language = &info[lang_start..lang_start + lang_len];

    let after_lang = lang_start + lang_len;
    let rest = &info[after_lang..];
    let list_start = after_lang + (rest.len() - rest.trim_start().len());
    let list = info[list_start..].trim_end();

    let language = (!language.is_empty()).then(|| language.to_string());

    if list.is_empty() {
        return Ok(FenceInfo {
            language,
            attributes: Attributes::new(),
            attribute_span: None,
        });
    }

    if !list.starts_with('{') {
        return Err(InfoError::new(
            list_start,
            format!("unexpected text after language: {list}"),
        ));
    }

    let pairs: SourcePairs = serde_json::from_str(list).map_err(|e| {
        InfoError::new(
            list_start + e.column().saturating_sub(1),
            format!("invalid attribute list: {e}"),
        )
    })?;

    let mut entries = Vec::with_capacity(pairs.0.len());
    for (key, value) in pairs.0 {
        let value = AttributeValue::from_json(&key, value)
            .map_err(|e| InfoError::new(list_start, e.to_string()))?;
        entries.push((key, value));
    }
    let attributes =
        Attributes::from_source(entries).map_err(|e| InfoError::new(list_start, e.to_string()))?;

    Ok(FenceInfo {
        language,
        attributes,
        attribute_span: Some((list_start, list_start + list.len())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_only() {
        let info = parse_info("sh").unwrap();
        assert_eq!(info.language.as_deref(), Some("sh"));
        assert!(info.attributes.is_empty());
        assert_eq!(info.attribute_span, None);
    }

    #[test]
    fn test_empty_info() {
        let info = parse_info("   ").unwrap();
        assert_eq!(info.language, None);
        assert!(info.attributes.is_empty());
    }

    #[test]
    fn test_attribute_list_order_and_span() {
        let raw = r#" js {"name":"foo","interactive":false,"timeout":30}"#;
        let info = parse_info(raw).unwrap();
        assert_eq!(info.language.as_deref(), Some("js"));
        let keys: Vec<_> = info.attributes.keys().collect();
        assert_eq!(keys, vec!["name", "interactive", "timeout"]);
        let (start, end) = info.attribute_span.unwrap();
        assert_eq!(&raw[start..end], r#"{"name":"foo","interactive":false,"timeout":30}"#);
    }

    #[test]
    fn test_attribute_list_without_space() {
        let info = parse_info(r#"bash{"id":"01HEXJ9KWG7BYSFYCNKVF0VWR6"}"#).unwrap();
        assert_eq!(info.language.as_deref(), Some("bash"));
        assert!(info.attributes.contains_key("id"));
    }

    #[test]
    fn test_attribute_list_without_language() {
        let info = parse_info(r#" {"name":"orphan"}"#).unwrap();
        assert_eq!(info.language, None);
        assert_eq!(info.attributes.len(), 1);
    }

    #[test]
    fn test_rejects_trailing_words() {
        let err = parse_info("sh title").unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(parse_info(r#"sh {"name":}"#).is_err());
        assert!(parse_info(r#"sh {"name":"a"} extra"#).is_err());
    }

    #[test]
    fn test_rejects_duplicates_and_nested_values() {
        let err = parse_info(r#"sh {"name":"a","name":"b"}"#).unwrap_err();
        assert!(err.message.contains("Duplicate"));
        assert!(parse_info(r#"sh {"env":{"A":"1"}}"#).is_err());
        assert!(parse_info(r#"sh {"name":null}"#).is_err());
    }
}
