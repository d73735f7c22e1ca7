//! Runme Test Utilities
//!
//! Shared test infrastructure for the Runme identity workspace:
//! - Deterministic identity generators
//! - Proptest strategies for notebooks
//! - Notebook fixtures for the identity scenarios
//! - Custom assertions for identity-specific validation

pub use runme_core::{
    Block, Cell, CellRef, Document, Identity, IdentityGenerator, LifecycleSetting, ParseError,
    ParseErrorKind, RunmeError, RunmeResult, UlidGenerator,
};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use ulid::Ulid;

// ============================================================================
// MOCK GENERATORS
// ============================================================================

/// Issues predictable, strictly increasing identities.
///
/// Every identity shares one timestamp; the random part counts up from 1.
#[derive(Debug)]
pub struct SequenceGenerator {
    timestamp_ms: u64,
    counter: AtomicU64,
}

impl SequenceGenerator {
    /// 2023-11-08, matching the fixture identities.
    pub const DEFAULT_TIMESTAMP_MS: u64 = 1_699_440_000_000;

    pub fn new() -> Self {
        Self::starting_at(Self::DEFAULT_TIMESTAMP_MS)
    }

    pub fn starting_at(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            counter: AtomicU64::new(0),
        }
    }

    /// Identity that the `n`th call (1-based) returns.
    pub fn nth(&self, n: u64) -> Identity {
        Identity::from_ulid(Ulid::from_parts(self.timestamp_ms, u128::from(n)))
    }

    /// Number of identities handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityGenerator for SequenceGenerator {
    fn next(&self) -> Identity {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.nth(n)
    }
}

/// Always returns the same identity. Used to force collisions.
#[derive(Debug, Clone, Copy)]
pub struct FixedGenerator(pub Identity);

impl IdentityGenerator for FixedGenerator {
    fn next(&self) -> Identity {
        self.0
    }
}

/// Returns queued identities first, then falls back to a [`SequenceGenerator`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<Identity>>,
    fallback: SequenceGenerator,
}

impl ScriptedGenerator {
    pub fn new<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = Identity>,
    {
        Self {
            queue: Mutex::new(identities.into_iter().collect()),
            fallback: SequenceGenerator::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl IdentityGenerator for ScriptedGenerator {
    fn next(&self) -> Identity {
        let scripted = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        scripted.unwrap_or_else(|| self.fallback.next())
    }
}

/// Parses a fixture identity token.
#[track_caller]
pub fn identity(token: &str) -> Identity {
    match token.parse() {
        Ok(id) => id,
        Err(e) => panic!("invalid fixture identity {token}: {e}"),
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for notebooks and their parts.
    //!
    //! Generated text always parses: prose never opens a fence, cell bodies
    //! never close one, and front matter never carries a `runme.id`.

    use super::*;
    use proptest::prelude::*;

    /// Generate any identity.
    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        (0u64..(1u64 << 48), any::<u128>())
            .prop_map(|(ms, random)| Identity::from_ulid(Ulid::from_parts(ms, random)))
    }

    /// Generate a LifecycleSetting variant.
    pub fn arb_lifecycle_setting() -> impl Strategy<Value = LifecycleSetting> {
        prop_oneof![
            Just(LifecycleSetting::None),
            Just(LifecycleSetting::Doc),
            Just(LifecycleSetting::Cell),
            Just(LifecycleSetting::All),
        ]
    }

    /// Generate a line break style.
    pub fn arb_line_break() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("\n"), Just("\r\n")]
    }

    /// Generate a fence language tag.
    pub fn arb_language() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("sh".to_string()),
            Just("bash".to_string()),
            Just("js".to_string()),
            Just("python".to_string()),
            "[a-z][a-z0-9]{0,7}",
        ]
    }

    /// Generate one attribute value as compact JSON.
    pub fn arb_attribute_json() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-zA-Z0-9 _./-]{0,12}".prop_map(|s| serde_json::Value::String(s).to_string()),
            any::<bool>().prop_map(|b| b.to_string()),
            (0u32..10_000).prop_map(|n| n.to_string()),
        ]
    }

    /// Generate an attribute list without an `id` key, e.g. `{"name":"x"}`.
    pub fn arb_attribute_list() -> impl Strategy<Value = String> {
        // Keys never start with `i`, so `id` cannot appear.
        prop::collection::btree_map("[a-hj-z][a-zA-Z]{0,7}", arb_attribute_json(), 0..4)
            .prop_map(|entries| {
                let body = entries
                    .iter()
                    .map(|(k, v)| format!("{}:{}", serde_json::Value::String(k.clone()), v))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{{{body}}}")
            })
    }

    /// Generate a prose line that cannot open a fence or front matter.
    pub fn arb_prose_line() -> impl Strategy<Value = String> {
        "[A-Za-z#>*][A-Za-z0-9 #.,!?:()*-]{0,40}"
    }

    /// Generate a cell body line that cannot close a fence.
    pub fn arb_body_line() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z][a-zA-Z0-9 ._=$()\"'-]{0,40}",
            Just(String::new()),
        ]
    }

    /// Generate an opening fence line: marker run, language, optional list.
    pub fn arb_fence_opening() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("```"), Just("~~~"), Just("````")],
            prop::option::weighted(0.9, arb_language()),
            prop::option::of(arb_attribute_list()),
        )
            .prop_map(|(fence, language, list)| match (language, list) {
                (Some(lang), Some(list)) => format!("{fence}{lang} {list}"),
                (Some(lang), None) => format!("{fence}{lang}"),
                (None, Some(list)) => format!("{fence} {list}"),
                (None, None) => fence.to_string(),
            })
    }

    /// A notebook block before line breaks are applied.
    #[derive(Debug, Clone)]
    pub enum BlockSketch {
        Prose(Vec<String>),
        Cell { opening: String, body: Vec<String> },
    }

    fn arb_block() -> impl Strategy<Value = BlockSketch> {
        prop_oneof![
            prop::collection::vec(arb_prose_line(), 1..4).prop_map(BlockSketch::Prose),
            (arb_fence_opening(), prop::collection::vec(arb_body_line(), 0..4))
                .prop_map(|(opening, body)| BlockSketch::Cell { opening, body }),
        ]
    }

    /// Generate a front matter scalar or flow collection, as written in YAML.
    pub fn arb_yaml_value() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z][a-z0-9]{0,8}",
            "[a-z ]{0,10}".prop_map(|v| format!("\"{v}\"")),
            "[a-z ]{0,10}".prop_map(|v| format!("'{v}'")),
            prop::collection::vec("[a-z]{1,4}", 0..3).prop_map(|items| format!("[{}]", items.join(", "))),
            ("[a-z]{1,4}", "[a-z0-9]{1,4}").prop_map(|(k, v)| format!("{{{k}: {v}}}")),
        ]
    }

    /// Generate a `key: value` front matter line, sometimes with a trailing comment.
    fn arb_yaml_entry(key: String) -> impl Strategy<Value = String> {
        (arb_yaml_value(), prop::option::weighted(0.2, "[a-z ]{0,12}")).prop_map(
            move |(value, comment)| match comment {
                Some(comment) => format!("{key}: {value}  # {comment}"),
                None => format!("{key}: {value}"),
            },
        )
    }

    /// Where a generated `runme` section without an `id` goes.
    #[derive(Debug, Clone, Copy)]
    pub enum RunmeSection {
        First,
        Last,
    }

    /// Generate front matter YAML lines that never carry `runme.id`.
    ///
    /// Mixes plain, quoted and flow values, comments, and an optional
    /// `runme` section holding only `version`.
    pub fn arb_front_matter_lines() -> impl Strategy<Value = Vec<String>> {
        // Keys never start with `r`, so `runme` only comes from the section.
        let entries = prop::collection::btree_set("[a-qs-z][a-z]{0,5}", 0..4).prop_flat_map(|keys| {
            keys.into_iter()
                .map(arb_yaml_entry)
                .collect::<Vec<_>>()
        });
        (
            entries,
            prop::option::weighted(0.3, "[a-z ]{0,12}"),
            prop::option::of(prop_oneof![Just(RunmeSection::First), Just(RunmeSection::Last)]),
            any::<bool>(),
        )
            .prop_map(|(entries, comment, runme, runme_comment)| {
                let mut lines = Vec::new();
                if let Some(comment) = comment {
                    lines.push(format!("# {comment}"));
                }
                let mut section = vec!["runme:".to_string()];
                if runme_comment {
                    section.push("  # format".to_string());
                }
                section.push("  version: v3".to_string());

                if matches!(runme, Some(RunmeSection::First)) {
                    lines.extend(section.iter().cloned());
                }
                lines.extend(entries);
                if matches!(runme, Some(RunmeSection::Last)) {
                    lines.extend(section);
                }
                lines
            })
    }

    /// Generate complete notebook text.
    pub fn arb_notebook() -> impl Strategy<Value = String> {
        (
            prop::option::of(arb_front_matter_lines()),
            prop::collection::vec(arb_block(), 0..6),
            arb_line_break(),
        )
            .prop_map(|(front_matter, blocks, nl)| {
                let mut text = String::new();
                if let Some(lines) = front_matter {
                    text.push_str("---");
                    text.push_str(nl);
                    for line in lines {
                        text.push_str(&line);
                        text.push_str(nl);
                    }
                    text.push_str("---");
                    text.push_str(nl);
                    text.push_str(nl);
                }
                for block in blocks {
                    match block {
                        BlockSketch::Prose(lines) => {
                            for line in lines {
                                text.push_str(&line);
                                text.push_str(nl);
                            }
                        }
                        BlockSketch::Cell { opening, body } => {
                            let fence: String =
                                opening.chars().take_while(|c| *c == '`' || *c == '~').collect();
                            text.push_str(&opening);
                            text.push_str(nl);
                            for line in body {
                                text.push_str(&line);
                                text.push_str(nl);
                            }
                            text.push_str(&fence);
                            text.push_str(nl);
                        }
                    }
                    text.push_str(nl);
                }
                text
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Notebooks used across the identity test suites.

    /// Document identity already present in [`EXISTENT_DOC_ID`].
    pub const EXISTENT_DOC_IDENTITY: &str = "01HEJKW175Z0SYY4SJCA86J0TF";

    /// Cell identity already present in [`EXISTENT_CELL_ID`].
    pub const EXISTENT_CELL_IDENTITY: &str = "01HER3GA0RQKJETKK5X5PPRTB4";

    /// A zero-byte notebook.
    pub const EMPTY: &str = "";

    /// No front matter, one named cell without identity.
    pub const SHEBANG: &str = "## Shebang
Example file used as part of the end to end suite

## Scenario 1

```js {\"name\":\"foo\"}
console.log(\"Scenario 1: Run scripts via Shebang!\")

```

";

    /// Front matter with a document identity; the cell has none.
    pub const EXISTENT_DOC_ID: &str = "---
foo:
  bar: baz
runme:
  id: 01HEJKW175Z0SYY4SJCA86J0TF
  version: v3
---

## Document with id

Example file used as part of the end to end suite

## Scenario

```js {\"name\":\"foo\"}
console.log(\"Run scripts via Shebang!\")

```

";

    /// No front matter; the only cell already has an identity.
    pub const EXISTENT_CELL_ID: &str = "## Existent ID
Example file used as part of the end to end suite

## Scenario

```js {\"id\":\"01HER3GA0RQKJETKK5X5PPRTB4\"}
console.log(\"Hello via Shebang\")

```

";

    /// Front matter without a `runme` section.
    pub const FOREIGN_FRONT_MATTER: &str = "---
foo:
  bar: baz
---

## Doc

```sh
echo hello
```
";

    /// Flow-style front matter mapping.
    pub const FLOW_FRONT_MATTER: &str = "---
{title: Hello}
---

# Doc
";

    /// `runme` section carrying a version but no id, next to commented
    /// and quoted keys.
    pub const COMMENTED_RUNME_SECTION: &str = "---
title: \"Hello\"  # main title
tags: [a, b]
runme:
  version: v3
---

# Doc
";

    /// Every identity already present.
    pub const FULLY_POPULATED: &str = "---
runme:
  id: 01HEJKW175Z0SYY4SJCA86J0TF
  version: v3
---

# Runbook

```sh {\"name\":\"build\",\"id\":\"01HER3GA0RQKJETKK5X5PPRTB4\"}
make build
```

```sh {\"id\":\"01HFA08N6F66WSG09RR9XEP0T6\",\"interactive\":false}
make test
```
";

    /// Two cells sharing one identity.
    pub const DUPLICATE_CELL_IDS: &str = "```sh {\"id\":\"01HER3GA0RQKJETKK5X5PPRTB4\"}
echo one
```

```sh {\"id\":\"01HER3GA0RQKJETKK5X5PPRTB4\"}
echo two
```
";

    /// Session outputs document pointing back at its notebook.
    pub const SESSION_OUTPUTS: &str = "---
runme:
  id: 01HEJKW175Z0SYY4SJCA86J0TF
  version: v3
  session:
    id: 01HFA08N6F66WSG09RR9XEP0T6
    document:
      relativePath: docs/README.md
---

```sh {\"id\":\"01HER3GA0RQKJETKK5X5PPRTB4\"}
echo hello
```
";

    /// Cell without a language tag.
    pub const BARE_FENCE: &str = "# Plain

```
no language here
```
";

    /// Opening fence that is never closed.
    pub const UNTERMINATED_FENCE: &str = "# Broken

```sh
echo never closed
";
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for identity-specific validation.

    use super::*;

    /// Assert that `token` is a well-formed identity.
    #[track_caller]
    pub fn assert_valid_identity(token: &str) {
        assert_eq!(token.len(), Identity::LEN, "identity has wrong length: {token}");
        assert!(
            token.parse::<Identity>().is_ok(),
            "identity does not parse: {token}"
        );
    }

    /// Assert that every cell carries a valid identity.
    #[track_caller]
    pub fn assert_all_cells_identified(document: &Document) {
        for (cell_ref, cell) in document.cells() {
            match cell.identity() {
                Some(id) => assert_valid_identity(id),
                None => panic!("{cell_ref} has no identity"),
            }
        }
    }

    /// Assert that no cell carries an identity.
    #[track_caller]
    pub fn assert_no_cell_identities(document: &Document) {
        for (cell_ref, cell) in document.cells() {
            assert!(
                !cell.has_identity(),
                "{cell_ref} unexpectedly has an identity"
            );
        }
    }

    /// Assert that `after` only adds bytes to `before`.
    ///
    /// Every byte of `before` must appear in `after` in the same order.
    #[track_caller]
    pub fn assert_append_only(before: &str, after: &str) {
        let mut remaining = after.bytes();
        for (pos, byte) in before.bytes().enumerate() {
            if !remaining.any(|b| b == byte) {
                panic!(
                    "byte {pos} ({:?}) of the original is missing from the output:\n{after}",
                    byte as char
                );
            }
        }
    }

    /// Assert that a result is a ParseError of the given kind.
    #[track_caller]
    pub fn assert_parse_error<T: std::fmt::Debug>(
        result: &Result<T, ParseError>,
        kind: ParseErrorKind,
    ) {
        match result {
            Err(e) => assert_eq!(e.kind, kind, "wrong parse error kind: {e}"),
            Ok(value) => panic!("Expected {kind} parse error, got: {value:?}"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sequence_generator_is_predictable() {
        let generator = SequenceGenerator::new();
        let first = generator.next();
        let second = generator.next();
        assert_eq!(first, generator.nth(1));
        assert_eq!(second, generator.nth(2));
        assert!(first < second);
        assert_eq!(generator.issued(), 2);
    }

    #[test]
    fn test_scripted_generator_falls_back() {
        let scripted = identity(fixtures::EXISTENT_CELL_IDENTITY);
        let generator = ScriptedGenerator::new([scripted]);
        assert_eq!(generator.next(), scripted);
        assert_eq!(generator.remaining(), 0);
        assert_ne!(generator.next(), scripted);
    }

    #[test]
    fn test_fixed_generator_repeats() {
        let id = identity(fixtures::EXISTENT_DOC_IDENTITY);
        let generator = FixedGenerator(id);
        assert_eq!(generator.next(), generator.next());
    }

    #[test]
    fn test_append_only_accepts_insertions() {
        assertions::assert_append_only("```js {}\n", "```js {\"id\":\"X\"}\n");
    }

    #[test]
    #[should_panic]
    fn test_append_only_rejects_removals() {
        assertions::assert_append_only("abc", "ac");
    }

    proptest! {
        #[test]
        fn prop_generated_identities_are_valid(id in generators::arb_identity()) {
            assertions::assert_valid_identity(&id.to_string());
        }

        #[test]
        fn prop_generated_lists_are_json_objects(list in generators::arb_attribute_list()) {
            let value: serde_json::Value = serde_json::from_str(&list).unwrap();
            prop_assert!(value.is_object());
            prop_assert!(value.get("id").is_none());
        }
    }
}
