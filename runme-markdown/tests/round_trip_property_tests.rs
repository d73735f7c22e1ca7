//! Property-Based Tests for Notebook Round-Trip
//!
//! Property: For any notebook, parse → render SHALL reproduce the input
//! byte for byte, and assigning identities SHALL only ever add bytes.
//!
//! This validates:
//! - The parser keeps every source byte somewhere in the model
//! - The printer emits untouched parts verbatim
//! - Identity insertion is append-only and stable across a second save
//! - Existing front matter keys read back unchanged after insertion

use proptest::prelude::*;
use runme_core::CellRef;
use runme_markdown::{parse, render};
use runme_test_utils::assertions::{assert_all_cells_identified, assert_append_only};
use runme_test_utils::generators::{arb_notebook, arb_prose_line};
use runme_test_utils::{IdentityGenerator, SequenceGenerator};

/// Assigns a document identity and one identity per cell that has a language.
fn identify_all(text: &str) -> Option<String> {
    let generator = SequenceGenerator::new();
    let mut doc = parse(text).ok()?;
    doc.assign_document_identity(&generator.next());
    let cells: Vec<CellRef> = doc
        .cells()
        .filter(|(_, cell)| cell.language().is_some())
        .map(|(cell_ref, _)| cell_ref)
        .collect();
    for cell_ref in cells {
        doc.assign_cell_identity(cell_ref, &generator.next());
    }
    render(&doc).ok()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_unmodified_round_trip(text in arb_notebook()) {
        let doc = parse(&text).unwrap();
        prop_assert_eq!(render(&doc).unwrap(), text);
    }

    #[test]
    fn prop_identity_insertion_is_append_only(text in arb_notebook()) {
        let out = identify_all(&text).unwrap();
        assert_append_only(&text, &out);
    }

    #[test]
    fn prop_second_pass_is_stable(text in arb_notebook()) {
        let once = identify_all(&text).unwrap();
        let doc = parse(&once).unwrap();
        prop_assert!(doc.document_identity().is_some());
        for (_, cell) in doc.cells().filter(|(_, c)| c.language().is_some()) {
            prop_assert!(cell.has_identity());
        }
        let twice = identify_all(&once).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn prop_front_matter_keys_survive_identity(text in arb_notebook()) {
        let before = parse(&text).unwrap();
        let out = identify_all(&text).unwrap();
        let after = parse(&out).unwrap();
        if let Some(original) = before.front_matter() {
            let reparsed = after.front_matter().unwrap().mapping();
            for (key, value) in original.mapping() {
                if key.as_str() == Some("runme") {
                    continue;
                }
                prop_assert_eq!(reparsed.get(key), Some(value));
            }
            prop_assert_eq!(
                after.front_matter().unwrap().version(),
                Some("v3")
            );
        }
    }

    #[test]
    fn prop_prose_only_parses_without_cells(lines in prop::collection::vec(arb_prose_line(), 0..8)) {
        let text = lines.join("\n");
        let doc = parse(&text).unwrap();
        prop_assert_eq!(doc.cell_count(), 0);
        prop_assert_eq!(render(&doc).unwrap(), text);
    }
}

#[test]
fn test_identified_cells_reparse_with_identities() {
    let text = "```sh\na\n```\n\n```js {\"name\":\"b\"}\nb\n```\n";
    let out = identify_all(text).unwrap();
    assert_all_cells_identified(&parse(&out).unwrap());
}
