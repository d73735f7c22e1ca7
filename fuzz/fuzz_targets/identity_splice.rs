//! Fuzz identity insertion.
//!
//! Every cell with a language gets an identity; the output must reparse with
//! those identities and keep every input byte in order.
//!
//! Run with: cargo +nightly fuzz run identity_splice -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use runme_core::{CellRef, IdentityGenerator, UlidGenerator};
use runme_markdown::{parse, render};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(mut document) = parse(input) else {
        return;
    };

    let generator = UlidGenerator::new();
    let targets: Vec<CellRef> = document
        .cells()
        .filter(|(_, cell)| cell.language().is_some() && !cell.has_identity())
        .map(|(cell_ref, _)| cell_ref)
        .collect();
    for cell in &targets {
        document.assign_cell_identity(*cell, &generator.next());
    }

    let Ok(output) = render(&document) else {
        return;
    };
    let reparsed = parse(&output).expect("rendered notebook reparses");
    for cell in targets {
        let expected = document.cell(cell).and_then(|c| c.identity());
        let actual = reparsed.cell(cell).and_then(|c| c.identity());
        assert_eq!(expected, actual, "identity lost for {cell:?}");
    }

    let mut rest = output.chars();
    for c in input.chars() {
        assert!(rest.any(|o| o == c), "input byte dropped");
    }
});
