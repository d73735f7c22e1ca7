//! Fuzz the notebook parser with arbitrary text.
//!
//! Anything that parses must render back to the exact input bytes.
//!
//! Run with: cargo +nightly fuzz run parse_round_trip -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use runme_markdown::{parse, render};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // Errors are fine; panics are not.
    let Ok(document) = parse(input) else {
        return;
    };
    let rendered = render(&document).expect("unmodified document renders");
    assert_eq!(rendered, input, "unmodified render must be byte-identical");
});
