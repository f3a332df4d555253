//! Fuzz target for the relation expression parser.
//!
//! Feeds arbitrary byte sequences to the parser. Parsing must never panic, and
//! every accepted expression must survive a print and reparse unchanged.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_expression_parser
//! ```

#![no_main]

use graft_expr::parse_expression;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(tree) = parse_expression(input) {
            let printed = tree.to_string();
            let reparsed = parse_expression(&printed).expect("printed expression must parse");
            assert_eq!(tree, reparsed, "{} printed as {}", input, printed);
        }
    }
});
