//! Structured fuzzing for relation expressions.
//!
//! Generates well-formed expressions with the `arbitrary` crate, so the parser
//! and the tree operations see deep nesting, aliases, filters and recursion
//! markers far more often than raw bytes would produce them.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_expression_structured
//! ```

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use graft_expr::{RelationPath, parse_expression};
use libfuzzer_sys::fuzz_target;

const NAMES: [&str; 6] = ["parent", "children", "pets", "movies", "actors", "$owner"];
const FILTERS: [&str; 4] = ["orderById", "select:id", "only-dogs", "f1"];

/// A generated recursion marker.
#[derive(Debug, Arbitrary)]
enum FuzzRecursion {
    None,
    Unbounded,
    Bounded(u8),
}

/// A generated relation reference with its subtree.
#[derive(Debug, Arbitrary)]
struct FuzzNode {
    name: u8,
    filters: Vec<u8>,
    alias: Option<u8>,
    recursion: FuzzRecursion,
    children: Vec<FuzzNode>,
}

impl FuzzNode {
    fn write(&self, out: &mut String, depth: usize) {
        let name = NAMES[self.name as usize % NAMES.len()];
        out.push_str(name);
        if !self.filters.is_empty() {
            let filters: Vec<&str> = self.filters.iter().map(|f| FILTERS[*f as usize % FILTERS.len()]).collect();
            out.push('(');
            out.push_str(&filters.join(", "));
            out.push(')');
        }
        if let Some(alias) = self.alias {
            out.push_str(&format!(" as {}{}", name.trim_start_matches('$'), alias));
        }
        match self.recursion {
            FuzzRecursion::Unbounded => out.push_str(".^"),
            FuzzRecursion::Bounded(n) => out.push_str(&format!(".^{}", n.max(1))),
            FuzzRecursion::None if !self.children.is_empty() && depth < 6 => {
                out.push_str(".[");
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    child.write(out, depth + 1);
                }
                out.push(']');
            }
            FuzzRecursion::None => {}
        }
    }
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(nodes) = Vec::<FuzzNode>::arbitrary(&mut u) else {
        return;
    };

    let mut input = String::from("[");
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            input.push_str(", ");
        }
        node.write(&mut input, 0);
    }
    input.push(']');

    // Duplicate sibling keys are rejected; everything else must parse.
    let Ok(tree) = parse_expression(&input) else {
        return;
    };

    let merged = tree.merged(tree.clone()).expect("merging a tree with itself cannot conflict");
    assert_eq!(merged, tree);

    for path in tree.paths() {
        assert!(tree.resolves(&path), "{} does not resolve in {}", path, input);
    }
    assert!(tree.find(&RelationPath::root()).is_some());
});
