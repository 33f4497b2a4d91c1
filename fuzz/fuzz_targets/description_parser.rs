#![no_main]

use declextract::ast;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Anything that parses must format to a fixpoint.
        if let Ok(desc) = ast::parse(input, "fuzz.txt") {
            let first = ast::format(&desc.nodes);
            let again = ast::parse(&first, "fuzz.txt").expect("formatted output must parse");
            assert_eq!(first, ast::format(&again.nodes));
        }
    }
});
