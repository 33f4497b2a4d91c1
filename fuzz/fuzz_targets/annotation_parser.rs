#![no_main]

use declextract::ingest::parse_annotation;
use declextract::syscall_table::IdentityMap;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let identities = IdentityMap::from([("read".to_string(), vec!["read".to_string()])]);
        let _ = parse_annotation(input, "fuzz.c", &identities);
    }
});
