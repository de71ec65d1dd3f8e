#![no_main]

use libfuzzer_sys::fuzz_target;

use cachefront::cache::ttl::{MAX_TTL_SECONDS, parse_ttl};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let parsed = parse_ttl(raw.as_ref(), 3600);
    assert!(parsed <= MAX_TTL_SECONDS);
    // Parsing is a pure function of its input.
    assert_eq!(parsed, parse_ttl(raw.as_ref(), 3600));
});
