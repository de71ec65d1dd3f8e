#![no_main]

use libfuzzer_sys::fuzz_target;

use cachefront::proxy::request::tenant_from_host;

fuzz_target!(|data: &[u8]| {
    let host = String::from_utf8_lossy(data);
    let tenant = tenant_from_host(Some(host.as_ref()));
    assert!(!tenant.is_empty());
    let _ = tenant_from_host(None);
});
