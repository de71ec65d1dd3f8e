use http::Method;
use sha2::{Digest, Sha256};

/// The canonical input reserves a slot where per-parameter vary data would
/// sit and always fills it with the empty JSON object. Deployed fingerprints
/// depend on this byte sequence; changing it orphans every existing entry.
const RESERVED_QUERY_SLOT: &[u8] = b"{}";

const FIELD_SEPARATOR: &[u8] = b":";

/// Deterministic 256-bit cache key over the cache-varying request fields,
/// emitted as 64 lowercase hex characters.
///
/// Headers and inbound query parameters other than `url` and `ttl` are
/// deliberately excluded: authorization material must not partition the
/// cache, and intermediaries that mutate headers must not change the key.
/// The raw TTL string participates so callers asking for different
/// lifetimes never share an entry.
pub fn fingerprint(
    tenant: &str,
    method: &Method,
    target_url: &str,
    body: &[u8],
    ttl_raw: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(method.as_str().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(target_url.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(RESERVED_QUERY_SLOT);
    hasher.update(FIELD_SEPARATOR);
    hasher.update(body);
    hasher.update(FIELD_SEPARATOR);
    hasher.update(ttl_raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Object-store path for the entry with the given fingerprint.
pub fn entry_path(fingerprint: &str) -> String {
    format!("cache/{fingerprint}/response.json")
}
