use http::HeaderMap;

/// Headers never forwarded to the upstream: hop-by-hop names, proxy-chain
/// metadata, and the two the client layer recomputes (`host`,
/// `content-length`). `accept-encoding` is dropped here and overwritten with
/// `identity` so the cached bytes equal the bytes the client sees.
const REQUEST_DROP: &[&str] = &[
    "connection",
    "upgrade",
    "transfer-encoding",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "host",
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-port",
    "content-length",
    "accept-encoding",
];

/// Headers stripped from the upstream response before it is stored or
/// replied. `content-length` is recomputed by the serialization layer and
/// `cache-control` is replaced by the proxy's own ensemble.
const RESPONSE_DROP: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "upgrade",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "cache-control",
];

pub fn is_dropped_request_header(name: &str) -> bool {
    REQUEST_DROP.iter().any(|d| name.eq_ignore_ascii_case(d))
}

pub fn is_dropped_response_header(name: &str) -> bool {
    RESPONSE_DROP.iter().any(|d| name.eq_ignore_ascii_case(d))
}

/// Build the header set forwarded to the upstream from the inbound request
/// headers. Duplicate values of forwardable names are kept.
pub fn sanitize_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut sanitized = HeaderMap::new();
    for (name, value) in headers.iter() {
        if is_dropped_request_header(name.as_str()) {
            continue;
        }
        sanitized.append(name.clone(), value.clone());
    }
    sanitized
}

/// Filter the response header sequence, preserving order and duplicates of
/// everything not on the drop list.
pub fn sanitize_response_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_dropped_response_header(name))
        .cloned()
        .collect()
}

/// Flatten a header map into an order-stable name/value sequence. Values
/// that are not valid UTF-8 are skipped.
pub fn headermap_to_vec(map: &HeaderMap) -> Vec<(String, String)> {
    let mut items = Vec::new();
    for (name, value) in map.iter() {
        if let Ok(value_str) = value.to_str() {
            items.push((name.as_str().to_string(), value_str.to_string()));
        }
    }
    items
}
