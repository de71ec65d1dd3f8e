use bytes::Bytes;
use http::{HeaderMap, Method, Uri, header};
use url::Url;

use crate::error::ProxyError;

pub const DEFAULT_TENANT: &str = "default";

const USAGE: &str =
    "expected ?url=<percent-encoded absolute http(s) URL>&ttl=<duration such as 30s, 5m, 2h, 7d>";

/// Everything the cache needs to know about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub tenant: String,
    pub method: Method,
    /// The `url` parameter exactly as it arrived, decoded once by query
    /// parsing. This byte sequence is what the fingerprint sees.
    pub target_raw: String,
    /// Parsed form of the same URL, used to talk to the upstream.
    pub target_url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub ttl_raw: String,
}

impl RequestDescriptor {
    pub fn from_parts(
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Self, ProxyError> {
        ensure_supported_method(&method)?;
        let tenant = tenant_from_host(
            headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok()),
        );
        let (target_raw, ttl_raw) = extract_params(uri)?;
        let target_url = parse_target_url(&target_raw)?;
        Ok(Self {
            tenant,
            method,
            target_raw,
            target_url,
            headers,
            body,
            ttl_raw,
        })
    }
}

fn ensure_supported_method(method: &Method) -> Result<(), ProxyError> {
    match *method {
        Method::GET
        | Method::POST
        | Method::PUT
        | Method::PATCH
        | Method::DELETE
        | Method::HEAD
        | Method::OPTIONS => Ok(()),
        _ => Err(ProxyError::BadRequest(format!(
            "unsupported method '{method}'"
        ))),
    }
}

/// The tenant is the lowercased leftmost DNS label of the request host,
/// taken literally, with any port stripped. An absent or empty host maps to
/// `"default"`.
pub fn tenant_from_host(host: Option<&str>) -> String {
    let Some(host) = host else {
        return DEFAULT_TENANT.to_string();
    };
    let host = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or("")
    } else {
        host.split(':').next().unwrap_or("")
    };
    let label = host.split('.').next().unwrap_or("");
    if label.is_empty() {
        DEFAULT_TENANT.to_string()
    } else {
        label.to_ascii_lowercase()
    }
}

/// Pull `url` and `ttl` out of the inbound query string. Every other
/// parameter, and the inbound path, is deliberately ignored. The first
/// occurrence of each parameter wins.
fn extract_params(uri: &Uri) -> Result<(String, String), ProxyError> {
    let query = uri.query().unwrap_or("");
    let mut target: Option<String> = None;
    let mut ttl: Option<String> = None;
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match name.as_ref() {
            "url" if target.is_none() => target = Some(value.into_owned()),
            "ttl" if ttl.is_none() => ttl = Some(value.into_owned()),
            _ => {}
        }
    }
    let target = target.ok_or_else(|| {
        ProxyError::BadRequest(format!("missing required query parameter 'url'; {USAGE}"))
    })?;
    Ok((target, ttl.unwrap_or_default()))
}

fn parse_target_url(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw)
        .map_err(|_| ProxyError::BadRequest(format!("target URL must be absolute; {USAGE}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProxyError::BadRequest(format!(
                "target URL scheme must be http or https, got '{other}'"
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(ProxyError::BadRequest(
            "target URL must include a host".to_string(),
        ));
    }
    Ok(url)
}
