use anyhow::{Context, Result, ensure};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};

const BODY_ENCODING_BASE64: &str = "base64";

/// A cached upstream response. Only built from a fully read upstream reply,
/// with the headers already sanitized.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub cached_at: u64,
    pub expires_at: u64,
    pub ttl: u64,
}

/// JSON envelope stored at `cache/<fingerprint>/response.json`. Bodies that
/// are valid UTF-8 are stored verbatim; anything else is base64-encoded and
/// flagged so arbitrary bytes survive the round trip.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry {
    status_code: u16,
    headers: Vec<(String, String)>,
    body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_encoding: Option<String>,
    expires_at: u64,
    ttl: u64,
    cached_at: u64,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: u64) -> bool {
        self.expires_at > now
    }

    pub fn remaining(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let (body, body_encoding) = match std::str::from_utf8(&self.body) {
            Ok(text) => (text.to_string(), None),
            Err(_) => (
                STANDARD.encode(&self.body),
                Some(BODY_ENCODING_BASE64.to_string()),
            ),
        };
        let persisted = PersistedEntry {
            status_code: self.status.as_u16(),
            headers: self.headers.clone(),
            body,
            body_encoding,
            expires_at: self.expires_at,
            ttl: self.ttl,
            cached_at: self.cached_at,
        };
        serde_json::to_vec(&persisted).context("failed to serialize cache entry")
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let persisted: PersistedEntry =
            serde_json::from_slice(data).context("failed to parse cache entry")?;
        let status = StatusCode::from_u16(persisted.status_code)
            .with_context(|| format!("invalid cached status code {}", persisted.status_code))?;
        let body = match persisted.body_encoding.as_deref() {
            Some(BODY_ENCODING_BASE64) => Bytes::from(
                STANDARD
                    .decode(persisted.body.as_bytes())
                    .context("failed to decode base64 cache body")?,
            ),
            Some(other) => anyhow::bail!("unknown cache body encoding '{other}'"),
            None => Bytes::from(persisted.body.into_bytes()),
        };
        ensure!(
            persisted.expires_at > persisted.cached_at,
            "cache entry expires before it was written"
        );
        Ok(Self {
            status,
            headers: persisted.headers,
            body,
            cached_at: persisted.cached_at,
            expires_at: persisted.expires_at,
            ttl: persisted.ttl,
        })
    }
}
