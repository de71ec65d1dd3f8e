use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::proxy::headers;
use crate::proxy::request::RequestDescriptor;
use crate::proxy::upstream::UpstreamClient;

pub mod entry;
pub mod key;
pub mod store;
pub mod ttl;

pub use entry::CacheEntry;
use store::ObjectStore;

pub const ENTRY_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Result of serving one request through the cache.
#[derive(Debug, Clone)]
pub struct Served {
    pub cache_status: CacheStatus,
    pub entry: CacheEntry,
    pub fingerprint: String,
    pub remaining: u64,
}

/// Orchestrates lookup, expiry, upstream fetch and write-back. There is
/// intentionally no single-flight: concurrent misses for one key may both
/// reach the upstream and the later put wins, which is fine because entries
/// are immutable per fingerprint.
pub struct CacheEngine {
    store: Arc<dyn ObjectStore>,
    upstream: UpstreamClient,
    default_ttl: u64,
    hot: Option<Mutex<LruCache<String, CacheEntry>>>,
}

impl CacheEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        upstream: UpstreamClient,
        default_ttl: u64,
        hot_entries: usize,
    ) -> Self {
        let hot = NonZeroUsize::new(hot_entries).map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            store,
            upstream,
            default_ttl,
            hot,
        }
    }

    pub async fn serve(
        &self,
        request: &RequestDescriptor,
        now: u64,
    ) -> Result<Served, ProxyError> {
        let ttl = ttl::parse_ttl(&request.ttl_raw, self.default_ttl);
        if ttl == 0 {
            return Err(ProxyError::BadRequest(
                "ttl must be a positive duration such as 30s, 5m, 2h or 7d".to_string(),
            ));
        }

        let fingerprint = key::fingerprint(
            &request.tenant,
            &request.method,
            &request.target_raw,
            &request.body,
            &request.ttl_raw,
        );
        let object_key = key::entry_path(&fingerprint);

        if let Some(entry) = self.lookup(&object_key, &fingerprint, now).await {
            let remaining = entry.remaining(now);
            info!(
                fingerprint = %fingerprint,
                tenant = %request.tenant,
                remaining,
                "cache hit"
            );
            return Ok(Served {
                cache_status: CacheStatus::Hit,
                entry,
                fingerprint,
                remaining,
            });
        }

        info!(fingerprint = %fingerprint, tenant = %request.tenant, "cache miss");
        let response = self.upstream.fetch(request).await?;

        let entry = CacheEntry {
            status: response.status,
            headers: headers::sanitize_response_headers(&response.headers),
            body: response.body,
            cached_at: now,
            expires_at: now.saturating_add(ttl),
            ttl,
        };

        // A failed write is logged and swallowed; the fetched response is
        // still valid and the next request simply repeats the fetch.
        match entry.to_json() {
            Ok(blob) => match self.store.put(&object_key, blob, ENTRY_CONTENT_TYPE).await {
                Ok(()) => {
                    debug!(fingerprint = %fingerprint, "cache write complete");
                    self.remember_hot(&fingerprint, &entry);
                }
                Err(err) => {
                    warn!(fingerprint = %fingerprint, error = %err, "cache write failed");
                }
            },
            Err(err) => {
                warn!(fingerprint = %fingerprint, error = %err, "cache entry serialization failed");
            }
        }

        Ok(Served {
            cache_status: CacheStatus::Miss,
            entry,
            fingerprint,
            remaining: ttl,
        })
    }

    async fn lookup(&self, object_key: &str, fingerprint: &str, now: u64) -> Option<CacheEntry> {
        if let Some(hot) = &self.hot {
            let cached = hot.lock().get(fingerprint).cloned();
            if let Some(entry) = cached {
                if entry.is_fresh(now) {
                    return Some(entry);
                }
                hot.lock().pop(fingerprint);
                // Fall through so the expired blob is reaped from the store.
            }
        }

        let blob = match self.store.get(object_key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(err) => {
                warn!(fingerprint = %fingerprint, error = %err, "store read failed; treating as miss");
                return None;
            }
        };

        match CacheEntry::from_json(&blob) {
            Ok(entry) if entry.is_fresh(now) => {
                self.remember_hot(fingerprint, &entry);
                Some(entry)
            }
            Ok(_) => {
                debug!(fingerprint = %fingerprint, "entry expired; reaping");
                self.reap(object_key, fingerprint).await;
                None
            }
            Err(err) => {
                warn!(fingerprint = %fingerprint, error = %err, "undecodable cache entry; reaping");
                self.reap(object_key, fingerprint).await;
                None
            }
        }
    }

    fn remember_hot(&self, fingerprint: &str, entry: &CacheEntry) {
        if let Some(hot) = &self.hot {
            hot.lock().put(fingerprint.to_string(), entry.clone());
        }
    }

    /// Best-effort deletion of an expired or corrupt entry. Failure is
    /// logged, never surfaced; the request proceeds as a miss either way.
    /// Runs before the refetch so the subsequent put cannot be clobbered.
    async fn reap(&self, object_key: &str, fingerprint: &str) {
        if let Some(hot) = &self.hot {
            hot.lock().pop(fingerprint);
        }
        match self.store.delete(object_key).await {
            Ok(()) => debug!(fingerprint = %fingerprint, "reaped expired entry"),
            Err(err) => warn!(fingerprint = %fingerprint, error = %err, "lazy reap failed"),
        }
    }
}
