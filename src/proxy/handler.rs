use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::response::Builder;
use http::{Response, header};
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::body::Incoming;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::cache::{CacheStatus, Served};
use crate::error::ProxyError;
use crate::logging::{self, RequestLogBuilder};
use crate::proxy::AppContext;
use crate::proxy::request::RequestDescriptor;

/// Intermediate CDNs must never cache the proxy's replies; the proxy's own
/// store is the source of truth and cross-tenant leakage through an
/// intermediary would be catastrophic.
const CACHE_CONTROL_ENSEMBLE: &str =
    "no-cache, no-store, must-revalidate, private, max-age=0, s-maxage=0";
const CORS_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const CORS_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

pub async fn handle(app: Arc<AppContext>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let correlation_id = Uuid::new_v4().to_string();
    let started = Instant::now();
    let mut log = RequestLogBuilder::new(&correlation_id).method(req.method().as_str());

    let response = match process(&app, req, &correlation_id).await {
        Ok((descriptor, served)) => {
            log = log
                .tenant(&descriptor.tenant)
                .target(&descriptor.target_raw)
                .fingerprint(&served.fingerprint)
                .cache_status(served.cache_status.as_str());
            match build_envelope(&descriptor, &served) {
                Ok(response) => response,
                Err(err) => {
                    warn!(correlation_id = %correlation_id, error = %err, "failed to assemble envelope");
                    error_response(&ProxyError::Internal(err))
                }
            }
        }
        Err(err) => {
            warn!(correlation_id = %correlation_id, kind = err.kind(), error = %err, "request failed");
            error_response(&err)
        }
    };

    log.status(response.status()).elapsed(started.elapsed()).log();
    response
}

async fn process(
    app: &AppContext,
    req: Request<Incoming>,
    correlation_id: &str,
) -> Result<(RequestDescriptor, Served), ProxyError> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|err| {
            ProxyError::Internal(anyhow::Error::new(err).context("failed to read request body"))
        })?
        .to_bytes();

    let descriptor = RequestDescriptor::from_parts(parts.method, &parts.uri, parts.headers, body)?;
    info!(
        correlation_id = %correlation_id,
        tenant = %descriptor.tenant,
        method = %descriptor.method,
        url = %descriptor.target_raw,
        "request received"
    );

    // Everything the engine and fetcher log inherits these fields.
    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation_id,
        tenant = %descriptor.tenant,
        method = %descriptor.method,
        url = %descriptor.target_raw,
    );
    let now = unix_now()?;
    let served = app.engine.serve(&descriptor, now).instrument(span).await?;
    Ok((descriptor, served))
}

fn unix_now() -> Result<u64, ProxyError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|err| {
            ProxyError::Internal(anyhow::Error::new(err).context("system clock before epoch"))
        })
}

fn build_envelope(
    descriptor: &RequestDescriptor,
    served: &Served,
) -> anyhow::Result<Response<Full<Bytes>>> {
    let mut builder = Response::builder().status(served.entry.status);
    for (name, value) in &served.entry.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder
        .header("X-Cache", served.cache_status.as_str())
        .header("X-Cache-Key", served.fingerprint.as_str())
        .header("X-Cache-Expires-In", format!("{}s", served.remaining));
    if served.cache_status == CacheStatus::Miss {
        builder = builder.header("X-Target-URL", descriptor.target_url.as_str());
    }
    builder = builder.header("X-Response-Time", logging::utc_timestamp());
    builder = apply_no_store_headers(builder);
    builder
        .body(Full::new(served.entry.body.clone()))
        .map_err(|err| anyhow::Error::new(err).context("invalid cached response envelope"))
}

fn error_response(err: &ProxyError) -> Response<Full<Bytes>> {
    let builder = Response::builder()
        .status(err.status())
        .header(header::CONTENT_TYPE, "application/json");
    apply_no_store_headers(builder)
        .body(Full::new(Bytes::from(err.to_json_body())))
        .expect("static error response headers are valid")
}

fn apply_no_store_headers(builder: Builder) -> Builder {
    builder
        .header(header::CACHE_CONTROL, CACHE_CONTROL_ENSEMBLE)
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header("Surrogate-Control", "no-store")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, CORS_METHODS)
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_HEADERS)
}
