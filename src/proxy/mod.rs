use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::cache::CacheEngine;
use crate::cache::store::ObjectStore;
use crate::settings::Settings;

pub mod handler;
pub mod headers;
pub mod request;
pub mod upstream;

use upstream::UpstreamClient;

/// Process-wide state: settings plus the cache engine (which owns the store
/// handle and the upstream client). Constructed once at startup.
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub engine: CacheEngine,
}

impl AppContext {
    pub fn new(settings: Arc<Settings>, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let upstream = UpstreamClient::new(settings.upstream_timeout(), settings.max_body_size)?;
        let engine = CacheEngine::new(
            store,
            upstream,
            settings.default_ttl,
            settings.hot_entries,
        );
        Ok(Self { settings, engine })
    }
}

pub async fn run(app: AppContext) -> Result<()> {
    let listen = app.settings.listen;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(address = %listen, "proxy listening");
    serve(app, listener).await
}

/// Accept loop: one task per connection, HTTP/1.1 service per task. The
/// handler is re-entrant; all shared state lives behind `Arc`.
pub async fn serve(app: AppContext, listener: TcpListener) -> Result<()> {
    let app = Arc::new(app);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                error!(error = %err, "accept failed");
                continue;
            }
        };
        let app = app.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn({
                let app = app.clone();
                move |req| {
                    let app = app.clone();
                    async move { Ok::<_, Infallible>(handler::handle(app, req).await) }
                }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer, error = %err, "connection closed with error");
            }
        });
    }
}
