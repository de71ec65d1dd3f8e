use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use cachefront::cache::store::build_store;
use cachefront::cli::LogFormat;
use cachefront::proxy::{self, AppContext};
use cachefront::settings::{Settings, StoreBackend};

pub struct TestProxy {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestProxy {
    /// Start an in-process proxy on an ephemeral port with a memory store
    /// and test-friendly defaults. `mutate` tweaks the settings first.
    pub async fn start(mutate: impl FnOnce(&mut Settings)) -> Result<Self> {
        let mut settings = Settings {
            listen: "127.0.0.1:0".parse()?,
            log: LogFormat::Text,
            default_ttl: 3600,
            upstream_timeout: 30,
            max_body_size: 6 * 1024 * 1024,
            hot_entries: 64,
            store: StoreBackend::Memory,
        };
        mutate(&mut settings);
        settings.validate()?;

        let settings = Arc::new(settings);
        let store = build_store(&settings.store).await?;
        let app = AppContext::new(settings, store)?;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = proxy::serve(app, listener).await;
        });
        Ok(Self { addr, handle })
    }

    pub async fn start_default() -> Result<Self> {
        Self::start(|_| {}).await
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
