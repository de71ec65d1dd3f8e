pub mod cache;
pub mod cli;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod settings;

use std::sync::Arc;

use anyhow::Result;

use crate::settings::Settings;

pub async fn run(settings: Settings) -> Result<()> {
    let settings = Arc::new(settings);
    let store = cache::store::build_store(&settings.store).await?;
    let app = proxy::AppContext::new(settings, store)?;
    proxy::run(app).await
}
