use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cli::{Cli, LogFormat};

fn default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("static listen address")
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_ttl() -> u64 {
    3600
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_max_body_size() -> usize {
    6 * 1024 * 1024
}

fn default_hot_entries() -> usize {
    256
}

/// Which object store backs the cache. The engine only ever sees the
/// [`crate::cache::store::ObjectStore`] trait, so the variants are
/// interchangeable at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Filesystem { dir: PathBuf },
    S3 { bucket: String },
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Memory
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
    /// Applied when the `ttl` query parameter is absent or unparseable.
    #[serde(default = "default_ttl")]
    pub default_ttl: u64,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Capacity of the in-process hot-entry layer in front of the store;
    /// 0 disables it.
    #[serde(default = "default_hot_entries")]
    pub hot_entries: usize,
    #[serde(default)]
    pub store: StoreBackend,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = Config::builder();
        let config_path = resolve_config_path(cli)?;

        if let Some(path) = &config_path {
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("CACHEFRONT")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().map_err(to_anyhow)?;
        let mut settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        if let Some(path) = &config_path {
            settings.apply_base_dir(path);
        }
        settings.apply_legacy_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Honor the two deployment variables the original environment exposed,
    /// so existing installations keep working without a config file.
    fn apply_legacy_env(&mut self) -> Result<()> {
        if let Ok(bucket) = std::env::var("S3_BUCKET_NAME")
            && !bucket.is_empty()
        {
            self.store = StoreBackend::S3 { bucket };
        }
        if let Ok(raw) = std::env::var("CACHE_TTL_SECONDS")
            && !raw.is_empty()
        {
            let secs: u64 = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid CACHE_TTL_SECONDS value '{raw}'"))?;
            self.default_ttl = secs;
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.default_ttl > 0,
            "default_ttl must be greater than 0 seconds (got {})",
            self.default_ttl
        );
        ensure!(
            self.upstream_timeout > 0,
            "upstream_timeout must be greater than 0 seconds (got {})",
            self.upstream_timeout
        );
        ensure!(
            self.max_body_size > 0,
            "max_body_size must be greater than 0 (got {})",
            self.max_body_size
        );
        match &self.store {
            StoreBackend::Memory => {}
            StoreBackend::Filesystem { dir } => {
                ensure!(
                    !dir.as_os_str().is_empty(),
                    "filesystem store requires a non-empty dir"
                );
            }
            StoreBackend::S3 { bucket } => {
                ensure!(!bucket.is_empty(), "s3 store requires a non-empty bucket");
            }
        }
        Ok(())
    }

    fn apply_base_dir(&mut self, config_path: &Path) {
        let base_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        if let StoreBackend::Filesystem { dir } = &mut self.store {
            *dir = absolutize(dir, base_dir);
        }
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

fn resolve_config_path(cli: &Cli) -> Result<Option<PathBuf>> {
    if let Some(path) = cli.config_path() {
        if !path.exists() {
            bail!("configuration file {} does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    for candidate in default_config_candidates() {
        if candidate.exists() {
            return Ok(Some(candidate));
        }
    }

    // Environment-only operation is a supported deployment mode.
    Ok(None)
}

fn default_config_candidates() -> [PathBuf; 2] {
    [
        PathBuf::from("/etc/cachefront/cachefront.toml"),
        PathBuf::from("cachefront.toml"),
    ]
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LogFormat;

    fn base_settings() -> Settings {
        Settings {
            listen: "127.0.0.1:0".parse().unwrap(),
            log: LogFormat::Text,
            default_ttl: 3600,
            upstream_timeout: 30,
            max_body_size: 1024,
            hot_entries: 16,
            store: StoreBackend::Memory,
        }
    }

    #[test]
    fn validation_accepts_defaults() {
        assert!(base_settings().validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_default_ttl() {
        let mut settings = base_settings();
        settings.default_ttl = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_upstream_timeout() {
        let mut settings = base_settings();
        settings.upstream_timeout = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validation_rejects_empty_bucket() {
        let mut settings = base_settings();
        settings.store = StoreBackend::S3 {
            bucket: String::new(),
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn filesystem_dir_is_resolved_against_config_dir() {
        let mut settings = base_settings();
        settings.store = StoreBackend::Filesystem {
            dir: PathBuf::from("cache"),
        };
        settings.apply_base_dir(Path::new("/etc/cachefront/cachefront.toml"));
        match &settings.store {
            StoreBackend::Filesystem { dir } => {
                assert_eq!(dir, &PathBuf::from("/etc/cachefront/cache"));
            }
            other => panic!("unexpected store backend: {other:?}"),
        }
    }
}
