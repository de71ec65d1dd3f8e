use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use parking_lot::Mutex;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;

use crate::settings::StoreBackend;

/// The sole abstraction boundary in front of the blob store. `put` is an
/// idempotent whole-object overwrite, `get` of a missing key is `Ok(None)`,
/// and `delete` of a missing key succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, blob: Vec<u8>, content_type: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

pub async fn build_store(backend: &StoreBackend) -> Result<Arc<dyn ObjectStore>> {
    match backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Filesystem { dir } => Ok(Arc::new(FsStore::new(dir.clone())?)),
        StoreBackend::S3 { bucket } => Ok(Arc::new(S3Store::new(bucket.clone()).await)),
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, blob: Vec<u8>, _content_type: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), blob);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

const TEMP_PREFIX: &str = "tmp_";

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create store root {}", root.display()))?;
        let store = Self { root };
        store.remove_temp_files()?;
        Ok(store)
    }

    /// Stray temp files are leftovers from writes interrupted mid-flight;
    /// none of them ever reached a final object path.
    fn remove_temp_files(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| name.starts_with(TEMP_PREFIX))
                    .unwrap_or(false)
            {
                std::fs::remove_file(&path).ok();
            }
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for component in key.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                bail!("invalid object key '{key}'");
            }
            if component.contains('\\') {
                bail!("invalid object key '{key}'");
            }
            path.push(component);
        }
        Ok(path)
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, key: &str, blob: Vec<u8>, _content_type: &str) -> Result<()> {
        let final_path = self.object_path(key)?;
        let parent = final_path
            .parent()
            .map(Path::to_path_buf)
            .with_context(|| format!("object key '{key}' has no parent directory"))?;
        async_fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;

        // Write to a temp file first; the final path only ever appears via
        // rename, so readers never observe a partial object.
        let temp_path = self.temp_path();
        let mut options = async_fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }
        let mut file = options
            .open(&temp_path)
            .await
            .with_context(|| format!("failed to open {}", temp_path.display()))?;
        if let Err(err) = async {
            file.write_all(&blob).await?;
            file.flush().await
        }
        .await
        {
            async_fs::remove_file(&temp_path).await.ok();
            return Err(err).with_context(|| format!("failed to write {}", temp_path.display()));
        }
        drop(file);

        if let Err(err) = async_fs::rename(&temp_path, &final_path).await {
            async_fs::remove_file(&temp_path).await.ok();
            return Err(err)
                .with_context(|| format!("failed to publish {}", final_path.display()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        match async_fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read object {}", path.display()))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match async_fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to delete object {}", path.display()));
            }
        }
        // Opportunistically prune now-empty directories up to the root.
        let mut parent = path.parent().map(Path::to_path_buf);
        while let Some(dir) = parent {
            if dir == self.root || async_fs::remove_dir(&dir).await.is_err() {
                break;
            }
            parent = dir.parent().map(Path::to_path_buf);
        }
        Ok(())
    }
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(bucket: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, blob: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(blob))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("failed to store object {key}"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .with_context(|| format!("failed to read object {key}"))?;
                Ok(Some(data.to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(anyhow::Error::new(service_err)
                        .context(format!("failed to fetch object {key}")))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to delete object {key}"))?;
        Ok(())
    }
}
