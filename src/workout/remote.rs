//! File-backed remote collections.
//!
//! Each collection is one JSON document inside a shared directory (a mounted
//! network share, a synced folder). When the directory is unreachable the
//! remote is offline and every call fails.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::sync::{RemoteSource, Syncable};

/// A remote collection stored as `<root>/<collection>.json`.
pub struct FileRemote<T> {
  root: PathBuf,
  collection: String,
  /// Serializes read-modify-write cycles within this process
  write_lock: Mutex<()>,
  _items: PhantomData<fn() -> T>,
}

impl<T: Syncable> FileRemote<T> {
  pub fn new(root: impl Into<PathBuf>, collection: &str) -> Self {
    Self {
      root: root.into(),
      collection: collection.to_string(),
      write_lock: Mutex::new(()),
      _items: PhantomData,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn document(&self) -> PathBuf {
    self.root.join(format!("{}.json", self.collection))
  }

  async fn read(&self) -> Result<Vec<T>> {
    if tokio::fs::metadata(&self.root).await.is_err() {
      return Err(eyre!("Remote directory {} is unreachable", self.root.display()));
    }

    let path = self.document();
    let contents = match tokio::fs::read(&path).await {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(eyre!("Failed to read {}: {}", path.display(), e)),
    };

    serde_json::from_slice(&contents)
      .map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))
  }

  async fn write(&self, items: &[T]) -> Result<()> {
    let path = self.document();
    let data = serde_json::to_vec_pretty(items)
      .map_err(|e| eyre!("Failed to serialize {}: {}", self.collection, e))?;

    // Write then rename so readers never see a partial document
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data)
      .await
      .map_err(|e| eyre!("Failed to write {}: {}", tmp.display(), e))?;
    tokio::fs::rename(&tmp, &path)
      .await
      .map_err(|e| eyre!("Failed to replace {}: {}", path.display(), e))?;

    Ok(())
  }

  /// Apply `change` to the stored collection under the write lock.
  async fn modify(&self, change: impl FnOnce(&mut Vec<T>)) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    let mut items = self.read().await?;
    change(&mut items);
    self.write(&items).await
  }
}

/// Insert `item`, replacing any stored item with the same key.
fn upsert<T: Syncable>(items: &mut Vec<T>, item: &T) {
  let key = item.sync_key();
  match items.iter_mut().find(|existing| existing.sync_key() == key) {
    Some(existing) => *existing = item.clone(),
    None => items.push(item.clone()),
  }
}

#[async_trait]
impl<T: Syncable> RemoteSource<T> for FileRemote<T> {
  async fn fetch_all(&self) -> Result<Vec<T>> {
    let items = self.read().await?;
    debug!(collection = %self.collection, count = items.len(), "fetched remote collection");
    Ok(items)
  }

  async fn add(&self, item: &T) -> Result<()> {
    // Replayed adds must not duplicate rows
    self.modify(|items| upsert(items, item)).await
  }

  fn supports_update(&self) -> bool {
    true
  }

  async fn update(&self, item: &T) -> Result<()> {
    self.modify(|items| upsert(items, item)).await
  }

  async fn remove(&self, item: &T) -> Result<()> {
    let key = item.sync_key();
    self
      .modify(|items| items.retain(|existing| existing.sync_key() != key))
      .await
  }
}
