//! Core traits and types for the synchronization cache.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

/// Trait for items that can live in an offline-synced store.
///
/// Two items with the same `sync_key` are the same logical entity, whatever
/// their other fields say.
pub trait Syncable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Stable identifier for this item (e.g., a client-generated id).
  /// Returns None if the item carries no identity yet.
  fn sync_key(&self) -> Option<String>;
}

/// The remote data source a store reconciles against.
///
/// Every error is treated as transient by the store: the mutation is queued
/// and retried on the next drain.
#[async_trait]
pub trait RemoteSource<T: Syncable>: Send + Sync {
  /// Fetch the full remote collection.
  async fn fetch_all(&self) -> Result<Vec<T>>;

  /// Create an item remotely.
  async fn add(&self, item: &T) -> Result<()>;

  /// Whether this source can update items in place.
  fn supports_update(&self) -> bool {
    false
  }

  /// Update an item remotely. Only called when `supports_update` is true.
  async fn update(&self, _item: &T) -> Result<()> {
    Err(eyre!("update handler not provided"))
  }

  /// Delete an item remotely.
  async fn remove(&self, item: &T) -> Result<()>;
}

#[async_trait]
impl<T: Syncable, R: RemoteSource<T> + ?Sized> RemoteSource<T> for Arc<R> {
  async fn fetch_all(&self) -> Result<Vec<T>> {
    (**self).fetch_all().await
  }

  async fn add(&self, item: &T) -> Result<()> {
    (**self).add(item).await
  }

  fn supports_update(&self) -> bool {
    (**self).supports_update()
  }

  async fn update(&self, item: &T) -> Result<()> {
    (**self).update(item).await
  }

  async fn remove(&self, item: &T) -> Result<()> {
    (**self).remove(item).await
  }
}

/// What happened to a mutation after its optimistic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  /// The remote source confirmed the mutation
  Synced,
  /// The remote call failed or was deferred; the mutation sits in the pending queue
  Queued,
  /// Nothing happened (missing identity or missing handler)
  Skipped,
}

/// Lifecycle of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Created, startup not begun
  Uninitialized,
  /// Replaying the pending queue before the first fetch
  Draining,
  /// Waiting for the seeding fetch
  Fetching,
  /// Serving the merged view
  Ready,
  /// Replaying the pending queue after a reconnect or a completed mutation
  Reconciling,
}

impl Phase {
  /// True until the startup drain and fetch have settled.
  pub fn is_loading(self) -> bool {
    matches!(self, Phase::Uninitialized | Phase::Draining | Phase::Fetching)
  }
}
