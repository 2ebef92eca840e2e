//! Durable FIFO of mutations the remote source has not confirmed yet.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::storage::QueueStorage;
use super::traits::Syncable;

/// Kind of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
  Add,
  Update,
  Remove,
}

/// A mutation waiting for remote confirmation.
///
/// Only `kind`, `item` and `enqueued_at` are persisted. `id` and `revision`
/// are assigned per process and let a replay tell whether the entry changed
/// while its remote call was in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOp<T> {
  pub kind: OpKind,
  pub item: T,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub enqueued_at: Option<DateTime<Utc>>,
  #[serde(skip)]
  pub(crate) id: u64,
  #[serde(skip)]
  pub(crate) revision: u32,
}

impl<T> PendingOp<T> {
  pub fn new(kind: OpKind, item: T) -> Self {
    Self {
      kind,
      item,
      enqueued_at: Some(Utc::now()),
      id: 0,
      revision: 0,
    }
  }
}

/// The pending queue of one namespace, mirrored to storage on every change.
pub struct PendingQueue<T, S: QueueStorage> {
  namespace: String,
  storage: Arc<S>,
  ops: Vec<PendingOp<T>>,
  next_id: u64,
}

impl<T: Syncable, S: QueueStorage> PendingQueue<T, S> {
  /// Load the queue persisted under `namespace`.
  pub fn restore(namespace: &str, storage: Arc<S>) -> Result<Self> {
    let mut ops: Vec<PendingOp<T>> = storage.load(namespace)?;
    for (index, op) in ops.iter_mut().enumerate() {
      op.id = index as u64 + 1;
    }
    let next_id = ops.len() as u64 + 1;

    if !ops.is_empty() {
      debug!(namespace, pending = ops.len(), "restored pending queue");
    }

    Ok(Self {
      namespace: namespace.to_string(),
      storage,
      ops,
      next_id,
    })
  }

  /// Append a mutation.
  ///
  /// An `Update` whose key's most recent entry is also an `Update` replaces
  /// that entry's payload in place. `Add` and `Remove` always append.
  pub fn enqueue(&mut self, kind: OpKind, item: T) -> Result<()> {
    if kind == OpKind::Update {
      if let Some(key) = item.sync_key() {
        let latest = self
          .ops
          .iter_mut()
          .rev()
          .find(|op| op.item.sync_key().as_deref() == Some(key.as_str()));

        if let Some(latest) = latest {
          if latest.kind == OpKind::Update {
            debug!(namespace = %self.namespace, key = %key, "squashing pending update");
            latest.item = item;
            latest.revision += 1;
            return self.persist();
          }
        }
      }
    }

    let mut op = PendingOp::new(kind, item);
    op.id = self.next_id;
    self.next_id += 1;
    self.ops.push(op);
    self.persist()
  }

  /// Queue a mutation that was issued before every entry already queued for
  /// its key, so it replays ahead of them.
  ///
  /// An `Update` directly followed by a queued `Update` is dropped: the
  /// later payload already replaces it.
  pub fn enqueue_ahead(&mut self, kind: OpKind, item: T) -> Result<()> {
    let key = item.sync_key();
    let first = self
      .ops
      .iter()
      .position(|op| key.is_some() && op.item.sync_key() == key);

    let Some(position) = first else {
      return self.enqueue(kind, item);
    };

    if kind == OpKind::Update && self.ops[position].kind == OpKind::Update {
      debug!(namespace = %self.namespace, "earlier update superseded by a queued one");
      return Ok(());
    }

    let mut op = PendingOp::new(kind, item);
    op.id = self.next_id;
    self.next_id += 1;
    self.ops.insert(position, op);
    self.persist()
  }

  /// Copy of the queue in FIFO order.
  pub fn snapshot(&self) -> Vec<PendingOp<T>> {
    self.ops.clone()
  }

  /// Drop a delivered entry.
  ///
  /// Returns false (and keeps the entry) when it was squashed after the
  /// snapshot was taken, or when it is gone already.
  pub fn settle(&mut self, op: &PendingOp<T>) -> Result<bool> {
    let Some(position) = self.ops.iter().position(|o| o.id == op.id) else {
      return Ok(false);
    };
    if self.ops[position].revision != op.revision {
      return Ok(false);
    }
    self.ops.remove(position);
    self.persist()?;
    Ok(true)
  }

  /// Whether any entry targets `key`.
  pub fn has_pending_for(&self, key: &str) -> bool {
    self
      .ops
      .iter()
      .any(|op| op.item.sync_key().as_deref() == Some(key))
  }

  pub fn len(&self) -> usize {
    self.ops.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }

  /// Enqueue time of the oldest entry that recorded one.
  pub fn oldest(&self) -> Option<DateTime<Utc>> {
    self.ops.iter().filter_map(|op| op.enqueued_at).min()
  }

  /// Forget every entry, in memory and in storage.
  pub fn clear(&mut self) -> Result<()> {
    self.ops.clear();
    self.storage.clear(&self.namespace)
  }

  fn persist(&self) -> Result<()> {
    self.storage.store(&self.namespace, &self.ops)
  }
}
