//! Offline-first store that reconciles a local view with a remote source.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connectivity::Connectivity;
use super::queue::{OpKind, PendingOp, PendingQueue};
use super::state::SyncState;
use super::storage::QueueStorage;
use super::traits::{Phase, RemoteSource, SyncOutcome, Syncable};

/// Summary of one pass over the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  /// Operations the remote source accepted
  pub delivered: usize,
  /// Operations that failed and stay queued
  pub failed: usize,
}

/// Point-in-time view of a store's sync health, for status indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
  pub phase: Phase,
  pub is_loading: bool,
  pub is_online: bool,
  /// Operations waiting in the durable queue
  pub pending: usize,
  /// When the oldest queued operation was recorded
  pub oldest_pending: Option<DateTime<Utc>>,
  /// Visible items whose latest local change is not confirmed yet
  pub unconfirmed: usize,
}

/// Offline-first store over a single remote collection.
///
/// Mutations are applied to the local view first, then sent to the remote
/// source. Failed calls land in a durable pending queue that is replayed
/// at startup, on reconnect and on demand.
pub struct OfflineStore<T, R, S: QueueStorage> {
  namespace: String,
  remote: R,
  state: Mutex<SyncState<T>>,
  queue: Mutex<PendingQueue<T, S>>,
  /// Keys with a direct remote call outstanding
  in_flight: Mutex<HashSet<String>>,
  /// Serializes drains so no operation is dispatched twice at once
  drain_guard: tokio::sync::Mutex<()>,
  phase: watch::Sender<Phase>,
  version: watch::Sender<u64>,
  connectivity: Connectivity,
  kick: Arc<Notify>,
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T, R, S> OfflineStore<T, R, S>
where
  T: Syncable,
  R: RemoteSource<T> + 'static,
  S: QueueStorage + 'static,
{
  /// Create a store, restoring the pending queue persisted under `namespace`.
  ///
  /// The store stays `Uninitialized` until `initialize` runs.
  pub fn new(
    namespace: &str,
    remote: R,
    storage: Arc<S>,
    connectivity: Connectivity,
  ) -> Result<Self> {
    let queue = PendingQueue::restore(namespace, storage)
      .map_err(|e| eyre!("Failed to restore pending queue '{}': {}", namespace, e))?;
    let (phase, _) = watch::channel(Phase::Uninitialized);
    let (version, _) = watch::channel(0);

    Ok(Self {
      namespace: namespace.to_string(),
      remote,
      state: Mutex::new(SyncState::new()),
      queue: Mutex::new(queue),
      in_flight: Mutex::new(HashSet::new()),
      drain_guard: tokio::sync::Mutex::new(()),
      phase,
      version,
      connectivity,
      kick: Arc::new(Notify::new()),
      tasks: Mutex::new(Vec::new()),
    })
  }

  /// Create a store and start it in the background: startup drain and fetch,
  /// plus a reconciler that replays the queue on reconnect.
  ///
  /// Must be called from within a Tokio runtime.
  pub fn open(
    namespace: &str,
    remote: R,
    storage: Arc<S>,
    connectivity: Connectivity,
  ) -> Result<Arc<Self>> {
    let store = Arc::new(Self::new(namespace, remote, storage, connectivity)?);

    let reconciler = store.spawn_reconciler();
    lock(&store.tasks).push(reconciler);

    let startup = Arc::clone(&store);
    tokio::spawn(async move {
      startup.initialize().await;
    });

    Ok(store)
  }

  /// Startup sequence: replay the queue, then seed the confirmed set.
  ///
  /// Never fails. A failed fetch leaves only the local overlay visible.
  pub async fn initialize(&self) {
    self.set_phase(Phase::Draining);
    if let Err(e) = self.sync_pending().await {
      warn!(namespace = %self.namespace, error = %e, "startup replay failed");
    }

    self.set_phase(Phase::Fetching);
    match self.remote.fetch_all().await {
      Ok(items) => self.apply_baseline(items),
      Err(e) => {
        warn!(namespace = %self.namespace, error = %e, "initial fetch failed, serving local changes only");
        self.apply_baseline(Vec::new());
      }
    }

    self.set_phase(Phase::Ready);
    info!(namespace = %self.namespace, items = self.items().len(), "store ready");
  }

  /// Wait until the startup drain and fetch have settled.
  pub async fn ready(&self) {
    let mut rx = self.phase.subscribe();
    let _ = rx.wait_for(|phase| !phase.is_loading()).await;
  }

  /// Refetch the remote baseline. Unlike startup, a failed fetch is
  /// reported and the current view is kept.
  pub async fn refresh(&self) -> Result<()> {
    let items = self
      .remote
      .fetch_all()
      .await
      .map_err(|e| eyre!("Failed to refresh '{}': {}", self.namespace, e))?;
    self.apply_baseline(items);
    Ok(())
  }

  /// Replay every pending operation in FIFO order.
  ///
  /// Delivered operations leave the queue, failed ones stay where they were.
  /// A call made while another drain is running waits for it, then drains
  /// whatever is left.
  pub async fn sync_pending(&self) -> Result<DrainReport> {
    let _guard = self.drain_guard.lock().await;

    let ops = lock(&self.queue).snapshot();
    if ops.is_empty() {
      return Ok(DrainReport::default());
    }

    let reconciling = *self.phase.borrow() == Phase::Ready;
    if reconciling {
      self.set_phase(Phase::Reconciling);
    }

    let result = self.replay(ops).await;

    if reconciling {
      self.set_phase(Phase::Ready);
    }

    let report = result?;
    info!(
      namespace = %self.namespace,
      delivered = report.delivered,
      failed = report.failed,
      "drained pending queue"
    );
    Ok(report)
  }

  /// Add an item.
  pub async fn add(&self, item: T) -> Result<SyncOutcome> {
    let Some(key) = item.sync_key() else {
      warn!(namespace = %self.namespace, "add skipped: item has no identity");
      return Ok(SyncOutcome::Skipped);
    };

    let stamp = lock(&self.state).stage(&key, item.clone());
    self.touch();

    self.deliver(OpKind::Add, &key, Some(stamp), item).await
  }

  /// Replace an existing item.
  pub async fn update(&self, item: T) -> Result<SyncOutcome> {
    let Some(key) = item.sync_key() else {
      warn!(namespace = %self.namespace, "update skipped: item has no identity");
      return Ok(SyncOutcome::Skipped);
    };
    if !self.remote.supports_update() {
      warn!(namespace = %self.namespace, "update skipped: update handler not provided");
      return Ok(SyncOutcome::Skipped);
    }

    let stamp = {
      let mut state = lock(&self.state);
      if !state.contains(&key) {
        warn!(namespace = %self.namespace, key = %key, "updating an unknown item, staging it as new");
      }
      state.stage(&key, item.clone())
    };
    self.touch();

    self.deliver(OpKind::Update, &key, Some(stamp), item).await
  }

  /// Delete an item. The deletion is visible immediately and never rolled back.
  pub async fn remove(&self, item: T) -> Result<SyncOutcome> {
    let Some(key) = item.sync_key() else {
      warn!(namespace = %self.namespace, "remove skipped: item has no identity");
      return Ok(SyncOutcome::Skipped);
    };

    lock(&self.state).discard(&key);
    self.touch();

    self.deliver(OpKind::Remove, &key, None, item).await
  }

  /// Merged view: confirmed items followed by unconfirmed local changes.
  pub fn items(&self) -> Vec<T> {
    lock(&self.state).items()
  }

  /// Visible item with the given key.
  pub fn find(&self, key: &str) -> Option<T> {
    lock(&self.state).get(key).cloned()
  }

  pub fn phase(&self) -> Phase {
    *self.phase.borrow()
  }

  pub fn is_loading(&self) -> bool {
    self.phase().is_loading()
  }

  pub fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  /// Change counter, bumped whenever `items` may have changed.
  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.version.subscribe()
  }

  /// Copy of the pending queue in replay order.
  pub fn pending(&self) -> Vec<PendingOp<T>> {
    lock(&self.queue).snapshot()
  }

  pub fn pending_len(&self) -> usize {
    lock(&self.queue).len()
  }

  /// Drop every pending operation. Items already visible stay visible.
  pub fn clear_pending(&self) -> Result<()> {
    lock(&self.queue).clear()?;
    warn!(namespace = %self.namespace, "pending queue cleared");
    Ok(())
  }

  pub fn status(&self) -> SyncStatus {
    let (pending, oldest_pending) = {
      let queue = lock(&self.queue);
      (queue.len(), queue.oldest())
    };
    let phase = self.phase();

    SyncStatus {
      phase,
      is_loading: phase.is_loading(),
      is_online: self.is_online(),
      pending,
      oldest_pending,
      unconfirmed: lock(&self.state).overlay_len(),
    }
  }

  /// Send a mutation whose optimistic step is done, queueing it on failure.
  async fn deliver(
    &self,
    kind: OpKind,
    key: &str,
    stamp: Option<u64>,
    item: T,
  ) -> Result<SyncOutcome> {
    let in_flight = {
      let mut queue = lock(&self.queue);
      let mut in_flight = lock(&self.in_flight);
      if queue.has_pending_for(key) || in_flight.contains(key) {
        // Earlier changes to this key must reach the remote first
        debug!(namespace = %self.namespace, key, ?kind, "queued behind earlier operations");
        queue.enqueue(kind, item)?;
        self.touch();
        return Ok(SyncOutcome::Queued);
      }
      in_flight.insert(key.to_string());
      InFlight {
        keys: &self.in_flight,
        key,
      }
    };

    match self.call_remote(kind, &item).await {
      Ok(()) => {
        if let Some(stamp) = stamp {
          lock(&self.state).confirm(key, stamp);
          self.touch();
        }
        drop(in_flight);
        if !lock(&self.queue).is_empty() {
          self.kick.notify_one();
        }
        Ok(SyncOutcome::Synced)
      }
      Err(e) => {
        warn!(namespace = %self.namespace, key, ?kind, error = %e, "remote call failed, queued for retry");
        // Anything queued for this key meanwhile was issued after this call
        lock(&self.queue).enqueue_ahead(kind, item)?;
        self.touch();
        Ok(SyncOutcome::Queued)
      }
    }
  }

  async fn replay(&self, ops: Vec<PendingOp<T>>) -> Result<DrainReport> {
    let mut report = DrainReport::default();
    // Keys whose earlier operation has not landed; later ones must wait
    let mut blocked: HashSet<String> = HashSet::new();

    for op in ops {
      let key = op.item.sync_key();
      if let Some(key) = &key {
        if blocked.contains(key) || lock(&self.in_flight).contains(key) {
          report.failed += 1;
          blocked.insert(key.clone());
          debug!(namespace = %self.namespace, key = %key, kind = ?op.kind, "held behind an earlier operation");
          continue;
        }
      }

      match self.call_remote(op.kind, &op.item).await {
        Ok(()) => {
          report.delivered += 1;
          self.settle(&op)?;
        }
        Err(e) => {
          report.failed += 1;
          if let Some(key) = key {
            blocked.insert(key);
          }
          debug!(namespace = %self.namespace, kind = ?op.kind, error = %e, "replay failed, keeping in queue");
        }
      }
    }

    Ok(report)
  }

  /// Remove a delivered operation and, once its key has no more pending work,
  /// move the local value into the confirmed set.
  fn settle(&self, op: &PendingOp<T>) -> Result<()> {
    let key = {
      let mut queue = lock(&self.queue);
      if !queue.settle(op)? {
        return Ok(());
      }
      match op.item.sync_key() {
        Some(key) if !queue.has_pending_for(&key) => key,
        _ => return Ok(()),
      }
    };

    if matches!(op.kind, OpKind::Add | OpKind::Update) && lock(&self.state).promote(&key) {
      self.touch();
    }
    Ok(())
  }

  /// Call the remote handler for `kind`, turning panics into errors.
  async fn call_remote(&self, kind: OpKind, item: &T) -> Result<()> {
    let call = async {
      match kind {
        OpKind::Add => self.remote.add(item).await,
        OpKind::Update if self.remote.supports_update() => self.remote.update(item).await,
        OpKind::Update => Err(eyre!("update handler not provided")),
        OpKind::Remove => self.remote.remove(item).await,
      }
    };

    match AssertUnwindSafe(call).catch_unwind().await {
      Ok(result) => result,
      Err(_) => Err(eyre!("remote {:?} handler panicked", kind)),
    }
  }

  /// Replace the confirmed set, then re-apply whatever is still queued so
  /// unconfirmed changes stay visible.
  fn apply_baseline(&self, items: Vec<T>) {
    let total = items.len();
    let keyed: Vec<(String, T)> = items
      .into_iter()
      .filter_map(|item| item.sync_key().map(|key| (key, item)))
      .collect();
    if keyed.len() < total {
      warn!(namespace = %self.namespace, skipped = total - keyed.len(), "ignoring remote items without identity");
    }

    let pending = lock(&self.queue).snapshot();

    {
      let mut state = lock(&self.state);
      state.replace_confirmed(keyed);
      for op in pending {
        let Some(key) = op.item.sync_key() else {
          continue;
        };
        match op.kind {
          OpKind::Add | OpKind::Update => {
            state.stage(&key, op.item);
          }
          OpKind::Remove => state.discard(&key),
        }
      }
    }

    self.touch();
  }

  fn spawn_reconciler(self: &Arc<Self>) -> JoinHandle<()> {
    let store = Arc::downgrade(self);
    let mut online = self.connectivity.subscribe();
    let kick = Arc::clone(&self.kick);

    tokio::spawn(async move {
      let mut was_online = *online.borrow_and_update();
      loop {
        let should_drain = tokio::select! {
          changed = online.changed() => {
            if changed.is_err() {
              break;
            }
            let now = *online.borrow_and_update();
            let reconnected = now && !was_online;
            was_online = now;
            reconnected
          }
          _ = kick.notified() => was_online,
        };
        if !should_drain {
          continue;
        }

        let Some(store) = store.upgrade() else {
          break;
        };
        if let Err(e) = store.sync_pending().await {
          warn!(namespace = %store.namespace, error = %e, "background replay failed");
        }
      }
    })
  }

  fn set_phase(&self, phase: Phase) {
    let previous = self.phase.send_replace(phase);
    if previous != phase {
      debug!(namespace = %self.namespace, ?previous, ?phase, "phase changed");
    }
  }

  fn touch(&self) {
    self.version.send_modify(|version| *version += 1);
  }
}

impl<T, R, S: QueueStorage> Drop for OfflineStore<T, R, S> {
  fn drop(&mut self) {
    for task in lock(&self.tasks).drain(..) {
      task.abort();
    }
  }
}

/// Marks a key as having a direct remote call outstanding until dropped.
struct InFlight<'a> {
  keys: &'a Mutex<HashSet<String>>,
  key: &'a str,
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    lock(self.keys).remove(self.key);
  }
}

fn lock<M>(mutex: &Mutex<M>) -> MutexGuard<'_, M> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
