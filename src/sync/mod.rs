//! Generic offline-first synchronization layer.
//!
//! This module provides a domain-agnostic store that:
//! - Applies add/update/remove optimistically to an in-memory view
//! - Sends each mutation to a remote source, queueing it durably on failure
//! - Replays the queue at startup (before the first fetch), on reconnect and on demand
//! - Serves the union of remote-confirmed items and unconfirmed local changes

mod connectivity;
mod queue;
mod state;
mod storage;
mod store;
mod traits;

pub use connectivity::{spawn_probe, Connectivity, PathProbe, Probe, TcpProbe};
pub use queue::{OpKind, PendingOp};
pub use storage::{MemoryQueueStorage, QueueStorage, SqliteQueueStorage};
pub use store::{DrainReport, OfflineStore, SyncStatus};
pub use traits::{Phase, RemoteSource, SyncOutcome, Syncable};
