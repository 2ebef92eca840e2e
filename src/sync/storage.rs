//! Queue storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::queue::PendingOp;

/// Trait for durable pending-queue backends.
///
/// Each namespace owns exactly one record: the whole queue as a JSON array.
pub trait QueueStorage: Send + Sync {
  /// Read the queue for a namespace. A missing record is an empty queue.
  fn load<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<PendingOp<T>>>;

  /// Replace the queue for a namespace.
  fn store<T: Serialize>(&self, namespace: &str, ops: &[PendingOp<T>]) -> Result<()>;

  /// Drop the record for a namespace.
  fn clear(&self, namespace: &str) -> Result<()>;
}

/// Process-local storage that forgets everything on exit.
/// Used when durability is disabled and in tests.
#[derive(Default)]
pub struct MemoryQueueStorage {
  records: Mutex<HashMap<String, String>>,
}

impl MemoryQueueStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Raw JSON record for a namespace, if any.
  pub fn raw(&self, namespace: &str) -> Option<String> {
    self
      .records
      .lock()
      .ok()
      .and_then(|records| records.get(namespace).cloned())
  }

  /// Seed a namespace with a raw JSON record.
  pub fn put_raw(&self, namespace: &str, json: &str) -> Result<()> {
    self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .insert(namespace.to_string(), json.to_string());
    Ok(())
  }
}

impl QueueStorage for MemoryQueueStorage {
  fn load<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<PendingOp<T>>> {
    match self.raw(namespace) {
      Some(json) => decode(namespace, &json),
      None => Ok(Vec::new()),
    }
  }

  fn store<T: Serialize>(&self, namespace: &str, ops: &[PendingOp<T>]) -> Result<()> {
    let json = encode(namespace, ops)?;
    self.put_raw(namespace, &json)
  }

  fn clear(&self, namespace: &str) -> Result<()> {
    self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .remove(namespace);
    Ok(())
  }
}

/// SQLite-based queue storage implementation.
pub struct SqliteQueueStorage {
  conn: Mutex<Connection>,
}

impl SqliteQueueStorage {
  /// Open or create the queue database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create queue directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open queue database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory queue database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("liftsync").join("queue.db"))
  }

  /// Run database migrations for queue tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(())
  }

  /// Raw JSON record for a namespace, if any.
  pub fn raw(&self, namespace: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT ops FROM pending_queue WHERE namespace = ?",
        params![namespace],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read pending queue '{}': {}", namespace, e))
  }

  /// Seed a namespace with a raw JSON record.
  pub fn put_raw(&self, namespace: &str, json: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO pending_queue (namespace, ops, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![namespace, json],
      )
      .map_err(|e| eyre!("Failed to write pending queue '{}': {}", namespace, e))?;

    Ok(())
  }
}

/// Schema for queue tables.
const QUEUE_SCHEMA: &str = r#"
-- One JSON array of pending operations per namespace
CREATE TABLE IF NOT EXISTS pending_queue (
    namespace TEXT PRIMARY KEY,
    ops TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl QueueStorage for SqliteQueueStorage {
  fn load<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<PendingOp<T>>> {
    match self.raw(namespace)? {
      Some(json) => decode(namespace, &json),
      None => Ok(Vec::new()),
    }
  }

  fn store<T: Serialize>(&self, namespace: &str, ops: &[PendingOp<T>]) -> Result<()> {
    let json = encode(namespace, ops)?;
    self.put_raw(namespace, &json)
  }

  fn clear(&self, namespace: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM pending_queue WHERE namespace = ?",
        params![namespace],
      )
      .map_err(|e| eyre!("Failed to clear pending queue '{}': {}", namespace, e))?;

    Ok(())
  }
}

fn encode<T: Serialize>(namespace: &str, ops: &[PendingOp<T>]) -> Result<String> {
  serde_json::to_string(ops)
    .map_err(|e| eyre!("Failed to serialize pending queue '{}': {}", namespace, e))
}

fn decode<T: DeserializeOwned>(namespace: &str, json: &str) -> Result<Vec<PendingOp<T>>> {
  serde_json::from_str(json)
    .map_err(|e| eyre!("Failed to parse pending queue '{}': {}", namespace, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::queue::OpKind;
  use serde::Deserialize;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: String,
  }

  fn op(kind: OpKind, id: &str) -> PendingOp<Note> {
    PendingOp::new(kind, Note { id: id.to_string() })
  }

  #[test]
  fn test_missing_namespace_is_empty() {
    let storage = SqliteQueueStorage::open_in_memory().unwrap();
    let ops: Vec<PendingOp<Note>> = storage.load("nothing").unwrap();
    assert!(ops.is_empty());
  }

  #[test]
  fn test_namespaces_do_not_collide() {
    let storage = SqliteQueueStorage::open_in_memory().unwrap();
    storage.store("a", &[op(OpKind::Add, "1")]).unwrap();
    storage
      .store("b", &[op(OpKind::Remove, "2"), op(OpKind::Add, "3")])
      .unwrap();

    let a: Vec<PendingOp<Note>> = storage.load("a").unwrap();
    let b: Vec<PendingOp<Note>> = storage.load("b").unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 2);
    assert_eq!(b[0].kind, OpKind::Remove);
  }

  #[test]
  fn test_clear_drops_record() {
    let storage = MemoryQueueStorage::new();
    storage.store("a", &[op(OpKind::Add, "1")]).unwrap();
    storage.clear("a").unwrap();
    assert!(storage.raw("a").is_none());
  }

  #[test]
  fn test_reads_bare_kind_item_pairs() {
    let storage = MemoryQueueStorage::new();
    storage
      .put_raw(
        "notes",
        r#"[{"kind":"add","item":{"id":"x"}},{"kind":"update","item":{"id":"y"}}]"#,
      )
      .unwrap();

    let ops: Vec<PendingOp<Note>> = storage.load("notes").unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[1].kind, OpKind::Update);
    assert_eq!(ops[1].item.id, "y");
    assert!(ops[0].enqueued_at.is_none());
  }

  #[test]
  fn test_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("queue.db");

    {
      let storage = SqliteQueueStorage::open(&path).unwrap();
      storage.store("a", &[op(OpKind::Update, "1")]).unwrap();
    }

    let storage = SqliteQueueStorage::open(&path).unwrap();
    let ops: Vec<PendingOp<Note>> = storage.load("a").unwrap();
    assert_eq!(ops, vec![op(OpKind::Update, "1")]);
  }

  #[test]
  fn test_corrupt_record_is_an_error() {
    let storage = MemoryQueueStorage::new();
    storage.put_raw("a", "not json").unwrap();
    assert!(storage.load::<Note>("a").is_err());
  }
}
