//! Online/offline tracking.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Shared online flag. Clones observe the same state.
#[derive(Clone)]
pub struct Connectivity {
  tx: watch::Sender<bool>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record the current state. Observers are only woken on an actual change.
  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
    if changed {
      info!(online, "connectivity changed");
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Default for Connectivity {
  fn default() -> Self {
    Self::new(true)
  }
}

/// A reachability check for the remote source.
#[async_trait]
pub trait Probe: Send + Sync {
  async fn check(&self) -> bool;
}

/// Online when a TCP connection to `addr` opens within `timeout`.
pub struct TcpProbe {
  addr: SocketAddr,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
    Self { addr, timeout }
  }
}

#[async_trait]
impl Probe for TcpProbe {
  async fn check(&self) -> bool {
    matches!(
      tokio::time::timeout(self.timeout, TcpStream::connect(self.addr)).await,
      Ok(Ok(_))
    )
  }
}

/// Online while `path` exists (e.g., a mounted network share).
pub struct PathProbe {
  path: PathBuf,
}

impl PathProbe {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl Probe for PathProbe {
  async fn check(&self) -> bool {
    tokio::fs::metadata(&self.path).await.is_ok()
  }
}

/// Poll `probe` every `interval` and publish the result.
/// Runs until the returned handle is aborted.
pub fn spawn_probe<P>(connectivity: Connectivity, probe: P, interval: Duration) -> JoinHandle<()>
where
  P: Probe + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let online = probe.check().await;
      connectivity.set_online(online);
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::net::TcpListener;

  #[test]
  fn test_set_online_notifies_on_change_only() {
    let connectivity = Connectivity::new(false);
    let mut rx = connectivity.subscribe();

    connectivity.set_online(false);
    assert!(!rx.has_changed().unwrap());

    connectivity.set_online(true);
    assert!(rx.has_changed().unwrap());
    assert!(*rx.borrow_and_update());
    assert!(connectivity.is_online());
  }

  #[tokio::test]
  async fn test_tcp_probe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let probe = TcpProbe::new(addr, Duration::from_secs(1));
    assert!(probe.check().await);

    drop(listener);
    assert!(!probe.check().await);
  }

  #[tokio::test]
  async fn test_path_probe() {
    let dir = tempfile::tempdir().unwrap();
    let probe = PathProbe::new(dir.path().join("share"));
    assert!(!probe.check().await);

    std::fs::create_dir(dir.path().join("share")).unwrap();
    assert!(probe.check().await);
  }

  #[tokio::test]
  async fn test_spawn_probe_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let connectivity = Connectivity::new(false);
    let mut rx = connectivity.subscribe();

    let handle = spawn_probe(
      connectivity.clone(),
      PathProbe::new(dir.path()),
      Duration::from_millis(10),
    );

    rx.changed().await.unwrap();
    assert!(*rx.borrow());
    handle.abort();
  }
}
