use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::{Command, ExerciseAction, LogAction};
use crate::config::Config;
use crate::sync::{
  spawn_probe, Connectivity, OfflineStore, PathProbe, Probe, QueueStorage, RemoteSource,
  SqliteQueueStorage, SyncOutcome, SyncStatus, Syncable,
};
use crate::workout::{Exercise, ExerciseBook, ExerciseLog, FileRemote, LogBook, Metrics};

/// Queue namespace for the exercise list
pub const EXERCISES_NAMESPACE: &str = "exercises";
/// Queue namespace for logged sets
pub const LOGS_NAMESPACE: &str = "exerciseLogs";

/// Application state
pub struct App<S: QueueStorage = SqliteQueueStorage> {
  config: Config,
  connectivity: Connectivity,
  exercises: ExerciseBook<FileRemote<Exercise>, S>,
  logs: LogBook<FileRemote<ExerciseLog>, S>,
}

impl App<SqliteQueueStorage> {
  /// Open both collections against the configured remote and queue database,
  /// waiting until each has finished its startup replay and fetch.
  pub async fn open(config: Config) -> Result<Self> {
    let storage = Arc::new(SqliteQueueStorage::open(&config.storage_path()?)?);
    Self::with_storage(config, storage).await
  }
}

impl<S: QueueStorage + 'static> App<S> {
  pub async fn with_storage(config: Config, storage: Arc<S>) -> Result<Self> {
    let remote_root = config.remote.path.clone();
    let online = PathProbe::new(&remote_root).check().await;
    info!(remote = %remote_root.display(), online, "opening collections");
    let connectivity = Connectivity::new(online);

    let exercises = OfflineStore::open(
      EXERCISES_NAMESPACE,
      FileRemote::new(&remote_root, "exercises"),
      Arc::clone(&storage),
      connectivity.clone(),
    )?;
    let logs = OfflineStore::open(
      LOGS_NAMESPACE,
      FileRemote::new(&remote_root, "exercise_logs"),
      storage,
      connectivity.clone(),
    )?;

    tokio::join!(exercises.ready(), logs.ready());

    Ok(Self {
      config,
      connectivity,
      exercises: ExerciseBook::new(exercises),
      logs: LogBook::new(logs),
    })
  }

  pub fn exercises(&self) -> &ExerciseBook<FileRemote<Exercise>, S> {
    &self.exercises
  }

  pub fn logs(&self) -> &LogBook<FileRemote<ExerciseLog>, S> {
    &self.logs
  }

  /// Run a single command, printing its result to stdout.
  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Exercises { action } => self.run_exercises(action).await,
      Command::Logs { action } => self.run_logs(action).await,
      Command::Sync => self.sync().await,
      Command::Status => {
        for line in self.status_lines() {
          println!("{}", line);
        }
        Ok(())
      }
      Command::Pending => {
        print_pending(self.exercises.store());
        print_pending(self.logs.store());
        Ok(())
      }
      Command::ClearPending => {
        let dropped =
          self.exercises.store().pending_len() + self.logs.store().pending_len();
        self.exercises.store().clear_pending()?;
        self.logs.store().clear_pending()?;
        println!("Dropped {} pending change(s)", dropped);
        Ok(())
      }
      Command::Watch => self.watch().await,
    }
  }

  async fn run_exercises(&self, action: ExerciseAction) -> Result<()> {
    match action {
      ExerciseAction::List => {
        for exercise in self.exercises.exercises() {
          println!("{}", exercise.name);
        }
      }
      ExerciseAction::Add { name } => {
        let outcome = self.exercises.add_exercise(&name).await?;
        println!("{}: {}", name.trim(), describe_outcome(outcome));
      }
      ExerciseAction::Remove { name } => {
        let removed = self.exercises.remove_exercise_by_name(&name).await?;
        println!("Removed {} exercise(s)", removed);
      }
    }
    Ok(())
  }

  async fn run_logs(&self, action: LogAction) -> Result<()> {
    match action {
      LogAction::List { exercise } => {
        let logs = match exercise {
          Some(name) => self.logs.logs_for(&name),
          None => self.logs.logs(),
        };
        for log in logs {
          println!(
            "{}  {}  {}  {}",
            log.logged_at.format("%Y-%m-%d %H:%M"),
            log.exercise_name,
            log.describe(),
            log.id
          );
        }
      }
      LogAction::Add {
        exercise,
        reps,
        weight,
        distance,
        duration,
      } => {
        let metrics = Metrics {
          reps,
          weight,
          distance,
          duration,
        };
        let (entry, outcome) = self.logs.log(&exercise, metrics).await?;
        println!("{} ({}): {}", entry.exercise_name, entry.id, describe_outcome(outcome));
      }
      LogAction::Remove { id } => {
        let outcome = self.logs.remove_log(&id).await?;
        println!("{}: {}", id, describe_outcome(outcome));
      }
    }
    Ok(())
  }

  async fn sync(&self) -> Result<()> {
    let exercises = self.exercises.store().sync_pending().await?;
    let logs = self.logs.store().sync_pending().await?;
    println!(
      "{}: {} delivered, {} still pending",
      EXERCISES_NAMESPACE, exercises.delivered, exercises.failed
    );
    println!(
      "{}: {} delivered, {} still pending",
      LOGS_NAMESPACE, logs.delivered, logs.failed
    );

    // Pick up changes made elsewhere
    let refreshed = tokio::try_join!(self.exercises.store().refresh(), self.logs.store().refresh());
    if let Err(e) = refreshed {
      warn!("refresh failed, keeping local view: {}", e);
      println!("Remote unreachable, showing local data");
    }
    Ok(())
  }

  fn status_lines(&self) -> Vec<String> {
    vec![
      format_status(EXERCISES_NAMESPACE, &self.exercises.store().status()),
      format_status(LOGS_NAMESPACE, &self.logs.store().status()),
    ]
  }

  /// Probe the remote until Ctrl-C, printing status whenever it changes.
  async fn watch(&self) -> Result<()> {
    let probe = PathProbe::new(&self.config.remote.path);
    let prober = spawn_probe(self.connectivity.clone(), probe, self.config.probe_interval());

    let mut online = self.connectivity.subscribe();
    let mut exercises = self.exercises.store().subscribe();
    let mut logs = self.logs.store().subscribe();

    for line in self.status_lines() {
      println!("{}", line);
    }

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        Ok(()) = online.changed() => {}
        Ok(()) = exercises.changed() => {}
        Ok(()) = logs.changed() => {}
      }
      for line in self.status_lines() {
        println!("{}", line);
      }
    }

    prober.abort();
    info!("watch stopped");
    Ok(())
  }
}

fn print_pending<T, R, S>(store: &OfflineStore<T, R, S>)
where
  T: Syncable,
  R: RemoteSource<T> + 'static,
  S: QueueStorage + 'static,
{
  for op in store.pending() {
    let key = op.item.sync_key().unwrap_or_else(|| "-".to_string());
    let since = op
      .enqueued_at
      .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
      .unwrap_or_else(|| "-".to_string());
    println!("{}  {:?}  {}  {}", store.namespace(), op.kind, key, since);
  }
}

fn describe_outcome(outcome: SyncOutcome) -> &'static str {
  match outcome {
    SyncOutcome::Synced => "synced",
    SyncOutcome::Queued => "saved offline, will sync later",
    SyncOutcome::Skipped => "nothing to do",
  }
}

/// One-line summary of a store's sync state.
pub fn format_status(name: &str, status: &SyncStatus) -> String {
  let mut line = format!(
    "{}: {:?}, {}",
    name,
    status.phase,
    if status.is_online { "online" } else { "offline" }
  );
  if status.pending > 0 {
    line.push_str(&format!(", {} pending", status.pending));
    if let Some(oldest) = status.oldest_pending {
      line.push_str(&format!(" since {}", oldest.format("%Y-%m-%d %H:%M")));
    }
  }
  if status.unconfirmed > 0 {
    line.push_str(&format!(", {} unconfirmed", status.unconfirmed));
  }
  line
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::{MemoryQueueStorage, Phase};
  use chrono::{TimeZone, Utc};
  use std::path::Path;

  async fn app(root: &Path, storage: Arc<MemoryQueueStorage>) -> App<MemoryQueueStorage> {
    App::with_storage(Config::from_remote(root.to_path_buf()), storage)
      .await
      .unwrap()
  }

  #[test]
  fn test_format_status() {
    let status = SyncStatus {
      phase: Phase::Ready,
      is_loading: false,
      is_online: false,
      pending: 2,
      oldest_pending: Some(Utc.with_ymd_and_hms(2026, 10, 19, 7, 30, 0).unwrap()),
      unconfirmed: 1,
    };
    assert_eq!(
      format_status("exercises", &status),
      "exercises: Ready, offline, 2 pending since 2026-10-19 07:30, 1 unconfirmed"
    );
  }

  #[test]
  fn test_format_status_idle() {
    let status = SyncStatus {
      phase: Phase::Ready,
      is_loading: false,
      is_online: true,
      pending: 0,
      oldest_pending: None,
      unconfirmed: 0,
    };
    assert_eq!(format_status("exerciseLogs", &status), "exerciseLogs: Ready, online");
  }

  #[tokio::test]
  async fn test_commands_online() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Arc::new(MemoryQueueStorage::new())).await;
    assert!(app.connectivity.is_online());

    app
      .run(Command::Exercises {
        action: ExerciseAction::Add {
          name: "Squats".to_string(),
        },
      })
      .await
      .unwrap();
    app
      .run(Command::Logs {
        action: LogAction::Add {
          exercise: "Squats".to_string(),
          reps: Some(5),
          weight: Some(100.0),
          distance: None,
          duration: None,
        },
      })
      .await
      .unwrap();
    app.run(Command::Status).await.unwrap();

    assert_eq!(app.exercises().exercises(), vec![Exercise::new("Squats")]);
    assert_eq!(app.logs().logs_for("Squats").len(), 1);
    assert!(dir.path().join("exercises.json").exists());
    assert!(dir.path().join("exercise_logs.json").exists());
  }

  #[tokio::test]
  async fn test_offline_changes_replay_on_next_open() {
    let dir = tempfile::tempdir().unwrap();
    let share = dir.path().join("share");
    let storage = Arc::new(MemoryQueueStorage::new());

    {
      let app = app(&share, Arc::clone(&storage)).await;
      assert!(!app.connectivity.is_online());
      app
        .run(Command::Exercises {
          action: ExerciseAction::Add {
            name: "Lunges".to_string(),
          },
        })
        .await
        .unwrap();
      app.run(Command::Pending).await.unwrap();
      assert_eq!(app.exercises().store().pending_len(), 1);
    }

    std::fs::create_dir(&share).unwrap();
    let app = app(&share, storage).await;
    assert_eq!(app.exercises().store().pending_len(), 0);
    assert_eq!(app.exercises().exercises(), vec![Exercise::new("Lunges")]);
  }

  #[tokio::test]
  async fn test_clear_pending_command() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir.path().join("missing"), Arc::new(MemoryQueueStorage::new())).await;
    app
      .run(Command::Exercises {
        action: ExerciseAction::Add {
          name: "Plank".to_string(),
        },
      })
      .await
      .unwrap();
    assert_eq!(app.exercises().store().pending_len(), 1);

    app.run(Command::ClearPending).await.unwrap();
    assert_eq!(app.exercises().store().pending_len(), 0);
    app.run(Command::Sync).await.unwrap();
  }
}
