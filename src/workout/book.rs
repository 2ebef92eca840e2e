//! Workout collections on top of offline-synced stores.

use color_eyre::Result;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::sync::{OfflineStore, QueueStorage, RemoteSource, SyncOutcome, Syncable};

use super::types::{clean_name, Exercise, ExerciseLog, Metrics};

/// The user's list of exercises.
pub struct ExerciseBook<R, S: QueueStorage> {
  store: Arc<OfflineStore<Exercise, R, S>>,
}

impl<R, S> ExerciseBook<R, S>
where
  R: RemoteSource<Exercise> + 'static,
  S: QueueStorage + 'static,
{
  pub fn new(store: Arc<OfflineStore<Exercise, R, S>>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &Arc<OfflineStore<Exercise, R, S>> {
    &self.store
  }

  pub fn exercises(&self) -> Vec<Exercise> {
    self.store.items()
  }

  /// Add an exercise unless one with the same name is already listed.
  pub async fn add_exercise(&self, name: &str) -> Result<SyncOutcome> {
    let exercise = Exercise::new(name);
    let key = exercise.sync_key();
    if self.exercises().iter().any(|e| e.sync_key() == key) {
      info!(name = %exercise.name, "exercise already listed");
      return Ok(SyncOutcome::Skipped);
    }
    info!(name = %exercise.name, "adding exercise");
    self.store.add(exercise).await
  }

  /// Remove every listed exercise with this name. Returns how many were removed.
  pub async fn remove_exercise_by_name(&self, name: &str) -> Result<usize> {
    let name = clean_name(name);
    info!(name = %name, "removing exercise");

    let matching: Vec<Exercise> = self
      .exercises()
      .into_iter()
      .filter(|e| clean_name(&e.name) == name)
      .collect();
    let count = matching.len();

    try_join_all(matching.into_iter().map(|e| self.store.remove(e))).await?;
    Ok(count)
  }
}

/// The user's training log.
pub struct LogBook<R, S: QueueStorage> {
  store: Arc<OfflineStore<ExerciseLog, R, S>>,
}

impl<R, S> LogBook<R, S>
where
  R: RemoteSource<ExerciseLog> + 'static,
  S: QueueStorage + 'static,
{
  pub fn new(store: Arc<OfflineStore<ExerciseLog, R, S>>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &Arc<OfflineStore<ExerciseLog, R, S>> {
    &self.store
  }

  /// All entries, most recent first.
  pub fn logs(&self) -> Vec<ExerciseLog> {
    let mut logs = self.store.items();
    logs.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
    logs
  }

  /// Entries for one exercise, most recent first.
  pub fn logs_for(&self, exercise_name: &str) -> Vec<ExerciseLog> {
    let name = clean_name(exercise_name);
    self
      .logs()
      .into_iter()
      .filter(|log| log.exercise_name == name)
      .collect()
  }

  /// Most recent entry for one exercise.
  pub fn last_log_for(&self, exercise_name: &str) -> Option<ExerciseLog> {
    self.logs_for(exercise_name).into_iter().next()
  }

  /// Record a set of `exercise_name` now.
  pub async fn log(&self, exercise_name: &str, metrics: Metrics) -> Result<(ExerciseLog, SyncOutcome)> {
    let entry = ExerciseLog::new(exercise_name, metrics);
    let outcome = self.store.add(entry.clone()).await?;
    Ok((entry, outcome))
  }

  /// Replace a logged entry, keeping its id.
  pub async fn edit(&self, entry: ExerciseLog) -> Result<SyncOutcome> {
    self.store.update(entry).await
  }

  pub async fn remove_log(&self, id: &str) -> Result<SyncOutcome> {
    match self.store.find(id) {
      Some(entry) => self.store.remove(entry).await,
      None => {
        warn!(id, "no log entry with this id");
        Ok(SyncOutcome::Skipped)
      }
    }
  }
}
