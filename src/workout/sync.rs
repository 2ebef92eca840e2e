//! Sync identities for workout types.

use crate::sync::Syncable;

use super::types::{clean_name, Exercise, ExerciseLog};

impl Syncable for Exercise {
  fn sync_key(&self) -> Option<String> {
    // Exercises are unique by name, whatever whitespace the stored row carries
    let name = clean_name(&self.name);
    (!name.is_empty()).then_some(name)
  }
}

impl Syncable for ExerciseLog {
  fn sync_key(&self) -> Option<String> {
    (!self.id.is_empty()).then(|| self.id.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::workout::types::Metrics;

  #[test]
  fn test_exercise_key_ignores_whitespace_drift() {
    assert_eq!(
      Exercise::new("Bench  Press").sync_key(),
      Exercise::new(" Bench Press").sync_key()
    );
  }

  #[test]
  fn test_raw_stored_name_matches_cleaned_name() {
    let stored: Exercise = serde_json::from_str(r#"{"name":" Bench  Press"}"#).unwrap();
    assert_eq!(stored.sync_key(), Some("Bench Press".to_string()));
    assert_eq!(stored.sync_key(), Exercise::new("Bench Press").sync_key());

    let blank: Exercise = serde_json::from_str(r#"{"name":"   "}"#).unwrap();
    assert_eq!(blank.sync_key(), None);
  }

  #[test]
  fn test_empty_identity() {
    assert_eq!(Exercise::new("  ").sync_key(), None);

    let mut log = ExerciseLog::new("Squats", Metrics::default());
    assert_eq!(log.sync_key(), Some(log.id.clone()));
    log.id.clear();
    assert_eq!(log.sync_key(), None);
  }

  #[test]
  fn test_log_key_survives_field_changes() {
    let log = ExerciseLog::new("Squats", Metrics::default());
    let mut edited = log.clone();
    edited.reps = Some(12);
    assert_eq!(log.sync_key(), edited.sync_key());
  }
}
