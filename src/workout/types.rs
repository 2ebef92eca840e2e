use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named exercise, e.g. "Squats"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
  pub name: String,
}

impl Exercise {
  pub fn new(name: &str) -> Self {
    Self {
      name: clean_name(name),
    }
  }
}

/// One logged set of an exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseLog {
  /// Client-generated id, stable across syncs
  pub id: String,
  pub exercise_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reps: Option<u32>,
  /// Kilograms
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub weight: Option<f64>,
  /// Meters
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub distance: Option<f64>,
  /// Seconds
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration: Option<f64>,
  pub logged_at: DateTime<Utc>,
}

/// Measurements of a logged set
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
  pub reps: Option<u32>,
  pub weight: Option<f64>,
  pub distance: Option<f64>,
  pub duration: Option<f64>,
}

impl ExerciseLog {
  /// New log entry with a fresh id, logged now.
  pub fn new(exercise_name: &str, metrics: Metrics) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      exercise_name: clean_name(exercise_name),
      reps: metrics.reps,
      weight: metrics.weight,
      distance: metrics.distance,
      duration: metrics.duration,
      logged_at: Utc::now(),
    }
  }

  /// Short human-readable summary of the measurements, e.g. "10 reps × 60 kg".
  pub fn describe(&self) -> String {
    let mut parts = Vec::new();
    if let Some(reps) = self.reps {
      parts.push(format!("{} reps", reps));
    }
    if let Some(weight) = self.weight {
      parts.push(format!("{} kg", weight));
    }
    if let Some(distance) = self.distance {
      parts.push(format!("{} m", distance));
    }
    if let Some(duration) = self.duration {
      parts.push(format!("{} s", duration));
    }
    if parts.is_empty() {
      "-".to_string()
    } else {
      parts.join(" × ")
    }
  }
}

/// Trim and collapse runs of whitespace so names compare reliably.
pub fn clean_name(name: &str) -> String {
  name.split_whitespace().collect::<Vec<_>>().join(" ")
}
