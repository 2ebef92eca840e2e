//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "liftsync")]
#[command(about = "An offline-first workout log synced through a shared directory")]
#[command(version)]
pub struct Cli {
  /// Path to config file (default: $XDG_CONFIG_HOME/liftsync/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
  /// Manage the exercise list
  #[command(alias = "e")]
  Exercises {
    #[command(subcommand)]
    action: ExerciseAction,
  },
  /// Manage logged sets
  #[command(alias = "l")]
  Logs {
    #[command(subcommand)]
    action: LogAction,
  },
  /// Replay pending changes now
  Sync,
  /// Show sync status of every collection
  Status,
  /// List pending changes
  Pending,
  /// Drop all pending changes without sending them
  ClearPending,
  /// Keep running, replaying pending changes whenever the remote comes back
  Watch,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ExerciseAction {
  /// List exercises
  #[command(alias = "ls")]
  List,
  /// Add an exercise
  Add { name: String },
  /// Remove an exercise by name
  #[command(alias = "rm")]
  Remove { name: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum LogAction {
  /// List logged sets, newest first
  #[command(alias = "ls")]
  List {
    /// Only show this exercise
    #[arg(short, long)]
    exercise: Option<String>,
  },
  /// Log a set
  Add {
    exercise: String,
    #[arg(long)]
    reps: Option<u32>,
    /// Kilograms
    #[arg(long)]
    weight: Option<f64>,
    /// Meters
    #[arg(long)]
    distance: Option<f64>,
    /// Seconds
    #[arg(long)]
    duration: Option<f64>,
  },
  /// Remove a logged set by id
  #[command(alias = "rm")]
  Remove { id: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Command {
    Cli::try_parse_from(args).unwrap().command
  }

  #[test]
  fn test_exercise_add() {
    assert_eq!(
      parse(&["liftsync", "exercises", "add", "Bench Press"]),
      Command::Exercises {
        action: ExerciseAction::Add {
          name: "Bench Press".to_string()
        }
      }
    );
  }

  #[test]
  fn test_aliases() {
    assert_eq!(
      parse(&["liftsync", "e", "ls"]),
      Command::Exercises {
        action: ExerciseAction::List
      }
    );
    assert_eq!(
      parse(&["liftsync", "l", "rm", "abc"]),
      Command::Logs {
        action: LogAction::Remove {
          id: "abc".to_string()
        }
      }
    );
  }

  #[test]
  fn test_log_add_metrics() {
    assert_eq!(
      parse(&["liftsync", "logs", "add", "Squats", "--reps", "5", "--weight", "102.5"]),
      Command::Logs {
        action: LogAction::Add {
          exercise: "Squats".to_string(),
          reps: Some(5),
          weight: Some(102.5),
          distance: None,
          duration: None,
        }
      }
    );
  }

  #[test]
  fn test_global_config_flag() {
    let cli = Cli::try_parse_from(["liftsync", "status", "--config", "/tmp/c.yaml"]).unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
    assert_eq!(cli.command, Command::Status);
  }

  #[test]
  fn test_clear_pending_is_kebab_case() {
    assert_eq!(parse(&["liftsync", "clear-pending"]), Command::ClearPending);
  }

  #[test]
  fn test_missing_subcommand_fails() {
    assert!(Cli::try_parse_from(["liftsync"]).is_err());
  }
}
