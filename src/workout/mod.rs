//! Workout logging on top of the sync layer.

mod book;
mod remote;
mod sync;
mod types;

pub use book::{ExerciseBook, LogBook};
pub use remote::FileRemote;
pub use types::{clean_name, Exercise, ExerciseLog, Metrics};
