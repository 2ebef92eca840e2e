//! Offline-first workout log.
//!
//! Collections are served from a local view that survives losing the remote:
//! mutations apply immediately, failed remote calls wait in a durable queue,
//! and the queue is replayed at startup and whenever the remote comes back.

pub mod app;
pub mod commands;
pub mod config;
pub mod sync;
pub mod workout;
