//! Per-endpoint sessions.
//!
//! Each endpoint sending telemetry gets one [`Session`] driven by its own
//! task. The task owns the session outright; the listener only talks to it
//! through a bounded queue held by the [`Registry`]. A session ends when the
//! listener shuts down or when a whole checkpoint interval passes without a
//! sample, and either way flushes and finishes its open race.

mod registry;
mod state;
mod task;

pub use registry::Registry;
pub use state::{NEW_RACE_CLOCK_THRESHOLD, Session, is_new_race};
