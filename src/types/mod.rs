//! Core data model: samples, races and laps.

mod lap;
mod race;
mod sample;

pub use lap::Lap;
pub use race::{Race, RaceEvent};
pub use sample::{Corners, RecordedSample, TelemetrySample, Vec3};
