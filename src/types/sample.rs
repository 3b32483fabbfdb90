//! Decoded telemetry samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A value reported once per wheel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Corners<T> {
    pub front_left: T,
    pub front_right: T,
    pub rear_left: T,
    pub rear_right: T,
}

/// A vector in the car's local space; X = right, Y = up, Z = forward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One decoded "Dash" datagram.
///
/// Field semantics follow the Forza Motorsport data out documentation. No
/// range validation happens here; a sample is exactly what the game sent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// 1 while driving, 0 in menus or when the race is stopped.
    pub is_race_on: i32,
    /// In-game clock in milliseconds. Wraps to 0 eventually.
    pub timestamp_ms: u32,

    pub engine_max_rpm: f32,
    pub engine_idle_rpm: f32,
    pub engine_current_rpm: f32,

    pub acceleration: Vec3,
    pub velocity: Vec3,
    /// X = pitch, Y = yaw, Z = roll.
    pub angular_velocity: Vec3,

    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,

    /// 0.0 = max stretch, 1.0 = max compression.
    pub normalized_suspension_travel: Corners<f32>,
    /// 0 means full grip, |ratio| > 1.0 means loss of grip.
    pub tire_slip_ratio: Corners<f32>,
    /// Radians per second.
    pub wheel_rotation_speed: Corners<f32>,
    pub wheel_on_rumble_strip: Corners<i32>,
    /// 0 to 1, where 1 is the deepest puddle.
    pub wheel_in_puddle_depth: Corners<f32>,
    pub surface_rumble: Corners<f32>,
    pub tire_slip_angle: Corners<f32>,
    pub tire_combined_slip: Corners<f32>,
    /// Meters.
    pub suspension_travel_meters: Corners<f32>,

    pub car_ordinal: i32,
    /// 0 (D) to 7 (X).
    pub car_class: i32,
    /// 100 to 999.
    pub car_performance_index: i32,
    /// 0 = FWD, 1 = RWD, 2 = AWD.
    pub drivetrain_type: i32,
    pub num_cylinders: i32,

    pub position: Vec3,

    /// Meters per second.
    pub speed: f32,
    /// Watts.
    pub power: f32,
    /// Newton meters.
    pub torque: f32,

    // The game reports rear left twice; rear right is a copy.
    pub tire_temp: Corners<f32>,

    pub boost: f32,
    pub fuel: f32,
    pub distance_traveled: f32,
    pub best_lap: f32,
    pub last_lap: f32,
    pub current_lap: f32,
    pub current_race_time: f32,

    pub lap_number: u16,

    pub race_position: u8,
    pub accel: u8,
    pub brake: u8,
    pub clutch: u8,
    pub hand_brake: u8,
    pub gear: u8,

    pub steer: i8,
    pub normalized_driving_line: i8,
    pub normalized_ai_brake_difference: i8,

    pub tire_wear: Corners<f32>,

    pub track_ordinal: i32,
}

impl TelemetrySample {
    /// Whether the car is on track (not in menus or paused).
    pub fn is_on_track(&self) -> bool {
        self.is_race_on != 0
    }

    /// Menus and idle screens emit packets with a zeroed clock.
    pub fn has_timestamp(&self) -> bool {
        self.timestamp_ms != 0
    }
}

/// A sample tagged with the race it belongs to and its receipt time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    #[serde(flatten)]
    pub sample: TelemetrySample,
    pub race: Uuid,
    pub created_at: DateTime<Utc>,
}

impl RecordedSample {
    pub fn new(sample: TelemetrySample, race: Uuid, created_at: DateTime<Utc>) -> Self {
        Self { sample, race, created_at }
    }
}
