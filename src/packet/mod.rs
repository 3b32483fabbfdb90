//! Forza Motorsport "Dash" packet decoding.
//!
//! The game sends one fixed-layout, little-endian record per simulation tick.
//! The layout is the Forza Motorsport data out "Dash" format:
//!
//! 1. **Sled** (232 bytes) - race flag, clock, engine, motion, per-wheel data,
//!    car identifiers
//! 2. **Dash** (99 bytes) - position, speed, temperatures, lap and race timing,
//!    driver inputs, tire wear, track identifier
//!
//! Decoding reads each field at its fixed offset through a [`ByteCursor`].
//! Bytes past [`PACKET_SIZE`] are ignored so newer, longer formats still decode.

mod cursor;

pub use cursor::{ByteCursor, ByteWriter};

use crate::types::TelemetrySample;
use crate::{Result, TelemetryError};

/// Size of the "Dash" record in bytes.
pub const PACKET_SIZE: usize = 331;

/// Receive buffer size; larger datagrams are truncated by the socket.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Decode one datagram.
///
/// Fails when the buffer is shorter than [`PACKET_SIZE`]. No field values are
/// validated; see [`TelemetrySample::has_timestamp`] for the one sanity check
/// the listener applies.
pub fn decode(buf: &[u8]) -> Result<TelemetrySample> {
    if buf.len() < PACKET_SIZE {
        return Err(TelemetryError::PacketTooShort { expected: PACKET_SIZE, actual: buf.len() });
    }

    let mut c = ByteCursor::new(&buf[..PACKET_SIZE]);

    // Struct expressions evaluate fields in source order, which is wire order.
    let sample = TelemetrySample {
        is_race_on: c.i32()?,
        timestamp_ms: c.u32()?,
        engine_max_rpm: c.f32()?,
        engine_idle_rpm: c.f32()?,
        engine_current_rpm: c.f32()?,
        acceleration: c.vec3()?,
        velocity: c.vec3()?,
        angular_velocity: c.vec3()?,
        yaw: c.f32()?,
        pitch: c.f32()?,
        roll: c.f32()?,
        normalized_suspension_travel: c.corners(ByteCursor::f32)?,
        tire_slip_ratio: c.corners(ByteCursor::f32)?,
        wheel_rotation_speed: c.corners(ByteCursor::f32)?,
        wheel_on_rumble_strip: c.corners(ByteCursor::i32)?,
        wheel_in_puddle_depth: c.corners(ByteCursor::f32)?,
        surface_rumble: c.corners(ByteCursor::f32)?,
        tire_slip_angle: c.corners(ByteCursor::f32)?,
        tire_combined_slip: c.corners(ByteCursor::f32)?,
        suspension_travel_meters: c.corners(ByteCursor::f32)?,
        car_ordinal: c.i32()?,
        car_class: c.i32()?,
        car_performance_index: c.i32()?,
        drivetrain_type: c.i32()?,
        num_cylinders: c.i32()?,
        position: c.vec3()?,
        speed: c.f32()?,
        power: c.f32()?,
        torque: c.f32()?,
        tire_temp: c.corners(ByteCursor::f32)?,
        boost: c.f32()?,
        fuel: c.f32()?,
        distance_traveled: c.f32()?,
        best_lap: c.f32()?,
        last_lap: c.f32()?,
        current_lap: c.f32()?,
        current_race_time: c.f32()?,
        lap_number: c.u16()?,
        race_position: c.u8()?,
        accel: c.u8()?,
        brake: c.u8()?,
        clutch: c.u8()?,
        hand_brake: c.u8()?,
        gear: c.u8()?,
        steer: c.i8()?,
        normalized_driving_line: c.i8()?,
        normalized_ai_brake_difference: c.i8()?,
        tire_wear: c.corners(ByteCursor::f32)?,
        track_ordinal: c.i32()?,
    };

    debug_assert_eq!(c.position(), PACKET_SIZE);
    Ok(sample)
}

/// Encode a sample into its wire representation.
pub fn encode(sample: &TelemetrySample) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(PACKET_SIZE);

    w.put_i32(sample.is_race_on);
    w.put_u32(sample.timestamp_ms);
    w.put_f32(sample.engine_max_rpm);
    w.put_f32(sample.engine_idle_rpm);
    w.put_f32(sample.engine_current_rpm);
    w.put_vec3(sample.acceleration);
    w.put_vec3(sample.velocity);
    w.put_vec3(sample.angular_velocity);
    w.put_f32(sample.yaw);
    w.put_f32(sample.pitch);
    w.put_f32(sample.roll);
    w.put_corners(sample.normalized_suspension_travel, ByteWriter::put_f32);
    w.put_corners(sample.tire_slip_ratio, ByteWriter::put_f32);
    w.put_corners(sample.wheel_rotation_speed, ByteWriter::put_f32);
    w.put_corners(sample.wheel_on_rumble_strip, ByteWriter::put_i32);
    w.put_corners(sample.wheel_in_puddle_depth, ByteWriter::put_f32);
    w.put_corners(sample.surface_rumble, ByteWriter::put_f32);
    w.put_corners(sample.tire_slip_angle, ByteWriter::put_f32);
    w.put_corners(sample.tire_combined_slip, ByteWriter::put_f32);
    w.put_corners(sample.suspension_travel_meters, ByteWriter::put_f32);
    w.put_i32(sample.car_ordinal);
    w.put_i32(sample.car_class);
    w.put_i32(sample.car_performance_index);
    w.put_i32(sample.drivetrain_type);
    w.put_i32(sample.num_cylinders);
    w.put_vec3(sample.position);
    w.put_f32(sample.speed);
    w.put_f32(sample.power);
    w.put_f32(sample.torque);
    w.put_corners(sample.tire_temp, ByteWriter::put_f32);
    w.put_f32(sample.boost);
    w.put_f32(sample.fuel);
    w.put_f32(sample.distance_traveled);
    w.put_f32(sample.best_lap);
    w.put_f32(sample.last_lap);
    w.put_f32(sample.current_lap);
    w.put_f32(sample.current_race_time);
    w.put_u16(sample.lap_number);
    w.put_u8(sample.race_position);
    w.put_u8(sample.accel);
    w.put_u8(sample.brake);
    w.put_u8(sample.clutch);
    w.put_u8(sample.hand_brake);
    w.put_u8(sample.gear);
    w.put_i8(sample.steer);
    w.put_i8(sample.normalized_driving_line);
    w.put_i8(sample.normalized_ai_brake_difference);
    w.put_corners(sample.tire_wear, ByteWriter::put_f32);
    w.put_i32(sample.track_ordinal);

    w.into_inner()
}
