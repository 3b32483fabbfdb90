//! Little-endian readers and writers over byte buffers.

use crate::types::{Corners, Vec3};
use crate::{Result, TelemetryError};

/// Sequential little-endian reader over a borrowed buffer.
///
/// Every read is bounds checked; reading past the end yields
/// [`TelemetryError::OutOfBounds`] with the offending offset.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read offset in bytes.
    pub fn position(&self) -> usize {
        self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self
            .data
            .get(self.offset..self.offset + N)
            .ok_or(TelemetryError::OutOfBounds { offset: self.offset })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.offset += N;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(u8::from_le_bytes(self.take()?))
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.take()?))
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    pub fn vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3 { x: self.f32()?, y: self.f32()?, z: self.f32()? })
    }

    /// Read four consecutive values in FL, FR, RL, RR order.
    pub fn corners<T>(&mut self, read: fn(&mut Self) -> Result<T>) -> Result<Corners<T>> {
        Ok(Corners {
            front_left: read(self)?,
            front_right: read(self)?,
            rear_left: read(self)?,
            rear_right: read(self)?,
        })
    }
}

/// Little-endian writer, the inverse of [`ByteCursor`].
#[derive(Debug, Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity) }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn put_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_vec3(&mut self, value: Vec3) {
        self.put_f32(value.x);
        self.put_f32(value.y);
        self.put_f32(value.z);
    }

    pub fn put_corners<T: Copy>(&mut self, value: Corners<T>, write: fn(&mut Self, T)) {
        write(self, value.front_left);
        write(self, value.front_right);
        write(self, value.rear_left);
        write(self, value.rear_right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let data = [0x01, 0x00, 0x00, 0x00, 0x34, 0x12, 0xff];
        let mut cursor = ByteCursor::new(&data);

        assert_eq!(cursor.i32().unwrap(), 1);
        assert_eq!(cursor.u16().unwrap(), 0x1234);
        assert_eq!(cursor.i8().unwrap(), -1);
        assert_eq!(cursor.position(), 7);
    }

    #[test]
    fn read_past_end_reports_offset() {
        let data = [0u8; 6];
        let mut cursor = ByteCursor::new(&data);

        cursor.u32().unwrap();
        let err = cursor.f32().unwrap_err();

        assert!(matches!(err, TelemetryError::OutOfBounds { offset: 4 }));
        // A failed read does not advance.
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn corners_keep_wheel_order() {
        let mut writer = ByteWriter::default();
        writer.put_corners(
            Corners { front_left: 1, front_right: 2, rear_left: 3, rear_right: 4 },
            ByteWriter::put_i32,
        );
        let data = writer.into_inner();

        let corners = ByteCursor::new(&data).corners(ByteCursor::i32).unwrap();

        assert_eq!(corners.front_left, 1);
        assert_eq!(corners.front_right, 2);
        assert_eq!(corners.rear_left, 3);
        assert_eq!(corners.rear_right, 4);
    }
}
