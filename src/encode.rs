//! Little-endian readers and writers for the Bitcoin wire format.

use crate::error::{LockError, LockResult};

/// Number of bytes a compact-size integer occupies on the wire.
pub fn varint_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Append-only byte buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Compact-size integer: 1, 3, 5 or 9 bytes.
    pub fn write_varint(&mut self, value: u64) {
        match varint_len(value) {
            1 => self.buf.push(value as u8),
            3 => {
                self.buf.push(0xfd);
                self.buf.extend_from_slice(&(value as u16).to_le_bytes());
            }
            5 => {
                self.buf.push(0xfe);
                self.buf.extend_from_slice(&(value as u32).to_le_bytes());
            }
            _ => {
                self.buf.push(0xff);
                self.buf.extend_from_slice(&value.to_le_bytes());
            }
        }
    }

    /// Length-prefixed byte string.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a byte slice. Every read fails with a serialization error
/// instead of panicking when the input is truncated.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> LockResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(LockError::serialization(format!(
                "unexpected end of data: wanted {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> LockResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> LockResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> LockResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> LockResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> LockResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> LockResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Compact-size integer. Non-canonical encodings are rejected.
    pub fn read_varint(&mut self) -> LockResult<u64> {
        let (value, width) = match self.read_u8()? {
            0xff => (self.read_u64_le()?, 9),
            0xfe => (u64::from(self.read_u32_le()?), 5),
            0xfd => (u64::from(self.read_u16_le()?), 3),
            b => (u64::from(b), 1),
        };
        if varint_len(value) != width {
            return Err(LockError::serialization(format!(
                "non-canonical compact size {}",
                value
            )));
        }
        Ok(value)
    }

    /// Length-prefixed byte string. The length is bounded by what is left.
    pub fn read_var_bytes(&mut self) -> LockResult<&'a [u8]> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(LockError::serialization(format!(
                "length prefix {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        self.read_bytes(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        let cases = [
            (0u64, 1),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x1_0000, 5),
            (0x1_0000_0000, 9),
        ];
        for (value, len) in cases {
            let mut w = Writer::default();
            w.write_varint(value);
            let bytes = w.into_bytes();
            assert_eq!(bytes.len(), len, "value {value:#x}");
            assert_eq!(Reader::new(&bytes).read_varint().unwrap(), value);
        }
    }

    #[test]
    fn test_non_canonical_varint_rejected() {
        // 0x10 encoded with a 0xfd prefix
        let bytes = [0xfd, 0x10, 0x00];
        assert!(Reader::new(&bytes).read_varint().is_err());
    }

    #[test]
    fn test_truncated_read() {
        let mut r = Reader::new(&[0x01, 0x02]);
        assert!(r.read_u32_le().is_err());
    }

    #[test]
    fn test_var_bytes_length_overflow() {
        let bytes = [0x05, 0xaa, 0xbb];
        assert!(Reader::new(&bytes).read_var_bytes().is_err());
    }
}
