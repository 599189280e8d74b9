//! Fixed-capacity, cursor-addressed bit storage backing every cell.
//!
//! Writes advance a cursor and are checked against the buffer's capacity;
//! reads are checked against the cursor, never the capacity — reading bits
//! that were never written is always an error, even when the backing bytes
//! physically exist.

use crate::cell::CellError;
use crate::types::Address;

/// Bit-level buffer with a write cursor.
///
/// Bits are addressed MSB-first within each byte, matching the wire format:
/// bit 0 of the buffer is the high bit of byte 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitBuffer {
    data: Vec<u8>,
    capacity: usize,
    cursor: usize,
}

impl BitBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.div_ceil(8)],
            capacity,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bits written so far.
    pub fn used_bits(&self) -> usize {
        self.cursor
    }

    pub fn free_bits(&self) -> usize {
        self.capacity - self.cursor
    }

    pub fn used_bytes(&self) -> usize {
        self.cursor.div_ceil(8)
    }

    /// Raw backing bytes covering the written region (last byte may be partial).
    pub fn data(&self) -> &[u8] {
        &self.data[..self.used_bytes()]
    }

    /// Reads the bit at position `n`.
    pub fn bit(&self, n: usize) -> Result<bool, CellError> {
        if n >= self.cursor {
            return Err(CellError::OutOfRange {
                offset: n,
                len: 1,
                written: self.cursor,
            });
        }
        Ok(self.data[n / 8] & (1 << (7 - n % 8)) != 0)
    }

    fn set(&mut self, n: usize, value: bool) {
        if value {
            self.data[n / 8] |= 1 << (7 - n % 8);
        } else {
            self.data[n / 8] &= !(1 << (7 - n % 8));
        }
    }

    fn ensure_free(&mut self, needed: usize) -> Result<(), CellError> {
        if needed > self.free_bits() {
            return Err(CellError::CapacityExceeded {
                needed,
                available: self.free_bits(),
            });
        }
        Ok(())
    }

    pub fn write_bit(&mut self, value: bool) -> Result<(), CellError> {
        self.ensure_free(1)?;
        let pos = self.cursor;
        self.set(pos, value);
        self.cursor += 1;
        Ok(())
    }

    /// Writes `value` as an unsigned big-endian integer of `bits` width.
    ///
    /// Writing zero with a zero width is a permitted no-op; a value whose
    /// minimal binary representation exceeds `bits` is an encoding error.
    pub fn write_uint(&mut self, value: u64, bits: usize) -> Result<(), CellError> {
        if bits == 0 {
            return if value == 0 {
                Ok(())
            } else {
                Err(CellError::EncodingError { bits })
            };
        }
        if bits > 64 || (bits < 64 && value >> bits != 0) {
            return Err(CellError::EncodingError { bits });
        }
        self.ensure_free(bits)?;
        for i in 0..bits {
            let bit = (value >> (bits - 1 - i)) & 1 != 0;
            let pos = self.cursor;
            self.set(pos, bit);
            self.cursor += 1;
        }
        Ok(())
    }

    /// Writes a signed integer as sign bit + offset binary, which is exactly
    /// two's complement of `bits` width.
    pub fn write_int(&mut self, value: i64, bits: usize) -> Result<(), CellError> {
        if bits == 0 || bits > 64 {
            return Err(CellError::EncodingError { bits });
        }
        if bits == 1 {
            return match value {
                -1 => self.write_bit(true),
                0 => self.write_bit(false),
                _ => Err(CellError::EncodingError { bits }),
            };
        }
        let half = 1i128 << (bits - 1);
        let v = value as i128;
        if v < -half || v >= half {
            return Err(CellError::EncodingError { bits });
        }
        if v < 0 {
            self.write_bit(true)?;
            self.write_uint((v + half) as u64, bits - 1)
        } else {
            self.write_bit(false)?;
            self.write_uint(v as u64, bits - 1)
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CellError> {
        self.write_raw(bytes, bytes.len() * 8)
    }

    /// Writes the first `bit_len` bits of `src` (MSB-first packed).
    pub fn write_raw(&mut self, src: &[u8], bit_len: usize) -> Result<(), CellError> {
        if bit_len > src.len() * 8 {
            return Err(CellError::EncodingError { bits: bit_len });
        }
        self.ensure_free(bit_len)?;
        for i in 0..bit_len {
            let bit = src[i / 8] & (1 << (7 - i % 8)) != 0;
            let pos = self.cursor;
            self.set(pos, bit);
            self.cursor += 1;
        }
        Ok(())
    }

    /// Appends another buffer's written bits.
    pub fn write_buffer(&mut self, other: &BitBuffer) -> Result<(), CellError> {
        self.write_raw(&other.data, other.cursor)
    }

    /// Variable-length coin amount: a 4-bit byte length then the value in
    /// that many big-endian bytes. Zero encodes as length 0.
    pub fn write_grams(&mut self, amount: u128) -> Result<(), CellError> {
        if amount == 0 {
            return self.write_uint(0, 4);
        }
        let byte_len = ((128 - amount.leading_zeros() as usize) + 7) / 8;
        self.write_uint(byte_len as u64, 4)?;
        let be = amount.to_be_bytes();
        self.write_bytes(&be[16 - byte_len..])
    }

    /// `addr_none$00` for absent, `addr_std$10` + no anycast + workchain int8
    /// + 256-bit account id otherwise.
    pub fn write_address(&mut self, address: Option<&Address>) -> Result<(), CellError> {
        match address {
            None => self.write_uint(0, 2),
            Some(addr) => {
                self.write_uint(2, 2)?;
                self.write_bit(false)?;
                self.write_int(addr.workchain as i64, 8)?;
                self.write_bytes(&addr.account)
            }
        }
    }

    /// Reads `bits` (≤ 64) as an unsigned big-endian integer starting at `start`.
    pub fn read_uint(&self, start: usize, bits: usize) -> Result<u64, CellError> {
        if bits > 64 || start + bits > self.cursor {
            return Err(CellError::OutOfRange {
                offset: start,
                len: bits,
                written: self.cursor,
            });
        }
        let mut value = 0u64;
        for i in start..start + bits {
            value = (value << 1) | (self.data[i / 8] >> (7 - i % 8) & 1) as u64;
        }
        Ok(value)
    }

    /// Reads `bits` (≤ 64) as a two's-complement signed integer.
    pub fn read_int(&self, start: usize, bits: usize) -> Result<i64, CellError> {
        if bits == 0 {
            return Err(CellError::OutOfRange {
                offset: start,
                len: bits,
                written: self.cursor,
            });
        }
        let raw = self.read_uint(start, bits)?;
        if bits == 64 {
            return Ok(raw as i64);
        }
        let sign = raw >> (bits - 1) & 1;
        if sign == 1 {
            Ok((raw as i64).wrapping_sub(1i64.wrapping_shl(bits as u32)))
        } else {
            Ok(raw as i64)
        }
    }

    /// Copies the `[start, start + n)` bit range into MSB-first packed bytes.
    pub fn read_bits(&self, start: usize, n: usize) -> Result<Vec<u8>, CellError> {
        if start + n > self.cursor {
            return Err(CellError::OutOfRange {
                offset: start,
                len: n,
                written: self.cursor,
            });
        }
        let mut out = vec![0u8; n.div_ceil(8)];
        for i in 0..n {
            let bit = self.data[(start + i) / 8] >> (7 - (start + i) % 8) & 1;
            out[i / 8] |= bit << (7 - i % 8);
        }
        Ok(out)
    }

    /// Written bits padded to a byte boundary with a `1` marker bit then zeros.
    pub fn top_upped_bytes(&self) -> Vec<u8> {
        let mut out = self.data[..self.used_bytes()].to_vec();
        let tail = self.cursor % 8;
        if tail != 0 {
            let last = out.len() - 1;
            // zero the unwritten low bits, then set the marker
            out[last] &= !((1u8 << (8 - tail)) - 1);
            out[last] |= 1 << (7 - tail);
        }
        out
    }

    /// Rebuilds a buffer from top-upped bytes. When `full_bytes` is false the
    /// final byte carries padding: scan at most 7 bits from the end for the
    /// marker bit and drop it.
    pub fn from_top_upped(bytes: &[u8], full_bytes: bool) -> Result<Self, CellError> {
        let mut buf = Self {
            data: bytes.to_vec(),
            capacity: bytes.len() * 8,
            cursor: bytes.len() * 8,
        };
        if full_bytes || bytes.is_empty() {
            return Ok(buf);
        }
        for _ in 0..7 {
            buf.cursor -= 1;
            let pos = buf.cursor;
            if buf.data[pos / 8] & (1 << (7 - pos % 8)) != 0 {
                buf.set(pos, false);
                return Ok(buf);
            }
        }
        Err(CellError::MalformedBoc {
            reason: "missing padding marker in top-upped data".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_round_trip() {
        for bits in 1..=64usize {
            let mut buf = BitBuffer::new(1023);
            let max = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
            for value in [0u64, 1, max / 2, max] {
                buf = BitBuffer::new(1023);
                buf.write_uint(value, bits).unwrap();
                assert_eq!(buf.read_uint(0, bits).unwrap(), value, "bits={bits}");
            }
            let _ = buf;
        }
    }

    #[test]
    fn test_uint_zero_width() {
        let mut buf = BitBuffer::new(8);
        buf.write_uint(0, 0).unwrap();
        assert_eq!(buf.used_bits(), 0);
        assert!(matches!(
            buf.write_uint(1, 0),
            Err(CellError::EncodingError { .. })
        ));
    }

    #[test]
    fn test_uint_too_wide_value() {
        let mut buf = BitBuffer::new(64);
        assert!(matches!(
            buf.write_uint(256, 8),
            Err(CellError::EncodingError { .. })
        ));
    }

    #[test]
    fn test_int_round_trip() {
        for bits in 2..=64usize {
            let half = 1i128 << (bits - 1);
            let lo = (-half).max(i64::MIN as i128) as i64;
            for value in [lo, -1, 0, 1, (half - 1) as i64] {
                let mut buf = BitBuffer::new(1023);
                buf.write_int(value, bits).unwrap();
                assert_eq!(buf.read_int(0, bits).unwrap(), value, "bits={bits}");
            }
        }
    }

    #[test]
    fn test_read_past_cursor_fails() {
        let mut buf = BitBuffer::new(1023);
        buf.write_uint(0xAB, 8).unwrap();
        assert!(buf.read_uint(0, 8).is_ok());
        assert!(matches!(
            buf.read_uint(0, 9),
            Err(CellError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut buf = BitBuffer::new(7);
        assert!(matches!(
            buf.write_uint(0xFF, 8),
            Err(CellError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_top_upped_round_trip() {
        let mut buf = BitBuffer::new(1023);
        buf.write_uint(0b10110, 5).unwrap();
        let bytes = buf.top_upped_bytes();
        assert_eq!(bytes, vec![0b1011_0100]);
        let back = BitBuffer::from_top_upped(&bytes, false).unwrap();
        assert_eq!(back.used_bits(), 5);
        assert_eq!(back.read_uint(0, 5).unwrap(), 0b10110);
    }

    #[test]
    fn test_top_upped_full_bytes() {
        let mut buf = BitBuffer::new(16);
        buf.write_uint(0xBEEF, 16).unwrap();
        let bytes = buf.top_upped_bytes();
        assert_eq!(bytes, vec![0xBE, 0xEF]);
        let back = BitBuffer::from_top_upped(&bytes, true).unwrap();
        assert_eq!(back.used_bits(), 16);
    }

    #[test]
    fn test_top_upped_missing_marker() {
        assert!(BitBuffer::from_top_upped(&[0x00], false).is_err());
    }

    #[test]
    fn test_grams_encoding() {
        let mut buf = BitBuffer::new(128);
        buf.write_grams(0).unwrap();
        assert_eq!(buf.used_bits(), 4);
        assert_eq!(buf.read_uint(0, 4).unwrap(), 0);

        let mut buf = BitBuffer::new(128);
        buf.write_grams(0x1234).unwrap();
        assert_eq!(buf.read_uint(0, 4).unwrap(), 2);
        assert_eq!(buf.read_uint(4, 16).unwrap(), 0x1234);
    }

    #[test]
    fn test_address_encoding() {
        let mut buf = BitBuffer::new(512);
        buf.write_address(None).unwrap();
        assert_eq!(buf.used_bits(), 2);

        let addr = Address {
            workchain: -1,
            account: [0x11; 32],
        };
        let mut buf = BitBuffer::new(512);
        buf.write_address(Some(&addr)).unwrap();
        assert_eq!(buf.read_uint(0, 2).unwrap(), 2);
        assert!(!buf.bit(2).unwrap());
        assert_eq!(buf.read_int(3, 8).unwrap(), -1);
        assert_eq!(buf.read_bits(11, 256).unwrap(), vec![0x11; 32]);
    }

    #[test]
    fn test_raw_bits_round_trip() {
        let mut buf = BitBuffer::new(1023);
        let src = [0xDE, 0xAD, 0xBE, 0xEF];
        buf.write_raw(&src, 28).unwrap();
        assert_eq!(buf.used_bits(), 28);
        let out = buf.read_bits(0, 28).unwrap();
        assert_eq!(out, vec![0xDE, 0xAD, 0xBE, 0xE0]);
    }
}
