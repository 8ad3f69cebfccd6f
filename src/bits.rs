//! Bit-addressed buffer matching on-wire packet layout.
//!
//! Bit 0 is the most significant bit of byte 0, i.e., big-endian bit order.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A finite, ordered, index-addressable sequence of bits.
///
/// Reads never grow the buffer; writes grow it as needed so an output
/// buffer can be built field by field at computed offsets.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitBuffer {
    data: Vec<u8>,
    bit_len: usize,
}

impl BitBuffer {
    /// Construct from whole bytes; the bit length is `8 * dat.len()`.
    #[must_use]
    pub fn from_bytes(dat: &[u8]) -> Self {
        BitBuffer {
            data: dat.to_vec(),
            bit_len: dat.len() * 8,
        }
    }

    /// A zero-filled buffer of exactly `bit_len` bits.
    #[must_use]
    pub fn zeroed(bit_len: usize) -> Self {
        BitBuffer {
            data: vec![0u8; bit_len.div_ceil(8)],
            bit_len,
        }
    }

    #[must_use]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    /// Backing bytes; trailing bits of the last byte are zero.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn bit(&self, idx: usize) -> u8 {
        (self.data[idx / 8] >> (7 - idx % 8)) & 1
    }

    fn set_bit(&mut self, idx: usize, val: u8) {
        let mask = 1u8 << (7 - idx % 8);
        if val == 0 {
            self.data[idx / 8] &= !mask;
        } else {
            self.data[idx / 8] |= mask;
        }
    }

    /// Read a `width`-bit big-endian field starting at bit `offset`.
    ///
    /// # Errors
    /// [`Error::NotEnoughBits`] if the field extends past the end of the
    /// buffer, or if `width` is 0 or greater than 64.
    pub fn read(&self, offset: usize, width: usize) -> Result<u64> {
        if width == 0 || width > 64 || offset + width > self.bit_len {
            return Err(Error::NotEnoughBits {
                offset,
                needed: width,
                available: self.bit_len.saturating_sub(offset),
            });
        }
        let mut v = 0u64;
        for i in 0..width {
            v = (v << 1) | u64::from(self.bit(offset + i));
        }
        Ok(v)
    }

    /// Write the low `width` bits of `value` at bit `offset`, growing the
    /// buffer if the field extends past the current end.
    pub fn write(&mut self, offset: usize, width: usize, value: u64) {
        self.grow_to(offset + width);
        for i in 0..width {
            let bit = ((value >> (width - 1 - i)) & 1) as u8;
            self.set_bit(offset + i, bit);
        }
    }

    /// Copy every bit of `field` into `self` starting at bit `offset`.
    pub fn write_buffer(&mut self, offset: usize, field: &BitBuffer) {
        self.grow_to(offset + field.bit_len);
        for i in 0..field.bit_len {
            self.set_bit(offset + i, field.bit(i));
        }
    }

    /// Extract `width` bits starting at `offset` as a new buffer whose bit 0
    /// is the source bit at `offset`. Unlike [`BitBuffer::read`] the width
    /// is unbounded, which is what character-string fields need.
    ///
    /// # Errors
    /// [`Error::NotEnoughBits`] if the field extends past the end.
    pub fn slice(&self, offset: usize, width: usize) -> Result<BitBuffer> {
        if offset + width > self.bit_len {
            return Err(Error::NotEnoughBits {
                offset,
                needed: width,
                available: self.bit_len.saturating_sub(offset),
            });
        }
        let mut out = BitBuffer::zeroed(width);
        for i in 0..width {
            out.set_bit(i, self.bit(offset + i));
        }
        Ok(out)
    }

    fn grow_to(&mut self, bit_len: usize) {
        if bit_len > self.bit_len {
            self.bit_len = bit_len;
            self.data.resize(bit_len.div_ceil(8), 0);
        }
    }

    /// Lowercase hexadecimal rendering of the buffer, one digit per nibble,
    /// padded out to whole bytes. Used for diagnostics and test comparison.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.data.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Binary digit string, exactly one `0`/`1` character per bit.
    #[must_use]
    pub fn to_binary(&self) -> String {
        (0..self.bit_len)
            .map(|i| if self.bit(i) == 1 { '1' } else { '0' })
            .collect()
    }
}

impl std::fmt::Display for BitBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{} ({} bits)", self.to_hex(), self.bit_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_aligned_and_unaligned() {
        let buf = BitBuffer::from_bytes(&[0x12, 0x34, 0x56]);

        assert_eq!(buf.read(0, 8).unwrap(), 0x12);
        assert_eq!(buf.read(8, 16).unwrap(), 0x3456);
        // nibble-straddling field
        assert_eq!(buf.read(4, 8).unwrap(), 0x23);
        assert_eq!(buf.read(1, 3).unwrap(), 0b001);
    }

    #[test]
    fn read_past_end_is_err() {
        let buf = BitBuffer::from_bytes(&[0xff]);
        let zult = buf.read(4, 8);
        assert!(matches!(
            zult,
            Err(Error::NotEnoughBits {
                offset: 4,
                needed: 8,
                available: 4
            })
        ));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut buf = BitBuffer::zeroed(24);
        buf.write(3, 11, 0x5a5);
        assert_eq!(buf.read(3, 11).unwrap(), 0x5a5);
        // neighboring bits untouched
        assert_eq!(buf.read(0, 3).unwrap(), 0);
        assert_eq!(buf.read(14, 10).unwrap(), 0);
    }

    #[test]
    fn write_grows_buffer() {
        let mut buf = BitBuffer::zeroed(0);
        buf.write(16, 8, 0xab);
        assert_eq!(buf.bit_len(), 24);
        assert_eq!(buf.as_bytes(), &[0, 0, 0xab]);
    }

    #[test]
    fn slice_copies_field() {
        let buf = BitBuffer::from_bytes(&[0x12, 0x34]);
        let field = buf.slice(4, 8).unwrap();
        assert_eq!(field.bit_len(), 8);
        assert_eq!(field.as_bytes(), &[0x23]);
        assert!(buf.slice(12, 8).is_err());
    }

    #[test]
    fn write_buffer_at_offset() {
        let mut out = BitBuffer::zeroed(16);
        let field = BitBuffer::from_bytes(&[0xff]);
        out.write_buffer(4, &field);
        assert_eq!(out.as_bytes(), &[0x0f, 0xf0]);
    }

    #[test]
    fn hex_and_binary_rendering() {
        let buf = BitBuffer::from_bytes(&[0xbf, 0x80, 0x00, 0x00]);
        assert_eq!(buf.to_hex(), "bf800000");

        let mut buf = BitBuffer::zeroed(16);
        buf.write(0, 16, 0xfffe);
        assert_eq!(buf.to_binary(), "1111111111111110");
    }
}
