//! Variable-length integer encodings used by net messages and entity deltas.

use crate::reader::BitReader;
use crate::writer::BitWriter;

/// Field index value that ends a prop list.
pub const FIELD_INDEX_END: u32 = 0xFFF;

impl BitReader<'_> {
    /// Read a "ubitvar": a 6-bit head whose bits 4..6 select how many more
    /// bits (0, 4, 8 or 28) extend the low nibble.
    pub fn read_ubitvar(&mut self) -> u32 {
        let head = self.read_uint(6);
        match head & 0b11_0000 {
            0b01_0000 => (head & 15) | (self.read_uint(4) << 4),
            0b10_0000 => (head & 15) | (self.read_uint(8) << 4),
            0b11_0000 => (head & 15) | (self.read_uint(28) << 4),
            _ => head,
        }
    }

    /// Read a protobuf-style varint of up to five 7-bit groups.
    pub fn read_varint32(&mut self) -> u32 {
        let mut result = 0u32;
        for group in 0..5 {
            let byte = self.read_uint(8);
            result |= (byte & 0x7F) << (7 * group);
            if byte & 0x80 == 0 {
                break;
            }
        }
        result
    }

    /// Read the next prop index of an entity delta given the previous one
    /// (`-1` before the first).
    ///
    /// Returns `None` at the end-of-list marker.
    pub fn read_field_index(&mut self, last: i32, new_way: bool) -> Option<i32> {
        if new_way && self.read_bit() {
            return Some(last + 1);
        }

        let step = if new_way && self.read_bit() {
            self.read_uint(3)
        } else {
            let head = self.read_uint(7);
            match head & 0b110_0000 {
                0b010_0000 => (head & 31) | (self.read_uint(2) << 5),
                0b100_0000 => (head & 31) | (self.read_uint(4) << 5),
                0b110_0000 => (head & 31) | (self.read_uint(7) << 5),
                _ => head,
            }
        };

        if step == FIELD_INDEX_END {
            None
        } else {
            Some(last + 1 + step as i32)
        }
    }
}

impl BitWriter<'_> {
    /// Write a "ubitvar" using the narrowest extension that fits.
    pub fn write_ubitvar(&mut self, value: u32) {
        let high = value >> 4;
        let low = value & 15;
        if high == 0 {
            self.write_uint(value, 6);
        } else if high < 1 << 4 {
            self.write_uint(low | 0b01_0000, 6);
            self.write_uint(high, 4);
        } else if high < 1 << 8 {
            self.write_uint(low | 0b10_0000, 6);
            self.write_uint(high, 8);
        } else {
            self.write_uint(low | 0b11_0000, 6);
            self.write_uint(high, 28);
        }
    }

    /// Write a protobuf-style varint.
    pub fn write_varint32(&mut self, mut value: u32) {
        loop {
            let group = value & 0x7F;
            value >>= 7;
            if value == 0 {
                self.write_uint(group, 8);
                return;
            }
            self.write_uint(group | 0x80, 8);
        }
    }

    /// Write a prop index following `last`, or the end-of-list marker when
    /// `index` is `None`.
    pub fn write_field_index(&mut self, index: Option<i32>, last: i32, new_way: bool) {
        let step = match index {
            Some(i) => (i - last - 1) as u32,
            None => FIELD_INDEX_END,
        };

        if new_way {
            if step == 0 && index.is_some() {
                self.write_bit(true);
                return;
            }
            self.write_bit(false);
            if step < 8 {
                self.write_bit(true);
                self.write_uint(step, 3);
                return;
            }
            self.write_bit(false);
        }

        let low = step & 31;
        let high = step >> 5;
        if high == 0 {
            self.write_uint(step, 7);
        } else if high < 1 << 2 {
            self.write_uint(low | 0b010_0000, 7);
            self.write_uint(high, 2);
        } else if high < 1 << 4 {
            self.write_uint(low | 0b100_0000, 7);
            self.write_uint(high, 4);
        } else {
            self.write_uint(low | 0b110_0000, 7);
            self.write_uint(high, 7);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_for(w: BitWriter<'_>) -> (Vec<u8>, usize) {
        let len = w.bit_offset();
        (w.into_bytes(), len)
    }

    #[test]
    fn ubitvar_widths() {
        for (value, bits) in [(5u32, 6), (0xAB, 10), (0xABC, 14), (0xABCD_EF01, 34)] {
            let mut w = BitWriter::new();
            w.write_ubitvar(value);
            let (bytes, len) = reader_for(w);
            assert_eq!(len, bits, "value {value:#x}");
            let mut r = BitReader::new(&bytes);
            assert_eq!(r.read_ubitvar(), value);
        }
    }

    #[test]
    fn varint_known_encoding() {
        let mut w = BitWriter::new();
        w.write_varint32(300);
        assert_eq!(w.as_bytes(), &[0xAC, 0x02]);
        let mut r = BitReader::new(w.as_bytes());
        assert_eq!(r.read_varint32(), 300);
    }

    #[test]
    fn varint_max_value() {
        let mut w = BitWriter::new();
        w.write_varint32(u32::MAX);
        assert_eq!(w.as_bytes().len(), 5);
        let mut r = BitReader::new(w.as_bytes());
        assert_eq!(r.read_varint32(), u32::MAX);
    }

    #[test]
    fn field_index_sequence_new_way() {
        let indices = [0, 1, 2, 9, 40, 200, 1500];
        let mut w = BitWriter::new();
        let mut last = -1;
        for &i in &indices {
            w.write_field_index(Some(i), last, true);
            last = i;
        }
        w.write_field_index(None, last, true);
        let (bytes, len) = reader_for(w);

        let mut r = BitReader::with_bit_len(&bytes, len);
        let mut last = -1;
        let mut decoded = Vec::new();
        while let Some(i) = r.read_field_index(last, true) {
            decoded.push(i);
            last = i;
        }
        assert_eq!(decoded, indices);
        assert!(!r.overflowed());
        assert_eq!(r.bits_left(), 0);
    }

    #[test]
    fn field_index_old_way_uses_seven_bit_head() {
        let mut w = BitWriter::new();
        w.write_field_index(Some(0), -1, false);
        assert_eq!(w.bit_offset(), 7);
        w.write_field_index(None, 0, false);
        let (bytes, len) = reader_for(w);
        let mut r = BitReader::with_bit_len(&bytes, len);
        assert_eq!(r.read_field_index(-1, false), Some(0));
        assert_eq!(r.read_field_index(0, false), None);
    }

    #[test]
    fn consecutive_index_costs_one_bit() {
        let mut w = BitWriter::new();
        w.write_field_index(Some(4), 3, true);
        assert_eq!(w.bit_offset(), 1);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ubitvar_roundtrip(value in any::<u32>()) {
                let mut w = BitWriter::new();
                w.write_ubitvar(value);
                let mut r = BitReader::new(w.as_bytes());
                prop_assert_eq!(r.read_ubitvar(), value);
            }

            #[test]
            fn field_index_roundtrip(
                last in -1i32..2000,
                step in 0i32..2000,
                new_way in any::<bool>(),
            ) {
                let index = last + 1 + step;
                let mut w = BitWriter::new();
                w.write_field_index(Some(index), last, new_way);
                let mut r = BitReader::new(w.as_bytes());
                prop_assert_eq!(r.read_field_index(last, new_way), Some(index));
            }
        }
    }
}
