//! Fixed-point coordinate and normal encodings.
//!
//! World coordinates are sent as a sign, an integer part and a 5-bit
//! fraction. The multiplayer ("MP") variants shrink the integer part when
//! the value lies inside the map bounds, cell coordinates are relative to a
//! grid cell of caller-supplied width, and normals carry an 11-bit fraction.

use crate::reader::BitReader;
use crate::writer::BitWriter;

/// Integer bits of a plain coordinate.
pub const COORD_INTEGER_BITS: u32 = 14;
/// Fractional bits of a full-precision coordinate.
pub const COORD_FRACTIONAL_BITS: u32 = 5;
/// Integer bits of an in-bounds multiplayer coordinate.
pub const COORD_INTEGER_BITS_MP: u32 = 11;
/// Fractional bits of a low-precision coordinate.
pub const COORD_FRACTIONAL_BITS_LP: u32 = 3;
/// Fractional bits of a normal component.
pub const NORMAL_FRACTIONAL_BITS: u32 = 11;

const COORD_DENOMINATOR: u32 = 1 << COORD_FRACTIONAL_BITS;
const COORD_RESOLUTION: f32 = 1.0 / COORD_DENOMINATOR as f32;
const COORD_RESOLUTION_LP: f32 = 1.0 / (1 << COORD_FRACTIONAL_BITS_LP) as f32;
const NORMAL_DENOMINATOR: u32 = (1 << NORMAL_FRACTIONAL_BITS) - 1;
const NORMAL_RESOLUTION: f32 = 1.0 / NORMAL_DENOMINATOR as f32;

fn signed(value: f32, negative: bool) -> f32 {
    if negative {
        -value
    } else {
        value
    }
}

impl BitReader<'_> {
    /// Read a plain world coordinate.
    pub fn read_bit_coord(&mut self) -> f32 {
        let has_int = self.read_bit();
        let has_fract = self.read_bit();
        if !has_int && !has_fract {
            return 0.0;
        }
        let negative = self.read_bit();
        let int_val = if has_int {
            self.read_uint(COORD_INTEGER_BITS) + 1
        } else {
            0
        };
        let fract_val = if has_fract {
            self.read_uint(COORD_FRACTIONAL_BITS)
        } else {
            0
        };
        signed(int_val as f32 + fract_val as f32 * COORD_RESOLUTION, negative)
    }

    /// Read a multiplayer-optimised coordinate.
    pub fn read_bit_coord_mp(&mut self, integral: bool, low_precision: bool) -> f32 {
        let in_bounds = self.read_bit();
        let int_bits = if in_bounds {
            COORD_INTEGER_BITS_MP
        } else {
            COORD_INTEGER_BITS
        };

        if integral {
            if !self.read_bit() {
                return 0.0;
            }
            let negative = self.read_bit();
            let int_val = self.read_uint(int_bits) + 1;
            return signed(int_val as f32, negative);
        }

        let has_int = self.read_bit();
        let negative = self.read_bit();
        let int_val = if has_int {
            self.read_uint(int_bits) + 1
        } else {
            0
        };
        let (fract_bits, resolution) = if low_precision {
            (COORD_FRACTIONAL_BITS_LP, COORD_RESOLUTION_LP)
        } else {
            (COORD_FRACTIONAL_BITS, COORD_RESOLUTION)
        };
        let fract_val = self.read_uint(fract_bits);
        signed(int_val as f32 + fract_val as f32 * resolution, negative)
    }

    /// Read a unit-vector component.
    pub fn read_bit_normal(&mut self) -> f32 {
        let negative = self.read_bit();
        let fract_val = self.read_uint(NORMAL_FRACTIONAL_BITS);
        signed(fract_val as f32 * NORMAL_RESOLUTION, negative)
    }

    /// Read a coordinate relative to a grid cell `bits` wide.
    pub fn read_bit_cell_coord(&mut self, bits: u32, integral: bool, low_precision: bool) -> f32 {
        let int_val = self.read_uint(bits);
        if integral {
            return int_val as f32;
        }
        let (fract_bits, resolution) = if low_precision {
            (COORD_FRACTIONAL_BITS_LP, COORD_RESOLUTION_LP)
        } else {
            (COORD_FRACTIONAL_BITS, COORD_RESOLUTION)
        };
        let fract_val = self.read_uint(fract_bits);
        int_val as f32 + fract_val as f32 * resolution
    }

    /// Read a vector of plain coordinates, each preceded by a presence bit.
    /// Absent components are zero.
    pub fn read_bit_vec3_coord(&mut self) -> [f32; 3] {
        let present = [self.read_bit(), self.read_bit(), self.read_bit()];
        let mut out = [0.0; 3];
        for (slot, has) in out.iter_mut().zip(present) {
            if has {
                *slot = self.read_bit_coord();
            }
        }
        out
    }
}

impl BitWriter<'_> {
    /// Write a plain world coordinate, truncating toward zero at 1/32
    /// resolution.
    pub fn write_bit_coord(&mut self, value: f32) {
        let negative = value < 0.0;
        let int_val = value.abs() as u32;
        let fract_val = ((value * COORD_DENOMINATOR as f32) as i32).unsigned_abs()
            & (COORD_DENOMINATOR - 1);

        self.write_bit(int_val != 0);
        self.write_bit(fract_val != 0);
        if int_val == 0 && fract_val == 0 {
            return;
        }
        self.write_bit(negative);
        if int_val != 0 {
            self.write_uint(int_val - 1, COORD_INTEGER_BITS);
        }
        if fract_val != 0 {
            self.write_uint(fract_val, COORD_FRACTIONAL_BITS);
        }
    }

    /// Write a unit-vector component.
    pub fn write_bit_normal(&mut self, value: f32) {
        let fract_val = ((value * NORMAL_DENOMINATOR as f32) as i32)
            .unsigned_abs()
            .min(NORMAL_DENOMINATOR);
        self.write_bit(value < 0.0);
        self.write_uint(fract_val, NORMAL_FRACTIONAL_BITS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(build: impl FnOnce(&mut BitWriter<'_>)) -> Vec<u8> {
        let mut w = BitWriter::new();
        build(&mut w);
        w.into_bytes()
    }

    #[test]
    fn zero_coord_is_two_bits() {
        let mut w = BitWriter::new();
        w.write_bit_coord(0.0);
        assert_eq!(w.bit_offset(), 2);
        let mut r = BitReader::new(w.as_bytes());
        assert_eq!(r.read_bit_coord(), 0.0);
    }

    #[test]
    fn coord_roundtrip_at_resolution() {
        for v in [1.0f32, -1.0, 0.5, -1234.75, 16000.03125, 0.03125] {
            let bytes = bytes_of(|w| w.write_bit_coord(v));
            let mut r = BitReader::new(&bytes);
            assert_eq!(r.read_bit_coord(), v, "value {v}");
        }
    }

    #[test]
    fn normal_roundtrip_within_resolution() {
        for v in [0.0f32, 1.0, -1.0, 0.5, -0.707] {
            let bytes = bytes_of(|w| w.write_bit_normal(v));
            let mut r = BitReader::new(&bytes);
            let got = r.read_bit_normal();
            assert!((got - v).abs() <= 1.0 / 2047.0, "{v} -> {got}");
        }
    }

    #[test]
    fn coord_mp_in_bounds_uses_short_integer() {
        let bytes = bytes_of(|w| {
            w.write_bit(true); // in bounds
            w.write_bit(true); // has int
            w.write_bit(true); // negative
            w.write_uint(99, COORD_INTEGER_BITS_MP);
            w.write_uint(16, COORD_FRACTIONAL_BITS);
        });
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bit_coord_mp(false, false), -100.5);
        assert_eq!(r.bit_offset(), 3 + 11 + 5);
    }

    #[test]
    fn coord_mp_low_precision_out_of_bounds() {
        let bytes = bytes_of(|w| {
            w.write_bit(false); // out of bounds
            w.write_bit(true);
            w.write_bit(false);
            w.write_uint(9999, COORD_INTEGER_BITS);
            w.write_uint(2, COORD_FRACTIONAL_BITS_LP);
        });
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bit_coord_mp(false, true), 10000.25);
    }

    #[test]
    fn coord_mp_integral() {
        let bytes = bytes_of(|w| {
            w.write_bit(true);
            w.write_bit(true);
            w.write_bit(false);
            w.write_uint(41, COORD_INTEGER_BITS_MP);
        });
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bit_coord_mp(true, false), 42.0);

        let bytes = bytes_of(|w| {
            w.write_bit(true);
            w.write_bit(false);
        });
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bit_coord_mp(true, false), 0.0);
        assert_eq!(r.bit_offset(), 2);
    }

    #[test]
    fn cell_coord_variants() {
        let bytes = bytes_of(|w| {
            w.write_uint(37, 10);
            w.write_uint(8, COORD_FRACTIONAL_BITS);
            w.write_uint(12, 10);
            w.write_uint(12, 10);
            w.write_uint(4, COORD_FRACTIONAL_BITS_LP);
        });
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bit_cell_coord(10, false, false), 37.25);
        assert_eq!(r.read_bit_cell_coord(10, true, false), 12.0);
        assert_eq!(r.read_bit_cell_coord(10, false, true), 12.5);
    }

    #[test]
    fn vec3_coord_skips_absent_components() {
        let bytes = bytes_of(|w| {
            w.write_bit(true);
            w.write_bit(false);
            w.write_bit(true);
            w.write_bit_coord(3.0);
            w.write_bit_coord(-2.5);
        });
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bit_vec3_coord(), [3.0, 0.0, -2.5]);
    }
}
