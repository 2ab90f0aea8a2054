//! Borrowed bit reader.

use std::fmt;

/// A cursor over a byte slice addressed in bits.
///
/// Offsets are absolute bit positions in the underlying slice, so a fork
/// and its parent agree on where any given bit lives. Values are packed
/// least significant bit first.
///
/// Once a read runs past `end`, the reader is permanently overflowed: the
/// offset is pinned to `end` and every further read returns zero.
#[derive(Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    start: usize,
    offset: usize,
    end: usize,
    overflow: bool,
}

impl<'a> BitReader<'a> {
    /// Read every bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_bit_len(data, data.len() * 8)
    }

    /// Read the first `bits` bits of `data`, clamped to the slice.
    pub fn with_bit_len(data: &'a [u8], bits: usize) -> Self {
        let end = bits.min(data.len() * 8);
        Self {
            data,
            start: 0,
            offset: 0,
            end,
            overflow: false,
        }
    }

    /// Read an unsigned value of `bits` width (0..=32).
    pub fn read_uint(&mut self, bits: u32) -> u32 {
        debug_assert!(bits <= 32, "read_uint supports at most 32 bits");
        let bits = bits.min(32) as usize;
        if bits == 0 {
            return 0;
        }
        if !self.claim(bits) {
            return 0;
        }

        let mut value: u64 = 0;
        let mut got = 0;
        let mut pos = self.offset - bits;
        while got < bits {
            let byte = u64::from(self.data[pos / 8]);
            let shift = pos % 8;
            let take = (8 - shift).min(bits - got);
            let chunk = (byte >> shift) & ((1u64 << take) - 1);
            value |= chunk << got;
            got += take;
            pos += take;
        }
        value as u32
    }

    /// Read a two's-complement signed value of `bits` width (0..=32).
    pub fn read_sint(&mut self, bits: u32) -> i32 {
        let raw = self.read_uint(bits);
        match bits {
            0 => 0,
            32.. => raw as i32,
            _ => {
                let shift = 32 - bits;
                ((raw << shift) as i32) >> shift
            }
        }
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> bool {
        self.read_uint(1) != 0
    }

    /// Read a raw IEEE-754 single.
    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_uint(32))
    }

    /// Fill `out` with whole bytes. Bytes past an overflow read as zero.
    pub fn read_bytes(&mut self, out: &mut [u8]) {
        for byte in out {
            *byte = self.read_uint(8) as u8;
        }
    }

    /// Read a NUL-terminated string into `buf`.
    ///
    /// Stops after the terminator or once `buf` is full. Returns the number
    /// of bytes consumed, terminator included. If no terminator was found
    /// the last byte of `buf` is overwritten with NUL so the output is
    /// always terminated.
    pub fn read_cstring(&mut self, buf: &mut [u8]) -> usize {
        for i in 0..buf.len() {
            let byte = self.read_uint(8) as u8;
            buf[i] = byte;
            if byte == 0 {
                return i + 1;
            }
        }
        if let Some(last) = buf.last_mut() {
            *last = 0;
        }
        buf.len()
    }

    /// Read a NUL-terminated string of any length. The terminator is
    /// consumed but not returned.
    pub fn read_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = self.read_uint(8) as u8;
            if byte == 0 {
                return out;
            }
            out.push(byte);
        }
    }

    /// Split off the next `bits` bits as an independent reader and advance
    /// past them.
    ///
    /// The fork aliases the same bytes. If fewer than `bits` remain, the
    /// fork covers what is left and both readers are marked overflowed.
    pub fn fork_and_advance(&mut self, bits: usize) -> BitReader<'a> {
        let begin = self.offset;
        let fits = self.claim(bits);
        BitReader {
            data: self.data,
            start: begin,
            offset: begin,
            end: self.offset,
            overflow: !fits,
        }
    }

    /// Advance `bits` bits without reading them.
    pub fn skip(&mut self, bits: usize) {
        self.claim(bits);
    }

    /// Bits remaining before `end`.
    pub fn bits_left(&self) -> usize {
        self.end - self.offset
    }

    /// Absolute bit offset of the cursor.
    pub fn bit_offset(&self) -> usize {
        self.offset
    }

    /// Absolute bit offset this reader started at.
    pub fn start_offset(&self) -> usize {
        self.start
    }

    /// Total bits this reader covers, consumed or not.
    pub fn bit_len(&self) -> usize {
        self.end - self.start
    }

    /// Whether a read has run past the end.
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// A copy of this reader rewound to its first bit.
    pub fn rewound(&self) -> BitReader<'a> {
        BitReader {
            offset: self.start,
            overflow: false,
            ..self.clone()
        }
    }

    /// The remaining bits packed into bytes. A trailing partial byte is
    /// zero-padded in its high bits.
    pub fn remaining_bytes(&self) -> Vec<u8> {
        let mut copy = self.clone();
        let mut out = Vec::with_capacity(copy.bits_left().div_ceil(8));
        while copy.bits_left() > 0 {
            let take = copy.bits_left().min(8) as u32;
            out.push(copy.read_uint(take) as u8);
        }
        out
    }

    /// Reserve `bits` bits, advancing the cursor. On overflow the cursor is
    /// pinned to `end`, the flag is set, and `false` is returned.
    fn claim(&mut self, bits: usize) -> bool {
        if bits > self.end - self.offset {
            self.offset = self.end;
            self.overflow = true;
            return false;
        }
        self.offset += bits;
        true
    }
}

impl fmt::Debug for BitReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitReader")
            .field("start", &self.start)
            .field("offset", &self.offset)
            .field("end", &self.end)
            .field("overflow", &self.overflow)
            .finish()
    }
}
