//! Growable bit writer with optional ground-truth checking.

use tracing::warn;

use crate::reader::BitReader;

/// Appends bit-packed values to a growable buffer, least significant bit
/// first, mirroring [`BitReader`].
///
/// A writer built with [`with_truth`](Self::with_truth) compares every bit
/// it writes against a reference encoding and remembers the first offset
/// where they diverge, so an encoder bug is reported at the field that
/// caused it rather than as a byte mismatch at the end.
#[derive(Debug, Default)]
pub struct BitWriter<'t> {
    data: Vec<u8>,
    offset: usize,
    truth: Option<&'t [u8]>,
    mismatch: Option<usize>,
}

impl<'t> BitWriter<'t> {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer that checks its output against `expected`.
    pub fn with_truth(expected: &'t [u8]) -> Self {
        Self {
            truth: Some(expected),
            ..Self::default()
        }
    }

    /// Write the low `bits` bits of `value` (0..=32).
    pub fn write_uint(&mut self, value: u32, bits: u32) {
        debug_assert!(bits <= 32, "write_uint supports at most 32 bits");
        let bits = bits.min(32) as usize;
        let begin = self.offset;
        let mut rest = u64::from(value);
        let mut left = bits;
        while left > 0 {
            let byte = self.offset / 8;
            if byte == self.data.len() {
                self.data.push(0);
            }
            let shift = self.offset % 8;
            let take = (8 - shift).min(left);
            let chunk = (rest & ((1u64 << take) - 1)) as u8;
            self.data[byte] |= chunk << shift;
            rest >>= take;
            left -= take;
            self.offset += take;
        }
        self.check_truth(begin);
    }

    /// Write a signed value in `bits` bits of two's complement.
    pub fn write_sint(&mut self, value: i32, bits: u32) {
        self.write_uint(value as u32, bits);
    }

    /// Write a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.write_uint(u32::from(bit), 1);
    }

    /// Write a raw IEEE-754 single.
    pub fn write_f32(&mut self, value: f32) {
        self.write_uint(value.to_bits(), 32);
    }

    /// Write whole bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_uint(u32::from(b), 8);
        }
    }

    /// Write `s` up to its first NUL, then a NUL terminator.
    pub fn write_cstring(&mut self, s: &[u8]) {
        let len = s.iter().position(|&b| b == 0).unwrap_or(s.len());
        self.write_bytes(&s[..len]);
        self.write_uint(0, 8);
    }

    /// Copy the unread bits of `stream` without consuming it.
    pub fn write_bitstream(&mut self, stream: &BitReader<'_>) {
        let mut copy = stream.clone();
        while copy.bits_left() > 0 {
            let take = copy.bits_left().min(32) as u32;
            let value = copy.read_uint(take);
            self.write_uint(value, take);
        }
    }

    /// Bits written so far.
    pub fn bit_offset(&self) -> usize {
        self.offset
    }

    /// The written bytes. A trailing partial byte is zero-padded.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// First bit offset where the output diverged from the reference, if
    /// any.
    pub fn first_mismatch(&self) -> Option<usize> {
        self.mismatch
    }

    fn check_truth(&mut self, begin: usize) {
        let Some(truth) = self.truth else {
            return;
        };
        if self.mismatch.is_some() {
            return;
        }
        for pos in begin..self.offset {
            let written = (self.data[pos / 8] >> (pos % 8)) & 1;
            let expected = truth.get(pos / 8).map(|b| (b >> (pos % 8)) & 1);
            if expected != Some(written) {
                warn!(
                    bit_offset = pos,
                    truth_bits = truth.len() * 8,
                    "bit writer diverged from ground truth"
                );
                self.mismatch = Some(pos);
                return;
            }
        }
    }
}
