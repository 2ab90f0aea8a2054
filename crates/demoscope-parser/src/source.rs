//! Buffered byte source with end-of-input tracking.

use std::io::{self, BufReader, Read};

use demoscope_core::DemoError;

use crate::codec;

/// The blocking input a decode session pulls from.
///
/// Wraps the caller's reader in a [`BufReader`] and counts consumed
/// bytes so skipped payloads can be told apart from missing ones.
pub struct ByteSource<R: Read> {
    inner: BufReader<R>,
    position: u64,
}

impl<R: Read> ByteSource<R> {
    /// Buffer `reader` with `capacity` bytes.
    pub fn new(reader: R, capacity: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity.max(1), reader),
            position: 0,
        }
    }

    /// Bytes consumed so far, skipped bytes included.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read one byte, or `None` when the input ended cleanly before it.
    pub fn read_u8_or_eof(&mut self) -> Result<Option<u8>, DemoError> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(buf[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, DemoError> {
        let v = codec::read_u8(&mut self.inner)?;
        self.position += 1;
        Ok(v)
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32, DemoError> {
        let v = codec::read_i32_le(&mut self.inner)?;
        self.position += 4;
        Ok(v)
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DemoError> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Discard `n` bytes without copying them out.
    pub fn skip(&mut self, n: u64) -> Result<(), DemoError> {
        let skipped = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())?;
        self.position += skipped;
        if skipped < n {
            return Err(DemoError::Truncated);
        }
        Ok(())
    }

    /// Append everything that is left to `out`.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, DemoError> {
        let n = self.inner.read_to_end(out)?;
        self.position += n as u64;
        Ok(n)
    }

    /// Decode the container header.
    pub fn read_header(&mut self) -> Result<demoscope_core::DemoHeader, DemoError> {
        let header = codec::decode_header(&mut self.inner)?;
        self.position += demoscope_core::HEADER_SIZE as u64;
        Ok(header)
    }
}
