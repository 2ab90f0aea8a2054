//! Bit-granularity reading and writing for embedded demo sub-protocols.
//!
//! Most of a demo's interesting payload (send tables, net messages, entity
//! deltas, string tables) is packed at bit granularity, least significant
//! bit first within each byte.
//!
//! # Architecture
//!
//! - [`BitReader`] is a borrowed view over a byte slice with absolute bit
//!   bounds. [`BitReader::fork_and_advance`] hands out sub-views without
//!   copying.
//! - [`BitWriter`] appends to a growable buffer and can check every bit
//!   it writes against a known-good reference.
//! - [`coord`] and [`varint`] add the engine's fixed-point and
//!   variable-length encodings to both sides.
//!
//! Reads past the end never touch memory outside the slice: they set a
//! sticky overflow flag and return zero. Callers check
//! [`BitReader::overflowed`] once a structure has been decoded.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod coord;
pub mod reader;
pub mod varint;
pub mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;

/// Number of bits needed to store values `0..=count`, as the engine
/// computes it: `floor(log2(count)) + 1`, and 1 for a count of 0.
pub fn bits_for(count: u32) -> u32 {
    if count == 0 {
        1
    } else {
        32 - count.leading_zeros()
    }
}
