//! Byte-level encode/decode for the demo container.
//!
//! All integers and floats are little-endian. The header is a fixed
//! 1072-byte block; everything after it is framed messages.

use std::io::{Read, Write};

use demoscope_core::header::{name_from_field, name_to_field, HEADER_NAME_LEN};
use demoscope_core::{DemoError, DemoHeader, MessageKind, DEMO_MAGIC, HEADER_SIZE};

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), DemoError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian i32.
pub fn write_i32_le(w: &mut dyn Write, v: i32) -> Result<(), DemoError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f32.
pub fn write_f32_le(w: &mut dyn Write, v: f32) -> Result<(), DemoError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write an i32 length prefix followed by the bytes. `kind` names the
/// message in the error for payloads too large to frame.
pub fn write_length_prefixed_bytes(
    w: &mut dyn Write,
    kind: MessageKind,
    b: &[u8],
) -> Result<(), DemoError> {
    let len = i32::try_from(b.len()).map_err(|_| DemoError::InvalidLength {
        kind,
        length: i32::MAX,
    })?;
    write_i32_le(w, len)?;
    w.write_all(b)?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, DemoError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian i32.
pub fn read_i32_le(r: &mut dyn Read) -> Result<i32, DemoError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian f32.
pub fn read_f32_le(r: &mut dyn Read) -> Result<f32, DemoError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

// ── Header encode/decode ────────────────────────────────────────

/// Encode the fixed-layout header.
pub fn encode_header(w: &mut dyn Write, header: &DemoHeader) -> Result<(), DemoError> {
    w.write_all(&header.id)?;
    write_i32_le(w, header.demo_protocol)?;
    write_i32_le(w, header.net_protocol)?;
    for name in [
        &header.server_name,
        &header.client_name,
        &header.map_name,
        &header.game_directory,
    ] {
        w.write_all(&name_to_field(name))?;
    }
    write_f32_le(w, header.seconds)?;
    write_i32_le(w, header.tick_count)?;
    write_i32_le(w, header.frame_count)?;
    write_i32_le(w, header.signon_length)?;
    Ok(())
}

/// Decode and validate the fixed-layout header.
///
/// The identifier is compared on its first seven bytes; the eighth is
/// forced to NUL like every name field's last byte.
pub fn decode_header(r: &mut dyn Read) -> Result<DemoHeader, DemoError> {
    let mut raw = [0u8; HEADER_SIZE];
    r.read_exact(&mut raw)?;

    let mut id = [0u8; 8];
    id.copy_from_slice(&raw[..8]);
    if id[..7] != DEMO_MAGIC[..7] {
        return Err(DemoError::InvalidMagic { found: id });
    }
    id[7] = 0;

    let word = |at: usize| [raw[at], raw[at + 1], raw[at + 2], raw[at + 3]];
    let name = |index: usize| {
        let at = 16 + index * HEADER_NAME_LEN;
        name_from_field(&raw[at..at + HEADER_NAME_LEN - 1])
    };
    let tail = 16 + 4 * HEADER_NAME_LEN;

    Ok(DemoHeader {
        id,
        demo_protocol: i32::from_le_bytes(word(8)),
        net_protocol: i32::from_le_bytes(word(12)),
        server_name: name(0),
        client_name: name(1),
        map_name: name(2),
        game_directory: name(3),
        seconds: f32::from_le_bytes(word(tail)),
        tick_count: i32::from_le_bytes(word(tail + 4)),
        frame_count: i32::from_le_bytes(word(tail + 8)),
        signon_length: i32::from_le_bytes(word(tail + 12)),
    })
}
