//! Demo recording writer.
//!
//! [`DemoWriter`] streams container messages to any `Write` sink using the
//! same version-dependent framing the parser reads. The header is written
//! immediately on construction.

use std::io::Write;

use demoscope_arena::Arena;
use demoscope_bits::BitWriter;
use demoscope_core::{
    CmdInfo, ConsoleCmd, CustomData, DataTables, DemoError, DemoHeader, DemoVersion, MessageKind,
    Packet, Preamble, Stop, StringTables, SyncTick, Tick, UserCmd,
};
use tracing::warn;

use crate::codec::{encode_header, write_i32_le, write_length_prefixed_bytes, write_u8};
use crate::stringtables::{StringTableEntry, StringTablesParsed};

/// Writes a demo recording to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use demoscope_core::{DemoHeader, MessageKind, SyncTick};
/// use demoscope_parser::DemoWriter;
///
/// let mut buf = Vec::new();
/// let mut writer = DemoWriter::new(&mut buf, &DemoHeader::new(3, 24)).unwrap();
/// let preamble = writer.preamble(MessageKind::SyncTick, 0, 0);
/// writer.write_synctick(&SyncTick { preamble }).unwrap();
/// drop(writer);
///
/// // 1072-byte header, then kind byte and tick.
/// assert_eq!(buf.len(), 1072 + 1 + 4);
/// assert_eq!(buf[1072], 3);
/// ```
pub struct DemoWriter<W: Write> {
    out: W,
    version: DemoVersion,
}

impl<W: Write> DemoWriter<W> {
    /// Create a writer for `header`'s protocol, writing the header.
    pub fn new(mut out: W, header: &DemoHeader) -> Result<Self, DemoError> {
        encode_header(&mut out, header)?;
        Ok(Self {
            out,
            version: DemoVersion::from_header(header),
        })
    }

    /// The protocol this writer frames messages for.
    pub fn version(&self) -> &DemoVersion {
        &self.version
    }

    /// A preamble for `kind` with this protocol's wire byte.
    pub fn preamble(&self, kind: MessageKind, tick: i32, slot: u8) -> Preamble {
        Preamble {
            kind,
            wire_kind: self.version.wire_kind(kind),
            tick: Tick(tick),
            slot,
        }
    }

    fn write_preamble(&mut self, preamble: &Preamble) -> Result<(), DemoError> {
        write_u8(&mut self.out, preamble.wire_kind)?;
        write_i32_le(&mut self.out, preamble.tick.0)?;
        if self.version.has_slot_in_preamble {
            write_u8(&mut self.out, preamble.slot)?;
        }
        Ok(())
    }

    /// Write a console command.
    pub fn write_consolecmd(&mut self, message: &ConsoleCmd<'_>) -> Result<(), DemoError> {
        self.write_preamble(&message.preamble)?;
        write_length_prefixed_bytes(&mut self.out, MessageKind::ConsoleCmd, message.data)
    }

    /// Write a custom data message.
    pub fn write_customdata(&mut self, message: &CustomData<'_>) -> Result<(), DemoError> {
        self.write_preamble(&message.preamble)?;
        write_i32_le(&mut self.out, message.unknown)?;
        write_length_prefixed_bytes(&mut self.out, MessageKind::CustomData, message.data)
    }

    /// Write a data tables message.
    pub fn write_datatables(&mut self, message: &DataTables<'_>) -> Result<(), DemoError> {
        self.write_preamble(&message.preamble)?;
        write_length_prefixed_bytes(&mut self.out, MessageKind::DataTables, message.data)
    }

    /// Write a packet or signon message. Missing cmdinfo blocks are written
    /// as zeroes; extra ones are dropped.
    pub fn write_packet(&mut self, message: &Packet<'_>) -> Result<(), DemoError> {
        self.write_preamble(&message.preamble)?;
        for i in 0..self.version.cmdinfo_size {
            let info = message.cmdinfo.get(i).copied().unwrap_or_default();
            self.out.write_all(&CmdInfo::to_bytes(&info))?;
        }
        write_i32_le(&mut self.out, message.in_sequence)?;
        write_i32_le(&mut self.out, message.out_sequence)?;
        write_length_prefixed_bytes(&mut self.out, message.preamble.kind, message.data)
    }

    /// Write the stop marker and its trailing bytes.
    pub fn write_stop(&mut self, message: &Stop<'_>) -> Result<(), DemoError> {
        write_u8(&mut self.out, self.version.wire_kind(MessageKind::Stop))?;
        self.out.write_all(message.data)?;
        Ok(())
    }

    /// Write a raw string tables message.
    pub fn write_stringtables(&mut self, message: &StringTables<'_>) -> Result<(), DemoError> {
        self.write_preamble(&message.preamble)?;
        write_length_prefixed_bytes(&mut self.out, MessageKind::StringTables, message.data)
    }

    /// Re-encode a decoded string tables message whose names live in
    /// `names`.
    ///
    /// The encoding is checked bit by bit against the message's original
    /// payload. Returns the first diverging bit offset, if any; the
    /// re-encoded bytes are written either way.
    pub fn write_stringtables_parsed(
        &mut self,
        message: &StringTablesParsed<'_>,
        names: &Arena,
    ) -> Result<Option<usize>, DemoError> {
        let mut bits = BitWriter::with_truth(message.data);
        bits.write_uint(message.tables.len() as u32, 8);
        for table in &message.tables {
            bits.write_cstring(table.name.resolve(names)?);
            bits.write_uint(table.entries.len() as u32, 16);
            for entry in &table.entries {
                write_entry(&mut bits, entry, names)?;
            }
            bits.write_bit(table.classes.is_some());
            if let Some(classes) = &table.classes {
                bits.write_uint(classes.len() as u32, 16);
                for entry in classes {
                    write_entry(&mut bits, entry, names)?;
                }
            }
        }
        if let Some(leftover) = &message.leftover {
            if bits.bit_offset() == leftover.start_offset() {
                bits.write_bitstream(leftover);
            }
        }

        let mismatch = bits.first_mismatch();
        if let Some(at) = mismatch {
            warn!(bit_offset = at, "string tables re-encode differs from source");
        }
        self.write_preamble(&message.preamble)?;
        write_length_prefixed_bytes(&mut self.out, MessageKind::StringTables, bits.as_bytes())?;
        Ok(mismatch)
    }

    /// Write a sync tick marker.
    pub fn write_synctick(&mut self, message: &SyncTick) -> Result<(), DemoError> {
        self.write_preamble(&message.preamble)
    }

    /// Write a user command.
    pub fn write_usercmd(&mut self, message: &UserCmd<'_>) -> Result<(), DemoError> {
        self.write_preamble(&message.preamble)?;
        write_i32_le(&mut self.out, message.cmd)?;
        write_length_prefixed_bytes(&mut self.out, MessageKind::UserCmd, message.data)
    }

    /// Write bytes as they are, for hand-built or corrupt input.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), DemoError> {
        self.out.write_all(bytes)?;
        Ok(())
    }

    /// The underlying sink.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Flush and return the underlying sink.
    pub fn into_inner(mut self) -> Result<W, DemoError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

fn write_entry(
    bits: &mut BitWriter<'_>,
    entry: &StringTableEntry<'_>,
    names: &Arena,
) -> Result<(), DemoError> {
    bits.write_cstring(entry.name.resolve(names)?);
    bits.write_bit(entry.data.is_some());
    if let Some(data) = &entry.data {
        bits.write_uint(u32::from(entry.size), 16);
        bits.write_bitstream(data);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stringtables::parse_stringtables;
    use demoscope_core::HEADER_SIZE;
    use smallvec::smallvec;

    fn portal2() -> DemoHeader {
        let mut h = DemoHeader::new(4, 2001);
        h.game_directory = "portal2".into();
        h
    }

    #[test]
    fn packet_pads_cmdinfo_to_protocol_size() {
        let mut buf = Vec::new();
        let mut w = DemoWriter::new(&mut buf, &portal2()).unwrap();
        let preamble = w.preamble(MessageKind::Packet, 12, 1);
        w.write_packet(&Packet {
            preamble,
            cmdinfo: smallvec![CmdInfo {
                flags: 1,
                ..CmdInfo::default()
            }],
            in_sequence: 5,
            out_sequence: 6,
            data: &[1, 2, 3],
        })
        .unwrap();
        drop(w);

        let body = &buf[HEADER_SIZE..];
        // kind, tick, slot, 2 cmdinfo blocks, sequences, length, payload
        assert_eq!(body.len(), 1 + 4 + 1 + 2 * 76 + 8 + 4 + 3);
        assert_eq!(body[0], 2);
        assert_eq!(body[5], 1);
        assert_eq!(&body[6..10], &1i32.to_le_bytes());
        assert!(body[82..158].iter().all(|&b| b == 0));
        assert_eq!(&body[body.len() - 3..], &[1, 2, 3]);
    }

    #[test]
    fn stop_has_no_preamble() {
        let mut buf = Vec::new();
        let mut w = DemoWriter::new(&mut buf, &portal2()).unwrap();
        w.write_stop(&Stop { data: b"tail" }).unwrap();
        drop(w);
        assert_eq!(&buf[HEADER_SIZE..], b"\x07tail");
    }

    #[test]
    fn old_protocol_string_tables_use_kind_eight() {
        let mut buf = Vec::new();
        let mut w = DemoWriter::new(&mut buf, &DemoHeader::new(3, 24)).unwrap();
        let preamble = w.preamble(MessageKind::StringTables, 0, 0);
        assert_eq!(preamble.wire_kind, 8);
        w.write_stringtables(&StringTables {
            preamble,
            data: &[0],
        })
        .unwrap();
        drop(w);
        assert_eq!(buf[HEADER_SIZE], 8);
    }

    #[test]
    fn string_tables_reencode_is_byte_identical() {
        let mut bits = BitWriter::new();
        bits.write_uint(1, 8);
        bits.write_cstring(b"userinfo");
        bits.write_uint(2, 16);
        bits.write_cstring(b"0");
        bits.write_bit(true);
        bits.write_uint(2, 16);
        bits.write_bytes(&[0x12, 0x34]);
        bits.write_cstring(b"1");
        bits.write_bit(false);
        bits.write_bit(false);
        let mut payload = bits.into_bytes();
        // Trailing garbage survives through the leftover bits.
        payload.push(0x5A);

        let mut buf = Vec::new();
        let mut w = DemoWriter::new(&mut buf, &portal2()).unwrap();
        let preamble = w.preamble(MessageKind::StringTables, 3, 0);
        let message = StringTables {
            preamble,
            data: &payload,
        };
        let mut arena = Arena::with_first_block(128);
        let parsed = parse_stringtables(&message, &mut arena).unwrap();
        let mismatch = w.write_stringtables_parsed(&parsed, &arena).unwrap();
        drop(w);

        assert_eq!(mismatch, None);
        let body = &buf[HEADER_SIZE..];
        let len = i32::from_le_bytes([body[6], body[7], body[8], body[9]]) as usize;
        assert_eq!(&body[10..10 + len], payload.as_slice());
    }
}
