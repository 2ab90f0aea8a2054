//! String table snapshot decoding.

use demoscope_arena::Arena;
use demoscope_bits::BitReader;
use demoscope_core::{ArenaStr, DemoError, Pool, Preamble, StringTables};

/// Longest entry or table name read, terminator included.
pub const MAX_NAME_LEN: usize = 1024;

/// One string table entry.
#[derive(Clone, Debug)]
pub struct StringTableEntry<'a> {
    /// Entry name.
    pub name: ArenaStr,
    /// Declared payload size in bytes; 0 without payload.
    pub size: u16,
    /// User data, when the entry has any.
    pub data: Option<BitReader<'a>>,
}

/// One table of a snapshot.
#[derive(Clone, Debug)]
pub struct StringTable<'a> {
    /// Table name, e.g. `instancebaseline`.
    pub name: ArenaStr,
    /// Server-side entries.
    pub entries: Vec<StringTableEntry<'a>>,
    /// Client-side entries, when the table carries them.
    pub classes: Option<Vec<StringTableEntry<'a>>>,
}

/// A decoded string tables message.
#[derive(Clone, Debug)]
pub struct StringTablesParsed<'a> {
    /// Ordering key of the source message.
    pub preamble: Preamble,
    /// The undecoded payload.
    pub data: &'a [u8],
    /// Tables in wire order.
    pub tables: Vec<StringTable<'a>>,
    /// Bits after the last table, usually byte padding.
    pub leftover: Option<BitReader<'a>>,
}

/// Decode a string tables message. Names are interned into `arena` in the
/// [`Pool::Temp`] pool.
pub fn parse_stringtables<'a>(
    message: &StringTables<'a>,
    arena: &mut Arena,
) -> Result<StringTablesParsed<'a>, DemoError> {
    let mut r = BitReader::new(message.data);
    let mut names = NameReader {
        buf: [0; MAX_NAME_LEN],
        arena,
    };

    let table_count = r.read_uint(8);
    let mut tables = Vec::with_capacity(table_count as usize);
    for _ in 0..table_count {
        let name = names.read(&mut r);
        let entry_count = r.read_uint(16);
        let entries = read_entries(&mut r, &mut names, entry_count);
        let classes = r.read_bit().then(|| {
            let count = r.read_uint(16);
            read_entries(&mut r, &mut names, count)
        });
        tables.push(StringTable {
            name,
            entries,
            classes,
        });
        if r.overflowed() {
            break;
        }
    }

    let left = r.bits_left();
    let leftover = (left != 0).then(|| r.fork_and_advance(left));
    if r.overflowed() {
        return Err(DemoError::Overflow {
            context: "string tables",
        });
    }

    Ok(StringTablesParsed {
        preamble: message.preamble,
        data: message.data,
        tables,
        leftover,
    })
}

fn read_entries<'a>(
    r: &mut BitReader<'a>,
    names: &mut NameReader<'_>,
    count: u32,
) -> Vec<StringTableEntry<'a>> {
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = names.read(r);
        let (size, data) = if r.read_bit() {
            let size = r.read_uint(16) as u16;
            (size, Some(r.fork_and_advance(usize::from(size) * 8)))
        } else {
            (0, None)
        };
        out.push(StringTableEntry { name, size, data });
        if r.overflowed() {
            break;
        }
    }
    out
}

struct NameReader<'m> {
    buf: [u8; MAX_NAME_LEN],
    arena: &'m mut Arena,
}

impl NameReader<'_> {
    fn read(&mut self, r: &mut BitReader<'_>) -> ArenaStr {
        let n = r.read_cstring(&mut self.buf);
        let end = self.buf[..n].iter().position(|&b| b == 0).unwrap_or(n);
        ArenaStr::intern(self.arena, Pool::Temp, &self.buf[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoscope_bits::BitWriter;
    use demoscope_core::{MessageKind, Tick};

    fn preamble() -> Preamble {
        Preamble {
            kind: MessageKind::StringTables,
            wire_kind: 9,
            tick: Tick(0),
            slot: 0,
        }
    }

    fn sample() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_uint(2, 8);

        w.write_cstring(b"downloadables");
        w.write_uint(1, 16);
        w.write_cstring(b"maps/a.bsp");
        w.write_bit(false);
        w.write_bit(false);

        w.write_cstring(b"instancebaseline");
        w.write_uint(1, 16);
        w.write_cstring(b"12");
        w.write_bit(true);
        w.write_uint(3, 16);
        w.write_bytes(&[0xAA, 0xBB, 0xCC]);
        w.write_bit(true);
        w.write_uint(1, 16);
        w.write_cstring(b"client");
        w.write_bit(false);
        w.into_bytes()
    }

    fn text(arena: &Arena, s: ArenaStr) -> &[u8] {
        s.resolve(arena).unwrap()
    }

    #[test]
    fn tables_entries_and_classes() {
        let bytes = sample();
        let message = StringTables {
            preamble: preamble(),
            data: &bytes,
        };
        let mut arena = Arena::with_first_block(256);
        let parsed = parse_stringtables(&message, &mut arena).unwrap();

        assert_eq!(parsed.tables.len(), 2);
        let dl = &parsed.tables[0];
        assert_eq!(text(&arena, dl.name), b"downloadables");
        assert_eq!(text(&arena, dl.entries[0].name), b"maps/a.bsp");
        assert!(dl.entries[0].data.is_none());
        assert!(dl.classes.is_none());

        let base = &parsed.tables[1];
        let entry = &base.entries[0];
        assert_eq!(entry.size, 3);
        assert_eq!(entry.data.as_ref().unwrap().remaining_bytes(), [0xAA, 0xBB, 0xCC]);
        let classes = base.classes.as_ref().unwrap();
        assert_eq!(text(&arena, classes[0].name), b"client");

        let leftover = parsed.leftover.unwrap();
        assert!(leftover.bits_left() < 8);
    }

    #[test]
    fn byte_aligned_payload_has_no_leftover() {
        let mut w = BitWriter::new();
        w.write_uint(0, 8);
        let bytes = w.into_bytes();
        let message = StringTables {
            preamble: preamble(),
            data: &bytes,
        };
        let mut arena = Arena::with_first_block(64);
        let parsed = parse_stringtables(&message, &mut arena).unwrap();
        assert!(parsed.tables.is_empty());
        assert!(parsed.leftover.is_none());
    }

    #[test]
    fn overlong_entry_overflows() {
        let mut w = BitWriter::new();
        w.write_uint(1, 8);
        w.write_cstring(b"t");
        w.write_uint(1, 16);
        w.write_cstring(b"e");
        w.write_bit(true);
        w.write_uint(500, 16);
        let bytes = w.into_bytes();
        let message = StringTables {
            preamble: preamble(),
            data: &bytes,
        };
        let mut arena = Arena::with_first_block(64);
        let err = parse_stringtables(&message, &mut arena).unwrap_err();
        assert_eq!(err.kind(), demoscope_core::ErrorKind::Truncation);
    }

    #[test]
    fn long_names_are_cut() {
        let mut w = BitWriter::new();
        w.write_cstring(&vec![b'x'; 2000]);
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        let mut arena = Arena::with_first_block(64);
        let name = NameReader {
            buf: [0; MAX_NAME_LEN],
            arena: &mut arena,
        }
        .read(&mut r);
        assert_eq!(r.bit_offset(), MAX_NAME_LEN * 8);
        assert_eq!(text(&arena, name).len(), MAX_NAME_LEN - 1);
    }
}
