//! Decoding of the send-table / server-class payload.
//!
//! The payload is one bit stream: a run of tables, each introduced by a set
//! bit, followed by a 16-bit class count and the class list. Names are
//! interned into the schema arena so they outlive the message buffer.

use demoscope_arena::{Arena, ArenaError};
use demoscope_bits::{BitReader, BitWriter};
use demoscope_core::sendtable::DEFAULT_PROP_PRIORITY;
use demoscope_core::{
    ArenaStr, ClassId, DemoError, DemoVersion, NumericInfo, Pool, PropFlags, PropKind, PropType,
    SendProp, SendTable, ServerClass,
};
use tracing::debug;

/// Width of a send-prop type tag.
const PROP_TYPE_BITS: u32 = 5;
/// Width of a table's prop count.
const PROP_COUNT_BITS: u32 = 10;
/// Width of an array's element count.
const ARRAY_ELEMENTS_BITS: u32 = 10;
/// Width of the class count and of each class id.
const CLASS_BITS: u32 = 16;

/// Send tables and server classes of one data-tables message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataTablesParsed {
    /// Tables in wire order.
    pub tables: Vec<SendTable>,
    /// Classes ordered by id.
    pub classes: Vec<ServerClass>,
}

/// Decode a data-tables payload, interning names into `arena`.
pub fn parse_datatables(
    data: &[u8],
    version: &DemoVersion,
    arena: &mut Arena,
) -> Result<DataTablesParsed, DemoError> {
    let mut r = BitReader::new(data);
    let mut parsed = DataTablesParsed::default();

    while r.read_bit() {
        let needs_decoder = r.read_bit();
        let name = intern(arena, &r.read_string());
        let prop_count = r.read_uint(PROP_COUNT_BITS);
        let mut props: Vec<SendProp> = Vec::with_capacity(prop_count as usize);
        for _ in 0..prop_count {
            let prop = parse_prop(&mut r, version, arena, props.last())?;
            props.push(prop);
        }
        if r.overflowed() {
            return Err(DemoError::Overflow {
                context: "send tables",
            });
        }
        parsed.tables.push(SendTable {
            name,
            needs_decoder,
            props,
        });
    }

    let class_count = r.read_uint(CLASS_BITS);
    parsed.classes.reserve(class_count as usize);
    for expected in 0..class_count {
        let id = r.read_uint(CLASS_BITS);
        let name = intern(arena, &r.read_string());
        let table = intern(arena, &r.read_string());
        if r.overflowed() {
            return Err(DemoError::Overflow {
                context: "server classes",
            });
        }
        if id != expected {
            return Err(DemoError::ClassIdMismatch {
                expected: expected as u16,
                found: id as u16,
            });
        }
        parsed.classes.push(ServerClass {
            id: ClassId(id as u16),
            name,
            table,
        });
    }

    if r.overflowed() {
        return Err(DemoError::Overflow {
            context: "data tables",
        });
    }

    debug!(
        tables = parsed.tables.len(),
        classes = parsed.classes.len(),
        "parsed data tables"
    );
    Ok(parsed)
}

fn parse_prop(
    r: &mut BitReader<'_>,
    version: &DemoVersion,
    arena: &mut Arena,
    previous: Option<&SendProp>,
) -> Result<SendProp, DemoError> {
    let tag = r.read_uint(PROP_TYPE_BITS);
    let prop_type =
        PropType::from_wire(tag, version.has_vector2()).ok_or(DemoError::InvalidPropType { tag })?;
    let raw_name = r.read_string();
    let name = intern(arena, &raw_name);
    let flags = PropFlags::from_wire(r.read_uint(version.sendprop_flag_bits), version.game);
    let priority = if version.has_sendprop_priority {
        r.read_uint(8) as u8
    } else {
        DEFAULT_PROP_PRIORITY
    };

    let kind = if prop_type == PropType::DataTable || flags.contains(PropFlags::EXCLUDE) {
        let table = intern(arena, &r.read_string());
        if flags.contains(PropFlags::EXCLUDE) {
            PropKind::Exclude { table }
        } else {
            PropKind::DataTable { table }
        }
    } else if prop_type == PropType::Array {
        let num_elements = r.read_uint(ARRAY_ELEMENTS_BITS);
        let element = previous.ok_or_else(|| DemoError::ArrayWithoutElement {
            prop: String::from_utf8_lossy(&raw_name).into_owned(),
        })?;
        PropKind::Array {
            element: Box::new(element.clone()),
            num_elements,
        }
    } else {
        let info = NumericInfo {
            low: r.read_f32(),
            high: r.read_f32(),
            bits: r.read_uint(version.sendprop_numbits_bits),
        };
        match prop_type {
            PropType::Int => PropKind::Int(info),
            PropType::Float => PropKind::Float(info),
            PropType::Vector3 => PropKind::Vector3(info),
            PropType::Vector2 => PropKind::Vector2(info),
            _ => PropKind::String(info),
        }
    };

    Ok(SendProp {
        name,
        flags,
        priority,
        kind,
    })
}

fn intern(arena: &mut Arena, bytes: &[u8]) -> ArenaStr {
    ArenaStr::intern(arena, Pool::Schema, bytes)
}

// ── Encoding ────────────────────────────────────────────────────

/// Encode tables and classes back into a data-tables payload.
///
/// Names are resolved through `arena`. Array props are written with their
/// element count only; the element descriptor must be the preceding prop,
/// as on the wire.
pub fn encode_datatables(
    parsed: &DataTablesParsed,
    version: &DemoVersion,
    arena: &Arena,
) -> Result<Vec<u8>, ArenaError> {
    let mut w = BitWriter::new();
    for table in &parsed.tables {
        w.write_bit(true);
        w.write_bit(table.needs_decoder);
        w.write_cstring(table.name.resolve(arena)?);
        w.write_uint(table.props.len() as u32, PROP_COUNT_BITS);
        for prop in &table.props {
            encode_prop(&mut w, prop, version, arena)?;
        }
    }
    w.write_bit(false);

    w.write_uint(parsed.classes.len() as u32, CLASS_BITS);
    for class in &parsed.classes {
        w.write_uint(u32::from(class.id.0), CLASS_BITS);
        w.write_cstring(class.name.resolve(arena)?);
        w.write_cstring(class.table.resolve(arena)?);
    }
    Ok(w.into_bytes())
}

fn encode_prop(
    w: &mut BitWriter<'_>,
    prop: &SendProp,
    version: &DemoVersion,
    arena: &Arena,
) -> Result<(), ArenaError> {
    let has_vector2 = version.has_vector2();
    // The type tag of an exclude prop is never read back.
    let prop_type = prop.prop_type().unwrap_or(PropType::Int);
    let tag = prop_type
        .to_wire(has_vector2)
        .or_else(|| PropType::Vector3.to_wire(has_vector2))
        .unwrap_or(0);
    w.write_uint(tag, PROP_TYPE_BITS);
    w.write_cstring(prop.name.resolve(arena)?);
    w.write_uint(prop.flags.to_wire(version.game), version.sendprop_flag_bits);
    if version.has_sendprop_priority {
        w.write_uint(u32::from(prop.priority), 8);
    }

    match &prop.kind {
        PropKind::DataTable { table } | PropKind::Exclude { table } => {
            w.write_cstring(table.resolve(arena)?);
        }
        PropKind::Array { num_elements, .. } => {
            w.write_uint(*num_elements, ARRAY_ELEMENTS_BITS);
        }
        PropKind::Int(info)
        | PropKind::Float(info)
        | PropKind::Vector3(info)
        | PropKind::Vector2(info)
        | PropKind::String(info) => {
            w.write_f32(info.low);
            w.write_f32(info.high);
            w.write_uint(info.bits, version.sendprop_numbits_bits);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoscope_core::{DemoHeader, Game};

    fn portal2() -> DemoVersion {
        let mut h = DemoHeader::new(4, 2001);
        h.game_directory = "portal2".into();
        DemoVersion::from_header(&h)
    }

    fn source2004() -> DemoVersion {
        DemoVersion::from_header(&DemoHeader::new(2, 7))
    }

    fn numeric(arena: &mut Arena, name: &str, kind: fn(NumericInfo) -> PropKind) -> SendProp {
        SendProp {
            name: ArenaStr::intern(arena, Pool::Schema, name.as_bytes()),
            flags: PropFlags::empty(),
            priority: DEFAULT_PROP_PRIORITY,
            kind: kind(NumericInfo {
                low: 0.0,
                high: 1.0,
                bits: 8,
            }),
        }
    }

    fn sample(arena: &mut Arena) -> DataTablesParsed {
        let health = numeric(arena, "m_iHealth", PropKind::Int);
        let mut element = numeric(arena, "000", PropKind::Float);
        element.flags = PropFlags::INSIDEARRAY;
        let array = SendProp {
            name: ArenaStr::intern(arena, Pool::Schema, b"m_flPoseParameter"),
            flags: PropFlags::empty(),
            priority: 64,
            kind: PropKind::Array {
                element: Box::new(element.clone()),
                num_elements: 24,
            },
        };
        let base = SendTable {
            name: ArenaStr::intern(arena, Pool::Schema, b"DT_BaseEntity"),
            needs_decoder: false,
            props: vec![health, element, array],
        };
        let nested = SendProp {
            name: ArenaStr::intern(arena, Pool::Schema, b"baseclass"),
            flags: PropFlags::COLLAPSIBLE,
            priority: DEFAULT_PROP_PRIORITY,
            kind: PropKind::DataTable {
                table: ArenaStr::intern(arena, Pool::Schema, b"DT_BaseEntity"),
            },
        };
        let player = SendTable {
            name: ArenaStr::intern(arena, Pool::Schema, b"DT_Player"),
            needs_decoder: true,
            props: vec![nested],
        };
        DataTablesParsed {
            tables: vec![base, player],
            classes: vec![ServerClass {
                id: ClassId(0),
                name: ArenaStr::intern(arena, Pool::Schema, b"CPlayer"),
                table: ArenaStr::intern(arena, Pool::Schema, b"DT_Player"),
            }],
        }
    }

    fn name(arena: &Arena, s: ArenaStr) -> String {
        String::from_utf8_lossy(s.resolve(arena).unwrap()).into_owned()
    }

    #[test]
    fn encode_then_parse_preserves_structure() {
        let version = portal2();
        let mut src = Arena::with_first_block(256);
        let original = sample(&mut src);
        let bytes = encode_datatables(&original, &version, &src).unwrap();

        let mut arena = Arena::with_first_block(256);
        let parsed = parse_datatables(&bytes, &version, &mut arena).unwrap();
        assert_eq!(parsed.tables.len(), 2);
        assert_eq!(name(&arena, parsed.tables[0].name), "DT_BaseEntity");
        assert!(parsed.tables[1].needs_decoder);

        let array = &parsed.tables[0].props[2];
        assert_eq!(array.priority, 64);
        match &array.kind {
            PropKind::Array {
                element,
                num_elements,
            } => {
                assert_eq!(*num_elements, 24);
                assert!(element.flags.contains(PropFlags::INSIDEARRAY));
                assert_eq!(name(&arena, element.name), "000");
            }
            other => panic!("expected array, got {other:?}"),
        }

        match &parsed.tables[1].props[0].kind {
            PropKind::DataTable { table } => assert_eq!(name(&arena, *table), "DT_BaseEntity"),
            other => panic!("expected datatable, got {other:?}"),
        }
        assert_eq!(name(&arena, parsed.classes[0].name), "CPlayer");
    }

    #[test]
    fn exclude_prop_carries_table() {
        let version = portal2();
        let mut src = Arena::with_first_block(256);
        let exclude = SendProp {
            name: ArenaStr::intern(&mut src, Pool::Schema, b"m_vecOrigin"),
            flags: PropFlags::EXCLUDE,
            priority: DEFAULT_PROP_PRIORITY,
            kind: PropKind::Exclude {
                table: ArenaStr::intern(&mut src, Pool::Schema, b"DT_BaseEntity"),
            },
        };
        let tables = DataTablesParsed {
            tables: vec![SendTable {
                name: ArenaStr::intern(&mut src, Pool::Schema, b"DT_Ragdoll"),
                needs_decoder: false,
                props: vec![exclude],
            }],
            classes: Vec::new(),
        };
        let bytes = encode_datatables(&tables, &version, &src).unwrap();
        let mut arena = Arena::with_first_block(256);
        let parsed = parse_datatables(&bytes, &version, &mut arena).unwrap();
        match &parsed.tables[0].props[0].kind {
            PropKind::Exclude { table } => assert_eq!(name(&arena, *table), "DT_BaseEntity"),
            other => panic!("expected exclude, got {other:?}"),
        }
    }

    #[test]
    fn source2004_has_default_priority() {
        let version = source2004();
        assert_eq!(version.game, Game::Source2004);
        let mut src = Arena::with_first_block(256);
        let mut tables = sample(&mut src);
        tables.tables[0].props[2].priority = DEFAULT_PROP_PRIORITY;
        let bytes = encode_datatables(&tables, &version, &src).unwrap();
        let mut arena = Arena::with_first_block(256);
        let parsed = parse_datatables(&bytes, &version, &mut arena).unwrap();
        assert!(parsed.tables[0]
            .props
            .iter()
            .all(|p| p.priority == DEFAULT_PROP_PRIORITY));
    }

    #[test]
    fn array_without_element_is_rejected() {
        let version = portal2();
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bit(false);
        w.write_cstring(b"DT_Broken");
        w.write_uint(1, PROP_COUNT_BITS);
        w.write_uint(5, PROP_TYPE_BITS);
        w.write_cstring(b"m_hMyWeapons");
        w.write_uint(0, version.sendprop_flag_bits);
        w.write_uint(128, 8);
        w.write_uint(48, ARRAY_ELEMENTS_BITS);
        w.write_bit(false);
        w.write_uint(0, CLASS_BITS);

        let mut arena = Arena::with_first_block(256);
        match parse_datatables(w.as_bytes(), &version, &mut arena) {
            Err(DemoError::ArrayWithoutElement { prop }) => assert_eq!(prop, "m_hMyWeapons"),
            other => panic!("expected ArrayWithoutElement, got {other:?}"),
        }
    }

    #[test]
    fn invalid_type_tag_is_rejected() {
        let version = portal2();
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bit(false);
        w.write_cstring(b"DT_Broken");
        w.write_uint(1, PROP_COUNT_BITS);
        w.write_uint(9, PROP_TYPE_BITS);

        let mut arena = Arena::with_first_block(256);
        assert!(matches!(
            parse_datatables(w.as_bytes(), &version, &mut arena),
            Err(DemoError::InvalidPropType { tag: 9 })
        ));
    }

    #[test]
    fn class_ids_must_be_dense() {
        let version = portal2();
        let mut w = BitWriter::new();
        w.write_bit(false);
        w.write_uint(2, CLASS_BITS);
        w.write_uint(0, CLASS_BITS);
        w.write_cstring(b"CWorld");
        w.write_cstring(b"DT_World");
        w.write_uint(3, CLASS_BITS);
        w.write_cstring(b"CPlayer");
        w.write_cstring(b"DT_Player");

        let mut arena = Arena::with_first_block(256);
        assert!(matches!(
            parse_datatables(w.as_bytes(), &version, &mut arena),
            Err(DemoError::ClassIdMismatch {
                expected: 1,
                found: 3
            })
        ));
    }

    #[test]
    fn truncated_payload_overflows() {
        let version = portal2();
        let mut src = Arena::with_first_block(256);
        let bytes = encode_datatables(&sample(&mut src), &version, &src).unwrap();
        let mut arena = Arena::with_first_block(256);
        let err = parse_datatables(&bytes[..bytes.len() / 2], &version, &mut arena).unwrap_err();
        assert_eq!(err.kind(), demoscope_core::ErrorKind::Truncation);
    }
}
