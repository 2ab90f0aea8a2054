//! Test utilities for demoscope development.
//!
//! Builds synthetic recordings byte by byte so tests can exercise the
//! decoder without shipping real demo files:
//!
//! - [`DemoBuilder`] frames container messages through [`DemoWriter`]
//! - [`SchemaBuilder`] assembles send tables and encodes the data tables
//!   payload
//! - [`NetMessages`] and [`EntityRecords`] write packet payloads
//! - [`fixtures::RecordingHandler`] records every callback as an
//!   [`fixtures::Event`]

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{EntitySnapshot, Event, RecordingHandler};

use demoscope_arena::Arena;
use demoscope_bits::{bits_for, BitReader, BitWriter};
use demoscope_core::id::{ENTITY_INDEX_BITS, ENTITY_SERIAL_BITS, MAX_EDICTS};
use demoscope_core::sendtable::DEFAULT_PROP_PRIORITY;
use demoscope_core::{
    ArenaStr, ClassId, ClassSchema, ConsoleCmd, CustomData, DataTables, DemoHeader, DemoVersion,
    FloatValue, Game, MessageKind, NumericInfo, Packet, Pool, PropFlags, PropKind, PropValue,
    SendProp, SendTable, ServerClass, Stop, StringTables, SyncTick, UserCmd,
};
use demoscope_parser::{encode_datatables, DataTablesParsed, DemoWriter, NetMessageType, UpdateType};

// ── Headers ─────────────────────────────────────────────────────

/// Demo protocol 2, as written by the 2004 engine.
pub fn source2004_header() -> DemoHeader {
    let mut h = DemoHeader::new(2, 7);
    h.game_directory = "cstrike".into();
    h.map_name = "de_dust".into();
    h
}

/// Demo protocol 3, as written by the Orange Box engine.
pub fn orange_box_header() -> DemoHeader {
    let mut h = DemoHeader::new(3, 24);
    h.game_directory = "tf".into();
    h.map_name = "ctf_2fort".into();
    h
}

/// Demo protocol 4, as written by Portal 2.
pub fn portal2_header() -> DemoHeader {
    let mut h = DemoHeader::new(4, 2001);
    h.game_directory = "portal2".into();
    h.map_name = "sp_a1_intro1".into();
    h
}

// ── DemoBuilder ─────────────────────────────────────────────────

/// Frames container messages into an in-memory recording.
pub struct DemoBuilder {
    writer: DemoWriter<Vec<u8>>,
    tick: i32,
}

impl DemoBuilder {
    pub fn new(header: &DemoHeader) -> Self {
        Self {
            writer: DemoWriter::new(Vec::new(), header).expect("writing to a Vec cannot fail"),
            tick: 0,
        }
    }

    pub fn version(&self) -> &DemoVersion {
        self.writer.version()
    }

    /// Tick stamped on the messages that follow.
    pub fn at(&mut self, tick: i32) -> &mut Self {
        self.tick = tick;
        self
    }

    pub fn synctick(&mut self) -> &mut Self {
        let preamble = self.writer.preamble(MessageKind::SyncTick, self.tick, 0);
        self.writer.write_synctick(&SyncTick { preamble }).unwrap();
        self
    }

    pub fn consolecmd(&mut self, data: &[u8]) -> &mut Self {
        let preamble = self.writer.preamble(MessageKind::ConsoleCmd, self.tick, 0);
        self.writer
            .write_consolecmd(&ConsoleCmd { preamble, data })
            .unwrap();
        self
    }

    pub fn customdata(&mut self, unknown: i32, data: &[u8]) -> &mut Self {
        let preamble = self.writer.preamble(MessageKind::CustomData, self.tick, 0);
        self.writer
            .write_customdata(&CustomData {
                preamble,
                unknown,
                data,
            })
            .unwrap();
        self
    }

    pub fn usercmd(&mut self, cmd: i32, data: &[u8]) -> &mut Self {
        let preamble = self.writer.preamble(MessageKind::UserCmd, self.tick, 0);
        self.writer
            .write_usercmd(&UserCmd {
                preamble,
                cmd,
                data,
            })
            .unwrap();
        self
    }

    pub fn datatables(&mut self, data: &[u8]) -> &mut Self {
        let preamble = self.writer.preamble(MessageKind::DataTables, self.tick, 0);
        self.writer
            .write_datatables(&DataTables { preamble, data })
            .unwrap();
        self
    }

    pub fn stringtables(&mut self, data: &[u8]) -> &mut Self {
        let preamble = self.writer.preamble(MessageKind::StringTables, self.tick, 0);
        self.writer
            .write_stringtables(&StringTables { preamble, data })
            .unwrap();
        self
    }

    pub fn packet(&mut self, data: &[u8]) -> &mut Self {
        self.framed_packet(MessageKind::Packet, data)
    }

    pub fn signon(&mut self, data: &[u8]) -> &mut Self {
        self.framed_packet(MessageKind::Signon, data)
    }

    fn framed_packet(&mut self, kind: MessageKind, data: &[u8]) -> &mut Self {
        let preamble = self.writer.preamble(kind, self.tick, 0);
        self.writer
            .write_packet(&Packet {
                preamble,
                cmdinfo: Default::default(),
                in_sequence: self.tick,
                out_sequence: self.tick,
                data,
            })
            .unwrap();
        self
    }

    pub fn stop(&mut self, trailing: &[u8]) -> &mut Self {
        self.writer.write_stop(&Stop { data: trailing }).unwrap();
        self
    }

    /// Bytes written as they are, for corrupt framing.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.writer.write_raw(bytes).unwrap();
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.into_inner().unwrap()
    }
}

// ── SchemaBuilder ───────────────────────────────────────────────

/// Assembles send tables and server classes.
///
/// Classes get consecutive ids in the order they are added.
pub struct SchemaBuilder {
    arena: Arena,
    parsed: DataTablesParsed,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            arena: Arena::with_first_block(4096),
            parsed: DataTablesParsed::default(),
        }
    }

    fn s(&mut self, text: &str) -> ArenaStr {
        ArenaStr::intern(&mut self.arena, Pool::Schema, text.as_bytes())
    }

    fn prop(&mut self, name: &str, flags: PropFlags, kind: PropKind) -> SendProp {
        SendProp {
            name: self.s(name),
            flags,
            priority: DEFAULT_PROP_PRIORITY,
            kind,
        }
    }

    /// Unsigned integer of `bits` width.
    pub fn uint(&mut self, name: &str, bits: u32) -> SendProp {
        self.prop(name, PropFlags::UNSIGNED, PropKind::Int(numeric(bits)))
    }

    /// Signed integer of `bits` width.
    pub fn int(&mut self, name: &str, bits: u32) -> SendProp {
        self.prop(name, PropFlags::empty(), PropKind::Int(numeric(bits)))
    }

    /// Float sent as raw IEEE-754.
    pub fn noscale(&mut self, name: &str) -> SendProp {
        self.prop(name, PropFlags::NOSCALE, PropKind::Float(numeric(32)))
    }

    /// Quantized float over `[low, high]`.
    pub fn quantized(&mut self, name: &str, bits: u32, low: f32, high: f32) -> SendProp {
        let info = NumericInfo { low, high, bits };
        self.prop(name, PropFlags::empty(), PropKind::Float(info))
    }

    /// Vector of raw floats.
    pub fn vector(&mut self, name: &str) -> SendProp {
        self.prop(name, PropFlags::NOSCALE, PropKind::Vector3(numeric(32)))
    }

    pub fn string(&mut self, name: &str) -> SendProp {
        self.prop(name, PropFlags::empty(), PropKind::String(numeric(0)))
    }

    /// Reference to `table`, expanded as its own subtree.
    pub fn nested(&mut self, table: &str) -> SendProp {
        let table = self.s(table);
        SendProp {
            name: table,
            flags: PropFlags::empty(),
            priority: DEFAULT_PROP_PRIORITY,
            kind: PropKind::DataTable { table },
        }
    }

    /// Reference to `table`, expanded inline.
    pub fn collapsible(&mut self, table: &str) -> SendProp {
        let mut prop = self.nested(table);
        prop.flags = PropFlags::COLLAPSIBLE;
        prop
    }

    /// Drops `(table, prop)` from the flattened schema.
    pub fn exclude(&mut self, table: &str, prop: &str) -> SendProp {
        let table = self.s(table);
        self.prop(prop, PropFlags::EXCLUDE, PropKind::Exclude { table })
    }

    pub fn table(&mut self, name: &str, props: Vec<SendProp>) -> &mut Self {
        let name = self.s(name);
        self.parsed.tables.push(SendTable {
            name,
            needs_decoder: false,
            props,
        });
        self
    }

    pub fn class(&mut self, name: &str, table: &str) -> &mut Self {
        let id = ClassId(self.parsed.classes.len() as u16);
        let name = self.s(name);
        let table = self.s(table);
        self.parsed.classes.push(ServerClass { id, name, table });
        self
    }

    /// The data tables payload for `version`.
    pub fn encode(&self, version: &DemoVersion) -> Vec<u8> {
        encode_datatables(&self.parsed, version, &self.arena).unwrap()
    }

    pub fn parsed(&self) -> &DataTablesParsed {
        &self.parsed
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}

fn numeric(bits: u32) -> NumericInfo {
    NumericInfo {
        low: 0.0,
        high: 0.0,
        bits,
    }
}

// ── Values ──────────────────────────────────────────────────────

/// Encode `value` the way a prop of `prop`'s type is decoded.
///
/// # Panics
///
/// On encodings the fixtures do not need: coordinates, normals and cell
/// coordinates, or a value that does not match the prop type.
pub fn write_value(w: &mut BitWriter<'_>, prop: &SendProp, value: &PropValue) {
    match (&prop.kind, value) {
        (PropKind::Int(info), PropValue::Int(v)) => {
            let bits = info.bits.min(32);
            if prop.flags.contains(PropFlags::UNSIGNED) {
                w.write_uint(*v as u32, bits);
            } else {
                w.write_sint(*v as i32, bits);
            }
        }
        (PropKind::Float(info), PropValue::Float(v)) => write_float(w, prop.flags, info, *v),
        (PropKind::Vector3(info), PropValue::Vector3(v)) => {
            assert!(!prop.flags.contains(PropFlags::NORMAL), "normals unsupported");
            v.iter().for_each(|c| write_float(w, prop.flags, info, *c));
        }
        (PropKind::Vector2(info), PropValue::Vector2(v)) => {
            v.iter().for_each(|c| write_float(w, prop.flags, info, *c));
        }
        (PropKind::String(_), PropValue::String(bytes)) => {
            w.write_uint(bytes.len() as u32, 9);
            w.write_bytes(bytes);
        }
        (
            PropKind::Array {
                element,
                num_elements,
            },
            PropValue::Array(items),
        ) => {
            w.write_uint(items.len() as u32, bits_for(*num_elements));
            items.iter().for_each(|item| write_value(w, element, item));
        }
        (kind, value) => panic!("cannot encode {value:?} as {kind:?}"),
    }
}

fn write_float(w: &mut BitWriter<'_>, flags: PropFlags, info: &NumericInfo, value: FloatValue) {
    let special = PropFlags::COORD
        | PropFlags::COORD_MP
        | PropFlags::COORD_MP_LOWPRECISION
        | PropFlags::COORD_MP_INTEGRAL
        | PropFlags::NORMAL
        | PropFlags::CELL_COORD
        | PropFlags::CELL_COORD_LOWPRECISION
        | PropFlags::CELL_COORD_INTEGRAL;
    assert!(!flags.intersects(special), "unsupported float encoding {flags:?}");
    match value {
        FloatValue::Exact(v) if flags.contains(PropFlags::NOSCALE) => w.write_f32(v),
        FloatValue::Quantized(raw) if !flags.contains(PropFlags::NOSCALE) => {
            w.write_uint(raw, info.bits.min(32))
        }
        other => panic!("{other:?} does not match flags {flags:?}"),
    }
}

// ── Entity records ──────────────────────────────────────────────

/// Finished update records of one packet-entities message.
#[derive(Clone, Debug)]
pub struct EntityBlob {
    pub bytes: Vec<u8>,
    pub bits: usize,
    pub count: u32,
    pub is_delta: bool,
}

/// Writes packet-entities update records for a schema.
pub struct EntityRecords<'v> {
    w: BitWriter<'static>,
    version: &'v DemoVersion,
    class_bits: u32,
    last: i64,
    count: u32,
}

impl<'v> EntityRecords<'v> {
    pub fn new(version: &'v DemoVersion, class_bits: u32) -> Self {
        Self {
            w: BitWriter::new(),
            version,
            class_bits,
            last: -1,
            count: 0,
        }
    }

    fn header(&mut self, index: u16, ty: UpdateType) {
        let step = i64::from(index) - self.last - 1;
        assert!(step >= 0, "records must ascend");
        self.w.write_ubitvar(step as u32);
        self.w.write_uint(ty.to_bits(), 2);
        self.last = i64::from(index);
        self.count += 1;
    }

    fn props(&mut self, schema: &ClassSchema, props: &[(usize, PropValue)]) {
        let new_way = self.version.has_new_way_field_index();
        if new_way {
            self.w.write_bit(true);
        }
        let mut last = -1;
        if self.version.game.is_new_engine() {
            for &(i, _) in props {
                self.w.write_field_index(Some(i as i32), last, new_way);
                last = i as i32;
            }
            self.w.write_field_index(None, last, new_way);
            for (i, value) in props {
                write_value(&mut self.w, &schema.props[*i].prop, value);
            }
        } else {
            for (i, value) in props {
                self.w.write_field_index(Some(*i as i32), last, new_way);
                write_value(&mut self.w, &schema.props[*i].prop, value);
                last = *i as i32;
            }
            self.w.write_field_index(None, last, new_way);
        }
    }

    pub fn enter(
        &mut self,
        schema: &ClassSchema,
        index: u16,
        serial: u32,
        props: &[(usize, PropValue)],
    ) -> &mut Self {
        self.header(index, UpdateType::EnterPvs);
        self.w
            .write_uint(u32::from(schema.class_id.0), self.class_bits);
        self.w.write_uint(serial, ENTITY_SERIAL_BITS);
        self.props(schema, props);
        self
    }

    pub fn delta(&mut self, schema: &ClassSchema, index: u16, props: &[(usize, PropValue)]) -> &mut Self {
        self.header(index, UpdateType::Delta);
        self.props(schema, props);
        self
    }

    pub fn leave(&mut self, index: u16) -> &mut Self {
        self.header(index, UpdateType::LeavePvs);
        self
    }

    pub fn delete(&mut self, index: u16) -> &mut Self {
        self.header(index, UpdateType::Delete);
        self
    }

    /// Close the records. `deletes` is the trailing delete list, written
    /// only for delta snapshots.
    pub fn finish(self, is_delta: bool, deletes: &[u16]) -> EntityBlob {
        let mut w = self.w;
        if is_delta {
            for &d in deletes {
                w.write_bit(true);
                w.write_uint(u32::from(d), ENTITY_INDEX_BITS);
            }
            w.write_bit(false);
        }
        let bits = w.bit_offset();
        EntityBlob {
            bytes: w.into_bytes(),
            bits,
            count: self.count,
            is_delta,
        }
    }
}

// ── Net messages ────────────────────────────────────────────────

/// Writes a packet payload one net message at a time.
pub struct NetMessages {
    w: BitWriter<'static>,
    version: DemoVersion,
}

impl NetMessages {
    pub fn new(version: &DemoVersion) -> Self {
        Self {
            w: BitWriter::new(),
            version: *version,
        }
    }

    fn id(&mut self, ty: NetMessageType) {
        let id = ty
            .to_id(&self.version)
            .unwrap_or_else(|| panic!("{ty} has no id on {}", self.version));
        self.w.write_uint(id, self.version.net_message_type_bits);
    }

    pub fn nop(&mut self) -> &mut Self {
        self.id(NetMessageType::Nop);
        self
    }

    pub fn tick(&mut self, tick: i32) -> &mut Self {
        self.id(NetMessageType::Tick);
        self.w.write_sint(tick, 32);
        if self.version.game != Game::Source2004 {
            self.w.write_uint(1500, 16);
            self.w.write_uint(25, 16);
        }
        self
    }

    pub fn print(&mut self, text: &str) -> &mut Self {
        self.id(NetMessageType::Print);
        self.w.write_cstring(text.as_bytes());
        self
    }

    pub fn string_cmd(&mut self, command: &str) -> &mut Self {
        self.id(NetMessageType::StringCmd);
        self.w.write_cstring(command.as_bytes());
        self
    }

    pub fn packet_entities(&mut self, blob: &EntityBlob) -> &mut Self {
        self.id(NetMessageType::PacketEntities);
        self.w.write_uint(MAX_EDICTS - 1, ENTITY_INDEX_BITS);
        self.w.write_bit(blob.is_delta);
        if blob.is_delta {
            self.w.write_sint(1, 32);
        }
        self.w.write_bit(false);
        self.w.write_uint(blob.count, ENTITY_INDEX_BITS);
        self.w.write_uint(blob.bits as u32, 20);
        self.w.write_bit(false);
        self.w
            .write_bitstream(&BitReader::with_bit_len(&blob.bytes, blob.bits));
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.w.into_bytes()
    }
}
