//! Send-table schema types.
//!
//! A recording describes every networked entity class as a tree of
//! [`SendTable`]s. Flattening turns each class's tree into one ordered list
//! of [`FlatProp`]s, collected into a [`SchemaSet`] that entity deltas index
//! into.

use std::fmt;

use bitflags::bitflags;

use crate::id::ClassId;
use crate::text::ArenaStr;
use crate::value::FloatValue;
use crate::version::Game;

bitflags! {
    /// Send-prop flags in a branch-independent layout.
    ///
    /// The bit positions follow the demo protocol 4 engines. Older branches
    /// are remapped by [`PropFlags::from_wire`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PropFlags: u32 {
        /// Integer is unsigned.
        const UNSIGNED = 1 << 0;
        /// Float is a world coordinate.
        const COORD = 1 << 1;
        /// Float is sent as raw IEEE-754.
        const NOSCALE = 1 << 2;
        /// Quantization rounds down.
        const ROUNDDOWN = 1 << 3;
        /// Quantization rounds up.
        const ROUNDUP = 1 << 4;
        /// Float or vector is a unit normal.
        const NORMAL = 1 << 5;
        /// Prop names a `(table, prop)` pair to drop during flattening.
        const EXCLUDE = 1 << 6;
        /// Vector carries a fourth component (unused on the wire).
        const XYZE = 1 << 7;
        /// Prop only describes an array element.
        const INSIDEARRAY = 1 << 8;
        /// Table proxy always sends.
        const PROXY_ALWAYS_YES = 1 << 9;
        /// Prop is one component of a vector.
        const IS_VECTOR_ELEM = 1 << 10;
        /// Nested table is expanded inline.
        const COLLAPSIBLE = 1 << 11;
        /// Multiplayer coordinate.
        const COORD_MP = 1 << 12;
        /// Low-precision multiplayer coordinate.
        const COORD_MP_LOWPRECISION = 1 << 13;
        /// Integral multiplayer coordinate.
        const COORD_MP_INTEGRAL = 1 << 14;
        /// Cell-relative coordinate.
        const CELL_COORD = 1 << 15;
        /// Low-precision cell-relative coordinate.
        const CELL_COORD_LOWPRECISION = 1 << 16;
        /// Integral cell-relative coordinate.
        const CELL_COORD_INTEGRAL = 1 << 17;
        /// Prop changes often; sorted into the early priority tier.
        const CHANGES_OFTEN = 1 << 18;
    }
}

/// Flags shared by every branch in bits 0..10.
const SHARED_FLAG_MASK: u32 = (1 << 10) - 1;

impl PropFlags {
    /// Decode a raw flag field as laid out by `game`.
    pub fn from_wire(raw: u32, game: Game) -> Self {
        let shared = PropFlags::from_bits_truncate(raw & SHARED_FLAG_MASK);
        let remapped = match game {
            Game::Source2004 | Game::Source2007 => {
                let bit = |n: u32, flag: PropFlags| {
                    if raw & (1 << n) != 0 {
                        flag
                    } else {
                        PropFlags::empty()
                    }
                };
                let mut f = bit(10, Self::CHANGES_OFTEN)
                    | bit(11, Self::IS_VECTOR_ELEM)
                    | bit(12, Self::COLLAPSIBLE);
                if game == Game::Source2007 {
                    f |= bit(13, Self::COORD_MP)
                        | bit(14, Self::COORD_MP_LOWPRECISION)
                        | bit(15, Self::COORD_MP_INTEGRAL);
                }
                f
            }
            _ => PropFlags::from_bits_truncate(raw & !SHARED_FLAG_MASK),
        };
        shared | remapped
    }

    /// Encode into the raw layout used by `game`. Flags the branch cannot
    /// express are dropped.
    pub fn to_wire(self, game: Game) -> u32 {
        let shared = self.bits() & SHARED_FLAG_MASK;
        match game {
            Game::Source2004 | Game::Source2007 => {
                let mut mapping = vec![
                    (Self::CHANGES_OFTEN, 10),
                    (Self::IS_VECTOR_ELEM, 11),
                    (Self::COLLAPSIBLE, 12),
                ];
                if game == Game::Source2007 {
                    mapping.extend([
                        (Self::COORD_MP, 13),
                        (Self::COORD_MP_LOWPRECISION, 14),
                        (Self::COORD_MP_INTEGRAL, 15),
                    ]);
                }
                mapping
                    .into_iter()
                    .filter(|(flag, _)| self.contains(*flag))
                    .fold(shared, |acc, (_, n)| acc | (1 << n))
            }
            _ => self.bits(),
        }
    }
}

/// Wire type tag of a send prop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropType {
    /// Integer.
    Int,
    /// Float.
    Float,
    /// Three floats.
    Vector3,
    /// Two floats.
    Vector2,
    /// Length-prefixed string.
    String,
    /// Counted array of the preceding prop.
    Array,
    /// Nested table reference.
    DataTable,
}

impl PropType {
    /// Decode a type tag. Branches without a 2-vector type number the
    /// later tags one lower.
    pub fn from_wire(raw: u32, has_vector2: bool) -> Option<Self> {
        let ty = match (raw, has_vector2) {
            (0, _) => Self::Int,
            (1, _) => Self::Float,
            (2, _) => Self::Vector3,
            (3, true) => Self::Vector2,
            (3, false) | (4, true) => Self::String,
            (4, false) | (5, true) => Self::Array,
            (5, false) | (6, true) => Self::DataTable,
            _ => return None,
        };
        Some(ty)
    }

    /// Encode a type tag. `None` for a 2-vector on a branch without one.
    pub fn to_wire(self, has_vector2: bool) -> Option<u32> {
        let shift = u32::from(has_vector2);
        match self {
            Self::Int => Some(0),
            Self::Float => Some(1),
            Self::Vector3 => Some(2),
            Self::Vector2 => has_vector2.then_some(3),
            Self::String => Some(3 + shift),
            Self::Array => Some(4 + shift),
            Self::DataTable => Some(5 + shift),
        }
    }
}

/// Quantization range of a numeric prop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NumericInfo {
    /// Value of raw 0.
    pub low: f32,
    /// Value of the all-ones raw pattern.
    pub high: f32,
    /// Encoded width in bits.
    pub bits: u32,
}

/// Per-type payload of a [`SendProp`].
#[derive(Clone, Debug, PartialEq)]
pub enum PropKind {
    /// Integer.
    Int(NumericInfo),
    /// Float.
    Float(NumericInfo),
    /// Three-component vector.
    Vector3(NumericInfo),
    /// Two-component vector.
    Vector2(NumericInfo),
    /// String; the range is carried on the wire but unused.
    String(NumericInfo),
    /// Counted array.
    Array {
        /// Element descriptor.
        element: Box<SendProp>,
        /// Maximum element count.
        num_elements: u32,
    },
    /// Reference to another table.
    DataTable {
        /// Referenced table name.
        table: ArenaStr,
    },
    /// Removes `(table, prop name)` from the flattened schema.
    Exclude {
        /// Table the excluded prop belongs to.
        table: ArenaStr,
    },
}

/// Default priority for branches that do not send one.
pub const DEFAULT_PROP_PRIORITY: u8 = 128;

/// Priority tier that changes-often props are sorted into.
pub const CHANGES_OFTEN_PRIORITY: u8 = 64;

/// One schema field.
#[derive(Clone, Debug, PartialEq)]
pub struct SendProp {
    /// Field name.
    pub name: ArenaStr,
    /// Branch-independent flags.
    pub flags: PropFlags,
    /// Sort priority; lower values are sent first.
    pub priority: u8,
    /// Type-specific details.
    pub kind: PropKind,
}

impl SendProp {
    /// The wire type of this prop, if it describes a value.
    pub fn prop_type(&self) -> Option<PropType> {
        match self.kind {
            PropKind::Int(_) => Some(PropType::Int),
            PropKind::Float(_) => Some(PropType::Float),
            PropKind::Vector3(_) => Some(PropType::Vector3),
            PropKind::Vector2(_) => Some(PropType::Vector2),
            PropKind::String(_) => Some(PropType::String),
            PropKind::Array { .. } => Some(PropType::Array),
            PropKind::DataTable { .. } => Some(PropType::DataTable),
            PropKind::Exclude { .. } => None,
        }
    }

    /// Quantization range, for numeric props.
    pub fn numeric(&self) -> Option<&NumericInfo> {
        match &self.kind {
            PropKind::Int(n)
            | PropKind::Float(n)
            | PropKind::Vector3(n)
            | PropKind::Vector2(n)
            | PropKind::String(n) => Some(n),
            _ => None,
        }
    }

    /// Convert a decoded float to its value. Quantized values are mapped
    /// linearly from `0..=2^bits-1` onto `low..=high`.
    pub fn to_float(&self, value: FloatValue) -> f32 {
        match value {
            FloatValue::Exact(v) => v,
            FloatValue::Quantized(raw) => {
                let Some(info) = self.numeric() else {
                    return raw as f32;
                };
                if info.bits == 0 {
                    return info.low;
                }
                let steps = ((1u64 << info.bits.min(32)) - 1) as f64;
                let span = f64::from(info.high) - f64::from(info.low);
                (f64::from(info.low) + span * f64::from(raw) / steps) as f32
            }
        }
    }
}

/// A named list of send props.
#[derive(Clone, Debug, PartialEq)]
pub struct SendTable {
    /// Table name, e.g. `DT_BasePlayer`.
    pub name: ArenaStr,
    /// Whether the client needs a decoder for this table.
    pub needs_decoder: bool,
    /// Props in declaration order.
    pub props: Vec<SendProp>,
}

/// Binds a class id to its root table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerClass {
    /// Dense class id.
    pub id: ClassId,
    /// Class name, e.g. `CBasePlayer`.
    pub name: ArenaStr,
    /// Root table name.
    pub table: ArenaStr,
}

/// A flattened prop and the table it was declared in.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatProp {
    /// The prop descriptor.
    pub prop: SendProp,
    /// Declaring table.
    pub owner: ArenaStr,
}

/// The ordered prop list entity deltas for one class index into.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassSchema {
    /// Dense class id.
    pub class_id: ClassId,
    /// Class name.
    pub class_name: ArenaStr,
    /// Root table name.
    pub table_name: ArenaStr,
    /// Props in wire order.
    pub props: Vec<FlatProp>,
}

/// Flattened schemas for every class, indexed by class id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaSet {
    classes: Vec<ClassSchema>,
    class_bits: u32,
}

impl SchemaSet {
    /// Build from schemas ordered by class id.
    pub fn new(classes: Vec<ClassSchema>) -> Self {
        let class_bits = demoscope_bits::bits_for(classes.len() as u32);
        Self {
            classes,
            class_bits,
        }
    }

    /// Schema for `id`.
    pub fn get(&self, id: ClassId) -> Option<&ClassSchema> {
        self.classes.get(usize::from(id.0))
    }

    /// Width of a class id in entity enter records.
    pub fn class_bits(&self) -> u32 {
        self.class_bits
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether there are no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All schemas in class id order.
    pub fn iter(&self) -> std::slice::Iter<'_, ClassSchema> {
        self.classes.iter()
    }
}

impl fmt::Display for PropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Vector3 => "vec3",
            Self::Vector2 => "vec2",
            Self::String => "string",
            Self::Array => "array",
            Self::DataTable => "datatable",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::Pool;

    fn float_prop(low: f32, high: f32, bits: u32) -> SendProp {
        SendProp {
            name: ArenaStr::empty(Pool::Schema),
            flags: PropFlags::empty(),
            priority: DEFAULT_PROP_PRIORITY,
            kind: PropKind::Float(NumericInfo { low, high, bits }),
        }
    }

    #[test]
    fn new_engine_flags_are_identity() {
        let raw = (1 << 18) | (1 << 15) | 1;
        let flags = PropFlags::from_wire(raw, Game::Portal2);
        assert_eq!(
            flags,
            PropFlags::CHANGES_OFTEN | PropFlags::CELL_COORD | PropFlags::UNSIGNED
        );
        assert_eq!(flags.to_wire(Game::Portal2), raw);
    }

    #[test]
    fn orange_box_flags_are_remapped() {
        let raw = (1 << 10) | (1 << 12) | (1 << 13) | (1 << 6);
        let flags = PropFlags::from_wire(raw, Game::Source2007);
        assert_eq!(
            flags,
            PropFlags::CHANGES_OFTEN
                | PropFlags::COLLAPSIBLE
                | PropFlags::COORD_MP
                | PropFlags::EXCLUDE
        );
        assert_eq!(flags.to_wire(Game::Source2007), raw);
    }

    #[test]
    fn source2004_has_no_mp_coords() {
        let raw = (1 << 13) | (1 << 11);
        let flags = PropFlags::from_wire(raw, Game::Source2004);
        assert_eq!(flags, PropFlags::IS_VECTOR_ELEM);
    }

    #[test]
    fn type_tags_shift_without_vector2() {
        assert_eq!(PropType::from_wire(3, true), Some(PropType::Vector2));
        assert_eq!(PropType::from_wire(3, false), Some(PropType::String));
        assert_eq!(PropType::from_wire(5, false), Some(PropType::DataTable));
        assert_eq!(PropType::from_wire(6, false), None);
        assert_eq!(PropType::from_wire(7, true), None);
        assert_eq!(PropType::Vector2.to_wire(false), None);
        assert_eq!(PropType::Array.to_wire(true), Some(5));
    }

    #[test]
    fn quantized_float_maps_onto_range() {
        let p = float_prop(-100.0, 100.0, 8);
        assert_eq!(p.to_float(FloatValue::Quantized(0)), -100.0);
        assert_eq!(p.to_float(FloatValue::Quantized(255)), 100.0);
        assert_eq!(p.to_float(FloatValue::Exact(3.5)), 3.5);
    }

    #[test]
    fn schema_set_class_bits() {
        assert_eq!(SchemaSet::new(Vec::new()).class_bits(), 1);
        let schema = |id: u16| ClassSchema {
            class_id: ClassId(id),
            class_name: ArenaStr::empty(Pool::Schema),
            table_name: ArenaStr::empty(Pool::Schema),
            props: Vec::new(),
        };
        let set = SchemaSet::new((0..5).map(schema).collect());
        assert_eq!(set.class_bits(), 3);
        assert_eq!(set.get(ClassId(4)).map(|s| s.class_id), Some(ClassId(4)));
        assert!(set.get(ClassId(5)).is_none());
    }
}
