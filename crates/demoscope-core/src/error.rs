//! Error types for demo decoding.
//!
//! Every [`DemoError`] is terminal for the decode session. [`ErrorKind`]
//! groups them into malformed data, truncated data and I/O failures.

use std::error::Error;
use std::fmt;
use std::io;

use demoscope_arena::ArenaError;

use crate::id::{ClassId, EntityIndex};
use crate::message::MessageKind;

/// Broad category of a [`DemoError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input violates the format.
    Format,
    /// The input ended early or a bit stream was over-read.
    Truncation,
    /// The underlying reader or writer failed.
    Io,
}

/// Errors that end a decode session.
#[derive(Debug)]
pub enum DemoError {
    /// An I/O error other than end of input.
    Io(io::Error),
    /// A decoded name no longer resolves in its arena.
    Arena(ArenaError),
    /// The header does not start with `HL2DEMO`.
    InvalidMagic {
        /// The identifier found.
        found: [u8; 8],
    },
    /// A container kind byte is not defined for this protocol.
    InvalidMessageType {
        /// The byte read.
        kind: u8,
    },
    /// A length prefix is negative or above the ceiling.
    InvalidLength {
        /// Message the length belongs to.
        kind: MessageKind,
        /// The declared length.
        length: i32,
    },
    /// A console command declared zero length.
    EmptyConsoleCmd,
    /// Input ended inside a message or the header.
    Truncated,
    /// A bit stream was read past its end.
    Overflow {
        /// What was being decoded.
        context: &'static str,
    },
    /// A send table references itself through its nested tables.
    CyclicTable {
        /// Table at which the cycle closed.
        table: String,
    },
    /// A table name does not resolve.
    UnknownTable {
        /// The unresolved name.
        table: String,
    },
    /// A send-prop type tag is not defined for this protocol.
    InvalidPropType {
        /// The raw tag.
        tag: u32,
    },
    /// An array prop has no preceding element descriptor.
    ArrayWithoutElement {
        /// Name of the array prop.
        prop: String,
    },
    /// Server class ids are not dense.
    ClassIdMismatch {
        /// Expected id (the class's position).
        expected: u16,
        /// Id found.
        found: u16,
    },
    /// A class id has no schema.
    UnknownClass {
        /// The class id.
        class_id: ClassId,
    },
    /// An entity delta references a prop past the end of its schema.
    PropIndexOutOfRange {
        /// Entity being decoded.
        entity: EntityIndex,
        /// The prop index.
        index: i32,
        /// Props in the schema.
        count: usize,
    },
    /// A prop that carries no value appeared in a flattened schema.
    NonValueProp {
        /// Prop name.
        prop: String,
    },
    /// An array value declares more elements than its prop allows.
    ArrayTooLong {
        /// Declared count.
        count: u32,
        /// Maximum.
        max: u32,
    },
    /// A delta update targets an entity that is not tracked.
    UnknownEntity {
        /// The entity index.
        index: EntityIndex,
    },
    /// An entity index is outside `0..2048`.
    EntityIndexOutOfRange {
        /// The index.
        index: i32,
    },
    /// A net message id is not defined for this protocol.
    UnknownNetMessage {
        /// The id.
        id: u32,
    },
}

impl DemoError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Truncated | Self::Overflow { .. } => ErrorKind::Truncation,
            _ => ErrorKind::Format,
        }
    }
}

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::InvalidMagic { found } => {
                write!(f, "invalid demo magic {:?}", String::from_utf8_lossy(found))
            }
            Self::InvalidMessageType { kind } => write!(f, "invalid message type {kind}"),
            Self::InvalidLength { kind, length } => {
                write!(f, "invalid length {length} for {kind} message")
            }
            Self::EmptyConsoleCmd => write!(f, "invalid consolecmd length 0"),
            Self::Truncated => write!(f, "message could not be read fully, reached end of input"),
            Self::Overflow { context } => write!(f, "bit stream overflowed while parsing {context}"),
            Self::CyclicTable { table } => write!(f, "send table {table} references itself"),
            Self::UnknownTable { table } => write!(f, "unknown send table {table}"),
            Self::InvalidPropType { tag } => write!(f, "invalid send prop type {tag}"),
            Self::ArrayWithoutElement { prop } => {
                write!(f, "array prop {prop} has no element descriptor")
            }
            Self::ClassIdMismatch { expected, found } => {
                write!(f, "server class id {found} at position {expected}")
            }
            Self::UnknownClass { class_id } => write!(f, "no schema for class {class_id}"),
            Self::PropIndexOutOfRange {
                entity,
                index,
                count,
            } => {
                write!(
                    f,
                    "prop index {index} out of range for entity {entity} ({count} props)"
                )
            }
            Self::NonValueProp { prop } => write!(f, "prop {prop} carries no value"),
            Self::ArrayTooLong { count, max } => {
                write!(f, "array of {count} elements exceeds maximum {max}")
            }
            Self::UnknownEntity { index } => write!(f, "delta for untracked entity {index}"),
            Self::EntityIndexOutOfRange { index } => {
                write!(f, "entity index {index} out of range")
            }
            Self::UnknownNetMessage { id } => write!(f, "unknown net message type {id}"),
        }
    }
}

impl Error for DemoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DemoError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(e)
        }
    }
}

impl From<ArenaError> for DemoError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_truncation() {
        let e: DemoError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(e, DemoError::Truncated));
        assert_eq!(e.kind(), ErrorKind::Truncation);
    }

    #[test]
    fn other_io_errors_are_io() {
        let e: DemoError = io::Error::other("disk on fire").into();
        assert_eq!(e.kind(), ErrorKind::Io);
    }

    #[test]
    fn length_message_names_kind() {
        let e = DemoError::InvalidLength {
            kind: MessageKind::Packet,
            length: 1 << 26,
        };
        assert_eq!(e.kind(), ErrorKind::Format);
        assert_eq!(e.to_string(), "invalid length 67108864 for packet message");
    }
}
