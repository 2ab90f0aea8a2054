//! Core types for decoding Source-engine demo recordings.
//!
//! This crate holds the vocabulary shared by the decoder and its handlers:
//! the file header, the per-recording [`DemoVersion`], borrowed views of
//! container messages, send-table schema types, decoded prop values, ids
//! and the [`DemoError`] taxonomy. It performs no I/O.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod header;
pub mod id;
pub mod message;
pub mod sendtable;
pub mod text;
pub mod value;
pub mod version;

pub use error::{DemoError, ErrorKind};
pub use header::{DemoHeader, DEMO_MAGIC, HEADER_SIZE};
pub use id::{ClassId, EntityHandle, EntityIndex, Tick};
pub use message::{
    CmdInfo, ConsoleCmd, CustomData, DataTables, MessageKind, Packet, Preamble, Stop,
    StringTables, SyncTick, UserCmd,
};
pub use sendtable::{
    ClassSchema, FlatProp, NumericInfo, PropFlags, PropKind, PropType, SchemaSet, SendProp,
    SendTable, ServerClass,
};
pub use text::{ArenaStr, Pool};
pub use value::{FloatValue, PropValue};
pub use version::{DemoVersion, Game};
