//! Streaming decoder for Source-engine demo recordings.
//!
//! A recording is a fixed 1072-byte header followed by framed messages.
//! [`DemoParser`] reads them in order and calls back into a
//! [`DemoHandler`] for the kinds the handler asked for through
//! [`DemoHandler::interests`]. Everything else is skipped on the input.
//!
//! # Architecture
//!
//! - [`parser`] frames messages and dispatches them
//! - [`datatables`] and [`flatten`] turn send tables into per-class schemas
//! - [`netmessages`] splits packet payloads into net messages
//! - [`entities`] applies packet entity deltas to an [`EntityTracker`]
//! - [`stringtables`] decodes string table snapshots
//! - [`writer`] frames messages back into a recording
//!
//! Decoded names are interned in session arenas and handed out as
//! [`ArenaStr`](demoscope_core::ArenaStr) handles; resolve them through the
//! [`HandlerContext`] passed to every callback.
//!
//! # Format
//!
//! ```text
//! [header 1072 bytes]
//! [kind u8] [tick i32] [slot u8, protocol 4+] [kind-specific body]
//! ...
//! [stop kind u8] [anything]
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod datatables;
pub mod entities;
pub mod flatten;
pub mod handler;
pub mod netmessages;
pub mod parser;
pub mod props;
pub mod source;
pub mod stringtables;
pub mod writer;

pub use config::{ConfigError, ParserConfig};
pub use datatables::{encode_datatables, parse_datatables, DataTablesParsed};
pub use entities::{
    decode_packet_entities, EntityState, EntityTracker, EntityUpdate, PacketEntitiesParsed,
    PropUpdate, UpdateType,
};
pub use flatten::flatten;
pub use handler::{DemoHandler, Flow, HandlerContext, Interests};
pub use netmessages::{
    parse_net_messages, MapHash, NetMessage, NetMessageType, PacketEntities, ServerInfo,
};
pub use parser::{parse, DemoParser, DemoState, ParseOutcome};
pub use stringtables::{parse_stringtables, StringTable, StringTableEntry, StringTablesParsed};
pub use writer::DemoWriter;
