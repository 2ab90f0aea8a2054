//! demoscope: a streaming decoder for Source-engine demo recordings.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the demoscope sub-crates. For most users, adding `demoscope` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use demoscope::prelude::*;
//!
//! // Counts console commands and stops at the first "disconnect".
//! #[derive(Default)]
//! struct Commands {
//!     seen: usize,
//! }
//!
//! impl DemoHandler for Commands {
//!     fn interests(&self) -> Interests {
//!         Interests::CONSOLECMD
//!     }
//!
//!     fn on_consolecmd(&mut self, _ctx: &HandlerContext<'_>, cmd: &ConsoleCmd<'_>) -> Flow {
//!         self.seen += 1;
//!         if cmd.command() == b"disconnect" {
//!             Flow::Stop
//!         } else {
//!             Flow::Continue
//!         }
//!     }
//! }
//!
//! // Anything that implements `std::io::Read` works; a file is the usual
//! // source. This one is only a header, so the session ends cleanly
//! // without invoking the handler.
//! let bytes = DemoWriter::new(Vec::new(), &DemoHeader::new(3, 24))
//!     .unwrap()
//!     .into_inner()
//!     .unwrap();
//!
//! let mut handler = Commands::default();
//! let outcome = parse(bytes.as_slice(), &mut handler);
//! assert_eq!(outcome.state, DemoState::EndOfInput);
//! assert_eq!(handler.seen, 0);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `demoscope-arena` | Chained-block arena and the message scratch buffer |
//! | [`bits`] | `demoscope-bits` | Bit reader and writer, coordinates and varints |
//! | [`types`] | `demoscope-core` | Header, versions, messages, send tables, values, errors |
//! | [`parser`] | `demoscope-parser` | Message loop, handler trait, schemas and entities |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use demoscope_core::DemoError;
use demoscope_parser::{DemoHandler, DemoState, ParseOutcome};

/// Arena storage for decoded names (`demoscope-arena`).
pub use demoscope_arena as arena;

/// Bit-granularity reading and writing (`demoscope-bits`).
pub use demoscope_bits as bits;

/// Header, version, message and schema types (`demoscope-core`).
///
/// Errors live here too: [`types::DemoError`] and its
/// [`types::ErrorKind`].
pub use demoscope_core as types;

/// The message loop and everything it decodes (`demoscope-parser`).
///
/// [`parser::DemoParser`] drives a [`parser::DemoHandler`];
/// [`parser::DemoWriter`] writes recordings back out.
pub use demoscope_parser as parser;

/// Common imports for typical demoscope usage.
///
/// ```rust
/// use demoscope::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use demoscope_core::{
        ConsoleCmd, CustomData, DataTables, DemoHeader, DemoVersion, EntityIndex, Game,
        MessageKind, Packet, PropValue, SchemaSet, Stop, StringTables, SyncTick, Tick, UserCmd,
    };

    // Errors
    pub use demoscope_core::{DemoError, ErrorKind};

    // Parser
    pub use demoscope_parser::{
        parse, DemoHandler, DemoParser, DemoState, DemoWriter, Flow, HandlerContext, Interests,
        NetMessage, NetMessageType, ParseOutcome, ParserConfig,
    };

    // Derived callbacks
    pub use demoscope_parser::{
        DataTablesParsed, EntityState, EntityUpdate, PacketEntities, PacketEntitiesParsed,
        StringTablesParsed, UpdateType,
    };

    pub use crate::parse_file;
}

/// Decode the recording at `path` with the default configuration.
///
/// A file that cannot be opened ends the session in
/// [`DemoState::Errored`] with an I/O error, like any other failure.
pub fn parse_file<P: AsRef<Path>, H: DemoHandler>(path: P, handler: H) -> ParseOutcome {
    let path = path.as_ref();
    match File::open(path) {
        Ok(file) => demoscope_parser::parse(BufReader::new(file), handler),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot open demo");
            ParseOutcome {
                state: DemoState::Errored,
                error: Some(DemoError::from(e)),
                messages: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use demoscope_test_utils::{orange_box_header, DemoBuilder, Event, RecordingHandler};
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("demoscope-{}-{name}.dem", std::process::id()))
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let mut b = DemoBuilder::new(&orange_box_header());
        b.at(3).synctick();
        b.at(4).consolecmd(b"status\0");
        b.stop(&[]);
        let path = temp_path("read");
        std::fs::write(&path, b.finish()).unwrap();

        let mut handler = RecordingHandler::new(Interests::SYNCTICK | Interests::CONSOLECMD);
        let outcome = parse_file(&path, &mut handler);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(outcome.state, DemoState::Stopped);
        assert_eq!(outcome.messages, 3);
        assert_eq!(
            handler.events,
            [
                Event::SyncTick { tick: 3 },
                Event::ConsoleCmd {
                    tick: 4,
                    command: "status".into()
                },
            ]
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = temp_path("missing");
        let outcome = parse_file(&path, RecordingHandler::new(Interests::all()));
        assert_eq!(outcome.state, DemoState::Errored);
        assert_eq!(outcome.messages, 0);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Io));
    }
}
