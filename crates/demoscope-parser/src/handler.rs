//! The [`DemoHandler`] trait, its [`Interests`] and the [`HandlerContext`].
//!
//! A handler declares up front which messages it consumes. The parser
//! reads that set once, before the first message, and skips the payload of
//! anything nobody asked for, including the decode work that only feeds a
//! derived callback.

use std::borrow::Cow;

use bitflags::bitflags;
use demoscope_arena::Arena;
use demoscope_core::{
    ArenaStr, ConsoleCmd, CustomData, DataTables, DemoHeader, DemoVersion, Packet, Pool,
    SchemaSet, Stop, StringTables, SyncTick, Tick, UserCmd,
};

use crate::datatables::DataTablesParsed;
use crate::entities::{EntityTracker, PacketEntitiesParsed};
use crate::netmessages::{NetMessage, PacketEntities};
use crate::stringtables::StringTablesParsed;

/// Whether the parser should keep going after a callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next message.
    #[default]
    Continue,
    /// Finish the current message, then stop in
    /// [`DemoState::Stopped`](crate::DemoState::Stopped).
    Stop,
}

impl Flow {
    /// Whether this is [`Flow::Stop`].
    pub fn is_stop(self) -> bool {
        self == Self::Stop
    }
}

bitflags! {
    /// The callbacks a handler wants invoked.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Interests: u32 {
        /// [`DemoHandler::on_header`].
        const HEADER = 1 << 0;
        /// [`DemoHandler::on_version`].
        const VERSION = 1 << 1;
        /// [`DemoHandler::on_consolecmd`].
        const CONSOLECMD = 1 << 2;
        /// [`DemoHandler::on_customdata`].
        const CUSTOMDATA = 1 << 3;
        /// [`DemoHandler::on_datatables`].
        const DATATABLES = 1 << 4;
        /// [`DemoHandler::on_datatables_parsed`].
        const DATATABLES_PARSED = 1 << 5;
        /// [`DemoHandler::on_flattened_props`].
        const FLATTENED_PROPS = 1 << 6;
        /// [`DemoHandler::on_packet`].
        const PACKET = 1 << 7;
        /// [`DemoHandler::on_packet_parsed`].
        const PACKET_PARSED = 1 << 8;
        /// [`DemoHandler::on_packet_entities`].
        const PACKET_ENTITIES = 1 << 9;
        /// [`DemoHandler::on_stop`].
        const STOP = 1 << 10;
        /// [`DemoHandler::on_stringtables`].
        const STRINGTABLES = 1 << 11;
        /// [`DemoHandler::on_stringtables_parsed`].
        const STRINGTABLES_PARSED = 1 << 12;
        /// [`DemoHandler::on_synctick`].
        const SYNCTICK = 1 << 13;
        /// [`DemoHandler::on_usercmd`].
        const USERCMD = 1 << 14;
        /// Track entity state even without an entity callback.
        const STORE_ENTS = 1 << 15;
    }
}

impl Interests {
    /// Entity state must be decoded and kept.
    pub fn tracks_entities(self) -> bool {
        self.intersects(Self::STORE_ENTS | Self::PACKET_ENTITIES)
    }

    /// Flattened schemas must be built.
    pub fn needs_schemas(self) -> bool {
        self.tracks_entities() || self.contains(Self::FLATTENED_PROPS)
    }

    /// Data tables payloads must be read.
    pub fn needs_datatables(self) -> bool {
        self.needs_schemas() || self.intersects(Self::DATATABLES | Self::DATATABLES_PARSED)
    }

    /// Packet payloads must be split into net messages.
    pub fn needs_net_messages(self) -> bool {
        self.tracks_entities() || self.contains(Self::PACKET_PARSED)
    }

    /// Anything past the header is wanted.
    pub fn needs_loop(self) -> bool {
        !self.difference(Self::HEADER | Self::VERSION).is_empty()
    }
}

/// Session state visible to callbacks.
///
/// Everything borrowed here is only valid for the duration of the
/// callback. Arena strings from decoded messages resolve through
/// [`bytes`](Self::bytes) and [`text`](Self::text).
pub struct HandlerContext<'s> {
    version: &'s DemoVersion,
    tick: Tick,
    temp: &'s Arena,
    schema: &'s Arena,
    schemas: Option<&'s SchemaSet>,
    entities: &'s EntityTracker,
}

impl<'s> HandlerContext<'s> {
    /// Construct a context. Typically called by the parser.
    pub fn new(
        version: &'s DemoVersion,
        tick: Tick,
        temp: &'s Arena,
        schema: &'s Arena,
        schemas: Option<&'s SchemaSet>,
        entities: &'s EntityTracker,
    ) -> Self {
        Self {
            version,
            tick,
            temp,
            schema,
            schemas,
            entities,
        }
    }

    /// Protocol of the recording.
    pub fn version(&self) -> &'s DemoVersion {
        self.version
    }

    /// Tick of the current message.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Flattened schemas, once a data tables message has been decoded.
    pub fn schemas(&self) -> Option<&'s SchemaSet> {
        self.schemas
    }

    /// Entities tracked so far.
    pub fn entities(&self) -> &'s EntityTracker {
        self.entities
    }

    /// The arena behind `pool`.
    pub fn arena(&self, pool: Pool) -> &'s Arena {
        match pool {
            Pool::Schema => self.schema,
            Pool::Temp => self.temp,
        }
    }

    /// Bytes of `s`; empty if `s` no longer resolves.
    pub fn bytes(&self, s: ArenaStr) -> &'s [u8] {
        s.resolve(self.arena(s.pool())).unwrap_or_default()
    }

    /// `s` as text, replacing invalid UTF-8.
    pub fn text(&self, s: ArenaStr) -> Cow<'s, str> {
        String::from_utf8_lossy(self.bytes(s))
    }
}

/// Receives decoded messages.
///
/// Only [`interests`](Self::interests) is required. Every callback
/// defaults to [`Flow::Continue`] and is only invoked when its interest
/// bit is set.
///
/// # Examples
///
/// ```
/// use demoscope_core::ConsoleCmd;
/// use demoscope_parser::{DemoHandler, Flow, HandlerContext, Interests};
///
/// #[derive(Default)]
/// struct Commands(Vec<String>);
///
/// impl DemoHandler for Commands {
///     fn interests(&self) -> Interests {
///         Interests::CONSOLECMD
///     }
///
///     fn on_consolecmd(&mut self, _ctx: &HandlerContext<'_>, cmd: &ConsoleCmd<'_>) -> Flow {
///         self.0.push(String::from_utf8_lossy(cmd.command()).into_owned());
///         Flow::Continue
///     }
/// }
///
/// assert!(Commands::default().interests().needs_loop());
/// ```
#[allow(unused_variables)]
pub trait DemoHandler {
    /// Callbacks this handler wants. Read once before decoding starts.
    fn interests(&self) -> Interests;

    /// The protocol descriptor, before the header.
    fn on_version(&mut self, version: &DemoVersion) -> Flow {
        Flow::Continue
    }

    /// The decoded header.
    fn on_header(&mut self, header: &DemoHeader) -> Flow {
        Flow::Continue
    }

    /// A console command.
    fn on_consolecmd(&mut self, ctx: &HandlerContext<'_>, message: &ConsoleCmd<'_>) -> Flow {
        Flow::Continue
    }

    /// A custom data message.
    fn on_customdata(&mut self, ctx: &HandlerContext<'_>, message: &CustomData<'_>) -> Flow {
        Flow::Continue
    }

    /// Raw send tables.
    fn on_datatables(&mut self, ctx: &HandlerContext<'_>, message: &DataTables<'_>) -> Flow {
        Flow::Continue
    }

    /// Decoded send tables and server classes. Names live in
    /// [`Pool::Schema`].
    fn on_datatables_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &DataTablesParsed,
    ) -> Flow {
        Flow::Continue
    }

    /// Flattened schemas for every class.
    fn on_flattened_props(&mut self, ctx: &HandlerContext<'_>, schemas: &SchemaSet) -> Flow {
        Flow::Continue
    }

    /// A packet or signon message.
    fn on_packet(&mut self, ctx: &HandlerContext<'_>, message: &Packet<'_>) -> Flow {
        Flow::Continue
    }

    /// The net messages of a packet, after any entity updates in it were
    /// applied.
    fn on_packet_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        packet: &Packet<'_>,
        messages: &[NetMessage<'_>],
    ) -> Flow {
        Flow::Continue
    }

    /// Entity updates. `parsed` is `None` when no schema was available to
    /// decode them.
    fn on_packet_entities(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &PacketEntities<'_>,
        parsed: Option<&PacketEntitiesParsed>,
    ) -> Flow {
        Flow::Continue
    }

    /// The end of the recording.
    fn on_stop(&mut self, ctx: &HandlerContext<'_>, message: &Stop<'_>) -> Flow {
        Flow::Continue
    }

    /// A raw string tables message.
    fn on_stringtables(&mut self, ctx: &HandlerContext<'_>, message: &StringTables<'_>) -> Flow {
        Flow::Continue
    }

    /// A decoded string tables message. Names live in [`Pool::Temp`].
    fn on_stringtables_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &StringTablesParsed<'_>,
    ) -> Flow {
        Flow::Continue
    }

    /// A sync tick marker.
    fn on_synctick(&mut self, ctx: &HandlerContext<'_>, message: &SyncTick) -> Flow {
        Flow::Continue
    }

    /// A user command.
    fn on_usercmd(&mut self, ctx: &HandlerContext<'_>, message: &UserCmd<'_>) -> Flow {
        Flow::Continue
    }
}

impl<T: DemoHandler + ?Sized> DemoHandler for &mut T {
    fn interests(&self) -> Interests {
        (**self).interests()
    }
    fn on_version(&mut self, version: &DemoVersion) -> Flow {
        (**self).on_version(version)
    }
    fn on_header(&mut self, header: &DemoHeader) -> Flow {
        (**self).on_header(header)
    }
    fn on_consolecmd(&mut self, ctx: &HandlerContext<'_>, message: &ConsoleCmd<'_>) -> Flow {
        (**self).on_consolecmd(ctx, message)
    }
    fn on_customdata(&mut self, ctx: &HandlerContext<'_>, message: &CustomData<'_>) -> Flow {
        (**self).on_customdata(ctx, message)
    }
    fn on_datatables(&mut self, ctx: &HandlerContext<'_>, message: &DataTables<'_>) -> Flow {
        (**self).on_datatables(ctx, message)
    }
    fn on_datatables_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &DataTablesParsed,
    ) -> Flow {
        (**self).on_datatables_parsed(ctx, message)
    }
    fn on_flattened_props(&mut self, ctx: &HandlerContext<'_>, schemas: &SchemaSet) -> Flow {
        (**self).on_flattened_props(ctx, schemas)
    }
    fn on_packet(&mut self, ctx: &HandlerContext<'_>, message: &Packet<'_>) -> Flow {
        (**self).on_packet(ctx, message)
    }
    fn on_packet_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        packet: &Packet<'_>,
        messages: &[NetMessage<'_>],
    ) -> Flow {
        (**self).on_packet_parsed(ctx, packet, messages)
    }
    fn on_packet_entities(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &PacketEntities<'_>,
        parsed: Option<&PacketEntitiesParsed>,
    ) -> Flow {
        (**self).on_packet_entities(ctx, message, parsed)
    }
    fn on_stop(&mut self, ctx: &HandlerContext<'_>, message: &Stop<'_>) -> Flow {
        (**self).on_stop(ctx, message)
    }
    fn on_stringtables(&mut self, ctx: &HandlerContext<'_>, message: &StringTables<'_>) -> Flow {
        (**self).on_stringtables(ctx, message)
    }
    fn on_stringtables_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &StringTablesParsed<'_>,
    ) -> Flow {
        (**self).on_stringtables_parsed(ctx, message)
    }
    fn on_synctick(&mut self, ctx: &HandlerContext<'_>, message: &SyncTick) -> Flow {
        (**self).on_synctick(ctx, message)
    }
    fn on_usercmd(&mut self, ctx: &HandlerContext<'_>, message: &UserCmd<'_>) -> Flow {
        (**self).on_usercmd(ctx, message)
    }
}
