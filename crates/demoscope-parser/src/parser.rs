//! The message loop.
//!
//! [`DemoParser`] reads the header, then one framed message at a time,
//! handing each to the [`DemoHandler`]. Payloads nobody asked for are
//! skipped on the input without being buffered. Every error is terminal:
//! the loop stops, the session's memory is released and the error is
//! reported in the [`ParseOutcome`].

use std::fmt;
use std::io::Read;

use demoscope_arena::{Arena, MessageBuffer};
use demoscope_core::version::CMDINFO_BYTES;
use demoscope_core::{
    CmdInfo, ConsoleCmd, CustomData, DataTables, DemoError, DemoVersion, ErrorKind, MessageKind,
    Packet, Preamble, SchemaSet, Stop, StringTables, SyncTick, Tick, UserCmd,
};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::{ConfigError, ParserConfig};
use crate::datatables::parse_datatables;
use crate::entities::{decode_packet_entities, EntityTracker};
use crate::flatten::flatten;
use crate::handler::{DemoHandler, Flow, HandlerContext, Interests};
use crate::netmessages::{parse_net_messages, NetMessage};
use crate::source::ByteSource;
use crate::stringtables::parse_stringtables;

// ── Outcome ─────────────────────────────────────────────────────

/// Where the message loop is, or where it ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DemoState {
    /// The header has not been read yet.
    Header,
    /// Messages are being read.
    Running,
    /// A stop message was read or a handler asked to stop.
    Stopped,
    /// Decoding failed.
    Errored,
    /// The input ended at a message boundary, or nothing past the header
    /// was wanted.
    EndOfInput,
}

impl fmt::Display for DemoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
            Self::EndOfInput => "end of input",
        };
        f.write_str(name)
    }
}

/// Result of a decode session.
#[derive(Debug)]
pub struct ParseOutcome {
    /// Terminal state.
    pub state: DemoState,
    /// The error that ended the session, when `state` is
    /// [`DemoState::Errored`].
    pub error: Option<DemoError>,
    /// Framed messages read, stop included.
    pub messages: u64,
}

impl ParseOutcome {
    /// Whether the session ended in an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Human-readable description of the error.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Category of the error.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(DemoError::kind)
    }
}

// ── Session state ───────────────────────────────────────────────

/// Memory owned by one decode session.
struct Session {
    scratch: MessageBuffer,
    /// Names from the message being decoded; cleared before every message.
    temp: Arena,
    /// Send table names; lives until the next data tables message.
    schema: Arena,
    schemas: Option<SchemaSet>,
    entities: EntityTracker,
    tick: Tick,
}

impl Session {
    fn new(config: &ParserConfig) -> Self {
        let arena = config.arena();
        Self {
            scratch: MessageBuffer::new(),
            temp: Arena::new(&arena),
            schema: Arena::new(&arena),
            schemas: None,
            entities: EntityTracker::new(),
            tick: Tick(0),
        }
    }

    fn context<'s>(&'s self, version: &'s DemoVersion) -> HandlerContext<'s> {
        HandlerContext::new(
            version,
            self.tick,
            &self.temp,
            &self.schema,
            self.schemas.as_ref(),
            &self.entities,
        )
    }

    fn release(&mut self) {
        self.scratch = MessageBuffer::new();
        self.temp.free();
        self.schema.free();
        self.schemas = None;
        self.entities.clear();
    }
}

enum Step {
    Continue,
    Stop,
    End,
}

// ── DemoParser ──────────────────────────────────────────────────

/// Streaming decoder for one recording.
///
/// # Examples
///
/// ```
/// use demoscope_core::{DemoHeader, Stop};
/// use demoscope_parser::{
///     DemoHandler, DemoParser, DemoState, DemoWriter, Interests, ParserConfig,
/// };
///
/// let mut bytes = Vec::new();
/// let mut writer = DemoWriter::new(&mut bytes, &DemoHeader::new(4, 2001)).unwrap();
/// writer.write_stop(&Stop { data: &[] }).unwrap();
/// drop(writer);
///
/// struct StopOnly;
/// impl DemoHandler for StopOnly {
///     fn interests(&self) -> Interests {
///         Interests::STOP
///     }
/// }
///
/// let mut parser = DemoParser::new(bytes.as_slice(), StopOnly, ParserConfig::default()).unwrap();
/// let outcome = parser.run();
/// assert_eq!(outcome.state, DemoState::Stopped);
/// assert!(!outcome.is_error());
/// ```
pub struct DemoParser<R: Read, H: DemoHandler> {
    source: ByteSource<R>,
    handler: H,
    config: ParserConfig,
    interests: Interests,
    session: Session,
    state: DemoState,
    messages: u64,
}

impl<R: Read, H: DemoHandler> DemoParser<R, H> {
    /// Create a parser over `reader`, validating `config`.
    pub fn new(reader: R, handler: H, config: ParserConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(reader, handler, config))
    }

    fn build(reader: R, handler: H, config: ParserConfig) -> Self {
        let interests = handler.interests();
        Self {
            source: ByteSource::new(reader, config.input_buffer),
            session: Session::new(&config),
            handler,
            config,
            interests,
            state: DemoState::Header,
            messages: 0,
        }
    }

    /// The handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consume the parser, returning the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Current state.
    pub fn state(&self) -> DemoState {
        self.state
    }

    /// Input bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Decode the whole recording.
    ///
    /// A parser runs once; later calls report the terminal state again
    /// without reading.
    pub fn run(&mut self) -> ParseOutcome {
        if self.state != DemoState::Header {
            return ParseOutcome {
                state: self.state,
                error: None,
                messages: self.messages,
            };
        }

        let result = self.run_inner();
        self.session.release();
        let error = match result {
            Ok(state) => {
                self.state = state;
                None
            }
            Err(e) => {
                warn!(error = %e, position = self.source.position(), "decode failed");
                self.state = DemoState::Errored;
                Some(e)
            }
        };
        debug!(state = %self.state, messages = self.messages, "decode finished");
        ParseOutcome {
            state: self.state,
            error,
            messages: self.messages,
        }
    }

    fn run_inner(&mut self) -> Result<DemoState, DemoError> {
        let header = self.source.read_header()?;
        let version = DemoVersion::from_header(&header);
        debug!(%version, map = %header.map_name, "header decoded");

        let mut stop = false;
        if self.interests.contains(Interests::VERSION) {
            stop |= self.handler.on_version(&version).is_stop();
        }
        if self.interests.contains(Interests::HEADER) {
            stop |= self.handler.on_header(&header).is_stop();
        }
        if stop {
            return Ok(DemoState::Stopped);
        }
        if !self.interests.needs_loop() {
            debug!("no message callbacks requested, skipping message loop");
            return Ok(DemoState::EndOfInput);
        }

        self.state = DemoState::Running;
        loop {
            match self.step(&version)? {
                Step::Continue => {}
                Step::Stop => return Ok(DemoState::Stopped),
                Step::End => return Ok(DemoState::EndOfInput),
            }
        }
    }

    fn step(&mut self, version: &DemoVersion) -> Result<Step, DemoError> {
        self.session.temp.clear();
        let Some(byte) = self.source.read_u8_or_eof()? else {
            return Ok(Step::End);
        };
        let kind = version
            .message_kind(byte)
            .ok_or(DemoError::InvalidMessageType { kind: byte })?;
        self.messages += 1;

        if kind == MessageKind::Stop {
            trace!(tick = %self.session.tick, "stop");
            self.stop(version)?;
            return Ok(Step::Stop);
        }

        let tick = Tick(self.source.read_i32()?);
        let slot = if version.has_slot_in_preamble {
            self.source.read_u8()?
        } else {
            0
        };
        self.session.tick = tick;
        let preamble = Preamble {
            kind,
            wire_kind: byte,
            tick,
            slot,
        };
        trace!(%kind, %tick, slot, "message");

        let flow = match kind {
            MessageKind::ConsoleCmd => self.consolecmd(version, preamble)?,
            MessageKind::CustomData => self.customdata(version, preamble)?,
            MessageKind::DataTables => self.datatables(version, preamble)?,
            MessageKind::Packet | MessageKind::Signon => self.packet(version, preamble)?,
            MessageKind::StringTables => self.stringtables(version, preamble)?,
            MessageKind::SyncTick => self.synctick(version, preamble),
            MessageKind::UserCmd => self.usercmd(version, preamble)?,
            MessageKind::Stop => Flow::Stop,
        };
        Ok(if flow.is_stop() {
            debug!(%kind, %tick, "handler requested stop");
            Step::Stop
        } else {
            Step::Continue
        })
    }

    // ── Framing helpers ─────────────────────────────────────────

    fn read_length(&mut self, kind: MessageKind) -> Result<usize, DemoError> {
        let length = self.source.read_i32()?;
        if length < 0 || length > self.config.max_message_len {
            return Err(DemoError::InvalidLength { kind, length });
        }
        Ok(length as usize)
    }

    fn skip(&mut self, kind: MessageKind, len: usize) -> Result<Flow, DemoError> {
        trace!(%kind, len, "skipping payload");
        self.source.skip(len as u64)?;
        Ok(Flow::Continue)
    }

    fn read_payload(&mut self, len: usize) -> Result<(), DemoError> {
        let buf = self.session.scratch.prepare(len);
        self.source.read_exact(buf)
    }

    // ── Message kinds ───────────────────────────────────────────

    fn consolecmd(&mut self, version: &DemoVersion, preamble: Preamble) -> Result<Flow, DemoError> {
        let len = self.read_length(MessageKind::ConsoleCmd)?;
        if len == 0 {
            return Err(DemoError::EmptyConsoleCmd);
        }
        if !self.interests.contains(Interests::CONSOLECMD) {
            return self.skip(MessageKind::ConsoleCmd, len);
        }

        let buf = self.session.scratch.prepare(len);
        self.source.read_exact(buf)?;
        buf[len - 1] = 0;

        let session = &self.session;
        let message = ConsoleCmd {
            preamble,
            data: session.scratch.as_slice(),
        };
        Ok(self
            .handler
            .on_consolecmd(&session.context(version), &message))
    }

    fn customdata(&mut self, version: &DemoVersion, preamble: Preamble) -> Result<Flow, DemoError> {
        let unknown = self.source.read_i32()?;
        let len = self.read_length(MessageKind::CustomData)?;
        if !self.interests.contains(Interests::CUSTOMDATA) || len == 0 {
            return self.skip(MessageKind::CustomData, len);
        }

        self.read_payload(len)?;
        let session = &self.session;
        let message = CustomData {
            preamble,
            unknown,
            data: session.scratch.as_slice(),
        };
        Ok(self
            .handler
            .on_customdata(&session.context(version), &message))
    }

    fn datatables(&mut self, version: &DemoVersion, preamble: Preamble) -> Result<Flow, DemoError> {
        let len = self.read_length(MessageKind::DataTables)?;
        let interests = self.interests;
        if !interests.needs_datatables() || len == 0 {
            return self.skip(MessageKind::DataTables, len);
        }

        self.read_payload(len)?;
        let Self {
            handler, session, ..
        } = self;
        let data = session.scratch.as_slice();
        let mut stop = false;

        if interests.contains(Interests::DATATABLES) {
            let message = DataTables { preamble, data };
            stop |= handler
                .on_datatables(&session.context(version), &message)
                .is_stop();
        }

        if interests.contains(Interests::DATATABLES_PARSED) || interests.needs_schemas() {
            session.schema.clear();
            session.schemas = None;
            session.entities.clear();

            let parsed = parse_datatables(data, version, &mut session.schema)?;
            if interests.contains(Interests::DATATABLES_PARSED) {
                stop |= handler
                    .on_datatables_parsed(&session.context(version), &parsed)
                    .is_stop();
            }

            if interests.needs_schemas() {
                let schemas = flatten(&parsed, &session.schema)?;
                debug!(classes = schemas.len(), "schemas flattened");
                session.schemas = Some(schemas);
                if interests.contains(Interests::FLATTENED_PROPS) {
                    if let Some(schemas) = session.schemas.as_ref() {
                        stop |= handler
                            .on_flattened_props(&session.context(version), schemas)
                            .is_stop();
                    }
                }
            }
        }
        Ok(flow(stop))
    }

    fn packet(&mut self, version: &DemoVersion, preamble: Preamble) -> Result<Flow, DemoError> {
        let interests = self.interests;
        let wants_packet = interests.contains(Interests::PACKET);

        let mut cmdinfo = SmallVec::new();
        for _ in 0..version.cmdinfo_size {
            if wants_packet {
                let mut raw = [0u8; CMDINFO_BYTES];
                self.source.read_exact(&mut raw)?;
                cmdinfo.push(CmdInfo::from_bytes(&raw));
            } else {
                self.source.skip(CMDINFO_BYTES as u64)?;
            }
        }
        let in_sequence = self.source.read_i32()?;
        let out_sequence = self.source.read_i32()?;
        let len = self.read_length(preamble.kind)?;
        if !(wants_packet || interests.needs_net_messages()) || len == 0 {
            return self.skip(preamble.kind, len);
        }

        self.read_payload(len)?;
        let Self {
            handler, session, ..
        } = self;
        let packet = Packet {
            preamble,
            cmdinfo,
            in_sequence,
            out_sequence,
            data: session.scratch.as_slice(),
        };
        let mut stop = false;

        if wants_packet {
            stop |= handler
                .on_packet(&session.context(version), &packet)
                .is_stop();
        }
        if !interests.needs_net_messages() {
            return Ok(flow(stop));
        }

        let messages = parse_net_messages(packet.data, version, &mut session.temp)?;
        if interests.tracks_entities() {
            for message in &messages {
                let NetMessage::PacketEntities(entities) = message else {
                    continue;
                };
                let parsed = match session.schemas.as_ref() {
                    Some(schemas) => Some(decode_packet_entities(
                        entities,
                        version,
                        schemas,
                        &session.schema,
                        &mut session.entities,
                    )?),
                    None => {
                        trace!("packet entities before data tables, not decoded");
                        None
                    }
                };
                if interests.contains(Interests::PACKET_ENTITIES) {
                    stop |= handler
                        .on_packet_entities(&session.context(version), entities, parsed.as_ref())
                        .is_stop();
                }
            }
        }
        if interests.contains(Interests::PACKET_PARSED) {
            stop |= handler
                .on_packet_parsed(&session.context(version), &packet, &messages)
                .is_stop();
        }
        Ok(flow(stop))
    }

    fn stringtables(
        &mut self,
        version: &DemoVersion,
        preamble: Preamble,
    ) -> Result<Flow, DemoError> {
        let len = self.read_length(MessageKind::StringTables)?;
        let interests = self.interests;
        let wanted = interests.intersects(Interests::STRINGTABLES | Interests::STRINGTABLES_PARSED);
        if !wanted || len == 0 {
            return self.skip(MessageKind::StringTables, len);
        }

        self.read_payload(len)?;
        let Self {
            handler, session, ..
        } = self;
        let message = StringTables {
            preamble,
            data: session.scratch.as_slice(),
        };
        let mut stop = false;

        if interests.contains(Interests::STRINGTABLES) {
            stop |= handler
                .on_stringtables(&session.context(version), &message)
                .is_stop();
        }
        if interests.contains(Interests::STRINGTABLES_PARSED) {
            let parsed = parse_stringtables(&message, &mut session.temp)?;
            stop |= handler
                .on_stringtables_parsed(&session.context(version), &parsed)
                .is_stop();
        }
        Ok(flow(stop))
    }

    fn synctick(&mut self, version: &DemoVersion, preamble: Preamble) -> Flow {
        if !self.interests.contains(Interests::SYNCTICK) {
            return Flow::Continue;
        }
        self.handler
            .on_synctick(&self.session.context(version), &SyncTick { preamble })
    }

    fn usercmd(&mut self, version: &DemoVersion, preamble: Preamble) -> Result<Flow, DemoError> {
        let cmd = self.source.read_i32()?;
        let len = self.read_length(MessageKind::UserCmd)?;
        if !self.interests.contains(Interests::USERCMD) || len == 0 {
            return self.skip(MessageKind::UserCmd, len);
        }

        self.read_payload(len)?;
        let session = &self.session;
        let message = UserCmd {
            preamble,
            cmd,
            data: session.scratch.as_slice(),
        };
        Ok(self.handler.on_usercmd(&session.context(version), &message))
    }

    fn stop(&mut self, version: &DemoVersion) -> Result<(), DemoError> {
        if !self.interests.contains(Interests::STOP) {
            return Ok(());
        }
        let mut data = Vec::new();
        self.source.read_to_end(&mut data)?;
        self.handler
            .on_stop(&self.session.context(version), &Stop { data: &data });
        Ok(())
    }
}

fn flow(stop: bool) -> Flow {
    if stop {
        Flow::Stop
    } else {
        Flow::Continue
    }
}

/// Decode `reader` with the default configuration.
pub fn parse<R: Read, H: DemoHandler>(reader: R, handler: H) -> ParseOutcome {
    DemoParser::build(reader, handler, ParserConfig::default()).run()
}
