//! A handler that records what it was told.
//!
//! [`RecordingHandler`] turns every callback into an owned [`Event`] so
//! tests can compare whole sessions with `assert_eq!`. It can be told to
//! stop after a number of events to exercise early termination.

use demoscope_core::{
    ConsoleCmd, CustomData, DataTables, DemoHeader, DemoVersion, MessageKind, Packet, PropValue,
    SchemaSet, Stop, StringTables, SyncTick, UserCmd,
};
use demoscope_parser::{
    DataTablesParsed, DemoHandler, Flow, HandlerContext, Interests, NetMessage, NetMessageType,
    PacketEntities, PacketEntitiesParsed, StringTablesParsed, UpdateType,
};

/// One callback, with the parts tests assert on.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Version {
        demo_protocol: i32,
        net_protocol: i32,
    },
    Header {
        map: String,
    },
    ConsoleCmd {
        tick: i32,
        command: String,
    },
    CustomData {
        tick: i32,
        unknown: i32,
        data: Vec<u8>,
    },
    DataTables {
        tick: i32,
        len: usize,
    },
    DataTablesParsed {
        tables: Vec<String>,
        classes: Vec<String>,
    },
    /// Class name and flattened prop names, per class.
    FlattenedProps {
        classes: Vec<(String, Vec<String>)>,
    },
    Packet {
        tick: i32,
        kind: MessageKind,
        len: usize,
    },
    PacketParsed {
        tick: i32,
        messages: Vec<NetMessageType>,
    },
    PacketEntities {
        tick: i32,
        updates: Option<Vec<(u16, UpdateType)>>,
    },
    Stop {
        trailing: Vec<u8>,
    },
    StringTables {
        tick: i32,
        len: usize,
    },
    StringTablesParsed {
        tick: i32,
        tables: Vec<(String, usize)>,
    },
    SyncTick {
        tick: i32,
    },
    UserCmd {
        tick: i32,
        cmd: i32,
        len: usize,
    },
}

/// Tracked entity as seen after a packet.
#[derive(Clone, Debug, PartialEq)]
pub struct EntitySnapshot {
    pub index: u16,
    pub class_id: u16,
    pub serial: u32,
    pub in_pvs: bool,
    pub props: Vec<Option<PropValue>>,
}

/// Records every callback it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingHandler {
    interests: Interests,
    stop_after: Option<usize>,
    pub events: Vec<Event>,
    /// Tracked entities after the most recent packet.
    pub entities: Vec<EntitySnapshot>,
}

impl RecordingHandler {
    pub fn new(interests: Interests) -> Self {
        Self {
            interests,
            ..Self::default()
        }
    }

    /// Ask the parser to stop once `n` events have been recorded.
    pub fn stop_after(mut self, n: usize) -> Self {
        self.stop_after = Some(n);
        self
    }

    fn record(&mut self, event: Event) -> Flow {
        self.events.push(event);
        match self.stop_after {
            Some(n) if self.events.len() >= n => Flow::Stop,
            _ => Flow::Continue,
        }
    }

    /// Ticks of the recorded sync tick events.
    pub fn ticks(&self) -> Vec<i32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::SyncTick { tick } => Some(*tick),
                _ => None,
            })
            .collect()
    }
}

impl DemoHandler for RecordingHandler {
    fn interests(&self) -> Interests {
        self.interests
    }

    fn on_version(&mut self, version: &DemoVersion) -> Flow {
        self.record(Event::Version {
            demo_protocol: version.demo_protocol,
            net_protocol: version.net_protocol,
        })
    }

    fn on_header(&mut self, header: &DemoHeader) -> Flow {
        self.record(Event::Header {
            map: header.map_name.clone(),
        })
    }

    fn on_consolecmd(&mut self, ctx: &HandlerContext<'_>, message: &ConsoleCmd<'_>) -> Flow {
        self.record(Event::ConsoleCmd {
            tick: ctx.tick().0,
            command: String::from_utf8_lossy(message.command()).into_owned(),
        })
    }

    fn on_customdata(&mut self, ctx: &HandlerContext<'_>, message: &CustomData<'_>) -> Flow {
        self.record(Event::CustomData {
            tick: ctx.tick().0,
            unknown: message.unknown,
            data: message.data.to_vec(),
        })
    }

    fn on_datatables(&mut self, ctx: &HandlerContext<'_>, message: &DataTables<'_>) -> Flow {
        self.record(Event::DataTables {
            tick: ctx.tick().0,
            len: message.data.len(),
        })
    }

    fn on_datatables_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &DataTablesParsed,
    ) -> Flow {
        let tables = message
            .tables
            .iter()
            .map(|t| ctx.text(t.name).into_owned())
            .collect();
        let classes = message
            .classes
            .iter()
            .map(|c| ctx.text(c.name).into_owned())
            .collect();
        self.record(Event::DataTablesParsed { tables, classes })
    }

    fn on_flattened_props(&mut self, ctx: &HandlerContext<'_>, schemas: &SchemaSet) -> Flow {
        let classes = schemas
            .iter()
            .map(|class| {
                let props = class
                    .props
                    .iter()
                    .map(|p| ctx.text(p.prop.name).into_owned())
                    .collect();
                (ctx.text(class.class_name).into_owned(), props)
            })
            .collect();
        self.record(Event::FlattenedProps { classes })
    }

    fn on_packet(&mut self, ctx: &HandlerContext<'_>, message: &Packet<'_>) -> Flow {
        self.record(Event::Packet {
            tick: ctx.tick().0,
            kind: message.preamble.kind,
            len: message.data.len(),
        })
    }

    fn on_packet_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        _packet: &Packet<'_>,
        messages: &[NetMessage<'_>],
    ) -> Flow {
        self.entities = ctx
            .entities()
            .iter()
            .map(|(index, state)| EntitySnapshot {
                index: index.0,
                class_id: state.class_id.0,
                serial: state.handle.serial(),
                in_pvs: state.in_pvs,
                props: state.props.clone(),
            })
            .collect();
        self.record(Event::PacketParsed {
            tick: ctx.tick().0,
            messages: messages.iter().map(NetMessage::message_type).collect(),
        })
    }

    fn on_packet_entities(
        &mut self,
        ctx: &HandlerContext<'_>,
        _message: &PacketEntities<'_>,
        parsed: Option<&PacketEntitiesParsed>,
    ) -> Flow {
        let updates = parsed.map(|p| {
            p.updates
                .iter()
                .map(|u| (u.index.0, u.update_type))
                .collect()
        });
        self.record(Event::PacketEntities {
            tick: ctx.tick().0,
            updates,
        })
    }

    fn on_stop(&mut self, _ctx: &HandlerContext<'_>, message: &Stop<'_>) -> Flow {
        self.record(Event::Stop {
            trailing: message.data.to_vec(),
        })
    }

    fn on_stringtables(&mut self, ctx: &HandlerContext<'_>, message: &StringTables<'_>) -> Flow {
        self.record(Event::StringTables {
            tick: ctx.tick().0,
            len: message.data.len(),
        })
    }

    fn on_stringtables_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        message: &StringTablesParsed<'_>,
    ) -> Flow {
        let tables = message
            .tables
            .iter()
            .map(|t| (ctx.text(t.name).into_owned(), t.entries.len()))
            .collect();
        self.record(Event::StringTablesParsed {
            tick: ctx.tick().0,
            tables,
        })
    }

    fn on_synctick(&mut self, ctx: &HandlerContext<'_>, _message: &SyncTick) -> Flow {
        self.record(Event::SyncTick { tick: ctx.tick().0 })
    }

    fn on_usercmd(&mut self, ctx: &HandlerContext<'_>, message: &UserCmd<'_>) -> Flow {
        self.record(Event::UserCmd {
            tick: ctx.tick().0,
            cmd: message.cmd,
            len: message.data.len(),
        })
    }
}
