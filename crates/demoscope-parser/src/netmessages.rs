//! Network messages embedded in packet and signon payloads.
//!
//! A packet payload is a run of `(type id, body)` records until fewer bits
//! than a type id remain. Ids and several field widths vary between engine
//! branches; everything that varies is read off the [`DemoVersion`].
//! Opaque bodies are handed out as zero-copy [`BitReader`] forks and
//! strings are interned into the per-message arena.

use std::fmt;

use demoscope_arena::Arena;
use demoscope_bits::{bits_for, BitReader};
use demoscope_core::id::ENTITY_INDEX_BITS;
use demoscope_core::{ArenaStr, DemoError, DemoVersion, Game, Pool};
use tracing::trace;

/// Type tag of a network message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetMessageType {
    /// No operation.
    Nop,
    /// Connection closed.
    Disconnect,
    /// File transfer request or denial.
    File,
    /// Split-screen player selector.
    SplitScreenUser,
    /// Server tick and frame timing.
    Tick,
    /// Client command string.
    StringCmd,
    /// Console variable updates.
    SetConVar,
    /// Signon phase change.
    SignonState,
    /// Console text.
    Print,
    /// Server description.
    ServerInfo,
    /// Single send table.
    SendTable,
    /// Server class list.
    ClassInfo,
    /// Pause toggle.
    SetPause,
    /// New string table.
    CreateStringTable,
    /// String table delta.
    UpdateStringTable,
    /// Voice codec setup.
    VoiceInit,
    /// Voice payload.
    VoiceData,
    /// Sound events.
    Sounds,
    /// View entity.
    SetView,
    /// View angle override.
    FixAngle,
    /// Crosshair angle.
    CrosshairAngle,
    /// World decal.
    BspDecal,
    /// Split-screen control.
    SplitScreen,
    /// Game user message.
    UserMessage,
    /// Entity-directed message.
    EntityMessage,
    /// Game event.
    GameEvent,
    /// Entity updates.
    PacketEntities,
    /// Temporary entities.
    TempEntities,
    /// Resource prefetch.
    Prefetch,
    /// Plugin menu.
    Menu,
    /// Game event descriptors.
    GameEventList,
    /// Console variable query.
    GetCvarValue,
    /// Key-values command.
    CmdKeyValues,
    /// Paint map data.
    PaintmapData,
}

impl NetMessageType {
    /// Map a type id for `version`.
    pub fn from_id(id: u32, version: &DemoVersion) -> Option<Self> {
        use NetMessageType::*;
        let ty = if version.net_message_type_bits == 6 {
            match id {
                0 => Nop,
                1 => Disconnect,
                2 => File,
                3 => SplitScreenUser,
                4 => Tick,
                5 => StringCmd,
                6 => SetConVar,
                7 => SignonState,
                8 => ServerInfo,
                9 => SendTable,
                10 => ClassInfo,
                11 => SetPause,
                12 => CreateStringTable,
                13 => UpdateStringTable,
                14 => VoiceInit,
                15 => VoiceData,
                16 => Print,
                17 => Sounds,
                18 => SetView,
                19 => FixAngle,
                20 => CrosshairAngle,
                21 => BspDecal,
                22 => SplitScreen,
                23 => UserMessage,
                24 => EntityMessage,
                25 => GameEvent,
                26 => PacketEntities,
                27 => TempEntities,
                28 => Prefetch,
                29 => Menu,
                30 => GameEventList,
                31 => GetCvarValue,
                32 => CmdKeyValues,
                33 => PaintmapData,
                _ => return None,
            }
        } else {
            match id {
                0 => Nop,
                1 => Disconnect,
                2 => File,
                3 => Tick,
                4 => StringCmd,
                5 => SetConVar,
                6 => SignonState,
                7 => Print,
                8 => ServerInfo,
                9 => SendTable,
                10 => ClassInfo,
                11 => SetPause,
                12 => CreateStringTable,
                13 => UpdateStringTable,
                14 => VoiceInit,
                15 => VoiceData,
                17 => Sounds,
                18 => SetView,
                19 => FixAngle,
                20 => CrosshairAngle,
                21 => BspDecal,
                23 => UserMessage,
                24 => EntityMessage,
                25 => GameEvent,
                26 => PacketEntities,
                27 => TempEntities,
                28 => Prefetch,
                29 => Menu,
                30 => GameEventList,
                31 => GetCvarValue,
                _ => return None,
            }
        };
        Some(ty)
    }

    /// The id `version` uses for this type, if the branch has it.
    pub fn to_id(self, version: &DemoVersion) -> Option<u32> {
        let limit = 1u32 << version.net_message_type_bits;
        (0..limit).find(|&id| Self::from_id(id, version) == Some(self))
    }
}

impl fmt::Display for NetMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Entity updates as carried on the wire. Decoded by
/// [`decode_packet_entities`](crate::entities::decode_packet_entities).
#[derive(Clone, Debug)]
pub struct PacketEntities<'a> {
    /// Highest entity count the server may send.
    pub max_entries: u32,
    /// Whether the updates are relative to an earlier snapshot.
    pub is_delta: bool,
    /// Tick of the snapshot the delta is relative to.
    pub delta_from: Option<i32>,
    /// Baseline slot in use.
    pub baseline: bool,
    /// Number of update records.
    pub updated_entries: u32,
    /// Whether the client should store this as its new baseline.
    pub update_baseline: bool,
    /// The update records.
    pub data: BitReader<'a>,
}

/// One decoded network message.
///
/// Strings are arena handles in the per-message pool; bodies the decoder
/// does not interpret are zero-copy bit streams.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum NetMessage<'a> {
    Nop,
    Disconnect {
        reason: ArenaStr,
    },
    File {
        transfer_id: u32,
        filename: ArenaStr,
        requested: bool,
    },
    SplitScreenUser {
        slot: bool,
    },
    Tick {
        tick: i32,
        /// Host frame time and its deviation in 1/100000 s, when sent.
        frame_timing: Option<(u16, u16)>,
    },
    StringCmd {
        command: ArenaStr,
    },
    SetConVar {
        convars: Vec<(ArenaStr, ArenaStr)>,
    },
    SignonState {
        state: u8,
        spawn_count: i32,
        num_server_players: Option<u32>,
        player_network_ids: Option<BitReader<'a>>,
        map_name: Option<ArenaStr>,
    },
    Print {
        text: ArenaStr,
    },
    ServerInfo(Box<ServerInfo>),
    SendTable {
        needs_decoder: bool,
        data: BitReader<'a>,
    },
    ClassInfo {
        create_on_client: bool,
        /// `(id, class name, table name)`; empty when created on the client.
        classes: Vec<(u32, ArenaStr, ArenaStr)>,
    },
    SetPause {
        paused: bool,
    },
    CreateStringTable {
        name: ArenaStr,
        max_entries: u32,
        num_entries: u32,
        /// `(size, size_bits)` of fixed-size user data.
        user_data_fixed: Option<(u32, u32)>,
        flags: u32,
        data: BitReader<'a>,
    },
    UpdateStringTable {
        table_id: u32,
        changed_entries: u32,
        data: BitReader<'a>,
    },
    VoiceInit {
        codec: ArenaStr,
        quality: u8,
        sample_rate: Option<u16>,
    },
    VoiceData {
        client: u8,
        proximity: u8,
        data: BitReader<'a>,
    },
    Sounds {
        reliable: bool,
        count: u32,
        data: BitReader<'a>,
    },
    SetView {
        entity: u32,
    },
    FixAngle {
        relative: bool,
        angles: [f32; 3],
    },
    CrosshairAngle {
        angles: [f32; 3],
    },
    BspDecal {
        position: [f32; 3],
        texture: u32,
        /// `(entity, model)` the decal is attached to.
        target: Option<(u32, u32)>,
        low_priority: bool,
    },
    SplitScreen {
        kind: u32,
        data: BitReader<'a>,
    },
    UserMessage {
        kind: u8,
        data: BitReader<'a>,
    },
    EntityMessage {
        entity: u32,
        class: u32,
        data: BitReader<'a>,
    },
    GameEvent {
        data: BitReader<'a>,
    },
    PacketEntities(PacketEntities<'a>),
    TempEntities {
        count: u8,
        data: BitReader<'a>,
    },
    Prefetch {
        sound_index: u32,
    },
    Menu {
        kind: u16,
        data: BitReader<'a>,
    },
    GameEventList {
        events: u32,
        data: BitReader<'a>,
    },
    GetCvarValue {
        cookie: i32,
        name: ArenaStr,
    },
    CmdKeyValues {
        data: BitReader<'a>,
    },
    PaintmapData {
        data: BitReader<'a>,
    },
}

/// Server description sent on connect.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct ServerInfo {
    pub protocol: u16,
    pub server_count: u32,
    pub is_hltv: bool,
    pub is_dedicated: bool,
    pub client_crc: u32,
    pub string_table_crc: Option<u32>,
    pub max_classes: u16,
    /// MD5 of the map on net protocol 24, otherwise a CRC in the low bytes.
    pub map_hash: MapHash,
    pub player_slot: u8,
    pub max_clients: u8,
    pub tick_interval: f32,
    pub os: u8,
    pub game_dir: ArenaStr,
    pub map_name: ArenaStr,
    pub sky_name: ArenaStr,
    pub host_name: ArenaStr,
    pub has_replay: Option<bool>,
}

/// Map checksum carried by [`ServerInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapHash {
    /// 32-bit CRC.
    Crc(u32),
    /// 128-bit MD5.
    Md5([u8; 16]),
}

impl NetMessage<'_> {
    /// The message's type tag.
    pub fn message_type(&self) -> NetMessageType {
        use NetMessageType as T;
        match self {
            Self::Nop => T::Nop,
            Self::Disconnect { .. } => T::Disconnect,
            Self::File { .. } => T::File,
            Self::SplitScreenUser { .. } => T::SplitScreenUser,
            Self::Tick { .. } => T::Tick,
            Self::StringCmd { .. } => T::StringCmd,
            Self::SetConVar { .. } => T::SetConVar,
            Self::SignonState { .. } => T::SignonState,
            Self::Print { .. } => T::Print,
            Self::ServerInfo(_) => T::ServerInfo,
            Self::SendTable { .. } => T::SendTable,
            Self::ClassInfo { .. } => T::ClassInfo,
            Self::SetPause { .. } => T::SetPause,
            Self::CreateStringTable { .. } => T::CreateStringTable,
            Self::UpdateStringTable { .. } => T::UpdateStringTable,
            Self::VoiceInit { .. } => T::VoiceInit,
            Self::VoiceData { .. } => T::VoiceData,
            Self::Sounds { .. } => T::Sounds,
            Self::SetView { .. } => T::SetView,
            Self::FixAngle { .. } => T::FixAngle,
            Self::CrosshairAngle { .. } => T::CrosshairAngle,
            Self::BspDecal { .. } => T::BspDecal,
            Self::SplitScreen { .. } => T::SplitScreen,
            Self::UserMessage { .. } => T::UserMessage,
            Self::EntityMessage { .. } => T::EntityMessage,
            Self::GameEvent { .. } => T::GameEvent,
            Self::PacketEntities(_) => T::PacketEntities,
            Self::TempEntities { .. } => T::TempEntities,
            Self::Prefetch { .. } => T::Prefetch,
            Self::Menu { .. } => T::Menu,
            Self::GameEventList { .. } => T::GameEventList,
            Self::GetCvarValue { .. } => T::GetCvarValue,
            Self::CmdKeyValues { .. } => T::CmdKeyValues,
            Self::PaintmapData { .. } => T::PaintmapData,
        }
    }
}

// ── Decoding ────────────────────────────────────────────────────

const ANGLE_SCALE: f32 = 360.0 / 65536.0;

/// Decode every network message in a packet payload.
pub fn parse_net_messages<'a>(
    data: &'a [u8],
    version: &DemoVersion,
    arena: &mut Arena,
) -> Result<Vec<NetMessage<'a>>, DemoError> {
    let mut r = BitReader::new(data);
    let mut messages = Vec::new();
    let type_bits = version.net_message_type_bits;

    while r.bits_left() >= type_bits as usize {
        if is_zero_padding(&r) {
            break;
        }
        let id = r.read_uint(type_bits);
        let ty = NetMessageType::from_id(id, version).ok_or(DemoError::UnknownNetMessage { id })?;
        let message = MessageReader {
            r: &mut r,
            version,
            arena,
        }
        .read(ty);
        if r.overflowed() {
            return Err(DemoError::Overflow {
                context: "net messages",
            });
        }
        trace!(message = %ty, "net message");
        messages.push(message);
    }
    Ok(messages)
}

/// Whether only the zero bits that pad the payload to a byte remain.
fn is_zero_padding(r: &BitReader<'_>) -> bool {
    let left = r.bits_left();
    left < 8 && r.clone().read_uint(left as u32) == 0
}

struct MessageReader<'r, 'a, 'v> {
    r: &'r mut BitReader<'a>,
    version: &'v DemoVersion,
    arena: &'r mut Arena,
}

impl<'a> MessageReader<'_, 'a, '_> {
    fn string(&mut self) -> ArenaStr {
        let bytes = self.r.read_string();
        ArenaStr::intern(self.arena, Pool::Temp, &bytes)
    }

    fn fixed_string(&mut self, len: usize) -> ArenaStr {
        let mut bytes = vec![0u8; len];
        self.r.read_bytes(&mut bytes);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        ArenaStr::intern(self.arena, Pool::Temp, &bytes[..end])
    }

    fn blob(&mut self, bits: usize) -> BitReader<'a> {
        self.r.fork_and_advance(bits)
    }

    fn angles(&mut self) -> [f32; 3] {
        [0; 3].map(|_| self.r.read_uint(16) as f32 * ANGLE_SCALE)
    }

    fn read(mut self, ty: NetMessageType) -> NetMessage<'a> {
        let game = self.version.game;
        let new_engine = game.is_new_engine();
        let r = &mut *self.r;

        match ty {
            NetMessageType::Nop => NetMessage::Nop,
            NetMessageType::Disconnect => NetMessage::Disconnect {
                reason: self.string(),
            },
            NetMessageType::File => {
                let transfer_id = self.r.read_uint(32);
                let filename = self.string();
                NetMessage::File {
                    transfer_id,
                    filename,
                    requested: self.r.read_bit(),
                }
            }
            NetMessageType::SplitScreenUser => NetMessage::SplitScreenUser {
                slot: r.read_bit(),
            },
            NetMessageType::Tick => {
                let tick = r.read_sint(32);
                let frame_timing = (game != Game::Source2004)
                    .then(|| (r.read_uint(16) as u16, r.read_uint(16) as u16));
                NetMessage::Tick { tick, frame_timing }
            }
            NetMessageType::StringCmd => NetMessage::StringCmd {
                command: self.string(),
            },
            NetMessageType::SetConVar => {
                let count = self.r.read_uint(8);
                let convars = (0..count).map(|_| (self.string(), self.string())).collect();
                NetMessage::SetConVar { convars }
            }
            NetMessageType::SignonState => {
                let state = self.r.read_uint(8) as u8;
                let spawn_count = self.r.read_sint(32);
                let extended = self.version.demo_protocol >= 4 && game != Game::Left4Dead;
                let (mut players, mut ids, mut map) = (None, None, None);
                if extended {
                    players = Some(self.r.read_uint(32));
                    let ids_len = self.r.read_uint(32) as usize;
                    ids = Some(self.blob(ids_len.saturating_mul(8)));
                    let map_len = self.r.read_uint(32) as usize;
                    map = Some(if map_len.saturating_mul(8) > self.r.bits_left() {
                        self.r.skip(map_len.saturating_mul(8));
                        ArenaStr::empty(Pool::Temp)
                    } else {
                        self.fixed_string(map_len)
                    });
                }
                NetMessage::SignonState {
                    state,
                    spawn_count,
                    num_server_players: players,
                    player_network_ids: ids,
                    map_name: map,
                }
            }
            NetMessageType::Print => NetMessage::Print {
                text: self.string(),
            },
            NetMessageType::ServerInfo => NetMessage::ServerInfo(Box::new(self.server_info())),
            NetMessageType::SendTable => {
                let needs_decoder = r.read_bit();
                let len = r.read_uint(16) as usize;
                NetMessage::SendTable {
                    needs_decoder,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::ClassInfo => {
                let count = self.r.read_uint(16);
                let create_on_client = self.r.read_bit();
                let mut classes = Vec::new();
                if !create_on_client {
                    let id_bits = bits_for(count);
                    classes.reserve(count as usize);
                    for _ in 0..count {
                        let id = self.r.read_uint(id_bits);
                        let name = self.string();
                        let table = self.string();
                        classes.push((id, name, table));
                        if self.r.overflowed() {
                            break;
                        }
                    }
                }
                NetMessage::ClassInfo {
                    create_on_client,
                    classes,
                }
            }
            NetMessageType::SetPause => NetMessage::SetPause {
                paused: r.read_bit(),
            },
            NetMessageType::CreateStringTable => {
                let name = self.string();
                let r = &mut *self.r;
                let max_entries = r.read_uint(16);
                let num_entries = r.read_uint(bits_for(max_entries));
                let len = if new_engine {
                    r.read_varint32()
                } else {
                    r.read_uint(20)
                } as usize;
                let user_data_fixed = r
                    .read_bit()
                    .then(|| (r.read_uint(12), r.read_uint(4)));
                let flags = if self.version.net_protocol >= 15 {
                    r.read_uint(if new_engine { 2 } else { 1 })
                } else {
                    0
                };
                NetMessage::CreateStringTable {
                    name,
                    max_entries,
                    num_entries,
                    user_data_fixed,
                    flags,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::UpdateStringTable => {
                let table_id = r.read_uint(5);
                let changed_entries = if r.read_bit() { r.read_uint(16) } else { 1 };
                let len = r.read_uint(20) as usize;
                NetMessage::UpdateStringTable {
                    table_id,
                    changed_entries,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::VoiceInit => {
                let codec = self.string();
                let quality = self.r.read_uint(8) as u8;
                let sample_rate =
                    (new_engine && quality == 255).then(|| self.r.read_uint(16) as u16);
                NetMessage::VoiceInit {
                    codec,
                    quality,
                    sample_rate,
                }
            }
            NetMessageType::VoiceData => {
                let client = r.read_uint(8) as u8;
                let proximity = r.read_uint(8) as u8;
                let len = r.read_uint(16) as usize;
                NetMessage::VoiceData {
                    client,
                    proximity,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::Sounds => {
                let reliable = r.read_bit();
                let (count, len) = if reliable {
                    (1, r.read_uint(8))
                } else {
                    (r.read_uint(8), r.read_uint(16))
                };
                NetMessage::Sounds {
                    reliable,
                    count,
                    data: r.fork_and_advance(len as usize),
                }
            }
            NetMessageType::SetView => NetMessage::SetView {
                entity: r.read_uint(ENTITY_INDEX_BITS),
            },
            NetMessageType::FixAngle => {
                let relative = self.r.read_bit();
                NetMessage::FixAngle {
                    relative,
                    angles: self.angles(),
                }
            }
            NetMessageType::CrosshairAngle => NetMessage::CrosshairAngle {
                angles: self.angles(),
            },
            NetMessageType::BspDecal => {
                let position = r.read_bit_vec3_coord();
                let texture = r.read_uint(9);
                let target = r.read_bit().then(|| {
                    (
                        r.read_uint(ENTITY_INDEX_BITS),
                        r.read_uint(self.version.model_index_bits),
                    )
                });
                NetMessage::BspDecal {
                    position,
                    texture,
                    target,
                    low_priority: r.read_bit(),
                }
            }
            NetMessageType::SplitScreen => {
                let kind = r.read_uint(1);
                let len = r.read_uint(11) as usize;
                NetMessage::SplitScreen {
                    kind,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::UserMessage => {
                let kind = r.read_uint(8) as u8;
                let len = r.read_uint(self.version.user_message_length_bits) as usize;
                NetMessage::UserMessage {
                    kind,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::EntityMessage => {
                let entity = r.read_uint(ENTITY_INDEX_BITS);
                let class = r.read_uint(9);
                let len = r.read_uint(11) as usize;
                NetMessage::EntityMessage {
                    entity,
                    class,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::GameEvent => {
                let len = r.read_uint(11) as usize;
                NetMessage::GameEvent {
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::PacketEntities => {
                let max_entries = r.read_uint(ENTITY_INDEX_BITS);
                let is_delta = r.read_bit();
                let delta_from = is_delta.then(|| r.read_sint(32));
                let baseline = r.read_bit();
                let updated_entries = r.read_uint(ENTITY_INDEX_BITS);
                let len = r.read_uint(20) as usize;
                let update_baseline = r.read_bit();
                NetMessage::PacketEntities(PacketEntities {
                    max_entries,
                    is_delta,
                    delta_from,
                    baseline,
                    updated_entries,
                    update_baseline,
                    data: r.fork_and_advance(len),
                })
            }
            NetMessageType::TempEntities => {
                let count = r.read_uint(8) as u8;
                let len = if new_engine {
                    r.read_varint32()
                } else {
                    r.read_uint(17)
                } as usize;
                NetMessage::TempEntities {
                    count,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::Prefetch => NetMessage::Prefetch {
                sound_index: r.read_uint(13),
            },
            NetMessageType::Menu => {
                let kind = r.read_uint(16) as u16;
                let len = r.read_uint(16) as usize;
                NetMessage::Menu {
                    kind,
                    data: r.fork_and_advance(len.saturating_mul(8)),
                }
            }
            NetMessageType::GameEventList => {
                let events = r.read_uint(9);
                let len = r.read_uint(20) as usize;
                NetMessage::GameEventList {
                    events,
                    data: r.fork_and_advance(len),
                }
            }
            NetMessageType::GetCvarValue => {
                let cookie = self.r.read_sint(32);
                NetMessage::GetCvarValue {
                    cookie,
                    name: self.string(),
                }
            }
            NetMessageType::CmdKeyValues => {
                let len = r.read_uint(32) as usize;
                NetMessage::CmdKeyValues {
                    data: r.fork_and_advance(len.saturating_mul(8)),
                }
            }
            NetMessageType::PaintmapData => {
                let len = r.read_uint(32) as usize;
                NetMessage::PaintmapData {
                    data: r.fork_and_advance(len),
                }
            }
        }
    }

    fn server_info(&mut self) -> ServerInfo {
        let version = self.version;
        let new_engine = version.game.is_new_engine();
        let r = &mut *self.r;

        let protocol = r.read_uint(16) as u16;
        let server_count = r.read_uint(32);
        let is_hltv = r.read_bit();
        let is_dedicated = r.read_bit();
        let client_crc = r.read_uint(32);
        let string_table_crc = new_engine.then(|| r.read_uint(32));
        let max_classes = r.read_uint(16) as u16;
        let map_hash = if version.net_protocol == 24 {
            let mut md5 = [0u8; 16];
            r.read_bytes(&mut md5);
            MapHash::Md5(md5)
        } else {
            MapHash::Crc(r.read_uint(32))
        };
        let player_slot = r.read_uint(8) as u8;
        let max_clients = r.read_uint(8) as u8;
        let tick_interval = r.read_f32();
        let os = r.read_uint(8) as u8;

        let game_dir = self.string();
        let map_name = self.string();
        let sky_name = self.string();
        let host_name = self.string();
        let has_replay =
            (new_engine && version.game != Game::Left4Dead).then(|| self.r.read_bit());

        ServerInfo {
            protocol,
            server_count,
            is_hltv,
            is_dedicated,
            client_crc,
            string_table_crc,
            max_classes,
            map_hash,
            player_slot,
            max_clients,
            tick_interval,
            os,
            game_dir,
            map_name,
            sky_name,
            host_name,
            has_replay,
        }
    }
}
