//! Container message kinds and the borrowed views handed to handlers.
//!
//! Payload slices borrow the dispatcher's per-message buffer and are only
//! valid for the duration of the callback that receives them.

use std::fmt;

use smallvec::SmallVec;

use crate::id::Tick;
use crate::version::CMDINFO_BYTES;

/// Kind of a framed container message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Signon-phase network packet.
    Signon,
    /// In-game network packet.
    Packet,
    /// Tick synchronisation marker; no payload.
    SyncTick,
    /// Console command text.
    ConsoleCmd,
    /// Encoded user command.
    UserCmd,
    /// Send tables and server classes.
    DataTables,
    /// End of recording.
    Stop,
    /// Game-specific custom data (demo protocol 4+).
    CustomData,
    /// String table snapshot.
    StringTables,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signon => "signon",
            Self::Packet => "packet",
            Self::SyncTick => "synctick",
            Self::ConsoleCmd => "consolecmd",
            Self::UserCmd => "usercmd",
            Self::DataTables => "datatables",
            Self::Stop => "stop",
            Self::CustomData => "customdata",
            Self::StringTables => "stringtables",
        };
        f.write_str(name)
    }
}

/// Ordering key carried by every framed message except stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preamble {
    /// Decoded kind.
    pub kind: MessageKind,
    /// Kind byte as it appeared on the wire.
    pub wire_kind: u8,
    /// Tick the message belongs to.
    pub tick: Tick,
    /// Player slot; 0 when the protocol has no slot byte.
    pub slot: u8,
}

/// Camera and view state for one split-screen player, carried by packets.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CmdInfo {
    /// View flags.
    pub flags: i32,
    /// Eye position.
    pub view_origin: [f32; 3],
    /// View angles.
    pub view_angles: [f32; 3],
    /// Local view angles.
    pub local_view_angles: [f32; 3],
    /// Interpolated eye position.
    pub view_origin2: [f32; 3],
    /// Interpolated view angles.
    pub view_angles2: [f32; 3],
    /// Interpolated local view angles.
    pub local_view_angles2: [f32; 3],
}

impl CmdInfo {
    /// Decode one little-endian cmdinfo block.
    pub fn from_bytes(raw: &[u8; CMDINFO_BYTES]) -> Self {
        let word = |i: usize| -> [u8; 4] { [raw[i], raw[i + 1], raw[i + 2], raw[i + 3]] };
        let vec3 = |at: usize| -> [f32; 3] {
            [
                f32::from_le_bytes(word(at)),
                f32::from_le_bytes(word(at + 4)),
                f32::from_le_bytes(word(at + 8)),
            ]
        };
        Self {
            flags: i32::from_le_bytes(word(0)),
            view_origin: vec3(4),
            view_angles: vec3(16),
            local_view_angles: vec3(28),
            view_origin2: vec3(40),
            view_angles2: vec3(52),
            local_view_angles2: vec3(64),
        }
    }

    /// Encode as a little-endian cmdinfo block.
    pub fn to_bytes(&self) -> [u8; CMDINFO_BYTES] {
        let mut out = [0u8; CMDINFO_BYTES];
        out[..4].copy_from_slice(&self.flags.to_le_bytes());
        let vectors = [
            self.view_origin,
            self.view_angles,
            self.local_view_angles,
            self.view_origin2,
            self.view_angles2,
            self.local_view_angles2,
        ];
        for (i, v) in vectors.iter().enumerate() {
            for (j, c) in v.iter().enumerate() {
                let at = 4 + i * 12 + j * 4;
                out[at..at + 4].copy_from_slice(&c.to_le_bytes());
            }
        }
        out
    }
}

/// A console command.
#[derive(Clone, Copy, Debug)]
pub struct ConsoleCmd<'a> {
    /// Ordering key.
    pub preamble: Preamble,
    /// Command text; the last byte is always NUL.
    pub data: &'a [u8],
}

impl ConsoleCmd<'_> {
    /// Command text up to the first NUL.
    pub fn command(&self) -> &[u8] {
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(self.data.len());
        &self.data[..end]
    }
}

/// Game-specific custom data.
#[derive(Clone, Copy, Debug)]
pub struct CustomData<'a> {
    /// Ordering key.
    pub preamble: Preamble,
    /// Callback index preceding the payload.
    pub unknown: i32,
    /// Payload bytes.
    pub data: &'a [u8],
}

/// Raw send-table definitions.
#[derive(Clone, Copy, Debug)]
pub struct DataTables<'a> {
    /// Ordering key.
    pub preamble: Preamble,
    /// Bit-packed tables and classes.
    pub data: &'a [u8],
}

/// A signon or in-game network packet.
#[derive(Clone, Debug)]
pub struct Packet<'a> {
    /// Ordering key; `kind` is [`MessageKind::Packet`] or
    /// [`MessageKind::Signon`].
    pub preamble: Preamble,
    /// One block per split-screen player.
    pub cmdinfo: SmallVec<[CmdInfo; 4]>,
    /// Incoming sequence number.
    pub in_sequence: i32,
    /// Outgoing sequence number.
    pub out_sequence: i32,
    /// Bit-packed net messages.
    pub data: &'a [u8],
}

/// End of the recording. Whatever follows the kind byte is its payload.
#[derive(Clone, Copy, Debug)]
pub struct Stop<'a> {
    /// Trailing bytes.
    pub data: &'a [u8],
}

/// Raw string table snapshot.
#[derive(Clone, Copy, Debug)]
pub struct StringTables<'a> {
    /// Ordering key.
    pub preamble: Preamble,
    /// Bit-packed tables.
    pub data: &'a [u8],
}

/// Tick synchronisation marker.
#[derive(Clone, Copy, Debug)]
pub struct SyncTick {
    /// Ordering key.
    pub preamble: Preamble,
}

/// An encoded user command.
#[derive(Clone, Copy, Debug)]
pub struct UserCmd<'a> {
    /// Ordering key.
    pub preamble: Preamble,
    /// Command sequence number.
    pub cmd: i32,
    /// Delta-encoded command bytes.
    pub data: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmdinfo_roundtrip() {
        let info = CmdInfo {
            flags: 3,
            view_origin: [1.0, -2.0, 64.5],
            view_angles: [10.0, 20.0, 0.0],
            local_view_angles2: [0.25, 0.5, 0.75],
            ..CmdInfo::default()
        };
        let bytes = info.to_bytes();
        assert_eq!(&bytes[..4], &3i32.to_le_bytes());
        assert_eq!(CmdInfo::from_bytes(&bytes), info);
    }

    #[test]
    fn console_command_text_stops_at_nul() {
        let preamble = Preamble {
            kind: MessageKind::ConsoleCmd,
            wire_kind: 4,
            tick: Tick(0),
            slot: 0,
        };
        let cmd = ConsoleCmd {
            preamble,
            data: b"sv_cheats 1\0",
        };
        assert_eq!(cmd.command(), b"sv_cheats 1");
    }
}
