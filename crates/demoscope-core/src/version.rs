//! Protocol-version descriptor derived from the header.
//!
//! Everything that varies between engine branches (preamble layout, the
//! meaning of container kind 8, send-prop flag layout, net message id width)
//! is decided once here and read by the decoders.

use std::fmt;

use crate::header::DemoHeader;
use crate::message::MessageKind;

/// Engine branch a recording was made with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Game {
    /// Original Source (demo protocol 2, or 3 with an old net protocol).
    Source2004,
    /// Orange Box era Source (demo protocol 3).
    Source2007,
    /// Left 4 Dead.
    Left4Dead,
    /// Left 4 Dead 2.
    Left4Dead2,
    /// Portal 2.
    Portal2,
    /// Any other demo protocol 4+ game.
    NewEngine,
}

impl Game {
    /// Whether this branch uses the demo protocol 4+ layouts.
    pub fn is_new_engine(self) -> bool {
        !matches!(self, Self::Source2004 | Self::Source2007)
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source2004 => "Source 2004",
            Self::Source2007 => "Source 2007",
            Self::Left4Dead => "Left 4 Dead",
            Self::Left4Dead2 => "Left 4 Dead 2",
            Self::Portal2 => "Portal 2",
            Self::NewEngine => "new engine",
        };
        f.write_str(name)
    }
}

/// Size in bytes of one packet cmdinfo block.
pub const CMDINFO_BYTES: usize = 76;

/// Format parameters for one recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemoVersion {
    /// Container format revision from the header.
    pub demo_protocol: i32,
    /// Network protocol revision from the header.
    pub net_protocol: i32,
    /// Engine branch.
    pub game: Game,
    /// Whether each framed message carries a player-slot byte after its tick.
    pub has_slot_in_preamble: bool,
    /// Cmdinfo blocks per packet message.
    pub cmdinfo_size: usize,
    /// Width of a net message type id.
    pub net_message_type_bits: u32,
    /// Width of a send-prop flag field.
    pub sendprop_flag_bits: u32,
    /// Width of a send-prop bit-count field.
    pub sendprop_numbits_bits: u32,
    /// Whether send props carry a priority byte.
    pub has_sendprop_priority: bool,
    /// Width of a user message length.
    pub user_message_length_bits: u32,
    /// Width of a model index.
    pub model_index_bits: u32,
}

impl DemoVersion {
    /// Derive the descriptor from a header.
    pub fn from_header(header: &DemoHeader) -> Self {
        let game = match header.demo_protocol {
            ..=2 => Game::Source2004,
            3 if header.net_protocol <= 14 => Game::Source2004,
            3 => Game::Source2007,
            _ => match header.game_directory.as_str() {
                "left4dead" => Game::Left4Dead,
                "left4dead2" => Game::Left4Dead2,
                "portal2" => Game::Portal2,
                _ => Game::NewEngine,
            },
        };
        let new_engine = game.is_new_engine();

        Self {
            demo_protocol: header.demo_protocol,
            net_protocol: header.net_protocol,
            game,
            has_slot_in_preamble: header.demo_protocol >= 4,
            cmdinfo_size: match game {
                Game::Portal2 => 2,
                Game::Left4Dead | Game::Left4Dead2 => 4,
                _ => 1,
            },
            net_message_type_bits: if header.demo_protocol >= 4 { 6 } else { 5 },
            sendprop_flag_bits: match game {
                Game::Source2004 => 13,
                Game::Source2007 => 16,
                _ => 19,
            },
            sendprop_numbits_bits: if game == Game::Source2004 { 6 } else { 7 },
            has_sendprop_priority: game != Game::Source2004,
            user_message_length_bits: if new_engine { 12 } else { 11 },
            model_index_bits: if new_engine { 12 } else { 11 },
        }
    }

    /// Map a container kind byte. Kind 8 means string tables before demo
    /// protocol 4 and custom data from 4 on.
    pub fn message_kind(&self, byte: u8) -> Option<MessageKind> {
        match byte {
            1 => Some(MessageKind::Signon),
            2 => Some(MessageKind::Packet),
            3 => Some(MessageKind::SyncTick),
            4 => Some(MessageKind::ConsoleCmd),
            5 => Some(MessageKind::UserCmd),
            6 => Some(MessageKind::DataTables),
            7 => Some(MessageKind::Stop),
            8 if self.demo_protocol < 4 => Some(MessageKind::StringTables),
            8 => Some(MessageKind::CustomData),
            9 => Some(MessageKind::StringTables),
            _ => None,
        }
    }

    /// The byte this recording uses for `kind`.
    pub fn wire_kind(&self, kind: MessageKind) -> u8 {
        match kind {
            MessageKind::Signon => 1,
            MessageKind::Packet => 2,
            MessageKind::SyncTick => 3,
            MessageKind::ConsoleCmd => 4,
            MessageKind::UserCmd => 5,
            MessageKind::DataTables => 6,
            MessageKind::Stop => 7,
            MessageKind::CustomData => 8,
            MessageKind::StringTables if self.demo_protocol < 4 => 8,
            MessageKind::StringTables => 9,
        }
    }

    /// Whether send tables use a distinct 2-vector type tag.
    pub fn has_vector2(&self) -> bool {
        self.game != Game::Source2004
    }

    /// Whether entity prop lists start with the "new way" index bit.
    pub fn has_new_way_field_index(&self) -> bool {
        self.game != Game::Source2004
    }
}

impl fmt::Display for DemoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (demo protocol {}, net protocol {})",
            self.game, self.demo_protocol, self.net_protocol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(demo: i32, net: i32, dir: &str) -> DemoVersion {
        let mut h = DemoHeader::new(demo, net);
        h.game_directory = dir.to_string();
        DemoVersion::from_header(&h)
    }

    #[test]
    fn old_protocols() {
        assert_eq!(version(2, 7, "hl2").game, Game::Source2004);
        assert_eq!(version(3, 14, "hl2").game, Game::Source2004);
        let v = version(3, 24, "hl2");
        assert_eq!(v.game, Game::Source2007);
        assert!(!v.has_slot_in_preamble);
        assert_eq!(v.net_message_type_bits, 5);
        assert_eq!(v.sendprop_flag_bits, 16);
        assert_eq!(v.cmdinfo_size, 1);
    }

    #[test]
    fn new_engine_games_by_directory() {
        let p2 = version(4, 2001, "portal2");
        assert_eq!(p2.game, Game::Portal2);
        assert_eq!(p2.cmdinfo_size, 2);
        assert!(p2.has_slot_in_preamble);
        assert_eq!(p2.net_message_type_bits, 6);
        assert_eq!(p2.sendprop_flag_bits, 19);

        assert_eq!(version(4, 37, "left4dead").cmdinfo_size, 4);
        assert_eq!(version(4, 2042, "left4dead2").game, Game::Left4Dead2);
        assert_eq!(version(4, 2000, "csgo").game, Game::NewEngine);
    }

    #[test]
    fn source2004_prop_layout() {
        let v = version(2, 7, "cstrike");
        assert_eq!(v.sendprop_flag_bits, 13);
        assert_eq!(v.sendprop_numbits_bits, 6);
        assert!(!v.has_sendprop_priority);
        assert!(!v.has_vector2());
    }

    #[test]
    fn kind_eight_depends_on_protocol() {
        assert_eq!(
            version(3, 24, "hl2").message_kind(8),
            Some(MessageKind::StringTables)
        );
        assert_eq!(
            version(4, 2001, "portal2").message_kind(8),
            Some(MessageKind::CustomData)
        );
        assert_eq!(version(4, 2001, "portal2").message_kind(0), None);
        assert_eq!(version(4, 2001, "portal2").message_kind(10), None);
    }

    #[test]
    fn wire_kind_inverts_message_kind() {
        for v in [version(3, 24, "hl2"), version(4, 2001, "portal2")] {
            for byte in 1..=9u8 {
                if let Some(kind) = v.message_kind(byte) {
                    let back = v.wire_kind(kind);
                    assert_eq!(v.message_kind(back), Some(kind));
                }
            }
        }
    }
}
