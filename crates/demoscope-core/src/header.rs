//! The fixed-layout demo file header.

/// Magic identifier at the start of every demo.
pub const DEMO_MAGIC: [u8; 8] = *b"HL2DEMO\0";

/// Width of each fixed name field in the header.
pub const HEADER_NAME_LEN: usize = 260;

/// Total header size in bytes.
pub const HEADER_SIZE: usize = 8 + 4 + 4 + 4 * HEADER_NAME_LEN + 4 + 4 + 4 + 4;

/// The 1072-byte header preceding the message stream.
///
/// Name fields are stored up to their first NUL.
#[derive(Clone, Debug, PartialEq)]
pub struct DemoHeader {
    /// Raw identifier bytes; [`DEMO_MAGIC`] for a valid file.
    pub id: [u8; 8],
    /// Container format revision.
    pub demo_protocol: i32,
    /// Network protocol revision of the recording game build.
    pub net_protocol: i32,
    /// Server the session was recorded on.
    pub server_name: String,
    /// Recording client's name.
    pub client_name: String,
    /// Map name.
    pub map_name: String,
    /// Game directory, e.g. `portal2`.
    pub game_directory: String,
    /// Playback length in seconds.
    pub seconds: f32,
    /// Number of ticks.
    pub tick_count: i32,
    /// Number of frames.
    pub frame_count: i32,
    /// Length of the signon section in bytes.
    pub signon_length: i32,
}

impl DemoHeader {
    /// A header with valid magic, the given protocols and every other field
    /// empty or zero.
    pub fn new(demo_protocol: i32, net_protocol: i32) -> Self {
        Self {
            id: DEMO_MAGIC,
            demo_protocol,
            net_protocol,
            server_name: String::new(),
            client_name: String::new(),
            map_name: String::new(),
            game_directory: String::new(),
            seconds: 0.0,
            tick_count: 0,
            frame_count: 0,
            signon_length: 0,
        }
    }

    /// Whether [`id`](Self::id) is the expected magic.
    pub fn has_valid_magic(&self) -> bool {
        self.id == DEMO_MAGIC
    }
}

/// Decode a fixed-width name field: bytes up to the first NUL (or the
/// whole field), lossily converted to UTF-8.
pub fn name_from_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Encode a name into a fixed-width, NUL-padded field. Names that do not
/// fit are cut so the field keeps a terminator.
pub fn name_to_field(name: &str) -> [u8; HEADER_NAME_LEN] {
    let mut field = [0u8; HEADER_NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(HEADER_NAME_LEN - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_1072_bytes() {
        assert_eq!(HEADER_SIZE, 1072);
    }

    #[test]
    fn name_field_roundtrip() {
        let field = name_to_field("portal2");
        assert_eq!(field[7], 0);
        assert_eq!(name_from_field(&field), "portal2");
    }

    #[test]
    fn unterminated_field_keeps_last_byte_free() {
        let long = "x".repeat(400);
        let field = name_to_field(&long);
        assert_eq!(field[HEADER_NAME_LEN - 1], 0);
        assert_eq!(name_from_field(&field).len(), HEADER_NAME_LEN - 1);
    }

    #[test]
    fn new_header_has_magic() {
        let h = DemoHeader::new(4, 2001);
        assert!(h.has_valid_magic());
        assert_eq!(h.map_name, "");
    }
}
