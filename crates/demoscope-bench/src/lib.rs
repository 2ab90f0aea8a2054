//! Benchmark profiles for demoscope.
//!
//! Builds synthetic recordings shaped like a small multiplayer match so
//! benchmarks and examples do not need real demo files:
//!
//! - [`reference_profile`]: 64 players over 1000 ticks
//! - [`stress_profile`]: 1024 players over 2000 ticks
//! - [`build_recording`]: any size, on any protocol header

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use demoscope_core::{ClassId, DemoHeader, FloatValue, PropValue, SchemaSet};
use demoscope_parser::flatten;
use demoscope_test_utils::{
    portal2_header, DemoBuilder, EntityRecords, NetMessages, SchemaBuilder,
};

/// Size of a synthetic recording.
#[derive(Clone, Debug)]
pub struct Profile {
    /// Protocol the recording is framed for.
    pub header: DemoHeader,
    /// Player entities, at indices `1..=players`.
    pub players: u16,
    /// Packets after the initial snapshot.
    pub ticks: i32,
}

/// 64 players over 1000 ticks on Portal 2 framing.
pub fn reference_profile() -> Profile {
    Profile {
        header: portal2_header(),
        players: 64,
        ticks: 1000,
    }
}

/// 1024 players over 2000 ticks.
pub fn stress_profile() -> Profile {
    Profile {
        header: portal2_header(),
        players: 1024,
        ticks: 2000,
    }
}

/// The send tables every profile uses: `CBaseEntity` (class 0) and
/// `CPlayer` (class 1) with six props.
pub fn player_schema() -> SchemaBuilder {
    let mut s = SchemaBuilder::new();
    let origin = s.vector("m_vecOrigin");
    let team = s.uint("m_iTeamNum", 6);
    s.table("DT_BaseEntity", vec![origin, team]);

    let base = s.nested("DT_BaseEntity");
    let health = s.uint("m_iHealth", 8);
    let speed = s.noscale("m_flMaxspeed");
    let armor = s.uint("m_ArmorValue", 8);
    let frags = s.int("m_iFrags", 16);
    s.table("DT_Player", vec![base, health, speed, armor, frags]);

    s.class("CBaseEntity", "DT_BaseEntity");
    s.class("CPlayer", "DT_Player");
    s
}

/// A schema shaped like a full game's: `classes` server classes, each
/// with its own table of `props` props on top of a shared collapsible
/// base and a nested physics table.
pub fn wide_schema(classes: usize, props: usize) -> SchemaBuilder {
    let mut s = SchemaBuilder::new();
    let origin = s.vector("m_vecOrigin");
    let fall = s.quantized("m_flFallVelocity", 12, -4096.0, 4096.0);
    s.table("DT_Physics", vec![origin, fall]);
    let team = s.uint("m_iTeamNum", 6);
    let model = s.uint("m_nModelIndex", 13);
    s.table("DT_Base", vec![team, model]);

    for c in 0..classes {
        let mut own = vec![s.collapsible("DT_Base"), s.nested("DT_Physics")];
        for p in 0..props {
            own.push(s.uint(&format!("m_field{p}"), 1 + (p % 32) as u32));
        }
        let table = format!("DT_Class{c}");
        s.table(&table, own);
        s.class(&format!("CClass{c}"), &table);
    }
    s
}

/// Encode `profile` as a complete recording.
///
/// Every player enters on the first packet; afterwards a quarter of them
/// move and take damage each tick. Values are a pure function of index and
/// tick, so the same profile always produces the same bytes.
///
/// # Panics
///
/// If `profile.players` is 2048 or more.
pub fn build_recording(profile: &Profile) -> Vec<u8> {
    let schema = player_schema();
    let set: SchemaSet = flatten(schema.parsed(), schema.arena()).expect("fixed schema flattens");
    let player = set.get(ClassId(1)).expect("CPlayer is class 1");

    let mut b = DemoBuilder::new(&profile.header);
    let version = *b.version();
    b.at(0).synctick();
    b.at(0).datatables(&schema.encode(&version));

    let mut rec = EntityRecords::new(&version, set.class_bits());
    for i in 1..=profile.players {
        rec.enter(
            player,
            i,
            u32::from(i) & 0x3FF,
            &[
                (0, origin(i, 0)),
                (1, PropValue::Int(i64::from(i % 2 + 2))),
                (2, PropValue::Int(100)),
                (3, PropValue::Float(FloatValue::Exact(320.0))),
                (4, PropValue::Int(0)),
                (5, PropValue::Int(0)),
            ],
        );
    }
    let mut m = NetMessages::new(&version);
    m.tick(0).packet_entities(&rec.finish(false, &[]));
    b.at(0).signon(&m.finish());

    for tick in 1..=profile.ticks {
        let mut rec = EntityRecords::new(&version, set.class_bits());
        for i in (1..=profile.players).filter(|i| (i32::from(*i) + tick) % 4 == 0) {
            rec.delta(
                player,
                i,
                &[
                    (0, origin(i, tick)),
                    (2, PropValue::Int(i64::from((tick + i32::from(i)) % 100 + 1))),
                ],
            );
        }
        let mut m = NetMessages::new(&version);
        m.tick(tick).packet_entities(&rec.finish(true, &[]));
        b.at(tick).packet(&m.finish());
        if tick % 100 == 0 {
            b.consolecmd(b"status\0");
        }
    }

    b.stop(&[]);
    b.finish()
}

fn origin(index: u16, tick: i32) -> PropValue {
    let x = f32::from(index) * 64.0;
    let y = tick as f32 * 0.5;
    PropValue::Vector3([
        FloatValue::Exact(x),
        FloatValue::Exact(y),
        FloatValue::Exact(64.0),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoscope_parser::{parse, DemoState, Interests};
    use demoscope_test_utils::RecordingHandler;

    fn small() -> Profile {
        Profile {
            header: portal2_header(),
            players: 8,
            ticks: 20,
        }
    }

    #[test]
    fn profile_decodes_cleanly() {
        let bytes = build_recording(&small());
        let mut handler = RecordingHandler::new(Interests::STORE_ENTS | Interests::PACKET_PARSED);
        let outcome = parse(bytes.as_slice(), &mut handler);
        assert_eq!(outcome.state, DemoState::Stopped, "{:?}", outcome.error);
        assert_eq!(handler.entities.len(), 8);
        // sync tick, data tables, signon, 20 packets, stop
        assert_eq!(outcome.messages, 24);
    }

    #[test]
    fn recording_is_deterministic() {
        assert_eq!(build_recording(&small()), build_recording(&small()));
    }

    #[test]
    fn wide_schema_flattens() {
        let schema = wide_schema(10, 8);
        let set = flatten(schema.parsed(), schema.arena()).unwrap();
        assert_eq!(set.len(), 10);
        let class = set.get(ClassId(9)).unwrap();
        // two base props, two physics props, eight own props
        assert_eq!(class.props.len(), 12);
    }

    #[test]
    fn profiles_fit_the_wire_limits() {
        assert!(reference_profile().players < 2048);
        assert!(stress_profile().players < 2048);
    }
}
