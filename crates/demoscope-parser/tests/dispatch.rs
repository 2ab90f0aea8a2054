//! Message loop integration tests.
//!
//! Each test builds a recording with `DemoBuilder`, runs it through a
//! `RecordingHandler` and checks the callbacks, the terminal state and how
//! far the input was consumed.

use demoscope_core::{DemoError, DemoHeader, ErrorKind, MessageKind, HEADER_SIZE};
use demoscope_parser::{
    parse, DemoParser, DemoState, Interests, NetMessageType, ParseOutcome, ParserConfig,
};
use demoscope_test_utils::{
    orange_box_header, portal2_header, source2004_header, DemoBuilder, Event, NetMessages,
    RecordingHandler,
};

// ── Helpers ─────────────────────────────────────────────────────

fn run(bytes: &[u8], handler: RecordingHandler) -> (ParseOutcome, RecordingHandler, u64) {
    let mut parser = DemoParser::new(bytes, handler, ParserConfig::default()).unwrap();
    let outcome = parser.run();
    let position = parser.position();
    (outcome, parser.into_handler(), position)
}

/// A session touching every message kind.
fn busy_recording(header: &DemoHeader) -> Vec<u8> {
    let mut b = DemoBuilder::new(header);
    let payload = {
        let mut m = NetMessages::new(b.version());
        m.tick(10).print("hello").string_cmd("status");
        m.finish()
    };
    b.at(0).synctick();
    b.at(1).signon(&payload);
    b.at(2).consolecmd(b"say hi\0");
    b.at(3).usercmd(7, &[0xAB; 12]);
    b.at(10).packet(&payload);
    b.at(11).stringtables(&[0]);
    b.at(12).synctick();
    b.stop(b"trailing");
    b.finish()
}

fn without_nops(messages: &[NetMessageType]) -> Vec<NetMessageType> {
    messages
        .iter()
        .copied()
        .filter(|&m| m != NetMessageType::Nop)
        .collect()
}

// ── Framing ─────────────────────────────────────────────────────

#[test]
fn stop_after_header() {
    let mut b = DemoBuilder::new(&portal2_header());
    b.stop(&[]);
    let bytes = b.finish();

    let (outcome, handler, position) =
        run(&bytes, RecordingHandler::new(Interests::HEADER | Interests::STOP));
    assert_eq!(outcome.state, DemoState::Stopped);
    assert!(outcome.error.is_none());
    assert_eq!(position, HEADER_SIZE as u64 + 1);
    assert_eq!(
        handler.events,
        [
            Event::Header {
                map: "sp_a1_intro1".into()
            },
            Event::Stop { trailing: vec![] },
        ]
    );
}

#[test]
fn minimal_header_then_stop_byte() {
    let mut bytes = b"HL2DEMO\0".to_vec();
    bytes.extend_from_slice(&4i32.to_le_bytes());
    bytes.resize(HEADER_SIZE, 0);
    bytes.push(0x07);

    let (outcome, handler, position) =
        run(&bytes, RecordingHandler::new(Interests::HEADER | Interests::STOP));
    assert_eq!(outcome.state, DemoState::Stopped);
    assert!(outcome.error.is_none());
    assert_eq!(position, 1073);
    assert_eq!(
        handler.events,
        [
            Event::Header { map: String::new() },
            Event::Stop { trailing: vec![] },
        ]
    );
}

#[test]
fn oversized_length_is_rejected_before_payload() {
    let mut b = DemoBuilder::new(&orange_box_header());
    b.raw(&[6]);
    b.raw(&0i32.to_le_bytes());
    b.raw(&(1i32 << 26).to_le_bytes());
    b.raw(&[0u8; 256]);
    let bytes = b.finish();

    let (outcome, handler, position) = run(&bytes, RecordingHandler::new(Interests::DATATABLES));
    assert_eq!(outcome.state, DemoState::Errored);
    assert!(matches!(
        outcome.error,
        Some(DemoError::InvalidLength {
            kind: MessageKind::DataTables,
            ..
        })
    ));
    assert!(handler.events.is_empty());
    assert_eq!(position, HEADER_SIZE as u64 + 9);
}

#[test]
fn invalid_kind_byte_ends_the_session() {
    let mut b = DemoBuilder::new(&orange_box_header());
    b.at(1).synctick();
    b.raw(&[0]);
    let bytes = b.finish();

    let (outcome, handler, _) = run(&bytes, RecordingHandler::new(Interests::SYNCTICK));
    assert_eq!(outcome.state, DemoState::Errored);
    assert!(matches!(
        outcome.error,
        Some(DemoError::InvalidMessageType { kind: 0 })
    ));
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Format));
    assert_eq!(handler.events, [Event::SyncTick { tick: 1 }]);
}

#[test]
fn invalid_magic() {
    let mut bytes = busy_recording(&orange_box_header());
    bytes[0] = b'X';
    let outcome = parse(bytes.as_slice(), RecordingHandler::new(Interests::HEADER));
    assert_eq!(outcome.state, DemoState::Errored);
    assert!(matches!(outcome.error, Some(DemoError::InvalidMagic { .. })));
}

#[test]
fn header_only_interests_skip_the_loop() {
    let mut bytes = busy_recording(&orange_box_header());
    // Garbage after the header must never be looked at.
    bytes.truncate(HEADER_SIZE);
    bytes.extend_from_slice(&[0xFF; 8]);

    let (outcome, handler, position) = run(
        &bytes,
        RecordingHandler::new(Interests::HEADER | Interests::VERSION),
    );
    assert_eq!(outcome.state, DemoState::EndOfInput);
    assert!(!outcome.is_error());
    assert_eq!(position, HEADER_SIZE as u64);
    assert_eq!(
        handler.events,
        [
            Event::Version {
                demo_protocol: 3,
                net_protocol: 24
            },
            Event::Header {
                map: "ctf_2fort".into()
            },
        ]
    );
}

#[test]
fn truncated_message_is_a_truncation_error() {
    let full = busy_recording(&orange_box_header());
    for cut in [HEADER_SIZE + 3, HEADER_SIZE + 20, full.len() - 20] {
        let outcome = parse(&full[..cut], RecordingHandler::new(Interests::all()));
        assert_eq!(outcome.state, DemoState::Errored, "cut at {cut}");
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Truncation), "cut at {cut}");
    }
}

#[test]
fn end_of_input_at_a_message_boundary() {
    let mut b = DemoBuilder::new(&portal2_header());
    b.at(5).synctick();
    let bytes = b.finish();
    let outcome = parse(bytes.as_slice(), RecordingHandler::new(Interests::SYNCTICK));
    assert_eq!(outcome.state, DemoState::EndOfInput);
    assert_eq!(outcome.messages, 1);
}

// ── Dispatch ────────────────────────────────────────────────────

#[test]
fn every_callback_in_wire_order() {
    for header in [source2004_header(), orange_box_header(), portal2_header()] {
        let bytes = busy_recording(&header);
        let interests = Interests::SYNCTICK
            | Interests::PACKET
            | Interests::CONSOLECMD
            | Interests::USERCMD
            | Interests::STRINGTABLES
            | Interests::STOP;
        let (outcome, handler, position) = run(&bytes, RecordingHandler::new(interests));
        assert_eq!(outcome.state, DemoState::Stopped, "{header:?}");
        assert_eq!(outcome.messages, 8);
        assert_eq!(position, bytes.len() as u64);

        let kinds: Vec<_> = handler
            .events
            .iter()
            .map(|e| match e {
                Event::SyncTick { tick } => format!("synctick@{tick}"),
                Event::Packet { tick, kind, .. } => format!("{kind}@{tick}"),
                Event::ConsoleCmd { tick, command } => format!("{command}@{tick}"),
                Event::UserCmd { tick, cmd, len } => format!("usercmd {cmd} {len}@{tick}"),
                Event::StringTables { tick, len } => format!("stringtables {len}@{tick}"),
                Event::Stop { trailing } => format!("stop {}", trailing.len()),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            [
                "synctick@0",
                "signon@1",
                "say hi@2",
                "usercmd 7 12@3",
                "packet@10",
                "stringtables 1@11",
                "synctick@12",
                "stop 8",
            ]
        );
    }
}

#[test]
fn skipping_and_decoding_agree_on_framing() {
    let bytes = busy_recording(&portal2_header());

    let (skipped, skipper, _) = run(&bytes, RecordingHandler::new(Interests::SYNCTICK));
    let (decoded, decoder, _) = run(&bytes, RecordingHandler::new(Interests::all()));

    assert_eq!(skipped.state, DemoState::Stopped);
    assert_eq!(decoded.state, DemoState::Stopped);
    assert_eq!(skipped.messages, decoded.messages);
    assert_eq!(skipper.ticks(), decoder.ticks());
    assert_eq!(skipper.ticks(), [0, 12]);
}

#[test]
fn packets_split_into_net_messages() {
    for header in [source2004_header(), orange_box_header(), portal2_header()] {
        let bytes = busy_recording(&header);
        let (outcome, handler, _) = run(&bytes, RecordingHandler::new(Interests::PACKET_PARSED));
        assert!(!outcome.is_error(), "{:?}", outcome.error);

        let parsed: Vec<_> = handler
            .events
            .iter()
            .map(|e| match e {
                Event::PacketParsed { tick, messages } => (*tick, without_nops(messages)),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let expected = vec![
            NetMessageType::Tick,
            NetMessageType::Print,
            NetMessageType::StringCmd,
        ];
        assert_eq!(parsed, [(1, expected.clone()), (10, expected)]);
    }
}

#[test]
fn custom_data_only_exists_from_protocol_four() {
    let mut b = DemoBuilder::new(&portal2_header());
    b.at(4).customdata(-1, b"blob");
    b.stop(&[]);
    let bytes = b.finish();
    let (_, handler, _) = run(&bytes, RecordingHandler::new(Interests::CUSTOMDATA));
    assert_eq!(
        handler.events,
        [Event::CustomData {
            tick: 4,
            unknown: -1,
            data: b"blob".to_vec()
        }]
    );

    // The same byte is a string tables message on older protocols.
    let mut b = DemoBuilder::new(&orange_box_header());
    b.raw(&[8]);
    b.raw(&4i32.to_le_bytes());
    b.raw(&1i32.to_le_bytes());
    b.raw(&[0]);
    let bytes = b.finish();
    let (_, handler, _) = run(&bytes, RecordingHandler::new(Interests::STRINGTABLES));
    assert_eq!(handler.events, [Event::StringTables { tick: 4, len: 1 }]);
}

// ── Early stop ──────────────────────────────────────────────────

#[test]
fn handler_stop_ends_the_session_cleanly() {
    let bytes = busy_recording(&orange_box_header());
    let (outcome, handler, position) = run(
        &bytes,
        RecordingHandler::new(Interests::SYNCTICK | Interests::CONSOLECMD).stop_after(2),
    );
    assert_eq!(outcome.state, DemoState::Stopped);
    assert!(!outcome.is_error());
    assert_eq!(outcome.messages, 3);
    assert_eq!(handler.events.len(), 2);
    assert!(position < bytes.len() as u64);
}

#[test]
fn stop_from_a_raw_callback_still_delivers_the_parsed_one() {
    let bytes = busy_recording(&orange_box_header());
    let (outcome, handler, _) = run(
        &bytes,
        RecordingHandler::new(Interests::PACKET | Interests::PACKET_PARSED).stop_after(1),
    );
    assert_eq!(outcome.state, DemoState::Stopped);
    assert!(matches!(handler.events[0], Event::Packet { tick: 1, .. }));
    assert!(matches!(handler.events[1], Event::PacketParsed { tick: 1, .. }));
    assert_eq!(handler.events.len(), 2);
}

#[test]
fn config_ceiling_applies_to_lengths() {
    let bytes = busy_recording(&orange_box_header());
    let config = ParserConfig {
        max_message_len: 4,
        ..ParserConfig::default()
    };
    let mut parser =
        DemoParser::new(bytes.as_slice(), RecordingHandler::new(Interests::all()), config)
            .unwrap();
    let outcome = parser.run();
    assert!(matches!(
        outcome.error,
        Some(DemoError::InvalidLength {
            kind: MessageKind::Signon,
            ..
        })
    ));
}
