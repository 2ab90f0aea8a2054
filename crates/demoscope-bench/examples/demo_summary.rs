//! Summarise a demo file, or the synthetic reference recording.
//!
//! Usage: `cargo run --example demo_summary [path/to/file.dem]`

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

use demoscope_bench::{build_recording, reference_profile};
use demoscope_core::{ConsoleCmd, DemoHeader, DemoVersion, Packet};
use demoscope_parser::{
    parse, DemoHandler, Flow, HandlerContext, Interests, NetMessage, PacketEntities,
    PacketEntitiesParsed,
};

#[derive(Default)]
struct Summary {
    version: Option<DemoVersion>,
    header: Option<DemoHeader>,
    net_messages: BTreeMap<String, u64>,
    commands: Vec<String>,
    entity_updates: u64,
    peak_entities: usize,
    last_tick: i32,
}

impl DemoHandler for Summary {
    fn interests(&self) -> Interests {
        Interests::VERSION
            | Interests::HEADER
            | Interests::CONSOLECMD
            | Interests::PACKET_PARSED
            | Interests::PACKET_ENTITIES
    }

    fn on_version(&mut self, version: &DemoVersion) -> Flow {
        self.version = Some(*version);
        Flow::Continue
    }

    fn on_header(&mut self, header: &DemoHeader) -> Flow {
        self.header = Some(header.clone());
        Flow::Continue
    }

    fn on_consolecmd(&mut self, ctx: &HandlerContext<'_>, message: &ConsoleCmd<'_>) -> Flow {
        let command = String::from_utf8_lossy(message.command());
        self.commands.push(format!("{:>6}  {command}", ctx.tick()));
        Flow::Continue
    }

    fn on_packet_parsed(
        &mut self,
        ctx: &HandlerContext<'_>,
        _packet: &Packet<'_>,
        messages: &[NetMessage<'_>],
    ) -> Flow {
        for message in messages {
            *self
                .net_messages
                .entry(message.message_type().to_string())
                .or_default() += 1;
        }
        self.peak_entities = self.peak_entities.max(ctx.entities().len());
        self.last_tick = self.last_tick.max(ctx.tick().0);
        Flow::Continue
    }

    fn on_packet_entities(
        &mut self,
        _ctx: &HandlerContext<'_>,
        _message: &PacketEntities<'_>,
        parsed: Option<&PacketEntitiesParsed>,
    ) -> Flow {
        if let Some(parsed) = parsed {
            self.entity_updates += parsed.updates.len() as u64;
        }
        Flow::Continue
    }
}

fn main() {
    let mut summary = Summary::default();
    let outcome = match std::env::args().nth(1) {
        Some(path) => {
            println!("=== {path} ===\n");
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("cannot open {path}: {e}");
                    std::process::exit(1);
                }
            };
            parse(BufReader::new(file), &mut summary)
        }
        None => {
            println!("=== synthetic reference recording ===\n");
            let bytes = build_recording(&reference_profile());
            parse(bytes.as_slice(), &mut summary)
        }
    };

    if let (Some(version), Some(header)) = (&summary.version, &summary.header) {
        println!("protocol:  {version}");
        println!("game:      {}", header.game_directory);
        println!("map:       {}", header.map_name);
    }
    println!("state:     {}", outcome.state);
    if let Some(message) = outcome.error_message() {
        println!("error:     {message}");
    }
    println!("messages:  {}", outcome.messages);
    println!("last tick: {}", summary.last_tick);
    println!("entities:  {} peak, {} updates", summary.peak_entities, summary.entity_updates);

    println!("\nnet messages:");
    for (name, count) in &summary.net_messages {
        println!("  {name:<24} {count:>8}");
    }
    if !summary.commands.is_empty() {
        println!("\nconsole commands:");
        for line in summary.commands.iter().take(20) {
            println!("  {line}");
        }
    }
}
