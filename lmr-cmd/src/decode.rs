use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use lmr::{
    assembly::AssemblerStats,
    bits::{parse_bits, BitFrame},
    channel::Input,
    config::{Engine, EngineConfig},
    message::{DecodedMessage, MessageRecord},
};
use serde::Serialize;
use tracing::{debug, info};

use crate::Format;

#[derive(Debug, Serialize)]
struct Output<'a> {
    messages: Vec<MessageRecord<'a>>,
    stats: AssemblerStats,
}

fn read_bits(input: &Path, packed: bool) -> Result<BitFrame> {
    if packed {
        let bytes = fs::read(input).with_context(|| format!("reading {input:?}"))?;
        return Ok(BitFrame::from_bytes(&bytes, bytes.len() * 8));
    }
    let text = fs::read_to_string(input).with_context(|| format!("reading {input:?}"))?;
    match parse_bits(&text) {
        Some(bits) => Ok(bits),
        None => bail!("{input:?} contains characters other than 0, 1 and whitespace"),
    }
}

pub fn decode(
    input: &Path,
    packed: bool,
    config: Option<&Path>,
    timeslot: u8,
    format: &Format,
) -> Result<()> {
    let config = match config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {path:?}"))?,
        None => EngineConfig::default(),
    };
    let engine = Engine::new(config).context("building engine")?;
    let bits = read_bits(input, packed)?;
    debug!("decoding {} bits with {}", bits.len(), engine.variant());

    let mut channel = engine.channel(timeslot, Vec::<DecodedMessage>::new());
    for (timestamp, bit) in bits.iter().enumerate() {
        channel.receive(Input::Bit {
            bit,
            timestamp: timestamp as u64,
        });
    }
    let stats = channel.stats();
    let messages = channel.into_listener();
    info!(
        decoded = stats.decoded,
        invalid = stats.invalid,
        abandoned = stats.abandoned,
        "done"
    );

    match format {
        Format::Json => {
            let output = Output {
                messages: messages.iter().map(DecodedMessage::record).collect(),
                stats,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Format::Text => {
            for msg in &messages {
                println!("{msg}");
            }
        }
    }
    Ok(())
}
