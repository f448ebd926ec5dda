use anyhow::Result;
use lmr::{catalog::Catalog, fec::BlockCodec, message::Protocol};
use serde::Serialize;

use crate::Format;

#[derive(Debug, Serialize)]
struct PatternInfo {
    name: String,
    protocol: Protocol,
    hex: String,
    bits: u32,
    threshold: u32,
    class: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClassInfo {
    name: String,
    protocol: Protocol,
    codec: String,
    slots: usize,
    slot_bits: usize,
    quorum: usize,
}

#[derive(Debug, Serialize)]
struct Listing {
    patterns: Vec<PatternInfo>,
    classes: Vec<ClassInfo>,
}

fn listing(catalog: &Catalog) -> Listing {
    let patterns = catalog
        .patterns()
        .iter()
        .map(|(id, p)| PatternInfo {
            name: p.name.clone(),
            protocol: p.protocol,
            hex: format!("{:0width$X}", p.value, width = (p.len as usize).div_ceil(4)),
            bits: p.len,
            threshold: p.threshold,
            class: catalog.layout(id).map(|l| l.class().to_string()),
        })
        .collect();
    let classes = catalog
        .class_names()
        .into_iter()
        .filter_map(|name| catalog.class(name))
        .map(|c| ClassInfo {
            name: c.name.clone(),
            protocol: c.protocol,
            codec: c.codec.name().to_string(),
            slots: c.slots,
            slot_bits: c.slot_bits,
            quorum: c.quorum,
        })
        .collect();
    Listing { patterns, classes }
}

pub fn patterns(format: &Format) -> Result<()> {
    let catalog = Catalog::standard()?;
    let listing = listing(&catalog);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&listing)?),
        Format::Text => {
            println!("{:<14} {:<6} {:<14} {:>4} {:>4}  CLASS", "PATTERN", "PROTO", "VALUE", "BITS", "MAX");
            for p in &listing.patterns {
                println!(
                    "{:<14} {:<6} {:<14} {:>4} {:>4}  {}",
                    p.name,
                    p.protocol.to_string(),
                    p.hex,
                    p.bits,
                    p.threshold,
                    p.class.as_deref().unwrap_or("-")
                );
            }
            println!();
            println!("{:<14} {:<22} {:>5} {:>9} {:>6}", "CLASS", "CODEC", "SLOTS", "SLOT_BITS", "QUORUM");
            for c in &listing.classes {
                println!(
                    "{:<14} {:<22} {:>5} {:>9} {:>6}",
                    c.name, c.codec, c.slots, c.slot_bits, c.quorum
                );
            }
        }
    }
    Ok(())
}
