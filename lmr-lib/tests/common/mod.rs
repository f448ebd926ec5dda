#![allow(dead_code)]
use lmr::{
    assembly::Position,
    bits::BitFrame,
    catalog::{Catalog, DMR_SHORT_LC},
    channel::{ChannelDecoder, Input, MessageListener},
    config::{Engine, EngineConfig},
    fec::BlockCodec,
    message::dmr::Cach,
};
use rand::{rngs::StdRng, Rng};

pub const DMR_SYNC: &str = "dmr-bs-data";

pub fn engine() -> Engine {
    Engine::new(EngineConfig::default()).expect("standard engine")
}

pub fn random_bits(rng: &mut StdRng, n: usize) -> Vec<bool> {
    (0..n).map(|_| rng.gen()).collect()
}

pub fn sync_bits(catalog: &Catalog, name: &str) -> Vec<bool> {
    let patterns = catalog.patterns();
    patterns
        .get(patterns.find(name).expect("pattern"))
        .expect("pattern")
        .bits()
}

/// Split the coded block of `payload` into the fragments of `class`.
pub fn fragments(catalog: &Catalog, class: &str, payload: &BitFrame) -> Vec<BitFrame> {
    let class = catalog.class(class).expect("class");
    let coded = class.codec.encode(payload);
    (0..class.slots)
        .map(|i| coded.slice(i * class.slot_bits..(i + 1) * class.slot_bits))
        .collect()
}

/// FIRST, CONTINUE.., LAST for `n` fragments.
pub fn positions(n: usize) -> Vec<Position> {
    let mut zult = vec![Position::First];
    zult.extend(std::iter::repeat(Position::Continue).take(n - 2));
    zult.push(Position::Last);
    zult
}

/// One 288-bit DMR base station burst carrying `fragment` in its CACH.
pub fn dmr_burst(
    catalog: &Catalog,
    position: Position,
    fragment: &BitFrame,
    rng: &mut StdRng,
) -> Vec<bool> {
    let mut zult: Vec<bool> = Cach::encode(false, 1, position, fragment).iter().collect();
    zult.extend(random_bits(rng, 108));
    zult.extend(sync_bits(catalog, DMR_SYNC));
    zult.extend(random_bits(rng, 108));
    zult
}

/// The four bursts carrying the Short LC `lc`.
pub fn short_lc_bursts(catalog: &Catalog, lc: &BitFrame, rng: &mut StdRng) -> Vec<Vec<bool>> {
    fragments(catalog, DMR_SHORT_LC, lc)
        .iter()
        .zip(positions(4))
        .map(|(fragment, position)| dmr_burst(catalog, position, fragment, rng))
        .collect()
}

/// Feed hard bits, advancing `timestamp` by one per bit.
pub fn feed<L: MessageListener>(decoder: &mut ChannelDecoder<L>, bits: &[bool], timestamp: &mut u64) {
    for &bit in bits {
        decoder.receive(Input::Bit {
            bit,
            timestamp: *timestamp,
        });
        *timestamp += 1;
    }
}
