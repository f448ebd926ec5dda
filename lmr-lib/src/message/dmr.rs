//! DMR CACH signalling and Short LC messages.
use std::fmt;

use crc::{Crc, CRC_8_SMBUS};

use super::{Discriminator, Identifier, IdentifierKind, MessageKind, Protocol, Registry, Role};
use crate::{
    assembly::Position,
    bits::BitFrame,
    fec::{HammingResult, HAMMING_7_4},
    Result,
};

/// Bits in the CACH at the start of a base station burst.
pub const CACH_BITS: usize = 24;
/// Short LC fragment bits carried by one CACH.
pub const CACH_PAYLOAD_BITS: usize = 17;
/// Short LC length after error correction: SLCO, 24 data bits, CRC-8.
pub const SHORT_LC_BITS: usize = 36;

/// CACH bit positions of the 7 TACT bits: AT, TC, LCSS(2) and 3 Hamming parity bits.
const TACT_POSITIONS: [usize; 7] = [0, 4, 8, 12, 14, 18, 22];

/// x^8 + x^2 + x + 1 with zero preset.
const SHORT_LC_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Decoded Common Announcement Channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cach {
    /// Inbound channel busy.
    pub access_type: bool,
    /// Timeslot (1 or 2) of the burst following this CACH.
    pub timeslot: u8,
    pub lcss: Position,
    /// The Short LC fragment.
    pub payload: BitFrame,
    /// The TACT needed a Hamming correction.
    pub corrected: bool,
}

fn lcss_position(lcss: u8) -> Position {
    match lcss & 0b11 {
        0 => Position::Single,
        1 => Position::First,
        2 => Position::Last,
        _ => Position::Continue,
    }
}

fn position_lcss(position: Position) -> u8 {
    match position {
        Position::Single => 0,
        Position::First => 1,
        Position::Last => 2,
        Position::Continue => 3,
    }
}

impl Cach {
    /// # Panics
    /// If `bits` is not [CACH_BITS] long.
    pub fn decode(bits: &BitFrame) -> Self {
        assert_eq!(bits.len(), CACH_BITS, "CACH must be {CACH_BITS} bits");
        let mut tact: Vec<bool> = TACT_POSITIONS.iter().map(|&i| bits.flag(i)).collect();
        let corrected = !matches!(HAMMING_7_4.correct(&mut tact), HammingResult::Clean);
        let payload = (0..CACH_BITS)
            .filter(|i| !TACT_POSITIONS.contains(i))
            .map(|i| bits.flag(i))
            .collect();
        let lcss = (u8::from(tact[2]) << 1) | u8::from(tact[3]);

        Self {
            access_type: tact[0],
            timeslot: if tact[1] { 2 } else { 1 },
            lcss: lcss_position(lcss),
            payload,
            corrected,
        }
    }

    /// # Panics
    /// If `payload` is not [CACH_PAYLOAD_BITS] long or `timeslot` is not 1 or 2.
    pub fn encode(access_type: bool, timeslot: u8, lcss: Position, payload: &BitFrame) -> BitFrame {
        assert_eq!(payload.len(), CACH_PAYLOAD_BITS, "CACH payload length");
        assert!(timeslot == 1 || timeslot == 2, "DMR timeslot must be 1 or 2");
        let lcss = position_lcss(lcss);
        let tact = HAMMING_7_4.encode(&[
            access_type,
            timeslot == 2,
            lcss & 0b10 != 0,
            lcss & 0b01 != 0,
        ]);

        let mut zult = vec![false; CACH_BITS];
        for (bit, &pos) in tact.iter().zip(TACT_POSITIONS.iter()) {
            zult[pos] = *bit;
        }
        let payload_positions = (0..CACH_BITS).filter(|i| !TACT_POSITIONS.contains(i));
        for (pos, bit) in payload_positions.zip(payload.iter()) {
            zult[pos] = bit;
        }
        BitFrame::from(zult)
    }
}

/// CRC-8 over the SLCO and data bits of a Short LC.
///
/// # Panics
/// If `payload` is shorter than 28 bits.
pub fn short_lc_crc(payload: &BitFrame) -> u8 {
    let value = payload.field_u32(0..28);
    SHORT_LC_CRC.checksum(&value.to_be_bytes())
}

/// `true` if the Short LC CRC matches.
pub fn short_lc_valid(payload: &BitFrame) -> bool {
    payload.len() == SHORT_LC_BITS && short_lc_crc(payload) == payload.field(28..36) as u8
}

/// Short LC opcode, the message discriminator.
pub fn slco(payload: &BitFrame) -> u32 {
    payload.field_u32(0..4)
}

/// Build a 36-bit Short LC with a valid CRC.
pub fn short_lc(slco: u8, data: u32) -> BitFrame {
    let value = (u32::from(slco & 0xf) << 24) | (data & 0xff_ffff);
    let crc = SHORT_LC_CRC.checksum(&value.to_be_bytes());
    BitFrame::from_u64((u64::from(value) << 8) | u64::from(crc), SHORT_LC_BITS)
}

/// Network model of a DMR Tier III system, deciding how the 12 system identity bits
/// split between network and site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkModel {
    Tiny,
    Small,
    Large,
    Huge,
}

impl NetworkModel {
    fn from_bits(v: u64) -> Self {
        match v & 0b11 {
            0 => Self::Tiny,
            1 => Self::Small,
            2 => Self::Large,
            _ => Self::Huge,
        }
    }

    /// Bits of the 12 bit identity given to the network; the remainder is the site.
    fn network_bits(&self) -> usize {
        match self {
            Self::Tiny => 9,
            Self::Small => 7,
            Self::Large => 4,
            Self::Huge => 2,
        }
    }

    /// Split the 12 identity bits starting at `start` into (network, site).
    fn split(&self, payload: &BitFrame, start: usize) -> (u16, u16) {
        let mid = start + self.network_bits();
        (
            payload.field(start..mid) as u16,
            payload.field(mid..start + 12) as u16,
        )
    }
}

/// Short LC content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortLc {
    Null,
    /// Activity on both timeslots of a repeater.
    ActivityUpdate {
        ts1: u8,
        ts2: u8,
        ts1_hash: u8,
        ts2_hash: u8,
    },
    ControlChannelParameters {
        model: NetworkModel,
        network: u16,
        site: u16,
        registration: bool,
        common_slot_counter: u16,
    },
    PayloadChannelParameters {
        model: NetworkModel,
        network: u16,
        site: u16,
        registration: bool,
    },
    /// Motorola Connect Plus control channel identity.
    ConnectPlusControlChannel { network: u16, site: u8 },
}

pub const SLCO_NULL: u8 = 0;
pub const SLCO_ACTIVITY_UPDATE: u8 = 1;
pub const SLCO_CONTROL_CHANNEL_PARAMETERS: u8 = 2;
pub const SLCO_PAYLOAD_CHANNEL_PARAMETERS: u8 = 3;
pub const SLCO_CONNECT_PLUS: u8 = 9;

fn activity_name(id: u8) -> &'static str {
    match id {
        0 => "IDLE",
        2 => "GROUP CSBK",
        3 => "INDIVIDUAL CSBK",
        8 => "GROUP VOICE",
        9 => "INDIVIDUAL VOICE",
        10 => "INDIVIDUAL DATA",
        11 => "GROUP DATA",
        12 => "EMERGENCY GROUP VOICE",
        13 => "EMERGENCY INDIVIDUAL VOICE",
        _ => "RESERVED",
    }
}

impl ShortLc {
    fn activity_update(payload: &BitFrame) -> Self {
        Self::ActivityUpdate {
            ts1: payload.field(4..8) as u8,
            ts2: payload.field(8..12) as u8,
            ts1_hash: payload.field(12..20) as u8,
            ts2_hash: payload.field(20..28) as u8,
        }
    }

    fn control_channel(payload: &BitFrame) -> Self {
        let model = NetworkModel::from_bits(payload.field(4..6));
        let (network, site) = model.split(payload, 6);
        Self::ControlChannelParameters {
            model,
            network,
            site,
            registration: payload.flag(18),
            common_slot_counter: payload.field(19..28) as u16,
        }
    }

    fn payload_channel(payload: &BitFrame) -> Self {
        let model = NetworkModel::from_bits(payload.field(4..6));
        let (network, site) = model.split(payload, 6);
        Self::PayloadChannelParameters {
            model,
            network,
            site,
            registration: payload.flag(18),
        }
    }

    fn connect_plus(payload: &BitFrame) -> Self {
        Self::ConnectPlusControlChannel {
            network: payload.field(4..16) as u16,
            site: payload.field(16..24) as u8,
        }
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            Self::Null => Vec::default(),
            Self::ActivityUpdate {
                ts1_hash, ts2_hash, ..
            } => [ts1_hash, ts2_hash]
                .into_iter()
                .filter(|h| **h != 0)
                .map(|h| Identifier::new(Role::To, IdentifierKind::HashedAddress, u32::from(*h)))
                .collect(),
            Self::ControlChannelParameters { network, site, .. }
            | Self::PayloadChannelParameters { network, site, .. } => vec![
                Identifier::new(Role::Network, IdentifierKind::Network, u32::from(*network)),
                Identifier::new(Role::Network, IdentifierKind::Site, u32::from(*site)),
            ],
            Self::ConnectPlusControlChannel { network, site } => vec![
                Identifier::new(Role::Network, IdentifierKind::Network, u32::from(*network)),
                Identifier::new(Role::Network, IdentifierKind::Site, u32::from(*site)),
            ],
        }
    }
}

impl fmt::Display for ShortLc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("SLC NULL"),
            Self::ActivityUpdate {
                ts1,
                ts2,
                ts1_hash,
                ts2_hash,
            } => write!(
                f,
                "SLC ACTIVITY TS1:{}[{ts1_hash:02X}] TS2:{}[{ts2_hash:02X}]",
                activity_name(*ts1),
                activity_name(*ts2)
            ),
            Self::ControlChannelParameters {
                model,
                network,
                site,
                registration,
                common_slot_counter,
            } => write!(
                f,
                "SLC CONTROL CHANNEL {model:?} NET:{network} SITE:{site} REG:{registration} CSC:{common_slot_counter}"
            ),
            Self::PayloadChannelParameters {
                model,
                network,
                site,
                registration,
            } => write!(
                f,
                "SLC PAYLOAD CHANNEL {model:?} NET:{network} SITE:{site} REG:{registration}"
            ),
            Self::ConnectPlusControlChannel { network, site } => {
                write!(f, "SLC CONNECT PLUS CONTROL NET:{network} SITE:{site}")
            }
        }
    }
}

/// Register the Short LC constructors.
///
/// # Errors
/// If any SLCO is already registered.
pub fn register(registry: &mut Registry) -> Result<()> {
    let d = |slco: u8| Discriminator::new(Protocol::Dmr, u32::from(slco));
    registry.register(d(SLCO_NULL), |_| MessageKind::from(ShortLc::Null))?;
    registry.register(d(SLCO_ACTIVITY_UPDATE), |p| {
        MessageKind::from(ShortLc::activity_update(p))
    })?;
    registry.register(d(SLCO_CONTROL_CHANNEL_PARAMETERS), |p| {
        MessageKind::from(ShortLc::control_channel(p))
    })?;
    registry.register(d(SLCO_PAYLOAD_CHANNEL_PARAMETERS), |p| {
        MessageKind::from(ShortLc::payload_channel(p))
    })?;
    registry.register(d(SLCO_CONNECT_PLUS), |p| {
        MessageKind::from(ShortLc::connect_plus(p))
    })?;
    Ok(())
}
