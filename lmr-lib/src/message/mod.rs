//! Typed messages and the discriminator-keyed [Registry] that builds them.
pub mod dmr;
pub mod p25;
mod registry;

use std::fmt;
use std::sync::OnceLock;

use derive_more::From;
use serde::{Deserialize, Serialize};

pub use registry::{Constructor, Registry};

use crate::bits::BitFrame;

/// Air interface a message or sync pattern belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "dmr")]
    Dmr,
    #[serde(rename = "p25p1")]
    P25Phase1,
    #[serde(rename = "p25p2")]
    P25Phase2,
    #[serde(rename = "nxdn")]
    Nxdn,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dmr => "dmr",
            Self::P25Phase1 => "p25p1",
            Self::P25Phase2 => "p25p2",
            Self::Nxdn => "nxdn",
        })
    }
}

/// Routing key used to select a message constructor.
///
/// Protocols with vendor specific opcodes encode the vendor in the upper bits of `value`,
/// see [Discriminator::vendor_opcode]. Protocols with a plain message type or token type
/// use the type as `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Discriminator {
    pub protocol: Protocol,
    pub value: u32,
}

impl Discriminator {
    pub fn new(protocol: Protocol, value: u32) -> Self {
        Self { protocol, value }
    }

    pub fn vendor_opcode(protocol: Protocol, vendor: u8, opcode: u8) -> Self {
        Self::new(protocol, (u32::from(vendor) << 8) | u32::from(opcode))
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#06x}", self.protocol, self.value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    From,
    To,
    /// Describes the system rather than a party to the call.
    Network,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Radio,
    Talkgroup,
    /// DMR 8-bit hashed address from an activity update.
    HashedAddress,
    Wacn,
    System,
    Network,
    Site,
    Channel,
}

/// An addressing entity carried by a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier {
    pub role: Role,
    pub kind: IdentifierKind,
    pub value: u32,
}

impl Identifier {
    pub fn new(role: Role, kind: IdentifierKind, value: u32) -> Self {
        Self { role, kind, value }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:?}={}", self.role, self.kind, self.value)
    }
}

/// Decoded message content.
#[derive(Clone, Debug, PartialEq, Eq, From)]
pub enum MessageKind {
    ShortLc(dmr::ShortLc),
    Mac(p25::MacMessage),
    LinkControl(p25::LinkControl),
    /// No constructor is registered for the discriminator. The raw bits are kept on the
    /// [DecodedMessage].
    #[from(ignore)]
    Unknown,
}

impl MessageKind {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    fn identifiers(&self) -> Vec<Identifier> {
        match self {
            Self::ShortLc(m) => m.identifiers(),
            Self::Mac(m) => m.identifiers(),
            Self::LinkControl(m) => m.identifiers(),
            Self::Unknown => Vec::default(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortLc(m) => write!(f, "{m}"),
            Self::Mac(m) => write!(f, "{m}"),
            Self::LinkControl(m) => write!(f, "{m}"),
            Self::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// Per-message context supplied by the assembler.
#[derive(Clone, Debug)]
pub struct MessageMeta {
    pub class: String,
    /// `false` if error correction or an integrity check failed.
    pub valid: bool,
    pub corrected_bits: usize,
    pub timestamp: u64,
    pub timeslot: u8,
}

/// A message decoded from one logical message instance. Immutable once built.
///
/// Identifiers and the text summary are derived on first access and cached.
#[derive(Debug)]
pub struct DecodedMessage {
    meta: MessageMeta,
    raw: BitFrame,
    discriminator: Discriminator,
    kind: MessageKind,
    identifiers: OnceLock<Vec<Identifier>>,
    summary: OnceLock<String>,
}

impl DecodedMessage {
    pub fn new(
        meta: MessageMeta,
        raw: BitFrame,
        discriminator: Discriminator,
        kind: MessageKind,
    ) -> Self {
        Self {
            meta,
            raw,
            discriminator,
            kind,
            identifiers: OnceLock::new(),
            summary: OnceLock::new(),
        }
    }

    /// Name of the message class that produced this message.
    pub fn class(&self) -> &str {
        &self.meta.class
    }

    pub fn is_valid(&self) -> bool {
        self.meta.valid
    }

    pub fn corrected_bits(&self) -> usize {
        self.meta.corrected_bits
    }

    pub fn timestamp(&self) -> u64 {
        self.meta.timestamp
    }

    pub fn timeslot(&self) -> u8 {
        self.meta.timeslot
    }

    pub fn discriminator(&self) -> Discriminator {
        self.discriminator
    }

    pub fn protocol(&self) -> Protocol {
        self.discriminator.protocol
    }

    /// Payload bits after error correction (or as received when correction failed).
    pub fn raw(&self) -> &BitFrame {
        &self.raw
    }

    pub fn raw_hex(&self) -> String {
        self.raw.to_hex()
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn is_unknown(&self) -> bool {
        self.kind.is_unknown()
    }

    pub fn identifiers(&self) -> &[Identifier] {
        self.identifiers.get_or_init(|| self.kind.identifiers())
    }

    pub fn summary(&self) -> &str {
        self.summary.get_or_init(|| {
            let mut s = format!(
                "{} TS{} {} {}",
                self.discriminator.protocol, self.meta.timeslot, self.kind, self.discriminator
            );
            if !self.meta.valid {
                s.push_str(" [INVALID]");
            }
            s
        })
    }

    /// Flattened view for serialization.
    pub fn record(&self) -> MessageRecord<'_> {
        MessageRecord {
            class: &self.meta.class,
            protocol: self.discriminator.protocol,
            discriminator: self.discriminator.value,
            valid: self.meta.valid,
            corrected_bits: self.meta.corrected_bits,
            timestamp: self.meta.timestamp,
            timeslot: self.meta.timeslot,
            raw_hex: self.raw_hex(),
            identifiers: self.identifiers(),
            summary: self.summary(),
        }
    }
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.meta.timestamp, self.summary())
    }
}

#[derive(Debug, Serialize)]
pub struct MessageRecord<'a> {
    pub class: &'a str,
    pub protocol: Protocol,
    pub discriminator: u32,
    pub valid: bool,
    pub corrected_bits: usize,
    pub timestamp: u64,
    pub timeslot: u8,
    pub raw_hex: String,
    pub identifiers: &'a [Identifier],
    pub summary: &'a str,
}
