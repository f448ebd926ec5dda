//! APCO-25 Phase 2 MAC messages and Phase 1 link control words.
use std::fmt;

use super::{Discriminator, Identifier, IdentifierKind, MessageKind, Protocol, Registry, Role};
use crate::{bits::BitFrame, Result};

/// Bits in a FACCH MAC PDU after error correction.
pub const MAC_BITS: usize = 156;
/// Bits in a link control word after error correction.
pub const LINK_CONTROL_BITS: usize = 72;

/// Standard (TIA) manufacturer ID.
pub const MFID_STANDARD: u8 = 0x00;
/// Alternate standard manufacturer ID, treated the same as [MFID_STANDARD].
pub const MFID_STANDARD_ALT: u8 = 0x01;
pub const MFID_MOTOROLA: u8 = 0x90;

pub const MAC_NULL: u8 = 0x00;
pub const MAC_GROUP_VOICE_CHANNEL_USER: u8 = 0x01;
pub const MAC_UNIT_TO_UNIT_VOICE_CHANNEL_USER: u8 = 0x02;
pub const MAC_NETWORK_STATUS_BROADCAST: u8 = 0x7b;
pub const MAC_MOTOROLA_GROUP_REGROUP_VOICE_CHANNEL_USER: u8 = 0x81;

pub const LCO_GROUP_VOICE_CHANNEL_USER: u8 = 0x00;
pub const LCO_UNIT_TO_UNIT_VOICE_CHANNEL_USER: u8 = 0x03;

fn octet(payload: &BitFrame, n: usize) -> u32 {
    payload.field_u32(n * 8..(n + 1) * 8)
}

/// Big-endian value of octets `start..end`.
fn octets(payload: &BitFrame, start: usize, end: usize) -> u32 {
    payload.field_u32(start * 8..end * 8)
}

/// Pad `bytes` with zeros and take the first `len` bits.
fn frame(bytes: &[u8], len: usize) -> BitFrame {
    let mut buf = bytes.to_vec();
    buf.resize(len.div_ceil(8).max(bytes.len()), 0);
    BitFrame::from_bytes(&buf, len)
}

/// Build a MAC PDU payload from its octets, header octet first.
pub fn mac_pdu(bytes: &[u8]) -> BitFrame {
    frame(bytes, MAC_BITS)
}

/// Build a link control word from its octets, LCF first.
pub fn link_control(bytes: &[u8]) -> BitFrame {
    frame(bytes, LINK_CONTROL_BITS)
}

/// Call options common to voice channel messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions(pub u8);

impl ServiceOptions {
    pub fn emergency(&self) -> bool {
        self.0 & 0x80 != 0
    }

    pub fn encrypted(&self) -> bool {
        self.0 & 0x40 != 0
    }

    pub fn priority(&self) -> u8 {
        self.0 & 0x07
    }
}

impl fmt::Display for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.emergency() {
            f.write_str("EMERGENCY ")?;
        }
        if self.encrypted() {
            f.write_str("ENCRYPTED ")?;
        }
        write!(f, "PRI{}", self.priority())
    }
}

/// Discriminator of a MAC PDU: the opcode in octet 1, qualified by the manufacturer ID in
/// octet 2 for manufacturer specific opcodes.
pub fn mac_discriminator(payload: &BitFrame) -> Discriminator {
    let opcode = octet(payload, 1) as u8;
    let vendor = if opcode >> 6 == 0b10 {
        match octet(payload, 2) as u8 {
            MFID_STANDARD_ALT => MFID_STANDARD,
            mfid => mfid,
        }
    } else {
        MFID_STANDARD
    };
    Discriminator::vendor_opcode(Protocol::P25Phase2, vendor, opcode)
}

/// Discriminator of a link control word: the LCO qualified by the manufacturer ID.
pub fn lc_discriminator(payload: &BitFrame) -> Discriminator {
    let lco = (octet(payload, 0) & 0x3f) as u8;
    let vendor = match octet(payload, 1) as u8 {
        MFID_STANDARD_ALT => MFID_STANDARD,
        mfid => mfid,
    };
    Discriminator::vendor_opcode(Protocol::P25Phase1, vendor, lco)
}

/// Phase 2 MAC message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacMessage {
    Null,
    GroupVoiceChannelUser {
        options: ServiceOptions,
        group: u16,
        source: u32,
    },
    UnitToUnitVoiceChannelUser {
        options: ServiceOptions,
        target: u32,
        source: u32,
    },
    NetworkStatusBroadcast {
        lra: u8,
        wacn: u32,
        system: u16,
        channel: u16,
    },
    /// Motorola patch/supergroup call.
    GroupRegroupVoiceChannelUser {
        options: ServiceOptions,
        supergroup: u16,
        source: u32,
    },
}

impl MacMessage {
    fn group_voice(p: &BitFrame) -> Self {
        Self::GroupVoiceChannelUser {
            options: ServiceOptions(octet(p, 2) as u8),
            group: octets(p, 3, 5) as u16,
            source: octets(p, 5, 8),
        }
    }

    fn unit_to_unit(p: &BitFrame) -> Self {
        Self::UnitToUnitVoiceChannelUser {
            options: ServiceOptions(octet(p, 2) as u8),
            target: octets(p, 3, 6),
            source: octets(p, 6, 9),
        }
    }

    fn network_status(p: &BitFrame) -> Self {
        Self::NetworkStatusBroadcast {
            lra: octet(p, 2) as u8,
            wacn: p.field_u32(24..44),
            system: p.field_u32(44..56) as u16,
            channel: p.field_u32(56..72) as u16,
        }
    }

    fn group_regroup(p: &BitFrame) -> Self {
        Self::GroupRegroupVoiceChannelUser {
            options: ServiceOptions(octet(p, 3) as u8),
            supergroup: octets(p, 4, 6) as u16,
            source: octets(p, 6, 9),
        }
    }

    /// `true` for a voice channel user message with the encryption option set.
    pub fn encrypted(&self) -> bool {
        match self {
            Self::GroupVoiceChannelUser { options, .. }
            | Self::UnitToUnitVoiceChannelUser { options, .. }
            | Self::GroupRegroupVoiceChannelUser { options, .. } => options.encrypted(),
            _ => false,
        }
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            Self::Null => Vec::default(),
            Self::GroupVoiceChannelUser { group, source, .. } => vec![
                Identifier::new(Role::To, IdentifierKind::Talkgroup, u32::from(*group)),
                Identifier::new(Role::From, IdentifierKind::Radio, *source),
            ],
            Self::UnitToUnitVoiceChannelUser { target, source, .. } => vec![
                Identifier::new(Role::To, IdentifierKind::Radio, *target),
                Identifier::new(Role::From, IdentifierKind::Radio, *source),
            ],
            Self::NetworkStatusBroadcast {
                wacn,
                system,
                channel,
                ..
            } => vec![
                Identifier::new(Role::Network, IdentifierKind::Wacn, *wacn),
                Identifier::new(Role::Network, IdentifierKind::System, u32::from(*system)),
                Identifier::new(Role::Network, IdentifierKind::Channel, u32::from(*channel)),
            ],
            Self::GroupRegroupVoiceChannelUser {
                supergroup, source, ..
            } => vec![
                Identifier::new(Role::To, IdentifierKind::Talkgroup, u32::from(*supergroup)),
                Identifier::new(Role::From, IdentifierKind::Radio, *source),
            ],
        }
    }
}

impl fmt::Display for MacMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("MAC NULL"),
            Self::GroupVoiceChannelUser {
                options,
                group,
                source,
            } => write!(f, "MAC GROUP VOICE FM:{source} TO:{group} {options}"),
            Self::UnitToUnitVoiceChannelUser {
                options,
                target,
                source,
            } => write!(f, "MAC UNIT TO UNIT VOICE FM:{source} TO:{target} {options}"),
            Self::NetworkStatusBroadcast {
                lra,
                wacn,
                system,
                channel,
            } => write!(
                f,
                "MAC NETWORK STATUS WACN:{wacn:05X} SYSTEM:{system:03X} LRA:{lra} CHAN:{channel:04X}"
            ),
            Self::GroupRegroupVoiceChannelUser {
                options,
                supergroup,
                source,
            } => write!(
                f,
                "MOTOROLA GROUP REGROUP VOICE FM:{source} TO:{supergroup} {options}"
            ),
        }
    }
}

/// Phase 1 link control content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkControl {
    GroupVoiceChannelUser {
        options: ServiceOptions,
        group: u16,
        source: u32,
    },
    UnitToUnitVoiceChannelUser {
        options: ServiceOptions,
        target: u32,
        source: u32,
    },
}

impl LinkControl {
    fn group_voice(p: &BitFrame) -> Self {
        Self::GroupVoiceChannelUser {
            options: ServiceOptions(octet(p, 2) as u8),
            group: octets(p, 4, 6) as u16,
            source: octets(p, 6, 9),
        }
    }

    fn unit_to_unit(p: &BitFrame) -> Self {
        Self::UnitToUnitVoiceChannelUser {
            options: ServiceOptions(octet(p, 2) as u8),
            target: octets(p, 3, 6),
            source: octets(p, 6, 9),
        }
    }

    pub fn encrypted(&self) -> bool {
        match self {
            Self::GroupVoiceChannelUser { options, .. }
            | Self::UnitToUnitVoiceChannelUser { options, .. } => options.encrypted(),
        }
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            Self::GroupVoiceChannelUser { group, source, .. } => vec![
                Identifier::new(Role::To, IdentifierKind::Talkgroup, u32::from(*group)),
                Identifier::new(Role::From, IdentifierKind::Radio, *source),
            ],
            Self::UnitToUnitVoiceChannelUser { target, source, .. } => vec![
                Identifier::new(Role::To, IdentifierKind::Radio, *target),
                Identifier::new(Role::From, IdentifierKind::Radio, *source),
            ],
        }
    }
}

impl fmt::Display for LinkControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroupVoiceChannelUser {
                options,
                group,
                source,
            } => write!(f, "LC GROUP VOICE FM:{source} TO:{group} {options}"),
            Self::UnitToUnitVoiceChannelUser {
                options,
                target,
                source,
            } => write!(f, "LC UNIT TO UNIT VOICE FM:{source} TO:{target} {options}"),
        }
    }
}

/// Register the MAC and link control constructors.
///
/// # Errors
/// If any discriminator is already registered.
pub fn register(registry: &mut Registry) -> Result<()> {
    let mac = |vendor: u8, opcode: u8| Discriminator::vendor_opcode(Protocol::P25Phase2, vendor, opcode);
    registry.register(mac(MFID_STANDARD, MAC_NULL), |_| {
        MessageKind::from(MacMessage::Null)
    })?;
    registry.register(mac(MFID_STANDARD, MAC_GROUP_VOICE_CHANNEL_USER), |p| {
        MessageKind::from(MacMessage::group_voice(p))
    })?;
    registry.register(
        mac(MFID_STANDARD, MAC_UNIT_TO_UNIT_VOICE_CHANNEL_USER),
        |p| MessageKind::from(MacMessage::unit_to_unit(p)),
    )?;
    registry.register(mac(MFID_STANDARD, MAC_NETWORK_STATUS_BROADCAST), |p| {
        MessageKind::from(MacMessage::network_status(p))
    })?;
    registry.register(
        mac(MFID_MOTOROLA, MAC_MOTOROLA_GROUP_REGROUP_VOICE_CHANNEL_USER),
        |p| MessageKind::from(MacMessage::group_regroup(p)),
    )?;

    let lc = |lco: u8| Discriminator::vendor_opcode(Protocol::P25Phase1, MFID_STANDARD, lco);
    registry.register(lc(LCO_GROUP_VOICE_CHANNEL_USER), |p| {
        MessageKind::from(LinkControl::group_voice(p))
    })?;
    registry.register(lc(LCO_UNIT_TO_UNIT_VOICE_CHANNEL_USER), |p| {
        MessageKind::from(LinkControl::unit_to_unit(p))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageMeta;

    fn dispatch(discriminator: Discriminator, payload: &BitFrame) -> MessageKind {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        let meta = MessageMeta {
            class: "test".into(),
            valid: true,
            corrected_bits: 0,
            timestamp: 0,
            timeslot: 0,
        };
        registry.dispatch(discriminator, payload, meta).kind().clone()
    }

    #[test]
    fn test_group_voice_mac() {
        let payload = mac_pdu(&[0x20, 0x01, 0x40, 0x12, 0x34, 0x00, 0x30, 0x39]);
        let d = mac_discriminator(&payload);
        assert_eq!(d, Discriminator::new(Protocol::P25Phase2, 0x01));

        let kind = dispatch(d, &payload);
        let MessageKind::Mac(msg) = kind else {
            panic!("expected MAC, got {kind:?}");
        };
        assert_eq!(
            msg,
            MacMessage::GroupVoiceChannelUser {
                options: ServiceOptions(0x40),
                group: 0x1234,
                source: 12345,
            }
        );
        assert!(msg.encrypted());
        assert_eq!(
            msg.identifiers(),
            vec![
                Identifier::new(Role::To, IdentifierKind::Talkgroup, 0x1234),
                Identifier::new(Role::From, IdentifierKind::Radio, 12345),
            ]
        );
        assert_eq!(msg.to_string(), "MAC GROUP VOICE FM:12345 TO:4660 ENCRYPTED PRI0");
    }

    #[test]
    fn test_network_status_broadcast() {
        // lra=0x05, wacn=0xBEE00, system=0x2A1, channel=0x1234
        let payload = mac_pdu(&[0x20, 0x7b, 0x05, 0xbe, 0xe0, 0x02, 0xa1, 0x12, 0x34]);
        let kind = dispatch(mac_discriminator(&payload), &payload);
        assert_eq!(
            kind,
            MessageKind::Mac(MacMessage::NetworkStatusBroadcast {
                lra: 5,
                wacn: 0xbee00,
                system: 0x2a1,
                channel: 0x1234,
            })
        );
    }

    #[test]
    fn test_vendor_opcode_uses_mfid() {
        let payload = mac_pdu(&[0x20, 0x81, 0x90, 0x80, 0x00, 0x01, 0x00, 0x00, 0x07]);
        let d = mac_discriminator(&payload);
        assert_eq!(d.value, 0x9081);
        assert_eq!(
            dispatch(d, &payload),
            MessageKind::Mac(MacMessage::GroupRegroupVoiceChannelUser {
                options: ServiceOptions(0x80),
                supergroup: 1,
                source: 7,
            })
        );

        // Unknown vendors fall back to the unknown message.
        let payload = mac_pdu(&[0x20, 0x81, 0xa4]);
        assert_eq!(
            dispatch(mac_discriminator(&payload), &payload),
            MessageKind::Unknown
        );
    }

    #[test]
    fn test_link_control_alt_mfid_is_standard() {
        let payload = link_control(&[0x03, 0x01, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0xc8]);
        let d = lc_discriminator(&payload);
        assert_eq!(d, Discriminator::new(Protocol::P25Phase1, 0x03));
        assert_eq!(
            dispatch(d, &payload),
            MessageKind::LinkControl(LinkControl::UnitToUnitVoiceChannelUser {
                options: ServiceOptions(0),
                target: 100,
                source: 200,
            })
        );
    }

    #[test]
    fn test_service_options() {
        let opts = ServiceOptions(0xc5);
        assert!(opts.emergency());
        assert!(opts.encrypted());
        assert_eq!(opts.priority(), 5);
        assert_eq!(opts.to_string(), "EMERGENCY ENCRYPTED PRI5");
    }
}
