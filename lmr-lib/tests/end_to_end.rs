mod common;

use lmr::{
    assembly::{FragmentDescriptor, Position},
    catalog::{DMR_SHORT_LC, P25P1_LC, P25P2_FACCH},
    channel::Input,
    fec::BlockCodec,
    message::{
        dmr::{self, ShortLc},
        p25::{self, LinkControl, MacMessage},
        Discriminator, IdentifierKind, MessageKind, Protocol, Role,
    },
};
use rand::{rngs::StdRng, SeedableRng};

use common::*;

#[test]
fn test_four_fragment_short_lc_decodes() {
    let engine = engine();
    let mut channel = engine.channel(1, Vec::new());
    let lc = dmr::short_lc(dmr::SLCO_CONTROL_CHANNEL_PARAMETERS, 0x12_3456);
    let pieces = fragments(engine.catalog(), DMR_SHORT_LC, &lc);
    assert!(pieces.iter().all(|p| p.len() == 17));

    for (i, (piece, position)) in pieces.iter().zip(positions(4)).enumerate() {
        channel
            .process_fragment(
                DMR_SHORT_LC,
                FragmentDescriptor::new(position, piece.clone(), i as u64),
            )
            .unwrap();
    }

    let msgs = channel.into_listener();
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];
    assert!(msg.is_valid());
    assert_eq!(msg.corrected_bits(), 0);
    assert_eq!(
        msg.discriminator(),
        Discriminator::new(
            Protocol::Dmr,
            u32::from(dmr::SLCO_CONTROL_CHANNEL_PARAMETERS)
        )
    );
    assert_eq!(msg.raw(), &lc);
    assert!(matches!(
        msg.kind(),
        MessageKind::ShortLc(ShortLc::ControlChannelParameters { .. })
    ));
}

#[test]
fn test_sync_loss_between_fragments_discards_message() {
    let engine = engine();
    let mut channel = engine.channel(1, Vec::new());
    let lc = dmr::short_lc(dmr::SLCO_CONTROL_CHANNEL_PARAMETERS, 0x12_3456);
    let pieces = fragments(engine.catalog(), DMR_SHORT_LC, &lc);

    for (i, (piece, position)) in pieces.iter().zip(positions(4)).enumerate() {
        if i == 2 {
            channel.receive(Input::SyncLoss);
        }
        channel
            .process_fragment(
                DMR_SHORT_LC,
                FragmentDescriptor::new(position, piece.clone(), i as u64),
            )
            .unwrap();
    }

    let stats = channel.stats();
    assert!(channel.listener().is_empty());
    assert_eq!(stats.decoded, 0);
    assert_eq!(stats.resets, 1);
}

#[test]
fn test_dmr_bitstream_short_lc() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(1);
    let mut channel = engine.channel(1, Vec::new());
    let lc = dmr::short_lc(dmr::SLCO_ACTIVITY_UPDATE, 0x89_4d00);

    let mut t = 0;
    for burst in short_lc_bursts(engine.catalog(), &lc, &mut rng) {
        feed(&mut channel, &burst, &mut t);
    }

    let msgs = channel.listener();
    assert_eq!(msgs.len(), 1, "{msgs:?}");
    let msg = &msgs[0];
    assert!(msg.is_valid());
    assert_eq!(msg.raw(), &lc);
    // Timestamp of the last sync bit of the first burst.
    assert_eq!(msg.timestamp(), 132 + 48 - 1);
    assert_eq!(msg.timeslot(), 1);
    assert_eq!(
        msg.kind(),
        &MessageKind::ShortLc(ShortLc::ActivityUpdate {
            ts1: 8,
            ts2: 9,
            ts1_hash: 0x4d,
            ts2_hash: 0,
        })
    );
    assert_eq!(msg.identifiers().len(), 1);
    assert_eq!(msg.identifiers()[0].kind, IdentifierKind::HashedAddress);
}

#[test]
fn test_dmr_bitstream_corrects_errors() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(2);
    let mut channel = engine.channel(2, Vec::new());
    let lc = dmr::short_lc(dmr::SLCO_CONNECT_PLUS, 0x0ab_120);

    let mut bursts = short_lc_bursts(engine.catalog(), &lc, &mut rng);
    // CACH bit 1 carries the first bit of the fragment.
    bursts[0][1] = !bursts[0][1];
    // Two sync bit errors stay within threshold.
    bursts[2][140] = !bursts[2][140];
    bursts[2][150] = !bursts[2][150];

    let mut t = 0;
    for burst in &bursts {
        feed(&mut channel, burst, &mut t);
    }

    let msgs = channel.into_listener();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].is_valid());
    assert_eq!(msgs[0].corrected_bits(), 1);
    assert_eq!(
        msgs[0].kind(),
        &MessageKind::ShortLc(ShortLc::ConnectPlusControlChannel {
            network: 0x0ab,
            site: 0x12,
        })
    );
}

#[test]
fn test_dmr_bitstream_sync_loss_emits_nothing() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(3);
    let mut channel = engine.channel(1, Vec::new());
    let lc = dmr::short_lc(dmr::SLCO_NULL, 0);

    let mut t = 0;
    for (i, burst) in short_lc_bursts(engine.catalog(), &lc, &mut rng)
        .iter()
        .enumerate()
    {
        if i == 2 {
            channel.receive(Input::SyncLoss);
        }
        feed(&mut channel, burst, &mut t);
    }

    assert!(channel.listener().is_empty());
    assert_eq!(channel.stats().resets, 1);
    assert_eq!(channel.stats().abandoned, 1);
}

#[test]
fn test_dmr_unknown_slco_keeps_raw_bits() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(4);
    let mut channel = engine.channel(1, Vec::new());
    let lc = dmr::short_lc(0xe, 0xfe_dcba);

    let mut t = 0;
    for burst in short_lc_bursts(engine.catalog(), &lc, &mut rng) {
        feed(&mut channel, &burst, &mut t);
    }

    let msgs = channel.into_listener();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].is_unknown());
    assert!(msgs[0].is_valid());
    assert_eq!(msgs[0].raw(), &lc);
    assert_eq!(msgs[0].discriminator(), Discriminator::new(Protocol::Dmr, 0xe));
    assert_eq!(msgs[0].raw_hex(), lc.to_hex());
}

#[test]
fn test_dmr_soft_input() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(5);
    let mut channel = engine.channel(1, Vec::new());
    let lc = dmr::short_lc(dmr::SLCO_PAYLOAD_CHANNEL_PARAMETERS, 0xc0_0000);

    let mut t = 0;
    for burst in short_lc_bursts(engine.catalog(), &lc, &mut rng) {
        for bit in burst {
            channel.receive(Input::Soft {
                value: if bit { 0.9 } else { -0.7 },
                timestamp: t,
            });
            t += 1;
        }
    }

    let msgs = channel.into_listener();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].is_valid());
    assert_eq!(msgs[0].raw(), &lc);
}

#[test]
fn test_p25p2_facch_bitstream() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(6);
    let mut channel = engine.channel(2, Vec::new());
    let mac = p25::mac_pdu(&[0x20, 0x01, 0xc2, 0x00, 0x65, 0x0f, 0x42, 0x40]);
    let class = engine.catalog().class(P25P2_FACCH).unwrap();
    let mut coded: Vec<bool> = class.codec.encode(&mac).iter().collect();
    // Four symbol errors on top of the nine punctured parity erasures.
    for symbol in [0, 5, 20, 40] {
        coded[symbol * 6 + 2] = !coded[symbol * 6 + 2];
    }

    let mut bits = random_bits(&mut rng, 100);
    bits.extend(sync_bits(engine.catalog(), "p25p2"));
    bits.extend(coded);
    bits.extend(random_bits(&mut rng, 50));
    let mut t = 1_000;
    feed(&mut channel, &bits, &mut t);

    let msgs = channel.into_listener();
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];
    assert!(msg.is_valid());
    // Punctured parity symbols count toward the corrected bits.
    assert!(msg.corrected_bits() >= 4);
    assert_eq!(msg.timestamp(), 1_000 + 100 + 40 - 1);
    let MessageKind::Mac(mac) = msg.kind() else {
        panic!("expected MAC message, got {:?}", msg.kind());
    };
    assert_eq!(
        mac,
        &MacMessage::GroupVoiceChannelUser {
            options: p25::ServiceOptions(0xc2),
            group: 0x65,
            source: 1_000_000,
        }
    );
    assert!(mac.encrypted());
    assert!(msg
        .identifiers()
        .iter()
        .any(|id| id.role == Role::From && id.value == 1_000_000));
}

#[test]
fn test_p25p1_link_control_with_lost_fragment() {
    let engine = engine();
    let mut channel = engine.channel(0, Vec::new());
    let lc = p25::link_control(&[0x00, 0x00, 0x40, 0x00, 0x00, 0x2a, 0x00, 0x04, 0xd2]);
    let pieces = fragments(engine.catalog(), P25P1_LC, &lc);

    for (i, (piece, position)) in pieces.iter().zip(positions(6)).enumerate() {
        if i == 3 {
            continue;
        }
        channel
            .process_fragment(
                P25P1_LC,
                FragmentDescriptor::new(position, piece.clone(), i as u64).with_sequence(i as u64),
            )
            .unwrap();
    }

    let msgs = channel.into_listener();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].is_valid());
    assert_eq!(
        msgs[0].kind(),
        &MessageKind::LinkControl(LinkControl::GroupVoiceChannelUser {
            options: p25::ServiceOptions(0x40),
            group: 42,
            source: 1234,
        })
    );
}

#[test]
fn test_spawned_channel_delivers_messages() {
    let engine = engine();
    let mut rng = StdRng::seed_from_u64(7);
    let (tx, rx) = crossbeam::channel::unbounded();
    let handle = engine.spawn_channel(1, tx).unwrap();
    let lc = dmr::short_lc(dmr::SLCO_NULL, 0);

    let mut t = 0;
    for burst in short_lc_bursts(engine.catalog(), &lc, &mut rng) {
        for bit in burst {
            assert!(handle.send(Input::Bit { bit, timestamp: t }));
            t += 1;
        }
    }
    let stats = handle.finish();

    assert_eq!(stats.decoded, 1);
    let msgs: Vec<_> = rx.try_iter().collect();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].kind(), &MessageKind::ShortLc(ShortLc::Null));
}

#[test]
fn test_single_fragment_carries_whole_block() {
    let engine = engine();
    let mut channel = engine.channel(1, Vec::new());
    let class = engine.catalog().class(P25P2_FACCH).unwrap();
    let coded = class.codec.encode(&p25::mac_pdu(&[0x20, 0x00]));

    channel
        .process_fragment(
            P25P2_FACCH,
            FragmentDescriptor::new(Position::Single, coded, 0),
        )
        .unwrap();

    let msgs = channel.into_listener();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].kind(), &MessageKind::Mac(MacMessage::Null));
}
