//! Read-only decoding tables shared by every channel.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::{
    bits::BitFrame,
    fec::{BlockCodec, CodedBlock, ReedSolomon, ShortLcBptc},
    framing::FrameLayout,
    message::{dmr, p25, DecodedMessage, Discriminator, MessageMeta, Protocol, Registry},
    sync::{PatternId, SyncCatalog},
    Error, Result,
};

/// Extracts the routing key from a corrected payload.
pub type DiscriminatorFn = fn(&BitFrame) -> Discriminator;

/// Integrity check applied after error correction, e.g., a CRC.
pub type CheckFn = fn(&BitFrame) -> bool;

pub const DMR_SHORT_LC: &str = "dmr-short-lc";
pub const P25P2_FACCH: &str = "p25p2-facch";
pub const P25P1_LC: &str = "p25p1-lc";

/// A kind of logical message: how many fragments carry it, which codec protects it, and
/// how to find its discriminator.
#[derive(Clone)]
pub struct MessageClass {
    pub name: String,
    pub protocol: Protocol,
    /// Number of fragments in a complete instance.
    pub slots: usize,
    /// Coded bits carried by each fragment.
    pub slot_bits: usize,
    /// Minimum populated slots before a decode is attempted.
    pub quorum: usize,
    pub codec: Arc<dyn BlockCodec>,
    discriminator: DiscriminatorFn,
    check: Option<CheckFn>,
}

impl MessageClass {
    /// # Panics
    /// If `slots * slot_bits` is not the codec's block size.
    pub fn new(
        name: &str,
        protocol: Protocol,
        slots: usize,
        slot_bits: usize,
        codec: Arc<dyn BlockCodec>,
        discriminator: DiscriminatorFn,
    ) -> Self {
        assert_eq!(
            slots * slot_bits,
            codec.coded_bits(),
            "{name}: {slots} slots of {slot_bits} bits do not fill a {} block",
            codec.name()
        );
        Self {
            name: name.to_string(),
            protocol,
            slots,
            slot_bits,
            quorum: slots,
            codec,
            discriminator,
            check: None,
        }
    }

    /// # Panics
    /// If `quorum` is zero or more than the slot count.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        assert!(
            quorum > 0 && quorum <= self.slots,
            "quorum must be in 1..={}",
            self.slots
        );
        self.quorum = quorum;
        self
    }

    pub fn with_check(mut self, check: CheckFn) -> Self {
        self.check = Some(check);
        self
    }

    pub fn coded_bits(&self) -> usize {
        self.slots * self.slot_bits
    }

    pub fn discriminator(&self, payload: &BitFrame) -> Discriminator {
        (self.discriminator)(payload)
    }
}

impl fmt::Debug for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageClass")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("slots", &self.slots)
            .field("slot_bits", &self.slot_bits)
            .field("quorum", &self.quorum)
            .field("codec", &self.codec.name())
            .finish()
    }
}

/// Sync patterns, frame layouts, message classes and the message registry.
///
/// Built once at startup, then wrapped in an [Arc] and shared read-only by all channels.
#[derive(Debug, Default)]
pub struct Catalog {
    patterns: Arc<SyncCatalog>,
    layouts: HashMap<PatternId, FrameLayout>,
    classes: HashMap<String, Arc<MessageClass>>,
    registry: Registry,
}

impl Catalog {
    pub fn new(patterns: SyncCatalog) -> Self {
        Self {
            patterns: Arc::new(patterns),
            ..Default::default()
        }
    }

    /// Catalog for the supported air interfaces: DMR Short LC carried in base station
    /// CACHs, P25 Phase 2 FACCH MAC PDUs and fragmented P25 Phase 1 link control.
    ///
    /// # Errors
    /// If a built-in message registers twice.
    pub fn standard() -> Result<Self> {
        let mut catalog = Self::new(SyncCatalog::standard());

        catalog.add_class(
            MessageClass::new(
                DMR_SHORT_LC,
                Protocol::Dmr,
                4,
                dmr::CACH_PAYLOAD_BITS,
                Arc::new(ShortLcBptc),
                |p| Discriminator::new(Protocol::Dmr, dmr::slco(p)),
            )
            .with_check(dmr::short_lc_valid),
        );
        catalog.add_class(MessageClass::new(
            P25P2_FACCH,
            Protocol::P25Phase2,
            1,
            270,
            Arc::new(ReedSolomon::p25_phase2_facch()),
            p25::mac_discriminator,
        ));
        catalog.add_class(
            MessageClass::new(
                P25P1_LC,
                Protocol::P25Phase1,
                6,
                24,
                Arc::new(ReedSolomon::p25_link_control()),
                p25::lc_discriminator,
            )
            .with_quorum(4),
        );

        for name in ["dmr-bs-data", "dmr-bs-voice"] {
            catalog.set_layout(
                name,
                FrameLayout::DmrBurst {
                    class: DMR_SHORT_LC.to_string(),
                },
            )?;
        }
        catalog.set_layout(
            "p25p2",
            FrameLayout::Block {
                class: P25P2_FACCH.to_string(),
                bits: 270,
            },
        )?;

        dmr::register(&mut catalog.registry)?;
        p25::register(&mut catalog.registry)?;
        Ok(catalog)
    }

    pub fn patterns(&self) -> &Arc<SyncCatalog> {
        &self.patterns
    }

    /// Mutable access to the patterns, only while no detector holds them.
    pub fn patterns_mut(&mut self) -> &mut SyncCatalog {
        Arc::make_mut(&mut self.patterns)
    }

    /// Add or replace a message class.
    pub fn add_class(&mut self, class: MessageClass) {
        self.classes.insert(class.name.clone(), Arc::new(class));
    }

    pub fn class(&self, name: &str) -> Option<&Arc<MessageClass>> {
        self.classes.get(name)
    }

    /// Class names in sorted order.
    pub fn class_names(&self) -> Vec<&str> {
        let mut zult: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        zult.sort_unstable();
        zult
    }

    /// # Errors
    /// [Error::UnknownClass] if there is no such class, [Error::Config] if `quorum` is zero
    /// or more than the class slot count.
    pub fn set_quorum(&mut self, name: &str, quorum: usize) -> Result<()> {
        let class = self
            .classes
            .get_mut(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))?;
        if quorum == 0 || quorum > class.slots {
            return Err(Error::Config(format!(
                "{name}: quorum {quorum} not in 1..={}",
                class.slots
            )));
        }
        Arc::make_mut(class).quorum = quorum;
        Ok(())
    }

    /// Frame captured after a sync on pattern `name`.
    ///
    /// # Errors
    /// [Error::InvalidPattern] for an unknown pattern, [Error::UnknownClass] if the layout
    /// names an unknown class.
    pub fn set_layout(&mut self, name: &str, layout: FrameLayout) -> Result<()> {
        let id = self
            .patterns
            .find(name)
            .ok_or_else(|| Error::InvalidPattern(format!("no pattern named {name}")))?;
        if !self.classes.contains_key(layout.class()) {
            return Err(Error::UnknownClass(layout.class().to_string()));
        }
        self.layouts.insert(id, layout);
        Ok(())
    }

    pub fn layout(&self, pattern: PatternId) -> Option<&FrameLayout> {
        self.layouts.get(&pattern)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Error correct `block` with the class codec and build the message.
    ///
    /// The message is valid only if correction succeeded and the class integrity check,
    /// if any, passes.
    ///
    /// # Panics
    /// If `block` is not the size of the class codec block.
    pub fn decode(
        &self,
        class: &MessageClass,
        block: &CodedBlock,
        timestamp: u64,
        timeslot: u8,
    ) -> DecodedMessage {
        let corrected = class.codec.decode(block);
        let checked = corrected.success && class.check.map_or(true, |c| c(&corrected.payload));
        if !corrected.success {
            debug!(class = %class.name, erased = block.erased.len(), "correction failed");
        } else if !checked {
            debug!(class = %class.name, "integrity check failed");
        }
        let meta = MessageMeta {
            class: class.name.clone(),
            valid: checked,
            corrected_bits: corrected.corrected_bits,
            timestamp,
            timeslot,
        };
        self.registry.dispatch(
            class.discriminator(&corrected.payload),
            &corrected.payload,
            meta,
        )
    }
}
