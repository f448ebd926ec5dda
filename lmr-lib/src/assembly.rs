//! Reassembly of logical messages carried in several fragments.
//!
//! A [FragmentAssembler] keeps at most one accumulation. Fragments are placed into the
//! slots of the accumulation's [MessageClass]; a LAST fragment, or a FIRST fragment
//! superseding an earlier accumulation, triggers a decode when enough slots are populated.
//! Slots that never arrived are handed to the codec as erasures.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    bits::BitFrame,
    catalog::{Catalog, MessageClass},
    fec::CodedBlock,
    message::DecodedMessage,
};

/// Position of a fragment within its logical message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    First,
    Continue,
    Last,
    /// A complete message in one fragment.
    Single,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentDescriptor {
    pub position: Position,
    /// Coded bits carried by this fragment.
    pub payload: BitFrame,
    /// Burst counter of the fragment, if the physical layer provides one. Used to leave
    /// gaps for fragments that were lost.
    pub sequence_index: Option<u64>,
    pub timestamp: u64,
}

impl FragmentDescriptor {
    pub fn new(position: Position, payload: BitFrame, timestamp: u64) -> Self {
        Self {
            position,
            payload,
            sequence_index: None,
            timestamp,
        }
    }

    pub fn with_sequence(mut self, sequence_index: u64) -> Self {
        self.sequence_index = Some(sequence_index);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblyStatus {
    Empty,
    Accumulating,
    /// The last accumulation was decoded.
    Complete,
    /// The last accumulation was dropped without a decode.
    Abandoned,
}

/// How fragments that do not follow a FIRST are handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Leniency {
    /// A CONTINUE without a preceding FIRST starts a new accumulation.
    pub orphan_continue: bool,
    /// A LAST without a preceding FIRST is decoded on its own, subject to quorum.
    pub orphan_last: bool,
}

impl Default for Leniency {
    fn default() -> Self {
        Self {
            orphan_continue: true,
            orphan_last: true,
        }
    }
}

impl Leniency {
    pub fn strict() -> Self {
        Self {
            orphan_continue: false,
            orphan_last: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssemblerStats {
    /// Messages emitted, valid or not.
    pub decoded: u64,
    /// Emitted messages flagged invalid.
    pub invalid: u64,
    /// Accumulations dropped for lack of quorum or superseded by another class.
    pub abandoned: u64,
    /// Accumulations discarded by [FragmentAssembler::reset].
    pub resets: u64,
    /// Fragments ignored: orphans under strict leniency and overflowing continuations.
    pub dropped: u64,
}

#[derive(Debug)]
struct Accumulation {
    class: Arc<MessageClass>,
    slots: Vec<Option<BitFrame>>,
    /// Slot for the next CONTINUE.
    next: usize,
    last_sequence: Option<u64>,
    timestamp: u64,
}

impl Accumulation {
    fn new(class: Arc<MessageClass>, timestamp: u64) -> Self {
        Self {
            slots: vec![None; class.slots],
            class,
            next: 0,
            last_sequence: None,
            timestamp,
        }
    }

    fn populated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Slot a CONTINUE lands in, accounting for bursts lost since the previous fragment.
    ///
    /// Sequence indexes wrap, so a sequence behind the previous one reads as a jump of
    /// nearly `u64::MAX` bursts. `None` when the slot cannot be represented.
    fn continue_slot(&self, sequence_index: Option<u64>) -> Option<usize> {
        let skipped = match (self.last_sequence, sequence_index) {
            (Some(prev), Some(seq)) => seq.wrapping_sub(prev).saturating_sub(1),
            _ => 0,
        };
        usize::try_from(skipped)
            .ok()
            .and_then(|skipped| self.next.checked_add(skipped))
    }

    fn store(&mut self, slot: usize, fragment: FragmentDescriptor) {
        self.slots[slot] = Some(fragment.payload);
        self.next = slot + 1;
        if fragment.sequence_index.is_some() {
            self.last_sequence = fragment.sequence_index;
        }
    }

    fn block(&self) -> CodedBlock {
        let n = self.class.slot_bits;
        let mut bits = Vec::with_capacity(self.class.coded_bits());
        let mut erased = Vec::default();
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(frame) => bits.extend(frame.iter()),
                None => {
                    bits.extend(std::iter::repeat(false).take(n));
                    erased.push(i * n..(i + 1) * n);
                }
            }
        }
        CodedBlock {
            bits: BitFrame::from(bits),
            erased,
        }
    }
}

/// Per channel fragment state machine.
///
/// Each call to [FragmentAssembler::process] yields at most one message. Radio problems,
/// such as lost or out of order fragments, never produce errors; they produce invalid
/// messages or nothing.
#[derive(Debug)]
pub struct FragmentAssembler {
    catalog: Arc<Catalog>,
    timeslot: u8,
    leniency: Leniency,
    state: Option<Accumulation>,
    status: AssemblyStatus,
    stats: AssemblerStats,
}

impl FragmentAssembler {
    pub fn new(catalog: Arc<Catalog>, timeslot: u8) -> Self {
        Self {
            catalog,
            timeslot,
            leniency: Leniency::default(),
            state: None,
            status: AssemblyStatus::Empty,
            stats: AssemblerStats::default(),
        }
    }

    pub fn with_leniency(mut self, leniency: Leniency) -> Self {
        self.leniency = leniency;
        self
    }

    pub fn status(&self) -> AssemblyStatus {
        self.status
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Slots populated in the current accumulation.
    pub fn populated(&self) -> usize {
        self.state.as_ref().map_or(0, Accumulation::populated)
    }

    /// Add a fragment of `class`.
    ///
    /// # Panics
    /// If the fragment is not `class.slot_bits` long, or for a SINGLE fragment, not
    /// `class.coded_bits()` long.
    pub fn process(
        &mut self,
        class: &Arc<MessageClass>,
        fragment: FragmentDescriptor,
    ) -> Option<DecodedMessage> {
        let expected = match fragment.position {
            Position::Single => class.coded_bits(),
            _ => class.slot_bits,
        };
        assert_eq!(
            fragment.payload.len(),
            expected,
            "{} fragment must be {expected} bits",
            class.name
        );
        trace!(
            class = %class.name,
            position = ?fragment.position,
            sequence = fragment.sequence_index,
            "fragment"
        );

        match fragment.position {
            Position::Single => {
                let block = CodedBlock::new(fragment.payload);
                let msg = self
                    .catalog
                    .decode(class, &block, fragment.timestamp, self.timeslot);
                Some(self.emitted(msg))
            }
            Position::First => {
                let flushed = self.state.take().and_then(|acc| {
                    debug!(class = %acc.class.name, populated = acc.populated(), "superseded by FIRST");
                    self.finish(acc)
                });
                let mut acc = Accumulation::new(class.clone(), fragment.timestamp);
                acc.store(0, fragment);
                self.state = Some(acc);
                self.status = AssemblyStatus::Accumulating;
                flushed
            }
            Position::Continue => {
                let mut acc = match self.take_matching(class) {
                    Some(acc) => acc,
                    None if self.leniency.orphan_continue => {
                        debug!(class = %class.name, "CONTINUE without FIRST, starting accumulation");
                        let mut acc = Accumulation::new(class.clone(), fragment.timestamp);
                        acc.next = 1;
                        acc
                    }
                    None => {
                        self.drop_fragment(class, "CONTINUE without FIRST");
                        return None;
                    }
                };
                match acc.continue_slot(fragment.sequence_index) {
                    Some(slot) if slot < acc.slots.len() - 1 => acc.store(slot, fragment),
                    _ => self.drop_fragment(class, "CONTINUE beyond last slot"),
                }
                self.state = Some(acc);
                self.status = AssemblyStatus::Accumulating;
                None
            }
            Position::Last => {
                let mut acc = match self.take_matching(class) {
                    Some(acc) => acc,
                    None if self.leniency.orphan_last => {
                        debug!(class = %class.name, "LAST without FIRST");
                        Accumulation::new(class.clone(), fragment.timestamp)
                    }
                    None => {
                        self.drop_fragment(class, "LAST without FIRST");
                        return None;
                    }
                };
                let last = acc.slots.len() - 1;
                acc.store(last, fragment);
                self.finish(acc)
            }
        }
    }

    /// Discard any accumulation without emitting anything.
    pub fn reset(&mut self) {
        if let Some(acc) = self.state.take() {
            debug!(class = %acc.class.name, populated = acc.populated(), "accumulation reset");
            self.stats.resets += 1;
        }
        self.status = AssemblyStatus::Empty;
    }

    /// Take the current accumulation if it is for `class`. An accumulation for another
    /// class is abandoned.
    fn take_matching(&mut self, class: &MessageClass) -> Option<Accumulation> {
        let acc = self.state.take()?;
        if acc.class.name == class.name {
            return Some(acc);
        }
        debug!(
            class = %acc.class.name,
            other = %class.name,
            "accumulation interrupted by another class"
        );
        self.stats.abandoned += 1;
        self.status = AssemblyStatus::Abandoned;
        None
    }

    fn drop_fragment(&mut self, class: &MessageClass, reason: &'static str) {
        trace!(class = %class.name, reason, "fragment dropped");
        self.stats.dropped += 1;
    }

    /// Decode `acc` if it meets quorum, otherwise abandon it.
    fn finish(&mut self, acc: Accumulation) -> Option<DecodedMessage> {
        let populated = acc.populated();
        if populated < acc.class.quorum {
            debug!(
                class = %acc.class.name,
                populated,
                quorum = acc.class.quorum,
                "below quorum, abandoned"
            );
            self.stats.abandoned += 1;
            self.status = AssemblyStatus::Abandoned;
            return None;
        }
        let msg = self
            .catalog
            .decode(&acc.class, &acc.block(), acc.timestamp, self.timeslot);
        Some(self.emitted(msg))
    }

    fn emitted(&mut self, msg: DecodedMessage) -> DecodedMessage {
        self.stats.decoded += 1;
        if !msg.is_valid() {
            self.stats.invalid += 1;
        }
        if self.state.is_none() {
            self.status = AssemblyStatus::Complete;
        }
        msg
    }
}
