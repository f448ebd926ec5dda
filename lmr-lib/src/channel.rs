//! Per channel decode pipeline: sync detection, frame extraction, fragment assembly and
//! message dispatch.
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender};
use tracing::{debug, span, trace, Level};

use crate::{
    assembly::{AssemblerStats, FragmentAssembler, FragmentDescriptor, Leniency, Position},
    catalog::{Catalog, MessageClass},
    framing::{FrameExtractor, FrameLayout, RawFrame, DMR_BURST_BITS},
    message::{dmr::Cach, dmr::CACH_BITS, DecodedMessage},
    sync::{DetectorVariant, SyncCandidate, SyncDetector},
    Error, Result,
};

/// Input from the demodulator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Input {
    /// A hard bit decision.
    Bit { bit: bool, timestamp: u64 },
    /// A soft decision; positive values are 1.
    Soft { value: f32, timestamp: u64 },
    /// The demodulator lost the signal. All partial state is discarded.
    SyncLoss,
}

/// Receives decoded messages as they are produced.
pub trait MessageListener {
    fn on_message(&mut self, message: DecodedMessage);

    fn on_sync_loss(&mut self) {}
}

impl MessageListener for Sender<DecodedMessage> {
    fn on_message(&mut self, message: DecodedMessage) {
        if self.send(message).is_err() {
            trace!("message receiver gone");
        }
    }
}

impl MessageListener for Vec<DecodedMessage> {
    fn on_message(&mut self, message: DecodedMessage) {
        self.push(message);
    }
}

/// Decoder for one channel or timeslot. Owns its sync detector and fragment assembler;
/// only the [Catalog] is shared.
pub struct ChannelDecoder<L> {
    catalog: Arc<Catalog>,
    timeslot: u8,
    detector: Box<dyn SyncDetector>,
    extractor: FrameExtractor,
    assembler: FragmentAssembler,
    listener: L,
}

impl<L: MessageListener> ChannelDecoder<L> {
    pub fn new(
        catalog: Arc<Catalog>,
        variant: DetectorVariant,
        timeslot: u8,
        leniency: Leniency,
        listener: L,
    ) -> Self {
        let history = catalog
            .patterns()
            .iter()
            .filter_map(|(id, p)| catalog.layout(id).map(|l| l.window().pre + p.len as usize))
            .max()
            .unwrap_or(0);
        Self {
            detector: variant.build(catalog.patterns().clone()),
            extractor: FrameExtractor::new(history),
            assembler: FragmentAssembler::new(catalog.clone(), timeslot).with_leniency(leniency),
            catalog,
            timeslot,
            listener,
        }
    }

    pub fn timeslot(&self) -> u8 {
        self.timeslot
    }

    pub fn variant(&self) -> DetectorVariant {
        self.detector.variant()
    }

    pub fn stats(&self) -> AssemblerStats {
        self.assembler.stats()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    pub fn receive(&mut self, input: Input) {
        match input {
            Input::Bit { bit, timestamp } => {
                let candidate = self.detector.observe(bit);
                self.bit(bit, candidate, timestamp);
            }
            Input::Soft { value, timestamp } => {
                let candidate = self.detector.observe_soft(value);
                self.bit(value > 0.0, candidate, timestamp);
            }
            Input::SyncLoss => self.sync_loss(),
        }
    }

    /// Feed a fragment that was framed outside the bit stream, e.g., a link control
    /// fragment recovered from a voice frame.
    ///
    /// # Errors
    /// [Error::UnknownClass] if `class` is not in the catalog.
    pub fn process_fragment(&mut self, class: &str, fragment: FragmentDescriptor) -> Result<()> {
        let class = self
            .catalog
            .class(class)
            .ok_or_else(|| Error::UnknownClass(class.to_string()))?
            .clone();
        self.assemble(&class, fragment);
        Ok(())
    }

    fn assemble(&mut self, class: &Arc<MessageClass>, fragment: FragmentDescriptor) {
        if let Some(msg) = self.assembler.process(class, fragment) {
            self.listener.on_message(msg);
        }
    }

    /// Discard detector history, frames in progress and partial messages.
    pub fn sync_loss(&mut self) {
        debug!(timeslot = self.timeslot, "sync loss");
        self.detector.reset();
        self.extractor.reset();
        self.assembler.reset();
        self.listener.on_sync_loss();
    }

    fn bit(&mut self, bit: bool, candidate: Option<SyncCandidate>, timestamp: u64) {
        // The extractor must see the bit before a capture starts on it.
        for frame in self.extractor.push(bit) {
            self.frame(frame);
        }
        let Some(candidate) = candidate else {
            return;
        };
        let Some(pattern) = self.catalog.patterns().get(candidate.pattern) else {
            return;
        };
        trace!(
            pattern = %pattern.name,
            bit_errors = candidate.bit_errors,
            start_offset = candidate.start_offset,
            "sync"
        );
        let Some(layout) = self.catalog.layout(candidate.pattern) else {
            return;
        };
        let window = layout.window();
        let sync_len = pattern.len as usize;
        if let Some(frame) = self.extractor.begin(candidate, sync_len, window, timestamp) {
            self.frame(frame);
        }
    }

    fn frame(&mut self, frame: RawFrame) {
        let Some(layout) = self.catalog.layout(frame.pattern).cloned() else {
            return;
        };
        let (class, fragment) = match layout {
            FrameLayout::DmrBurst { class } => {
                let cach = Cach::decode(&frame.pre.slice(0..CACH_BITS));
                if cach.lcss == Position::Single {
                    trace!(start_offset = frame.start_offset, "CACH single fragment ignored");
                    return;
                }
                let fragment = FragmentDescriptor::new(cach.lcss, cach.payload, frame.timestamp)
                    .with_sequence(frame.start_offset / DMR_BURST_BITS as u64);
                (class, fragment)
            }
            FrameLayout::Block { class, .. } => (
                class,
                FragmentDescriptor::new(Position::Single, frame.post, frame.timestamp),
            ),
        };
        let Some(class) = self.catalog.class(&class).cloned() else {
            debug!(%class, "frame for unknown class");
            return;
        };
        self.assemble(&class, fragment);
    }
}

/// A [ChannelDecoder] running on its own thread.
pub struct ChannelHandle {
    input: Sender<Input>,
    cancel: Sender<()>,
    handle: JoinHandle<AssemblerStats>,
}

impl ChannelHandle {
    /// Start a worker thread for `decoder`.
    ///
    /// # Errors
    /// [Error::Io] if the thread cannot be spawned.
    pub fn spawn<L>(mut decoder: ChannelDecoder<L>) -> Result<Self>
    where
        L: MessageListener + Send + 'static,
    {
        let (input_tx, input_rx): (Sender<Input>, Receiver<Input>) = unbounded();
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let timeslot = decoder.timeslot();

        let handle = thread::Builder::new()
            .name(format!("channel-{timeslot}"))
            .spawn(move || {
                let span = span!(Level::TRACE, "channel", timeslot);
                let _guard = span.enter();
                loop {
                    select! {
                        recv(cancel_rx) -> _ => {
                            debug!("channel cancelled");
                            break;
                        }
                        recv(input_rx) -> input => match input {
                            Ok(input) => {
                                if cancel_rx.try_recv().is_ok() {
                                    debug!("channel cancelled");
                                    break;
                                }
                                decoder.receive(input);
                            }
                            Err(_) => break,
                        },
                    }
                }
                decoder.stats()
            })?;

        Ok(Self {
            input: input_tx,
            cancel: cancel_tx,
            handle,
        })
    }

    pub fn sender(&self) -> Sender<Input> {
        self.input.clone()
    }

    /// Queue `input`; `false` if the worker has stopped.
    pub fn send(&self, input: Input) -> bool {
        self.input.send(input).is_ok()
    }

    /// Stop the worker, discarding queued input and partial messages.
    pub fn cancel(self) -> AssemblerStats {
        let _ = self.cancel.try_send(());
        self.finish()
    }

    /// Process everything queued, then stop the worker.
    pub fn finish(self) -> AssemblerStats {
        drop(self.input);
        self.handle.join().expect("channel thread panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bits::BitFrame, catalog::DMR_SHORT_LC, fec::BlockCodec, message::dmr};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn decoder() -> ChannelDecoder<Vec<DecodedMessage>> {
        ChannelDecoder::new(
            Arc::new(Catalog::standard().unwrap()),
            DetectorVariant::Word64,
            1,
            Leniency::default(),
            Vec::new(),
        )
    }

    #[test]
    fn test_external_fragments_reach_listener() {
        let mut dec = decoder();
        let class = dec.catalog.class(DMR_SHORT_LC).unwrap().clone();
        let lc = dmr::short_lc(dmr::SLCO_ACTIVITY_UPDATE, 0x80_0000);
        let coded = class.codec.encode(&lc);
        let positions = [
            Position::First,
            Position::Continue,
            Position::Continue,
            Position::Last,
        ];
        for (i, position) in positions.into_iter().enumerate() {
            let piece = coded.slice(i * class.slot_bits..(i + 1) * class.slot_bits);
            dec.process_fragment(DMR_SHORT_LC, FragmentDescriptor::new(position, piece, i as u64))
                .unwrap();
        }

        let msgs = dec.into_listener();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].is_valid());
        assert_eq!(msgs[0].raw(), &lc);
    }

    #[test]
    fn test_unknown_class_is_error() {
        let mut dec = decoder();
        let zult = dec.process_fragment(
            "nope",
            FragmentDescriptor::new(Position::First, BitFrame::zeros(17), 0),
        );
        assert!(matches!(zult, Err(Error::UnknownClass(_))));
    }

    #[test]
    fn test_noise_produces_nothing() {
        let mut dec = decoder();
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..2000u64 {
            dec.receive(Input::Bit {
                bit: rng.gen(),
                timestamp: i,
            });
        }
        assert!(dec.listener().is_empty());
        assert_eq!(dec.stats().decoded, 0);
    }

    #[test]
    fn test_cancel_discards_partial_state() {
        let (tx, rx) = unbounded();
        let mut dec = ChannelDecoder::new(
            Arc::new(Catalog::standard().unwrap()),
            DetectorVariant::Scalar,
            2,
            Leniency::default(),
            tx,
        );
        dec.process_fragment(
            DMR_SHORT_LC,
            FragmentDescriptor::new(Position::First, BitFrame::zeros(17), 0),
        )
        .unwrap();
        let handle = ChannelHandle::spawn(dec).unwrap();
        assert!(handle.send(Input::Bit {
            bit: true,
            timestamp: 0
        }));
        let stats = handle.cancel();
        assert_eq!(stats.decoded, 0);
        assert!(rx.try_recv().is_err());
    }
}
