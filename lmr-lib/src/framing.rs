//! Slicing raw frames out of the bit stream around a detected sync.
use std::collections::VecDeque;

use tracing::trace;

use crate::{
    bits::BitFrame,
    message::dmr::CACH_BITS,
    sync::{PatternId, SyncCandidate},
};

/// Bits between consecutive DMR burst syncs on a base station carrier.
pub const DMR_BURST_BITS: usize = 288;
/// DMR burst payload bits on each side of the sync.
pub const DMR_HALF_PAYLOAD_BITS: usize = 108;

/// What is captured around a sync pattern, and the message class it feeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameLayout {
    /// DMR base station burst: CACH and the first payload half before the sync, the second
    /// payload half after it. The CACH carries one Short LC fragment.
    DmrBurst { class: String },
    /// A single coded block immediately following the sync.
    Block { class: String, bits: usize },
}

/// Bits captured before and after a sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub pre: usize,
    pub post: usize,
}

impl FrameLayout {
    pub fn class(&self) -> &str {
        match self {
            Self::DmrBurst { class } | Self::Block { class, .. } => class,
        }
    }

    pub fn window(&self) -> Window {
        match self {
            Self::DmrBurst { .. } => Window {
                pre: CACH_BITS + DMR_HALF_PAYLOAD_BITS,
                post: DMR_HALF_PAYLOAD_BITS,
            },
            Self::Block { bits, .. } => Window {
                pre: 0,
                post: *bits,
            },
        }
    }
}

/// Bits surrounding one detected sync, with the sync itself removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub pattern: PatternId,
    pub bit_errors: u32,
    /// Stream offset of the first sync bit.
    pub start_offset: u64,
    /// Timestamp of the last sync bit.
    pub timestamp: u64,
    pub pre: BitFrame,
    pub post: BitFrame,
}

#[derive(Debug)]
struct Capture {
    candidate: SyncCandidate,
    timestamp: u64,
    pre: BitFrame,
    post: Vec<bool>,
    post_len: usize,
}

impl Capture {
    fn finish(self) -> RawFrame {
        RawFrame {
            pattern: self.candidate.pattern,
            bit_errors: self.candidate.bit_errors,
            start_offset: self.candidate.start_offset,
            timestamp: self.timestamp,
            pre: self.pre,
            post: BitFrame::from(self.post),
        }
    }
}

/// Keeps enough bit history to recover the bits preceding a sync, and collects the bits
/// following one.
///
/// Every bit must be [pushed](FrameExtractor::push) before it is given to the sync
/// detector so a capture started by [FrameExtractor::begin] sees the history up to and
/// including the last sync bit.
#[derive(Debug)]
pub struct FrameExtractor {
    history: VecDeque<bool>,
    capacity: usize,
    pending: Vec<Capture>,
}

impl FrameExtractor {
    /// `capacity` is the longest pre-sync window plus the longest sync pattern.
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            pending: Vec::default(),
        }
    }

    /// Add a bit to the history and to every capture in progress, returning the captures
    /// completed by it.
    pub fn push(&mut self, bit: bool) -> Vec<RawFrame> {
        if self.capacity > 0 {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(bit);
        }

        if self.pending.is_empty() {
            return Vec::default();
        }
        for capture in &mut self.pending {
            capture.post.push(bit);
        }
        let (done, pending): (Vec<Capture>, Vec<Capture>) = self
            .pending
            .drain(..)
            .partition(|c| c.post.len() == c.post_len);
        self.pending = pending;
        done.into_iter().map(Capture::finish).collect()
    }

    /// Start a capture for a sync ending at the most recently pushed bit.
    ///
    /// Returns the frame immediately when `window.post` is zero. Returns `None` when not
    /// enough history is available for `window.pre`, e.g., right after a reset.
    pub fn begin(
        &mut self,
        candidate: SyncCandidate,
        sync_len: usize,
        window: Window,
        timestamp: u64,
    ) -> Option<RawFrame> {
        let needed = window.pre + sync_len;
        if self.history.len() < needed || needed > self.capacity {
            trace!(
                start_offset = candidate.start_offset,
                available = self.history.len(),
                needed,
                "not enough history for frame"
            );
            return None;
        }
        let start = self.history.len() - needed;
        let pre: BitFrame = self
            .history
            .range(start..start + window.pre)
            .copied()
            .collect();

        let capture = Capture {
            candidate,
            timestamp,
            pre,
            post: Vec::with_capacity(window.post),
            post_len: window.post,
        };
        if window.post == 0 {
            return Some(capture.finish());
        }
        self.pending.push(capture);
        None
    }

    pub fn is_capturing(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop all history and captures in progress.
    pub fn reset(&mut self) {
        self.history.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(start_offset: u64) -> SyncCandidate {
        SyncCandidate {
            pattern: PatternId(0),
            bit_errors: 0,
            start_offset,
        }
    }

    #[test]
    fn test_capture_pre_and_post() {
        let mut extractor = FrameExtractor::new(16);
        // pre: 1010, sync: 1111, post: 001
        for b in [true, false, true, false, true, true, true, true] {
            assert!(extractor.push(b).is_empty());
        }
        let window = Window { pre: 4, post: 3 };
        assert!(extractor.begin(candidate(4), 4, window, 99).is_none());
        assert!(extractor.is_capturing());

        assert!(extractor.push(false).is_empty());
        assert!(extractor.push(false).is_empty());
        let frames = extractor.push(true);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pre, BitFrame::from_u64(0b1010, 4));
        assert_eq!(frames[0].post, BitFrame::from_u64(0b001, 3));
        assert_eq!(frames[0].timestamp, 99);
        assert_eq!(frames[0].start_offset, 4);
        assert!(!extractor.is_capturing());
    }

    #[test]
    fn test_insufficient_history() {
        let mut extractor = FrameExtractor::new(16);
        for _ in 0..6 {
            extractor.push(true);
        }
        assert!(extractor
            .begin(candidate(2), 4, Window { pre: 4, post: 1 }, 0)
            .is_none());
        assert!(!extractor.is_capturing());
    }

    #[test]
    fn test_post_only_window_and_reset() {
        let mut extractor = FrameExtractor::new(0);
        assert!(extractor
            .begin(candidate(0), 0, Window { pre: 0, post: 2 }, 0)
            .is_none());
        assert!(extractor.is_capturing());
        extractor.reset();
        assert!(!extractor.is_capturing());
        assert!(extractor.push(true).is_empty());
    }

    #[test]
    fn test_layout_windows() {
        let burst = FrameLayout::DmrBurst {
            class: "x".into(),
        };
        assert_eq!(burst.window(), Window { pre: 132, post: 108 });
        assert_eq!(
            132 + 48 + 108,
            DMR_BURST_BITS,
            "a burst and its sync fill one slot"
        );
        let block = FrameLayout::Block {
            class: "y".into(),
            bits: 270,
        };
        assert_eq!(block.window(), Window { pre: 0, post: 270 });
        assert_eq!(block.class(), "y");
    }
}
