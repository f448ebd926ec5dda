//! Block forward error correction.
//!
//! Every codec implements [BlockCodec]. Decoding never fails for bad radio data: an error
//! pattern beyond the code's capacity is reported as [CorrectedBlock::success] `false`,
//! with the uncorrected systematic bits as the payload so callers can still inspect
//! legible fields. Handing a codec a block of the wrong length is a programming error and
//! panics.
mod bptc;
mod galois;
mod hamming;
mod reed_solomon;

use std::fmt;
use std::ops::Range;

pub use bptc::ShortLcBptc;
pub use galois::{gf64, GaloisField};
pub use hamming::{Hamming, HammingResult, HAMMING_17_12, HAMMING_7_4};
pub use reed_solomon::ReedSolomon;

use crate::bits::BitFrame;

/// The possible correction dispositions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integrity {
    /// Data did not require correction.
    Ok,
    /// Data was successfully corrected.
    Corrected,
    /// Not correctable, too many errors.
    Uncorrectable,
}

impl Integrity {
    /// Return `true` if [Self::Ok] or [Self::Corrected].
    pub fn ok(&self) -> bool {
        matches!(self, Self::Ok | Self::Corrected)
    }
}

/// A coded block as received, with the bit ranges that were never received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodedBlock {
    pub bits: BitFrame,
    /// Bit ranges known to be missing. Their content in `bits` is meaningless.
    pub erased: Vec<Range<usize>>,
}

impl CodedBlock {
    pub fn new(bits: BitFrame) -> Self {
        Self {
            bits,
            erased: Vec::default(),
        }
    }

    pub fn with_erasure(mut self, range: Range<usize>) -> Self {
        self.erased.push(range);
        self
    }

    /// `true` if any bit in `range` is erased.
    pub fn is_erased(&self, range: Range<usize>) -> bool {
        self.erased
            .iter()
            .any(|e| e.start < range.end && range.start < e.end)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

impl From<BitFrame> for CodedBlock {
    fn from(bits: BitFrame) -> Self {
        Self::new(bits)
    }
}

/// Output of [BlockCodec::decode].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrectedBlock {
    /// Systematic payload bits, corrected when `success` is `true`.
    pub payload: BitFrame,
    /// Number of bits changed by correction.
    pub corrected_bits: usize,
    pub success: bool,
}

impl CorrectedBlock {
    pub(crate) fn failed(payload: BitFrame) -> Self {
        Self {
            payload,
            corrected_bits: 0,
            success: false,
        }
    }

    pub fn integrity(&self) -> Integrity {
        match (self.success, self.corrected_bits) {
            (false, _) => Integrity::Uncorrectable,
            (true, 0) => Integrity::Ok,
            (true, _) => Integrity::Corrected,
        }
    }
}

/// A block code that corrects a fixed-size coded block into a systematic payload.
pub trait BlockCodec: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Length of a coded block in bits.
    fn coded_bits(&self) -> usize;

    /// Length of the decoded payload in bits.
    fn payload_bits(&self) -> usize;

    /// `true` if the codec uses [CodedBlock::erased] to locate missing symbols. Codecs
    /// that do not support erasures decode erased bits as received.
    fn supports_erasures(&self) -> bool {
        false
    }

    /// Correct `block`. The block is never modified.
    ///
    /// # Panics
    /// If `block` is not [BlockCodec::coded_bits] long.
    fn decode(&self, block: &CodedBlock) -> CorrectedBlock;

    /// Produce the coded block for `payload`.
    ///
    /// # Panics
    /// If `payload` is not [BlockCodec::payload_bits] long.
    fn encode(&self, payload: &BitFrame) -> BitFrame;
}
