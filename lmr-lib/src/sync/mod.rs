//! Frame synchronization.
//!
//! A [SyncDetector] is fed one bit decision at a time and compares the trailing bits
//! against every pattern in a [SyncCatalog]. When the Hamming distance to a pattern is
//! within that pattern's threshold a [SyncCandidate] is returned.
//!
//! Several implementations are provided, see [DetectorVariant]. They must produce exactly
//! the same candidates for the same input; they differ only in how the comparison is
//! batched.
//!
//! Soft decisions carry a weight derived from their magnitude. A pattern's penalty is the
//! summed weight of its mismatched bits, and a pattern whose penalty exceeds
//! `threshold * NOMINAL_WEIGHT` is rejected even when its bit error count is within
//! threshold. Hard decisions all weigh [NOMINAL_WEIGHT]. When more than one pattern
//! qualifies at the same bit the lowest penalty wins, then the fewest errors, and
//! remaining ties go to the pattern registered first.
mod lanes;
mod scalar;
mod word;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use lanes::LaneDetector;
pub use scalar::ScalarDetector;
pub use word::WordDetector;

use crate::{message::Protocol, Error, Result};

/// Longest pattern any detector can hold.
pub const MAX_PATTERN_BITS: u32 = 64;

/// Weight of a hard decision, and of a soft decision with magnitude 1.0.
pub const NOMINAL_WEIGHT: u32 = 16;

/// Heaviest weight a single decision can carry.
pub const MAX_WEIGHT: u32 = 4 * NOMINAL_WEIGHT;

/// Confidence weight of a soft decision. NaN weighs nothing.
pub fn soft_weight(value: f32) -> u32 {
    let scaled = (value.abs() * NOMINAL_WEIGHT as f32).round();
    if scaled >= MAX_WEIGHT as f32 {
        MAX_WEIGHT
    } else if scaled > 0.0 {
        scaled as u32
    } else {
        0
    }
}

/// Index of a pattern in its [SyncCatalog].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub usize);

/// A known bit sequence marking a frame boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPattern {
    pub name: String,
    pub protocol: Protocol,
    /// Pattern bits, right aligned. The first transmitted bit is bit `len - 1`.
    pub value: u64,
    pub len: u32,
    /// Maximum number of mismatched bits still accepted as a sync.
    pub threshold: u32,
}

impl SyncPattern {
    pub fn new(name: &str, protocol: Protocol, value: u64, len: u32, threshold: u32) -> Self {
        Self {
            name: name.to_string(),
            protocol,
            value,
            len,
            threshold,
        }
    }

    pub fn mask(&self) -> u64 {
        if self.len >= 64 {
            u64::MAX
        } else {
            (1u64 << self.len) - 1
        }
    }

    /// Pattern bits in transmission order.
    pub fn bits(&self) -> Vec<bool> {
        (0..self.len)
            .map(|i| (self.value >> (self.len - 1 - i)) & 1 == 1)
            .collect()
    }
}

/// A possible frame boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncCandidate {
    pub pattern: PatternId,
    pub bit_errors: u32,
    /// Stream offset of the first bit of the sync pattern, counted from the first bit the
    /// detector ever observed.
    pub start_offset: u64,
}

/// The set of patterns a detector looks for. Read-only once detectors are built.
#[derive(Clone, Debug, Default)]
pub struct SyncCatalog {
    patterns: Vec<SyncPattern>,
}

impl SyncCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the sync patterns for the supported air interfaces.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for pattern in [
            SyncPattern::new("dmr-bs-data", Protocol::Dmr, 0xDFF5_7D75_DF5D, 48, 4),
            SyncPattern::new("dmr-bs-voice", Protocol::Dmr, 0x755F_D7DF_75F7, 48, 4),
            SyncPattern::new("dmr-ms-data", Protocol::Dmr, 0xD5D7_F77F_D757, 48, 4),
            SyncPattern::new("dmr-ms-voice", Protocol::Dmr, 0x7F7D_5DD5_7DFD, 48, 4),
            SyncPattern::new("p25p1", Protocol::P25Phase1, 0x5575_F5FF_77FF, 48, 4),
            SyncPattern::new("p25p2", Protocol::P25Phase2, 0x57_5D57_F7FF, 40, 3),
            SyncPattern::new("nxdn", Protocol::Nxdn, 0xC_DF59, 20, 1),
        ] {
            catalog.register(pattern).expect("builtin pattern");
        }
        catalog
    }

    /// Add a pattern, returning its id.
    ///
    /// # Errors
    /// [Error::InvalidPattern] if the pattern is empty, longer than [MAX_PATTERN_BITS], has
    /// bits set beyond its length, or reuses a registered name.
    pub fn register(&mut self, pattern: SyncPattern) -> Result<PatternId> {
        if pattern.len == 0 || pattern.len > MAX_PATTERN_BITS {
            return Err(Error::InvalidPattern(format!(
                "{}: length {} not in 1..={MAX_PATTERN_BITS}",
                pattern.name, pattern.len
            )));
        }
        if pattern.value & !pattern.mask() != 0 {
            return Err(Error::InvalidPattern(format!(
                "{}: value has bits set beyond {} bits",
                pattern.name, pattern.len
            )));
        }
        if self.find(&pattern.name).is_some() {
            return Err(Error::InvalidPattern(format!(
                "{}: already registered",
                pattern.name
            )));
        }
        self.patterns.push(pattern);
        Ok(PatternId(self.patterns.len() - 1))
    }

    /// Change the threshold of a registered pattern.
    ///
    /// # Errors
    /// [Error::InvalidPattern] if no pattern has the name or the threshold is not less than
    /// the pattern length.
    pub fn set_threshold(&mut self, name: &str, threshold: u32) -> Result<()> {
        let Some(id) = self.find(name) else {
            return Err(Error::InvalidPattern(format!("{name}: not registered")));
        };
        let pattern = &mut self.patterns[id.0];
        if threshold >= pattern.len {
            return Err(Error::InvalidPattern(format!(
                "{name}: threshold {threshold} must be less than length {}",
                pattern.len
            )));
        }
        pattern.threshold = threshold;
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<PatternId> {
        self.patterns
            .iter()
            .position(|p| p.name == name)
            .map(PatternId)
    }

    pub fn get(&self, id: PatternId) -> Option<&SyncPattern> {
        self.patterns.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PatternId, &SyncPattern)> {
        self.patterns
            .iter()
            .enumerate()
            .map(|(i, p)| (PatternId(i), p))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Length of the longest registered pattern.
    pub fn max_len(&self) -> u32 {
        self.patterns.iter().map(|p| p.len).max().unwrap_or(0)
    }
}

/// Scores a sliding bit window against a [SyncCatalog].
pub trait SyncDetector: Send {
    /// Shift in one bit decision made with confidence `weight`, clamped to [MAX_WEIGHT].
    fn observe_weighted(&mut self, bit: bool, weight: u32) -> Option<SyncCandidate>;

    /// Shift in one hard bit decision.
    fn observe(&mut self, bit: bool) -> Option<SyncCandidate> {
        self.observe_weighted(bit, NOMINAL_WEIGHT)
    }

    /// Shift in one soft decision. Positive values are a `1` bit; the magnitude is the
    /// confidence, see [soft_weight].
    fn observe_soft(&mut self, value: f32) -> Option<SyncCandidate> {
        self.observe_weighted(value > 0.0, soft_weight(value))
    }

    /// Clear the bit history. The stream offset keeps counting so candidate offsets stay
    /// comparable across a reset.
    fn reset(&mut self);

    fn variant(&self) -> DetectorVariant;
}

/// The interchangeable [SyncDetector] implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorVariant {
    /// One bit comparison at a time.
    Scalar,
    /// A 64-bit shift register compared with XOR and popcount, one pattern at a time.
    Word64,
    /// Patterns compared 4 at a time in fixed-width lanes (256 bits).
    Lanes4,
    /// Patterns compared 8 at a time in fixed-width lanes (512 bits).
    Lanes8,
}

impl DetectorVariant {
    pub const ALL: [DetectorVariant; 4] = [Self::Scalar, Self::Word64, Self::Lanes4, Self::Lanes8];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Word64 => "word64",
            Self::Lanes4 => "lanes4",
            Self::Lanes8 => "lanes8",
        }
    }

    /// Create a detector of this variant for `catalog`.
    pub fn build(&self, catalog: Arc<SyncCatalog>) -> Box<dyn SyncDetector> {
        match self {
            Self::Scalar => Box::new(ScalarDetector::new(catalog)),
            Self::Word64 => Box::new(WordDetector::new(catalog)),
            Self::Lanes4 => Box::new(LaneDetector::<4>::new(catalog)),
            Self::Lanes8 => Box::new(LaneDetector::<8>::new(catalog)),
        }
    }
}

impl fmt::Display for DetectorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| Error::UnknownVariant(s.to_string()))
    }
}

/// Run `bits` through `detector`, collecting every candidate.
pub fn scan<I>(detector: &mut dyn SyncDetector, bits: I) -> Vec<SyncCandidate>
where
    I: IntoIterator<Item = bool>,
{
    bits.into_iter()
        .filter_map(|b| detector.observe(b))
        .collect()
}

/// Pick the winning pattern from per-pattern error counts given in registration order.
/// `None` entries are patterns not yet eligible. `penalty` gives the mismatch weight of a
/// pattern and is only called for patterns within their error threshold.
#[inline]
pub(crate) fn select<I, P>(
    scores: I,
    catalog: &SyncCatalog,
    penalty: P,
) -> Option<(PatternId, u32)>
where
    I: IntoIterator<Item = (usize, Option<u32>)>,
    P: Fn(usize) -> u32,
{
    let mut best: Option<(PatternId, u32, u32)> = None;
    for (idx, errors) in scores {
        let Some(errors) = errors else {
            continue;
        };
        let threshold = catalog.patterns[idx].threshold;
        if errors > threshold {
            continue;
        }
        let weight = penalty(idx);
        if weight > threshold * NOMINAL_WEIGHT {
            continue;
        }
        match best {
            Some((_, e, w)) if (w, e) <= (weight, errors) => {}
            _ => best = Some((PatternId(idx), errors, weight)),
        }
    }
    best.map(|(id, errors, _)| (id, errors))
}

/// Bookkeeping shared by all variants: how many bits are valid in the history and the
/// absolute stream position.
#[derive(Clone, Debug, Default)]
pub(crate) struct Position {
    /// Bits shifted in since the last reset, saturating at [MAX_PATTERN_BITS].
    pub fill: u32,
    /// Bits observed since construction.
    pub offset: u64,
}

impl Position {
    #[inline]
    pub fn advance(&mut self) {
        self.fill = (self.fill + 1).min(MAX_PATTERN_BITS);
        self.offset += 1;
    }

    #[inline]
    pub fn candidate(&self, pattern: PatternId, bit_errors: u32, len: u32) -> SyncCandidate {
        SyncCandidate {
            pattern,
            bit_errors,
            start_offset: self.offset - u64::from(len),
        }
    }
}

/// Shift `item` into a history bounded to `cap` entries.
pub(crate) fn push_history<T>(history: &mut VecDeque<T>, cap: usize, item: T) {
    if history.len() == cap {
        history.pop_front();
    }
    history.push_back(item);
}

/// Decision weights of the last 64 bits, lined up with a 64-bit shift register: bit `i` of
/// the register was observed `i` steps ago.
#[derive(Clone, Debug)]
pub(crate) struct Weights {
    ring: [u8; 64],
    head: usize,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            ring: [0; 64],
            head: 0,
        }
    }
}

impl Weights {
    #[inline]
    pub fn push(&mut self, weight: u32) {
        self.ring[self.head] = weight.min(MAX_WEIGHT) as u8;
        self.head = (self.head + 1) & 63;
    }

    /// Summed weight of the register bits set in `mismatch`.
    #[inline]
    pub fn penalty(&self, mut mismatch: u64) -> u32 {
        let mut total = 0;
        while mismatch != 0 {
            let age = mismatch.trailing_zeros() as usize;
            total += u32::from(self.ring[(self.head + 63 - age) & 63]);
            mismatch &= mismatch - 1;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use test_case::test_case;

    fn pattern_bits(catalog: &SyncCatalog, name: &str) -> Vec<bool> {
        catalog
            .get(catalog.find(name).expect("pattern"))
            .expect("pattern")
            .bits()
    }

    #[test_case(DetectorVariant::Scalar; "scalar")]
    #[test_case(DetectorVariant::Word64; "word64")]
    #[test_case(DetectorVariant::Lanes4; "lanes4")]
    #[test_case(DetectorVariant::Lanes8; "lanes8")]
    fn test_exact_pattern_found(variant: DetectorVariant) {
        let catalog = Arc::new(SyncCatalog::standard());
        let mut detector = variant.build(catalog.clone());

        let mut bits = vec![false; 10];
        bits.extend(pattern_bits(&catalog, "dmr-bs-data"));
        let found = scan(detector.as_mut(), bits);

        assert_eq!(
            found,
            vec![SyncCandidate {
                pattern: catalog.find("dmr-bs-data").unwrap(),
                bit_errors: 0,
                start_offset: 10,
            }],
            "variant {variant}"
        );
    }

    #[test_case(DetectorVariant::Scalar; "scalar")]
    #[test_case(DetectorVariant::Word64; "word64")]
    #[test_case(DetectorVariant::Lanes4; "lanes4")]
    #[test_case(DetectorVariant::Lanes8; "lanes8")]
    fn test_error_count_at_and_beyond_threshold(variant: DetectorVariant) {
        let catalog = Arc::new(SyncCatalog::standard());
        let id = catalog.find("p25p1").unwrap();
        let pattern = catalog.get(id).unwrap().clone();
        let mut rng = StdRng::seed_from_u64(42);

        for k in 0..=pattern.threshold + 2 {
            let mut bits = pattern.bits();
            let mut flipped = Vec::new();
            while flipped.len() < k as usize {
                let idx = rng.gen_range(0..bits.len());
                if !flipped.contains(&idx) {
                    bits[idx] = !bits[idx];
                    flipped.push(idx);
                }
            }

            let mut detector = variant.build(catalog.clone());
            let hits: Vec<SyncCandidate> = scan(detector.as_mut(), bits.clone())
                .into_iter()
                .filter(|c| c.pattern == id)
                .collect();

            if k <= pattern.threshold {
                assert_eq!(hits.len(), 1, "k={k} should be detected");
                assert_eq!(hits[0].bit_errors, k, "k={k} wrong error count");
                assert_eq!(hits[0].start_offset, 0);
            } else {
                assert!(hits.is_empty(), "k={k} beyond threshold was detected");
            }
        }
    }

    #[test]
    fn test_reset_clears_history() {
        let catalog = Arc::new(SyncCatalog::standard());
        for variant in DetectorVariant::ALL {
            let mut detector = variant.build(catalog.clone());
            let bits = pattern_bits(&catalog, "nxdn");
            // Feed all but the last bit, reset, then the last bit. Nothing may match.
            for b in &bits[..bits.len() - 1] {
                assert!(detector.observe(*b).is_none());
            }
            detector.reset();
            assert!(
                detector.observe(bits[bits.len() - 1]).is_none(),
                "{variant} matched across reset"
            );

            // Offsets keep counting across the reset.
            let found = scan(detector.as_mut(), bits.clone());
            assert_eq!(found.len(), 1, "{variant}");
            assert_eq!(found[0].start_offset, bits.len() as u64, "{variant}");
        }
    }

    #[test]
    fn test_soft_observe_slices_by_sign() {
        let catalog = Arc::new(SyncCatalog::standard());
        let bits = pattern_bits(&catalog, "p25p2");
        let mut detector = DetectorVariant::Word64.build(catalog.clone());
        let found: Vec<SyncCandidate> = bits
            .iter()
            .filter_map(|b| detector.observe_soft(if *b { 0.8 } else { -1.2 }))
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern, catalog.find("p25p2").unwrap());
    }

    #[test]
    fn test_soft_weight() {
        assert_eq!(soft_weight(1.0), NOMINAL_WEIGHT);
        assert_eq!(soft_weight(-0.5), 8);
        assert_eq!(soft_weight(0.0), 0);
        assert_eq!(soft_weight(12.0), MAX_WEIGHT);
        assert_eq!(soft_weight(f32::NAN), 0);
    }

    // Three of p25p1's four tolerated errors, made with magnitude `weak`.
    #[test_case(DetectorVariant::Scalar, 0.25, true; "scalar weak errors")]
    #[test_case(DetectorVariant::Scalar, 2.0, false; "scalar confident errors")]
    #[test_case(DetectorVariant::Word64, 0.25, true; "word64 weak errors")]
    #[test_case(DetectorVariant::Word64, 2.0, false; "word64 confident errors")]
    #[test_case(DetectorVariant::Lanes4, 1.0, true; "lanes4 nominal errors")]
    #[test_case(DetectorVariant::Lanes4, 2.0, false; "lanes4 confident errors")]
    #[test_case(DetectorVariant::Lanes8, 0.25, true; "lanes8 weak errors")]
    #[test_case(DetectorVariant::Lanes8, 2.0, false; "lanes8 confident errors")]
    fn test_soft_penalty_gates_candidates(variant: DetectorVariant, weak: f32, accepted: bool) {
        let catalog = Arc::new(SyncCatalog::standard());
        let id = catalog.find("p25p1").unwrap();
        let flipped = [3, 17, 40];
        let values: Vec<f32> = pattern_bits(&catalog, "p25p1")
            .into_iter()
            .enumerate()
            .map(|(i, b)| {
                let (bit, mag) = if flipped.contains(&i) { (!b, weak) } else { (b, 1.0) };
                if bit {
                    mag
                } else {
                    -mag
                }
            })
            .collect();

        let mut detector = variant.build(catalog.clone());
        let hits: Vec<SyncCandidate> = values
            .iter()
            .filter_map(|v| detector.observe_soft(*v))
            .filter(|c| c.pattern == id)
            .collect();

        if accepted {
            assert_eq!(hits.len(), 1, "{variant}");
            assert_eq!(hits[0].bit_errors, 3, "{variant}");
        } else {
            assert!(hits.is_empty(), "{variant} accepted confident errors");
        }
    }

    #[test]
    fn test_lower_penalty_beats_registration_order() {
        let mut catalog = SyncCatalog::new();
        let first = catalog
            .register(SyncPattern::new("a", Protocol::Dmr, 0b1111_0000, 8, 1))
            .unwrap();
        let second = catalog
            .register(SyncPattern::new("b", Protocol::Dmr, 0b1111_0011, 8, 1))
            .unwrap();
        let catalog = Arc::new(catalog);

        // 0b1111_0001 is one error from both; the error against "b" is the weak bit.
        let weak_b = [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -0.25, 0.9];
        // The error against "a" is the weak bit.
        let weak_a = [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -0.9, 0.25];
        for variant in DetectorVariant::ALL {
            for (values, winner) in [(weak_b, second), (weak_a, first)] {
                let mut detector = variant.build(catalog.clone());
                let found: Vec<SyncCandidate> = values
                    .iter()
                    .filter_map(|v| detector.observe_soft(*v))
                    .collect();
                assert_eq!(found.len(), 1, "{variant}");
                assert_eq!(found[0].pattern, winner, "{variant}");
                assert_eq!(found[0].bit_errors, 1, "{variant}");
            }
        }
    }

    #[test]
    fn test_tie_goes_to_first_registered() {
        let mut catalog = SyncCatalog::new();
        let first = catalog
            .register(SyncPattern::new("a", Protocol::Dmr, 0b1111_0000, 8, 1))
            .unwrap();
        catalog
            .register(SyncPattern::new("b", Protocol::Dmr, 0b1111_0011, 8, 1))
            .unwrap();
        let catalog = Arc::new(catalog);

        // One error from both patterns.
        let input = BitsOf(0b1111_0001, 8);
        for variant in DetectorVariant::ALL {
            let mut detector = variant.build(catalog.clone());
            let found = scan(detector.as_mut(), input.bits());
            assert_eq!(found.len(), 1, "{variant}");
            assert_eq!(found[0].pattern, first, "{variant}");
            assert_eq!(found[0].bit_errors, 1, "{variant}");
        }
    }

    #[test]
    fn test_lower_error_count_wins() {
        let mut catalog = SyncCatalog::new();
        catalog
            .register(SyncPattern::new("a", Protocol::Dmr, 0b1111_0000, 8, 2))
            .unwrap();
        let second = catalog
            .register(SyncPattern::new("b", Protocol::Dmr, 0b1111_0011, 8, 2))
            .unwrap();
        let catalog = Arc::new(catalog);

        let input = BitsOf(0b1111_0011, 8);
        for variant in DetectorVariant::ALL {
            let mut detector = variant.build(catalog.clone());
            let found = scan(detector.as_mut(), input.bits());
            assert_eq!(found[0].pattern, second, "{variant}");
            assert_eq!(found[0].bit_errors, 0, "{variant}");
        }
    }

    #[test]
    fn test_register_rejects_invalid_patterns() {
        let mut catalog = SyncCatalog::new();
        assert!(catalog
            .register(SyncPattern::new("empty", Protocol::Dmr, 0, 0, 0))
            .is_err());
        assert!(catalog
            .register(SyncPattern::new("long", Protocol::Dmr, 0, 65, 0))
            .is_err());
        assert!(catalog
            .register(SyncPattern::new("wide", Protocol::Dmr, 0x1ff, 8, 0))
            .is_err());
        catalog
            .register(SyncPattern::new("ok", Protocol::Dmr, 0xff, 8, 0))
            .unwrap();
        assert!(catalog
            .register(SyncPattern::new("ok", Protocol::Dmr, 0x0f, 8, 0))
            .is_err());
        assert!(catalog.set_threshold("ok", 8).is_err());
        assert!(catalog.set_threshold("missing", 1).is_err());
        catalog.set_threshold("ok", 2).unwrap();
    }

    #[test]
    fn test_variant_names_round_trip() {
        for variant in DetectorVariant::ALL {
            assert_eq!(variant.as_str().parse::<DetectorVariant>().unwrap(), variant);
        }
        assert!("avx9000".parse::<DetectorVariant>().is_err());
    }

    struct BitsOf(u64, u32);

    impl BitsOf {
        fn bits(&self) -> Vec<bool> {
            (0..self.1).map(|i| (self.0 >> (self.1 - 1 - i)) & 1 == 1).collect()
        }
    }
}
