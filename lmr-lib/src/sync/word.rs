use std::sync::Arc;

use super::{
    select, DetectorVariant, Position, SyncCandidate, SyncCatalog, SyncDetector, Weights,
};

#[derive(Clone, Copy)]
struct Packed {
    value: u64,
    mask: u64,
    len: u32,
}

/// Detector keeping the history in a single 64-bit shift register.
///
/// Each pattern is scored with one XOR, one AND and a popcount.
pub struct WordDetector {
    catalog: Arc<SyncCatalog>,
    patterns: Vec<Packed>,
    register: u64,
    weights: Weights,
    pos: Position,
}

impl WordDetector {
    pub fn new(catalog: Arc<SyncCatalog>) -> Self {
        let patterns = catalog
            .iter()
            .map(|(_, p)| Packed {
                value: p.value,
                mask: p.mask(),
                len: p.len,
            })
            .collect();
        Self {
            catalog,
            patterns,
            register: 0,
            weights: Weights::default(),
            pos: Position::default(),
        }
    }
}

impl SyncDetector for WordDetector {
    #[inline]
    fn observe_weighted(&mut self, bit: bool, weight: u32) -> Option<SyncCandidate> {
        self.register = (self.register << 1) | u64::from(bit);
        self.weights.push(weight);
        self.pos.advance();

        let fill = self.pos.fill;
        let register = self.register;
        let scores = self.patterns.iter().enumerate().map(|(i, p)| {
            let errors = ((register ^ p.value) & p.mask).count_ones();
            (i, (fill >= p.len).then_some(errors))
        });
        let penalty = |i: usize| {
            let p = &self.patterns[i];
            self.weights.penalty((register ^ p.value) & p.mask)
        };
        let (id, errors) = select(scores, &self.catalog, penalty)?;
        Some(self.pos.candidate(id, errors, self.patterns[id.0].len))
    }

    fn reset(&mut self) {
        self.register = 0;
        self.pos.fill = 0;
    }

    fn variant(&self) -> DetectorVariant {
        DetectorVariant::Word64
    }
}
