use std::sync::Arc;

use super::{
    select, DetectorVariant, Position, SyncCandidate, SyncCatalog, SyncDetector, Weights,
};

/// `W` patterns laid out for lane-parallel comparison. Unused lanes have a length no
/// history can reach so they are never eligible.
#[derive(Clone, Copy)]
struct Block<const W: usize> {
    values: [u64; W],
    masks: [u64; W],
    lens: [u32; W],
}

impl<const W: usize> Block<W> {
    const EMPTY: Self = Self {
        values: [0; W],
        masks: [0; W],
        lens: [u32::MAX; W],
    };

    /// Mismatched bits of every lane against `register`.
    #[inline(always)]
    fn mismatches(&self, register: u64) -> [u64; W] {
        let mut mismatches = [0u64; W];
        for lane in 0..W {
            mismatches[lane] = (register ^ self.values[lane]) & self.masks[lane];
        }
        mismatches
    }

    /// Score every lane against `register`.
    #[inline(always)]
    fn score(&self, register: u64) -> [u32; W] {
        let mismatches = self.mismatches(register);
        let mut errors = [0u32; W];
        for lane in 0..W {
            errors[lane] = mismatches[lane].count_ones();
        }
        errors
    }
}

/// Detector comparing the shift register against `W` patterns per step using fixed-size
/// arrays, which the compiler lowers to vector instructions where the target has them.
pub struct LaneDetector<const W: usize> {
    catalog: Arc<SyncCatalog>,
    blocks: Vec<Block<W>>,
    register: u64,
    weights: Weights,
    pos: Position,
}

impl<const W: usize> LaneDetector<W> {
    pub fn new(catalog: Arc<SyncCatalog>) -> Self {
        let patterns: Vec<_> = catalog.iter().map(|(_, p)| p).collect();
        let blocks = patterns
            .chunks(W)
            .map(|chunk| {
                let mut block = Block::EMPTY;
                for (lane, pattern) in chunk.iter().enumerate() {
                    block.values[lane] = pattern.value;
                    block.masks[lane] = pattern.mask();
                    block.lens[lane] = pattern.len;
                }
                block
            })
            .collect();
        Self {
            catalog,
            blocks,
            register: 0,
            weights: Weights::default(),
            pos: Position::default(),
        }
    }
}

impl<const W: usize> SyncDetector for LaneDetector<W> {
    #[inline]
    fn observe_weighted(&mut self, bit: bool, weight: u32) -> Option<SyncCandidate> {
        self.register = (self.register << 1) | u64::from(bit);
        self.weights.push(weight);
        self.pos.advance();

        let fill = self.pos.fill;
        let register = self.register;
        let count = self.catalog.len();
        let scores = self.blocks.iter().enumerate().flat_map(|(b, block)| {
            let errors = block.score(register);
            (0..W).map(move |lane| {
                let eligible = fill >= block.lens[lane];
                (b * W + lane, eligible.then_some(errors[lane]))
            })
        });
        let penalty = |i: usize| {
            let mismatches = self.blocks[i / W].mismatches(register);
            self.weights.penalty(mismatches[i % W])
        };
        let (id, errors) = select(scores.take(count), &self.catalog, penalty)?;
        let len = self.blocks[id.0 / W].lens[id.0 % W];
        Some(self.pos.candidate(id, errors, len))
    }

    fn reset(&mut self) {
        self.register = 0;
        self.pos.fill = 0;
    }

    fn variant(&self) -> DetectorVariant {
        match W {
            4 => DetectorVariant::Lanes4,
            8 => DetectorVariant::Lanes8,
            _ => unreachable!("no detector variant for {W} lanes"),
        }
    }
}
