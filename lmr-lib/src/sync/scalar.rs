use std::collections::VecDeque;
use std::sync::Arc;

use super::{
    push_history, select, DetectorVariant, Position, SyncCandidate, SyncCatalog, SyncDetector,
    MAX_WEIGHT,
};

/// Reference detector comparing one bit at a time.
///
/// This is the slowest variant and the one the others are checked against.
pub struct ScalarDetector {
    catalog: Arc<SyncCatalog>,
    patterns: Vec<Vec<bool>>,
    history: VecDeque<bool>,
    weights: VecDeque<u32>,
    cap: usize,
    pos: Position,
}

impl ScalarDetector {
    pub fn new(catalog: Arc<SyncCatalog>) -> Self {
        let patterns = catalog.iter().map(|(_, p)| p.bits()).collect();
        let cap = catalog.max_len() as usize;
        Self {
            catalog,
            patterns,
            history: VecDeque::with_capacity(cap),
            weights: VecDeque::with_capacity(cap),
            cap,
            pos: Position::default(),
        }
    }

    fn errors(&self, pattern: &[bool]) -> Option<u32> {
        if self.history.len() < pattern.len() {
            return None;
        }
        let start = self.history.len() - pattern.len();
        let mut errors = 0;
        for (i, expected) in pattern.iter().enumerate() {
            if self.history[start + i] != *expected {
                errors += 1;
            }
        }
        Some(errors)
    }

    /// Summed weight of the mismatched bits. Only called once [ScalarDetector::errors] has
    /// found enough history.
    fn penalty(&self, pattern: &[bool]) -> u32 {
        let start = self.history.len() - pattern.len();
        pattern
            .iter()
            .enumerate()
            .filter(|(i, expected)| self.history[start + i] != **expected)
            .map(|(i, _)| self.weights[start + i])
            .sum()
    }
}

impl SyncDetector for ScalarDetector {
    fn observe_weighted(&mut self, bit: bool, weight: u32) -> Option<SyncCandidate> {
        push_history(&mut self.history, self.cap, bit);
        push_history(&mut self.weights, self.cap, weight.min(MAX_WEIGHT));
        self.pos.advance();

        let scores = self
            .patterns
            .iter()
            .enumerate()
            .map(|(i, p)| (i, self.errors(p)));
        let (id, errors) = select(scores, &self.catalog, |i| self.penalty(&self.patterns[i]))?;
        Some(self.pos.candidate(id, errors, self.patterns[id.0].len() as u32))
    }

    fn reset(&mut self) {
        self.history.clear();
        self.weights.clear();
        self.pos.fill = 0;
    }

    fn variant(&self) -> DetectorVariant {
        DetectorVariant::Scalar
    }
}
