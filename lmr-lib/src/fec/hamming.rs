/// A systematic single error correcting Hamming code defined by the parity-check column of
/// each data bit. Parity bit `k` has the column `1 << (parity - 1 - k)`.
#[derive(Debug, Clone, Copy)]
pub struct Hamming {
    data_cols: &'static [u8],
    parity: usize,
}

/// Outcome of [Hamming::correct].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HammingResult {
    Clean,
    /// A single error at this bit position was corrected.
    Corrected(usize),
    /// The syndrome does not match any single bit position.
    Uncorrectable,
}

/// Hamming(17,12,3) protecting each row of the Short LC product code.
pub const HAMMING_17_12: Hamming = Hamming {
    data_cols: &[
        0x03, 0x05, 0x06, 0x07, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x11,
    ],
    parity: 5,
};

/// Hamming(7,4,3) protecting the DMR CACH TACT bits.
pub const HAMMING_7_4: Hamming = Hamming {
    data_cols: &[0b101, 0b111, 0b110, 0b011],
    parity: 3,
};

impl Hamming {
    pub fn data_bits(&self) -> usize {
        self.data_cols.len()
    }

    pub fn word_bits(&self) -> usize {
        self.data_cols.len() + self.parity
    }

    fn column(&self, pos: usize) -> u8 {
        if pos < self.data_cols.len() {
            self.data_cols[pos]
        } else {
            1 << (self.parity - 1 - (pos - self.data_cols.len()))
        }
    }

    /// Syndrome of a full codeword; zero for a valid codeword.
    ///
    /// # Panics
    /// If `word` is not [Hamming::word_bits] bits.
    pub fn syndrome(&self, word: &[bool]) -> u8 {
        assert_eq!(word.len(), self.word_bits(), "hamming word length");
        word.iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .fold(0, |acc, (i, _)| acc ^ self.column(i))
    }

    /// Bit position whose column equals `syndrome`.
    pub fn locate(&self, syndrome: u8) -> Option<usize> {
        (0..self.word_bits()).find(|&i| self.column(i) == syndrome)
    }

    /// Append parity bits to `data`.
    ///
    /// # Panics
    /// If `data` is not [Hamming::data_bits] long.
    pub fn encode(&self, data: &[bool]) -> Vec<bool> {
        assert_eq!(data.len(), self.data_bits(), "hamming data length");
        let parity = data
            .iter()
            .zip(self.data_cols)
            .filter(|(b, _)| **b)
            .fold(0u8, |acc, (_, col)| acc ^ col);
        let mut zult = data.to_vec();
        zult.extend((0..self.parity).map(|k| (parity >> (self.parity - 1 - k)) & 1 == 1));
        zult
    }

    /// Correct at most one bit error in place.
    pub fn correct(&self, word: &mut [bool]) -> HammingResult {
        match self.syndrome(word) {
            0 => HammingResult::Clean,
            s => match self.locate(s) {
                Some(pos) => {
                    word[pos] = !word[pos];
                    HammingResult::Corrected(pos)
                }
                None => HammingResult::Uncorrectable,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nibble(v: u8) -> Vec<bool> {
        (0..4).map(|i| (v >> (3 - i)) & 1 == 1).collect()
    }

    #[test]
    fn test_hamming_7_4_corrects_every_single_error() {
        for v in 0..16u8 {
            let word = HAMMING_7_4.encode(&nibble(v));
            assert_eq!(HAMMING_7_4.syndrome(&word), 0);
            for pos in 0..7 {
                let mut bad = word.clone();
                bad[pos] = !bad[pos];
                assert_eq!(HAMMING_7_4.correct(&mut bad), HammingResult::Corrected(pos));
                assert_eq!(bad, word, "value {v} pos {pos}");
            }
        }
    }

    #[test]
    fn test_hamming_17_12_detects_double_errors() {
        let data: Vec<bool> = (0..12).map(|i| i % 3 == 0).collect();
        let word = HAMMING_17_12.encode(&data);
        assert_eq!(word.len(), 17);
        assert_eq!(HAMMING_17_12.syndrome(&word), 0);
        for a in 0..17 {
            for b in (a + 1)..17 {
                let mut bad = word.clone();
                bad[a] = !bad[a];
                bad[b] = !bad[b];
                assert_ne!(HAMMING_17_12.syndrome(&bad), 0, "errors at {a},{b}");
            }
        }
    }
}
