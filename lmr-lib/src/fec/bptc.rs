use ndarray::{s, Array2};
use tracing::trace;

use super::{BlockCodec, CodedBlock, CorrectedBlock, Hamming, HammingResult, HAMMING_17_12};
use crate::bits::BitFrame;

const ROWS: usize = 4;
const COLS: usize = 17;
const DATA_ROWS: usize = 3;
const DATA_COLS: usize = 12;
const CODED_BITS: usize = ROWS * COLS;
const PAYLOAD_BITS: usize = DATA_ROWS * DATA_COLS;

/// Interleaved product code protecting the 36-bit DMR Short LC.
///
/// The 68 coded bits form a 4x17 matrix after de-interleaving. The first three rows are
/// Hamming(17,12) codewords carrying 12 payload bits each, and the last row holds the even
/// parity of each column. Row syndromes locate errors within a row and column parity
/// locates them across rows, so a double error confined to one row is recoverable, as are
/// single errors spread over different rows and errors in the parity row.
///
/// Bit `j` of the row-major matrix is transmitted at position `4j mod 67`; bit 67 is
/// transmitted last.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortLcBptc;

impl ShortLcBptc {
    const HAMMING: Hamming = HAMMING_17_12;

    fn interleave_index(j: usize) -> usize {
        if j == CODED_BITS - 1 {
            j
        } else {
            (j * 4) % (CODED_BITS - 1)
        }
    }

    /// De-interleave the transmitted bits into the code matrix.
    ///
    /// ## Panics
    /// If the block is not 68 bits.
    fn deinterleave(bits: &BitFrame) -> Array2<bool> {
        assert_eq!(
            bits.len(),
            CODED_BITS,
            "short LC block must be {CODED_BITS} bits"
        );
        Array2::from_shape_fn((ROWS, COLS), |(r, c)| {
            bits.flag(Self::interleave_index(r * COLS + c))
        })
    }

    fn row_syndrome(matrix: &Array2<bool>, row: usize) -> u8 {
        let word: Vec<bool> = matrix.row(row).iter().copied().collect();
        Self::HAMMING.syndrome(&word)
    }

    /// Columns whose parity across all four rows is odd.
    fn parity_mismatches(matrix: &Array2<bool>) -> Vec<usize> {
        (0..COLS)
            .filter(|&c| matrix.column(c).iter().filter(|b| **b).count() % 2 == 1)
            .collect()
    }

    /// Apply Hamming single error correction to each data row with a non-zero syndrome.
    /// Returns the number of bits flipped, or `None` if a row could not be corrected.
    fn correct_rows(matrix: &mut Array2<bool>, rows: &[usize]) -> Option<usize> {
        let mut flipped = 0;
        for &row in rows {
            let mut word: Vec<bool> = matrix.row(row).iter().copied().collect();
            match Self::HAMMING.correct(&mut word) {
                HammingResult::Clean => {}
                HammingResult::Corrected(col) => {
                    matrix[[row, col]] = !matrix[[row, col]];
                    flipped += 1;
                }
                HammingResult::Uncorrectable => return None,
            }
        }
        Some(flipped)
    }

    /// Errors left only in the column parity row are corrected by flipping it.
    fn correct_parity_row(matrix: &mut Array2<bool>, limit: usize) -> Option<usize> {
        let mismatches = Self::parity_mismatches(matrix);
        if mismatches.len() > limit {
            return None;
        }
        for &c in &mismatches {
            matrix[[DATA_ROWS, c]] = !matrix[[DATA_ROWS, c]];
        }
        Some(mismatches.len())
    }

    /// Returns the number of corrected bits, or `None` if the errors exceed capacity.
    fn correct(matrix: &mut Array2<bool>) -> Option<usize> {
        let bad_rows: Vec<usize> = (0..DATA_ROWS)
            .filter(|&r| Self::row_syndrome(matrix, r) != 0)
            .collect();
        let mismatches = Self::parity_mismatches(matrix);

        match bad_rows.as_slice() {
            [] => Self::correct_parity_row(matrix, 2),
            [row] => {
                // Column parity points at the error positions when the other rows and the
                // parity row are clean.
                let mut guided = matrix.clone();
                for &c in &mismatches {
                    guided[[*row, c]] = !guided[[*row, c]];
                }
                if !mismatches.is_empty() && Self::row_syndrome(&guided, *row) == 0 {
                    *matrix = guided;
                    return Some(mismatches.len());
                }
                let flipped = Self::correct_rows(matrix, &[*row])?;
                let parity = Self::correct_parity_row(matrix, 1)?;
                Some(flipped + parity)
            }
            rows => {
                let flipped = Self::correct_rows(matrix, rows)?;
                let parity = Self::correct_parity_row(matrix, 1)?;
                Some(flipped + parity)
            }
        }
    }

    fn payload(matrix: &Array2<bool>) -> BitFrame {
        matrix
            .slice(s![..DATA_ROWS, ..DATA_COLS])
            .iter()
            .copied()
            .collect()
    }
}

impl BlockCodec for ShortLcBptc {
    fn name(&self) -> &str {
        "bptc-68-36"
    }

    fn coded_bits(&self) -> usize {
        CODED_BITS
    }

    fn payload_bits(&self) -> usize {
        PAYLOAD_BITS
    }

    fn decode(&self, block: &CodedBlock) -> CorrectedBlock {
        let mut matrix = Self::deinterleave(&block.bits);
        match Self::correct(&mut matrix) {
            Some(corrected_bits) => CorrectedBlock {
                payload: Self::payload(&matrix),
                corrected_bits,
                success: true,
            },
            None => {
                trace!("short LC block uncorrectable");
                CorrectedBlock::failed(Self::payload(&Self::deinterleave(&block.bits)))
            }
        }
    }

    fn encode(&self, payload: &BitFrame) -> BitFrame {
        assert_eq!(
            payload.len(),
            PAYLOAD_BITS,
            "short LC payload must be {PAYLOAD_BITS} bits"
        );
        let mut matrix = Array2::from_elem((ROWS, COLS), false);
        for row in 0..DATA_ROWS {
            let data = &payload.as_slice()[row * DATA_COLS..(row + 1) * DATA_COLS];
            for (c, b) in Self::HAMMING.encode(data).into_iter().enumerate() {
                matrix[[row, c]] = b;
            }
        }
        for c in 0..COLS {
            let odd = (0..DATA_ROWS).filter(|&r| matrix[[r, c]]).count() % 2 == 1;
            matrix[[DATA_ROWS, c]] = odd;
        }

        let mut zult = vec![false; CODED_BITS];
        for (j, b) in matrix.iter().enumerate() {
            zult[Self::interleave_index(j)] = *b;
        }
        BitFrame::from(zult)
    }
}
