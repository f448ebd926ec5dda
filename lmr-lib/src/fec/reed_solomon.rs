use tracing::trace;

use super::{gf64, BlockCodec, CodedBlock, CorrectedBlock, GaloisField};
use crate::bits::{symbols_to_bits, BitFrame};

/// Shortened and punctured Reed-Solomon code over GF(2^6), decoding errors and erasures.
///
/// The mother code is RS(63, 63 - nroots) with generator roots `alpha^1..=alpha^nroots`.
/// Codeword symbol `i` is the coefficient of `x^i`. Parity occupies positions
/// `0..nroots`, of which the lowest `punctured` are never transmitted and always decoded
/// as erasures. Data occupies `nroots..nroots + data`; higher positions are shortened and
/// known to be zero.
///
/// Symbols are transmitted data first, highest position first, followed by the
/// transmitted parity, highest position first. Each symbol is 6 bits, most significant
/// bit first.
#[derive(Debug, Clone)]
pub struct ReedSolomon {
    name: String,
    field: &'static GaloisField,
    nroots: usize,
    data: usize,
    punctured: usize,
    /// Generator polynomial, lowest degree first.
    generator: Vec<u8>,
}

/// Symbol level decode result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SymbolDecode {
    pub data: Vec<u8>,
    pub corrected_bits: usize,
    pub success: bool,
}

impl ReedSolomon {
    /// # Panics
    /// If the shortened code does not fit in 63 symbols or more parity is punctured than
    /// exists.
    pub fn new(name: &str, nroots: usize, data: usize, punctured: usize) -> Self {
        let field = gf64();
        assert!(
            nroots + data <= field.order(),
            "RS code longer than {} symbols",
            field.order()
        );
        assert!(punctured < nroots, "cannot puncture all parity symbols");

        let mut generator = vec![1u8];
        for j in 1..=nroots {
            generator = field.poly_mul(&generator, &[field.alpha(j as i64), 1]);
        }

        Self {
            name: name.to_string(),
            field,
            nroots,
            data,
            punctured,
            generator,
        }
    }

    /// RS(63,35,29) shortened to 26 data symbols with 9 of the 28 parity symbols
    /// punctured, protecting P25 Phase 2 FACCH MAC PDUs (45 transmitted hexbits).
    pub fn p25_phase2_facch() -> Self {
        Self::new("rs-63-35-facch", 28, 26, 9)
    }

    /// RS(24,12,13) protecting the P25 Phase 1 link control word.
    pub fn p25_link_control() -> Self {
        Self::new("rs-24-12-13", 12, 12, 0)
    }

    /// RS(36,20,17) protecting the P25 Phase 1 header data unit.
    pub fn p25_header() -> Self {
        Self::new("rs-36-20-17", 16, 20, 0)
    }

    /// Transmitted symbol count.
    pub fn symbols(&self) -> usize {
        self.data + self.nroots - self.punctured
    }

    pub fn data_symbols(&self) -> usize {
        self.data
    }

    /// Maximum value of `2 * errors + erasures` the code corrects, including the punctured
    /// erasures.
    pub fn capacity(&self) -> usize {
        self.nroots
    }

    /// Codeword position of transmitted symbol `t`.
    fn position(&self, t: usize) -> usize {
        if t < self.data {
            self.nroots + self.data - 1 - t
        } else {
            self.nroots - 1 - (t - self.data)
        }
    }

    fn syndromes(&self, codeword: &[u8]) -> Vec<u8> {
        (1..=self.nroots)
            .map(|j| self.field.eval(codeword, self.field.alpha(j as i64)))
            .collect()
    }

    /// Berlekamp-Massey over `seq`, returning the connection polynomial and its length.
    fn berlekamp_massey(&self, seq: &[u8]) -> (Vec<u8>, usize) {
        let gf = self.field;
        let mut c = vec![1u8];
        let mut b = vec![1u8];
        let mut l = 0usize;
        let mut m = 1usize;
        let mut last = 1u8;

        for n in 0..seq.len() {
            let mut d = seq[n];
            for i in 1..=l.min(c.len() - 1) {
                d ^= gf.mul(c[i], seq[n - i]);
            }
            if d == 0 {
                m += 1;
                continue;
            }
            let coef = gf.div(d, last);
            let prev = c.clone();
            if c.len() < b.len() + m {
                c.resize(b.len() + m, 0);
            }
            for (i, &bi) in b.iter().enumerate() {
                c[i + m] ^= gf.mul(coef, bi);
            }
            if 2 * l <= n {
                l = n + 1 - l;
                b = prev;
                last = d;
                m = 1;
            } else {
                m += 1;
            }
        }
        (c, l)
    }

    /// Decode transmitted symbols. `erased[t]` marks transmitted symbol `t` as missing.
    ///
    /// # Panics
    /// If either slice is not [ReedSolomon::symbols] long.
    pub(crate) fn decode_symbols(&self, symbols: &[u8], erased: &[bool]) -> SymbolDecode {
        assert_eq!(symbols.len(), self.symbols(), "{} symbol count", self.name);
        assert_eq!(erased.len(), self.symbols(), "{} erasure count", self.name);
        let gf = self.field;
        let n = self.nroots + self.data;

        let mut codeword = vec![0u8; n];
        let mut erasures: Vec<usize> = (0..self.punctured).collect();
        for (t, (&sym, &gone)) in symbols.iter().zip(erased).enumerate() {
            let pos = self.position(t);
            if gone {
                erasures.push(pos);
            } else {
                codeword[pos] = sym & 0x3f;
            }
        }
        let received_data = |cw: &[u8]| -> Vec<u8> {
            (0..self.data).map(|t| cw[self.position(t)]).collect()
        };
        let failed = |cw: &[u8]| SymbolDecode {
            data: received_data(cw),
            corrected_bits: 0,
            success: false,
        };

        // Erased symbols are zero filled, so past capacity the all zero word would pass the
        // syndrome check.
        if erasures.len() > self.nroots {
            trace!(code = %self.name, erasures = erasures.len(), "too many erasures");
            return failed(&codeword);
        }
        let syndromes = self.syndromes(&codeword);
        if syndromes.iter().all(|s| *s == 0) {
            return SymbolDecode {
                data: received_data(&codeword),
                corrected_bits: self.count_changes(symbols, erased, &codeword),
                success: true,
            };
        }

        // Erasure locator, then the Forney syndromes which depend only on the errors.
        let mut gamma = vec![1u8];
        for &pos in &erasures {
            gamma = gf.poly_mul(&gamma, &[1, gf.alpha(pos as i64)]);
        }
        let mut modified = gf.poly_mul(&gamma, &syndromes);
        modified.truncate(self.nroots);
        let (lambda, errors) = self.berlekamp_massey(&modified[erasures.len()..]);
        if 2 * errors + erasures.len() > self.nroots {
            trace!(code = %self.name, errors, erasures = erasures.len(), "beyond capacity");
            return failed(&codeword);
        }

        let mut psi = gf.poly_mul(&lambda, &gamma);
        while psi.len() > 1 && psi[psi.len() - 1] == 0 {
            psi.pop();
        }
        let degree = psi.len() - 1;
        if degree != errors + erasures.len() {
            return failed(&codeword);
        }

        // Chien search over every position of the full length code; a root in the
        // shortened region cannot be a real error.
        let roots: Vec<usize> = (0..gf.order())
            .filter(|&i| gf.eval(&psi, gf.alpha(-(i as i64))) == 0)
            .collect();
        if roots.len() != degree || roots.iter().any(|&i| i >= n) {
            trace!(code = %self.name, roots = roots.len(), degree, "locator roots mismatch");
            return failed(&codeword);
        }

        let mut omega = gf.poly_mul(&syndromes, &psi);
        omega.truncate(self.nroots);
        let derivative: Vec<u8> = psi
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, &c)| if i % 2 == 1 { c } else { 0 })
            .collect();

        let mut corrected = codeword.clone();
        for &i in &roots {
            let x_inv = gf.alpha(-(i as i64));
            let denom = gf.eval(&derivative, x_inv);
            if denom == 0 {
                return failed(&codeword);
            }
            corrected[i] ^= gf.div(gf.eval(&omega, x_inv), denom);
        }

        if self.syndromes(&corrected).iter().any(|s| *s != 0) {
            trace!(code = %self.name, "correction did not produce a codeword");
            return failed(&codeword);
        }

        SymbolDecode {
            data: received_data(&corrected),
            corrected_bits: self.count_changes(symbols, erased, &corrected),
            success: true,
        }
    }

    /// Bits changed between the transmitted symbols as given and the corrected codeword.
    fn count_changes(&self, symbols: &[u8], erased: &[bool], codeword: &[u8]) -> usize {
        symbols
            .iter()
            .enumerate()
            .map(|(t, &sym)| {
                let fixed = codeword[self.position(t)];
                if erased[t] {
                    fixed.count_ones() as usize
                } else {
                    ((sym & 0x3f) ^ fixed).count_ones() as usize
                }
            })
            .sum()
    }

    /// Encode data symbols into the transmitted symbol order.
    ///
    /// # Panics
    /// If `data` is not [ReedSolomon::data_symbols] long.
    pub(crate) fn encode_symbols(&self, data: &[u8]) -> Vec<u8> {
        assert_eq!(data.len(), self.data, "{} data symbol count", self.name);
        let gf = self.field;
        let n = self.nroots + self.data;

        let mut codeword = vec![0u8; n];
        for (t, &sym) in data.iter().enumerate() {
            codeword[self.position(t)] = sym & 0x3f;
        }

        // Remainder of x^nroots * m(x) divided by the monic generator.
        let mut rem = codeword.clone();
        for deg in (self.nroots..n).rev() {
            let coef = rem[deg];
            if coef == 0 {
                continue;
            }
            for (j, &g) in self.generator.iter().enumerate() {
                rem[deg - self.nroots + j] ^= gf.mul(coef, g);
            }
        }
        codeword[..self.nroots].copy_from_slice(&rem[..self.nroots]);

        (0..self.symbols())
            .map(|t| codeword[self.position(t)])
            .collect()
    }

    fn bits_to_symbols(&self, block: &CodedBlock) -> (Vec<u8>, Vec<bool>) {
        let m = self.field.symbol_bits() as usize;
        (0..self.symbols())
            .map(|t| {
                let range = t * m..(t + 1) * m;
                (
                    block.bits.field(range.clone()) as u8,
                    block.is_erased(range),
                )
            })
            .unzip()
    }
}

impl BlockCodec for ReedSolomon {
    fn name(&self) -> &str {
        &self.name
    }

    fn coded_bits(&self) -> usize {
        self.symbols() * self.field.symbol_bits() as usize
    }

    fn payload_bits(&self) -> usize {
        self.data * self.field.symbol_bits() as usize
    }

    fn supports_erasures(&self) -> bool {
        true
    }

    fn decode(&self, block: &CodedBlock) -> CorrectedBlock {
        assert_eq!(
            block.len(),
            self.coded_bits(),
            "{} block must be {} bits",
            self.name,
            self.coded_bits()
        );
        let (symbols, erased) = self.bits_to_symbols(block);
        let zult = self.decode_symbols(&symbols, &erased);
        let payload = BitFrame::from(symbols_to_bits(
            &zult.data,
            self.field.symbol_bits() as usize,
        ));
        if zult.success {
            CorrectedBlock {
                payload,
                corrected_bits: zult.corrected_bits,
                success: true,
            }
        } else {
            CorrectedBlock::failed(payload)
        }
    }

    fn encode(&self, payload: &BitFrame) -> BitFrame {
        assert_eq!(
            payload.len(),
            self.payload_bits(),
            "{} payload must be {} bits",
            self.name,
            self.payload_bits()
        );
        let m = self.field.symbol_bits() as usize;
        let data: Vec<u8> = (0..self.data)
            .map(|i| payload.field(i * m..(i + 1) * m) as u8)
            .collect();
        BitFrame::from(symbols_to_bits(&self.encode_symbols(&data), m))
    }
}
