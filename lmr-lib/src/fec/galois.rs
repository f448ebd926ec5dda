use std::sync::OnceLock;

/// Arithmetic over GF(2^m) using exponent and logarithm tables.
#[derive(Debug, Clone)]
pub struct GaloisField {
    m: u32,
    /// Number of non-zero elements, `2^m - 1`.
    order: usize,
    /// `exp[i] = alpha^i`, doubled in length so products never need a modulo.
    exp: Vec<u8>,
    log: Vec<usize>,
}

impl GaloisField {
    /// Build the field for symbol width `m` from a primitive polynomial given with its
    /// `x^m` term, e.g. `0x43` for `x^6 + x + 1`.
    ///
    /// # Panics
    /// If `m` is not in `2..=8` or `poly` is not primitive.
    pub fn new(m: u32, poly: u32) -> Self {
        assert!((2..=8).contains(&m), "symbol width must be 2..=8 bits");
        let order = (1usize << m) - 1;
        let mut exp = vec![0u8; order * 2];
        let mut log = vec![0usize; order + 1];
        let mut x: u32 = 1;
        for i in 0..order {
            exp[i] = x as u8;
            log[x as usize] = i;
            x <<= 1;
            if x & (1 << m) != 0 {
                x ^= poly;
            }
        }
        assert_eq!(x, 1, "polynomial {poly:#x} is not primitive");
        for i in order..order * 2 {
            exp[i] = exp[i - order];
        }
        Self { m, order, exp, log }
    }

    pub fn symbol_bits(&self) -> u32 {
        self.m
    }

    /// Number of non-zero elements, which is also the full code length.
    pub fn order(&self) -> usize {
        self.order
    }

    /// `alpha^power`, for any integer power.
    pub fn alpha(&self, power: i64) -> u8 {
        self.exp[power.rem_euclid(self.order as i64) as usize]
    }

    pub fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            return 0;
        }
        self.exp[self.log[a as usize] + self.log[b as usize]]
    }

    /// `a / b`.
    ///
    /// # Panics
    /// If `b` is zero.
    pub fn div(&self, a: u8, b: u8) -> u8 {
        assert!(b != 0, "division by zero in GF(2^{})", self.m);
        if a == 0 {
            return 0;
        }
        self.exp[self.log[a as usize] + self.order - self.log[b as usize]]
    }

    /// Evaluate a polynomial with coefficients lowest degree first.
    pub fn eval(&self, poly: &[u8], x: u8) -> u8 {
        poly.iter().rev().fold(0, |acc, &c| self.mul(acc, x) ^ c)
    }

    /// Multiply two polynomials, coefficients lowest degree first.
    pub fn poly_mul(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        if a.is_empty() || b.is_empty() {
            return Vec::default();
        }
        let mut zult = vec![0u8; a.len() + b.len() - 1];
        for (i, &ai) in a.iter().enumerate() {
            if ai == 0 {
                continue;
            }
            for (j, &bj) in b.iter().enumerate() {
                zult[i + j] ^= self.mul(ai, bj);
            }
        }
        zult
    }
}

/// GF(2^6) with primitive polynomial `x^6 + x + 1`, the field of the P25 hexbit
/// Reed-Solomon codes.
pub fn gf64() -> &'static GaloisField {
    static FIELD: OnceLock<GaloisField> = OnceLock::new();
    FIELD.get_or_init(|| GaloisField::new(6, 0x43))
}
