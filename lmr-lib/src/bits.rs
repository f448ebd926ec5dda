use std::fmt;
use std::ops::Range;

/// An immutable, fixed-length sequence of bits.
///
/// Bits are stored one per element in transmission order. Multi-bit fields are read most
/// significant bit first, which is how all of the supported air interfaces define them.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitFrame {
    bits: Box<[bool]>,
}

impl BitFrame {
    /// Create a frame of `len` zero bits.
    pub fn zeros(len: usize) -> Self {
        Self {
            bits: vec![false; len].into_boxed_slice(),
        }
    }

    /// Create a frame from the low `len` bits of `value`, most significant first.
    ///
    /// # Panics
    /// If `len > 64`.
    pub fn from_u64(value: u64, len: usize) -> Self {
        assert!(len <= 64, "at most 64 bits fit in a u64");
        (0..len).map(|i| (value >> (len - 1 - i)) & 1 == 1).collect()
    }

    /// Create a frame from the first `len` bits of `bytes`, most significant bit first.
    ///
    /// # Panics
    /// If `bytes` holds fewer than `len` bits.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        assert!(bytes.len() * 8 >= len, "not enough bytes for {len} bits");
        (0..len)
            .map(|i| (bytes[i / 8] >> (7 - (i % 8))) & 1 == 1)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<bool> {
        self.bits.get(idx).copied()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().copied()
    }

    /// Copy out a sub-range of this frame.
    ///
    /// # Panics
    /// If the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Self {
        self.bits[range].iter().copied().collect()
    }

    /// Read the bits in `range` as an unsigned integer, most significant bit first.
    ///
    /// # Panics
    /// If the range is out of bounds or wider than 64 bits.
    pub fn field(&self, range: Range<usize>) -> u64 {
        assert!(range.len() <= 64, "field wider than 64 bits");
        self.bits[range]
            .iter()
            .fold(0u64, |acc, &b| (acc << 1) | u64::from(b))
    }

    /// [BitFrame::field] truncated to a `u32`, for fields known to be at most 32 bits.
    pub fn field_u32(&self, range: Range<usize>) -> u32 {
        debug_assert!(range.len() <= 32);
        self.field(range) as u32
    }

    pub fn flag(&self, idx: usize) -> bool {
        self.bits[idx]
    }

    /// Number of bit positions where `self` and `other` differ. Extra bits in the longer
    /// frame are not counted.
    pub fn distance(&self, other: &BitFrame) -> usize {
        self.iter().zip(other.iter()).filter(|(a, b)| a != b).count()
    }

    /// Pack into bytes, most significant bit first, zero padding the final byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut zult = vec![0u8; self.bits.len().div_ceil(8)];
        for (i, _) in self.bits.iter().enumerate().filter(|(_, b)| **b) {
            zult[i / 8] |= 0x80 >> (i % 8);
        }
        zult
    }

    /// Lower case hex of the packed bytes, used for diagnostics.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Return a copy with the bit at `idx` inverted.
    pub fn with_flipped(&self, idx: usize) -> Self {
        let mut bits = self.bits.to_vec();
        bits[idx] = !bits[idx];
        Self {
            bits: bits.into_boxed_slice(),
        }
    }
}

impl FromIterator<bool> for BitFrame {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        Self {
            bits: iter.into_iter().collect::<Vec<bool>>().into_boxed_slice(),
        }
    }
}

impl From<Vec<bool>> for BitFrame {
    fn from(bits: Vec<bool>) -> Self {
        Self {
            bits: bits.into_boxed_slice(),
        }
    }
}

impl From<&[bool]> for BitFrame {
    fn from(bits: &[bool]) -> Self {
        bits.iter().copied().collect()
    }
}

impl fmt::Debug for BitFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitFrame({} bits, 0x{})", self.len(), self.to_hex())
    }
}

impl fmt::Display for BitFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.iter() {
            f.write_str(if b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Parse a string of ASCII `0`/`1` characters, ignoring whitespace. Any other character
/// yields `None`.
pub fn parse_bits(s: &str) -> Option<BitFrame> {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '0' => Some(false),
            '1' => Some(true),
            _ => None,
        })
        .collect::<Option<Vec<bool>>>()
        .map(BitFrame::from)
}

/// Pack a sequence of `m`-bit symbols into bits, most significant bit of each symbol first.
pub(crate) fn symbols_to_bits(symbols: &[u8], m: usize) -> Vec<bool> {
    symbols
        .iter()
        .flat_map(|&s| (0..m).map(move |i| (s >> (m - 1 - i)) & 1 == 1))
        .collect()
}
