//! Growable null bitmap
//!
//! One bit per cell marks a missing value. The bitmap has a logical length
//! that only grows through [`Bitmap::set`] and [`Bitmap::append`]; reading
//! past it always yields `false` and never allocates. Equality and hashing
//! look at the bits only, so bitmaps that read the same compare equal
//! whatever their length.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Bits per backing word
const WORD_BITS: usize = 64;

/// Backing storage grows by this many words at a time
const PAGE_WORDS: usize = 4;

/// Growable, positionally addressable "missing" flags
#[derive(Clone, Default)]
pub struct Bitmap {
    /// Backing words, LSB first; always a whole number of pages
    words: Vec<u64>,

    /// Logical length in bits
    len: usize,
}

impl Bitmap {
    /// Create an empty bitmap
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bitmap of length `n` with every bit set
    pub fn fill(n: usize) -> Self {
        let mut bits = Self::new();
        if n == 0 {
            return bits;
        }
        bits.reserve_bits(n);
        let full = n / WORD_BITS;
        for w in &mut bits.words[..full] {
            *w = u64::MAX;
        }
        let rem = n % WORD_BITS;
        if rem != 0 {
            bits.words[full] = (1u64 << rem) - 1;
        }
        bits.len = n;
        bits
    }

    /// Logical length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the logical length is zero
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get bit `i`; always false beyond the logical length
    #[inline]
    pub fn bit(&self, i: usize) -> bool {
        if i >= self.len {
            return false;
        }
        (self.words[i / WORD_BITS] >> (i % WORD_BITS)) & 1 == 1
    }

    /// Set bit `i`, growing the logical length to `i + 1` if needed
    ///
    /// Clearing a bit past the logical length leaves the bitmap unchanged.
    pub fn set(&mut self, i: usize, value: bool) {
        if i >= self.len {
            if !value {
                return;
            }
            self.reserve_bits(i + 1);
            self.len = i + 1;
        }
        let mask = 1u64 << (i % WORD_BITS);
        if value {
            self.words[i / WORD_BITS] |= mask;
        } else {
            self.words[i / WORD_BITS] &= !mask;
        }
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Concatenate `tail` at position `at`, which must equal the current length
    pub fn append(&self, tail: &Bitmap, at: usize) -> Result<Bitmap> {
        if at != self.len {
            return Err(Error::BitmapRange { at, len: self.len });
        }
        let mut out = self.clone();
        if tail.len == 0 {
            return Ok(out);
        }
        let total = at + tail.len;
        out.reserve_bits(total);
        let shift = at % WORD_BITS;
        let base = at / WORD_BITS;
        let used = tail.len.div_ceil(WORD_BITS);
        for (k, &w) in tail.words[..used].iter().enumerate() {
            if w == 0 {
                continue;
            }
            out.words[base + k] |= w << shift;
            if shift != 0 && base + k + 1 < out.words.len() {
                out.words[base + k + 1] |= w >> (WORD_BITS - shift);
            }
        }
        out.len = total;
        Ok(out)
    }

    /// Independent copy of bits `lo..min(hi, len)`
    pub fn slice(&self, lo: usize, hi: usize) -> Bitmap {
        let hi = hi.min(self.len);
        let mut out = Bitmap::new();
        if lo >= hi {
            return out;
        }
        out.reserve_bits(hi - lo);
        out.len = hi - lo;
        for i in lo..hi {
            if self.bit(i) {
                let j = i - lo;
                out.words[j / WORD_BITS] |= 1u64 << (j % WORD_BITS);
            }
        }
        out
    }

    /// Ungrouped `0`/`1` rendering of the logical bits
    pub fn repr(&self) -> String {
        (0..self.len).map(|i| if self.bit(i) { '1' } else { '0' }).collect()
    }

    /// Backing words up to the last non-zero one
    fn significant_words(&self) -> &[u64] {
        let used = self.words.iter().rposition(|&w| w != 0).map_or(0, |k| k + 1);
        &self.words[..used]
    }

    fn reserve_bits(&mut self, bits: usize) {
        let words = bits.div_ceil(WORD_BITS);
        if words > self.words.len() {
            let pages = words.div_ceil(PAGE_WORDS);
            self.words.resize(pages * PAGE_WORDS, 0);
        }
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.significant_words() == other.significant_words()
    }
}

impl Eq for Bitmap {}

impl Hash for Bitmap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

/// Bits grouped by 8 and separated by `.`
impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            if i != 0 && i % 8 == 0 {
                f.write_str(".")?;
            }
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap[{}]({})", self.len, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Bitmap of length `bits.len()` holding `bits`
    fn bools(bits: &[bool]) -> Bitmap {
        let mut b = Bitmap::fill(bits.len());
        for (i, &v) in bits.iter().enumerate() {
            b.set(i, v);
        }
        b
    }

    #[test]
    fn test_fill_and_set() {
        let mut b = Bitmap::fill(31);
        assert!(b.bit(0));
        b.set(0, false);
        assert!(!b.bit(0));
        assert_eq!(b.len(), 31);
        assert_eq!(b.repr(), format!("0{}", "1".repeat(30)));
        assert!(!b.bit(31));
        assert!(!b.bit(1064));
    }

    #[test]
    fn test_set_grows_length() {
        let mut b = Bitmap::new();
        assert_eq!(b.len(), 0);
        b.set(128, true);
        assert_eq!(b.len(), 129);
        b.set(128, false);
        assert_eq!(b.len(), 129);
        assert!(!b.bit(128));
        b.set(255, false);
        assert_eq!(b.len(), 129);
        assert_eq!(b.count_ones(), 0);
    }

    #[test]
    fn test_clear_past_end_keeps_length() {
        let mut b = Bitmap::new();
        b.set(255, false);
        assert_eq!(b.len(), 0);
        let mut a = Bitmap::new();
        a.set(0, true);
        a.set(256, true);
        a.set(256, false);
        a.set(300, false);
        assert_eq!(a.len(), 257);
        assert_eq!(a.count_ones(), 1);
    }

    #[test]
    fn test_equality_ignores_length() {
        let mut cleared = Bitmap::new();
        cleared.set(70, true);
        cleared.set(70, false);
        assert_eq!(cleared.len(), 71);
        assert_eq!(cleared, Bitmap::new());

        let mut a = Bitmap::fill(3);
        a.set(1, false);
        let mut b = Bitmap::new();
        b.set(2, true);
        b.set(0, true);
        assert_eq!(a, b);
        b.set(5, true);
        assert_ne!(a, b);
    }

    #[test]
    fn test_append_contiguous() {
        let z = Bitmap::fill(1);
        let mut b = Bitmap::fill(31);
        b.set(0, false);
        let c = z.append(&b, 1).unwrap();
        assert_eq!(c.len(), 32);
        assert_eq!(c.repr(), format!("10{}", "1".repeat(30)));

        let d = Bitmap::fill(128).append(&Bitmap::fill(120), 128).unwrap();
        assert_eq!(d.len(), 248);
        let d = d.append(&Bitmap::fill(67), 248).unwrap();
        assert_eq!(d.len(), 315);
        assert_eq!(d.count_ones(), 315);
    }

    #[test]
    fn test_append_non_contiguous_fails() {
        let b = Bitmap::fill(34);
        assert!(matches!(
            b.append(&Bitmap::new(), 33),
            Err(Error::BitmapRange { at: 33, len: 34 })
        ));
        assert!(Bitmap::new().append(&Bitmap::fill(3), 127).is_err());
    }

    #[test]
    fn test_display_groups_by_eight() {
        let b = bools(&[false; 128]).append(&Bitmap::fill(3), 128).unwrap();
        let plain = format!("{}111", "0".repeat(128));
        let mut grouped = String::new();
        for (i, c) in plain.chars().enumerate() {
            if i != 0 && i % 8 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        assert_eq!(b.to_string(), grouped);
        assert_eq!(b.repr(), plain);
    }

    #[test]
    fn test_slice() {
        let mut b = Bitmap::fill(3);
        b = Bitmap::fill(1).append(&b, 1).unwrap();
        b.set(200, true);
        let q = b.slice(1, 4);
        assert_eq!(q.len(), 3);
        assert_eq!(q.repr(), "111");
        let q = b.slice(150, 1000);
        assert_eq!(q.len(), 51);
        assert!(q.bit(50));
        assert_eq!(b.slice(300, 400).len(), 0);
    }

    proptest! {
        #[test]
        fn prop_fill_bits(n in 0usize..1000) {
            let b = Bitmap::fill(n);
            prop_assert_eq!(b.len(), n);
            for i in 0..n + 70 {
                prop_assert_eq!(b.bit(i), i < n);
            }
        }

        #[test]
        fn prop_append_preserves_bits(
            a in proptest::collection::vec(any::<bool>(), 0..200),
            t in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            let left = bools(&a);
            let tail = bools(&t);
            let joined = left.append(&tail, a.len()).unwrap();
            prop_assert_eq!(joined.len(), a.len() + t.len());
            for (i, &v) in a.iter().chain(t.iter()).enumerate() {
                prop_assert_eq!(joined.bit(i), v);
            }
        }
    }
}
