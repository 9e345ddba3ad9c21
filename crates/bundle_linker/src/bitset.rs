//! Compact per-entry-point membership sets.
//!
//! `unused_finder::graph::UsedTag` tracks a *fixed* three-bit membership
//! (entry/test/ignored) per file with `bitflags!`.
//! Here the bit count is the number of entry points, decided at link time,
//! so we can't use a `bitflags!`-generated type. Per spec.md §9's
//! REDESIGN FLAGS note this is instead a contiguous word buffer compared by
//! raw equality and unioned word-at-a-time.

use std::hash::{Hash, Hasher};

/// A set of entry-point bit positions, backed by `u64` words.
#[derive(Debug, Clone)]
pub struct BitSet {
    words: Vec<u64>,
    bits: usize,
}

impl BitSet {
    pub fn new(bits: usize) -> Self {
        let words = (bits + 63) / 64;
        Self {
            words: vec![0u64; words.max(1)],
            bits,
        }
    }

    pub fn bit_count(&self) -> usize {
        self.bits
    }

    #[inline]
    pub fn set(&mut self, bit: usize) {
        debug_assert!(bit < self.bits, "bit {bit} out of range for {} bits", self.bits);
        self.words[bit / 64] |= 1u64 << (bit % 64);
    }

    #[inline]
    pub fn get(&self, bit: usize) -> bool {
        debug_assert!(bit < self.bits, "bit {bit} out of range for {} bits", self.bits);
        (self.words[bit / 64] >> (bit % 64)) & 1 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Word-at-a-time OR. Returns true if this changed the set (so callers
    /// can short-circuit propagation once a fixpoint is reached).
    pub fn union_with(&mut self, other: &BitSet) -> bool {
        debug_assert_eq!(self.words.len(), other.words.len());
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            let merged = *a | *b;
            if merged != *a {
                changed = true;
            }
            *a = merged;
        }
        changed
    }

    pub fn iter_set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bits).filter(move |b| self.get(*b))
    }

    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Grows this set to `new_bits`, preserving every existing bit and
    /// zero-filling the rest. Used when the classifier discovers a new
    /// dynamic entry point (spec.md §4.1) after some `BitSet`s have already
    /// been allocated at the old entry-point count.
    pub fn grow(&mut self, new_bits: usize) {
        debug_assert!(new_bits >= self.bits, "BitSet::grow cannot shrink");
        self.bits = new_bits;
        let words_needed = (new_bits + 63) / 64;
        self.words.resize(words_needed.max(1), 0);
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits && self.words == other.words
    }
}
impl Eq for BitSet {}

impl Hash for BitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
        self.words.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn union_reports_change_and_is_idempotent() {
        let mut a = BitSet::new(130);
        let mut b = BitSet::new(130);
        b.set(5);
        b.set(129);
        assert!(a.union_with(&b));
        assert!(a.get(5));
        assert!(a.get(129));
        // unioning again makes no further change
        assert!(!a.union_with(&b));
    }

    #[test]
    fn grow_preserves_existing_bits_and_zero_fills_new_ones() {
        let mut a = BitSet::new(4);
        a.set(1);
        a.set(3);
        a.grow(130);
        assert_eq!(a.bit_count(), 130);
        assert!(a.get(1));
        assert!(a.get(3));
        assert!(!a.get(2));
        assert!(!a.get(129));
        a.set(129);
        assert!(a.get(129));
    }

    #[test]
    fn equal_signatures_compare_equal() {
        let mut a = BitSet::new(8);
        let mut b = BitSet::new(8);
        a.set(3);
        b.set(3);
        assert_eq!(a, b);
        b.set(4);
        assert_ne!(a, b);
    }
}
