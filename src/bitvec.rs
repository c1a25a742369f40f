use fixedbitset::FixedBitSet;

/// A dense bit set with the rank/select operations the column layers need.
///
/// This is the crate's single concrete implementation of the "BitVector"
/// collaborator SPEC_FULL.md treats as external: everything above this
/// module only ever calls the methods below, never reaches into
/// `fixedbitset` directly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitVector {
    bits: FixedBitSet,
}

impl BitVector {
    /// A bitvector of `len` bits, all clear.
    pub fn with_size(len: usize) -> BitVector {
        BitVector {
            bits: FixedBitSet::with_capacity(len),
        }
    }

    /// A bitvector of `len` bits, all set to `value`.
    pub fn filled(len: usize, value: bool) -> BitVector {
        let mut bv = BitVector::with_size(len);
        if value {
            bv.bits.set_range(.., true);
        }
        bv
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True if there are no bits.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Read bit `i`. Panics if `i >= len()`.
    pub fn get(&self, i: usize) -> bool {
        self.bits.contains(i)
    }

    /// Set bit `i` to `value`.
    pub fn set(&mut self, i: usize, value: bool) {
        self.bits.set(i, value);
    }

    /// Grow or shrink to `new_len`, filling any newly-added bits with
    /// `value`. Mirrors the host's `BitVector::Resize`.
    pub fn resize(&mut self, new_len: usize, value: bool) {
        let old_len = self.bits.len();
        self.bits.grow(new_len);
        if value && new_len > old_len {
            self.bits.set_range(old_len..new_len, true);
        }
    }

    /// Count of set bits strictly below `i` (i.e. in `[0, i)`).
    ///
    /// This is `rank(i)` in the glossary sense.
    pub fn rank(&self, i: usize) -> usize {
        self.count_set_bits_in_range(0, i)
    }

    /// Count of set bits in `[start, end)`.
    pub fn count_set_bits_in_range(&self, start: usize, end: usize) -> usize {
        if start >= end {
            return 0;
        }
        self.bits.count_ones(start..end)
    }

    /// Total count of set bits.
    pub fn count_set_bits(&self) -> usize {
        self.bits.count_ones(..)
    }

    /// Position of the `n`-th set bit (0-indexed), i.e. `select(n)`.
    /// Panics if there is no such bit.
    pub fn index_of_nth_set(&self, n: usize) -> usize {
        self.bits
            .ones()
            .nth(n)
            .expect("index_of_nth_set: fewer than n+1 set bits")
    }

    /// Iterate the positions of all set bits in ascending order.
    pub fn set_bit_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.ones()
    }

    /// Iterate the positions of all set bits within `[start, end)`.
    pub fn set_bit_indices_in_range(&self, start: usize, end: usize) -> Vec<u32> {
        self.bits
            .ones()
            .skip_while(move |&i| i < start)
            .take_while(move |&i| i < end)
            .map(|i| i as u32)
            .collect()
    }

    /// Intersect with another bitvector of the same length (bitwise AND).
    pub fn intersect(&mut self, other: &BitVector) {
        self.bits.intersect_with(&other.bits);
    }

    /// Complement bits in `[start, end)` in place, leaving bits outside that
    /// range untouched. Used by `Ne` = "complement of `Eq`'s range".
    pub fn toggle_range(&mut self, start: usize, end: usize) {
        for i in start..end {
            let cur = self.bits.contains(i);
            self.bits.set(i, !cur);
        }
    }

    /// Build a bitvector of length `len` with `[0, range_end)` set and the
    /// rest clear, except that `[eq_start, eq_end)` (a sub-range of
    /// `[0, range_end)`) is cleared. Used to materialise `Ne` on a sorted
    /// column from the `Eq` range: everything in the search range except
    /// the equal sub-range.
    pub fn range_minus_subrange(len: usize, range: (usize, usize), hole: (usize, usize)) -> BitVector {
        let mut bv = BitVector::with_size(len);
        let (rs, re) = range;
        bv.bits.set_range(rs..re, true);
        let (hs, he) = hole;
        if hs < he {
            bv.bits.set_range(hs..he, false);
        }
        bv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_and_select_roundtrip() {
        let mut bv = BitVector::with_size(10);
        for i in [0usize, 2, 3, 6, 7, 8] {
            bv.set(i, true);
        }
        assert_eq!(bv.rank(0), 0);
        assert_eq!(bv.rank(3), 2);
        assert_eq!(bv.rank(10), 6);
        assert_eq!(bv.index_of_nth_set(0), 0);
        assert_eq!(bv.index_of_nth_set(1), 2);
        assert_eq!(bv.index_of_nth_set(5), 8);
    }

    #[test]
    fn range_minus_subrange_builds_complement() {
        let bv = BitVector::range_minus_subrange(10, (2, 8), (4, 6));
        let set: Vec<usize> = bv.set_bit_indices().collect();
        assert_eq!(set, vec![2, 3, 6, 7]);
    }
}
