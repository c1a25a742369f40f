//! General permutation overlay: presents `child[arrangement[i]]` as overlay
//! row `i`, where `arrangement` may repeat storage rows or appear in any
//! order. See SPEC_FULL.md §4.5.
//!
//! When `monotonicity` is `Monotonic`, `arrangement` is known to visit
//! `child`'s rows in non-decreasing value order (this is how a materialised
//! sort order is represented) — `index_search_validated` and
//! `ordered_index_search_validated` exploit that to push a binary search
//! down to the child instead of scanning every surviving token.

use super::{
    distinct_by_value, min_max_by_value, stable_sort_by_value, Chain, FilterOp, RangeOrBitVector,
    SearchValidation, SingleSearchResult,
};
use crate::bitvec::BitVector;
use crate::config::EngineConfig;
use crate::string_pool::StringPool;
use crate::token::{Monotonicity, OrderedIndices, Token, TokenVec};
use crate::value::SqlValue;
use std::rc::Rc;

/// An arbitrary (possibly repeating, possibly unordered) row permutation
/// over a child chain. `arrangement` is `Rc`-shared for the same reason as
/// [`super::SelectorOverlay::selector`].
#[derive(Debug)]
pub struct ArrangementOverlay {
    /// The wrapped chain.
    pub child: Box<Chain>,
    /// Storage row visited by each overlay row.
    pub arrangement: Rc<Vec<u32>>,
    /// Whether `arrangement` visits `child` in non-decreasing value order.
    pub monotonicity: Monotonicity,
}

impl ArrangementOverlay {
    fn to_storage(&self, i: u32) -> u32 {
        self.arrangement[i as usize]
    }

    pub fn size(&self) -> u32 {
        self.arrangement.len() as u32
    }

    pub fn validate_search_constraints(&self, op: FilterOp, val: SqlValue) -> SearchValidation {
        self.child.validate_search_constraints(op, val)
    }

    pub fn single_search(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        row: u32,
    ) -> SingleSearchResult {
        self.child.single_search(pool, op, val, self.to_storage(row))
    }

    pub fn search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        range: (u32, u32),
    ) -> RangeOrBitVector {
        if matches!(self.monotonicity, Monotonicity::Monotonic) && op.supports_ordered_index_search() {
            let slice = &self.arrangement[range.0 as usize..range.1 as usize];
            let (lo, hi) = self
                .child
                .ordered_index_search_validated(pool, op, val, OrderedIndices::new(slice));
            return RangeOrBitVector::Range(range.0 + lo, range.0 + hi);
        }
        let mut bv = BitVector::with_size(range.1 as usize);
        for i in range.0..range.1 {
            if self.child.single_search(pool, op, val, self.to_storage(i)) == SingleSearchResult::Match {
                bv.set(i as usize, true);
            }
        }
        RangeOrBitVector::BitVector(bv)
    }

    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        cfg: &EngineConfig,
    ) {
        if matches!(self.monotonicity, Monotonicity::Monotonic)
            && op.supports_ordered_index_search()
            && !indices.is_empty()
        {
            let translated: Vec<u32> = indices.tokens.iter().map(|t| self.to_storage(t.index)).collect();
            let (lo, hi) = self
                .child
                .ordered_index_search_validated(pool, op, val, OrderedIndices::new(&translated));
            indices.tokens = indices.tokens[lo as usize..hi as usize].to_vec();
            return;
        }
        let _ = cfg;
        indices.retain(|t| {
            self.child.single_search(pool, op, val, self.to_storage(t.index)) == SingleSearchResult::Match
        });
    }

    pub fn ordered_index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        ordered: OrderedIndices,
    ) -> (u32, u32) {
        let translated: Vec<u32> = ordered.indices.iter().map(|&i| self.to_storage(i)).collect();
        self.child
            .ordered_index_search_validated(pool, op, val, OrderedIndices::new(&translated))
    }

    pub fn stable_sort(&self, pool: &StringPool, tokens: &mut Vec<Token>, desc: bool) {
        stable_sort_by_value(tokens, desc, |i| self.child.get_slow(pool, self.to_storage(i)));
    }

    pub fn distinct(&self, pool: &StringPool, indices: &mut TokenVec) {
        // Repeated storage rows are trivially equal-valued; filter those
        // out before falling back to the general value-based dedup.
        let mut seen_storage: rustc_hash::FxHashSet<u32> = rustc_hash::FxHashSet::default();
        indices.retain(|t| seen_storage.insert(self.to_storage(t.index)));
        distinct_by_value(indices, |i| self.child.get_slow(pool, self.to_storage(i)));
    }

    pub fn min_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.child.get_slow(pool, self.to_storage(i)), false)
    }

    pub fn max_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.child.get_slow(pool, self.to_storage(i)), true)
    }

    pub fn get_slow<'p>(&self, pool: &'p StringPool, index: u32) -> SqlValue<'p> {
        self.child.get_slow(pool, self.to_storage(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::storage::{NumericKind, NumericStorage};

    fn make_monotonic() -> ArrangementOverlay {
        // child values: [30, 10, 20, 0] ; arrangement visits in ascending order
        ArrangementOverlay {
            child: Box::new(Chain::Numeric(NumericStorage {
                data: NumericKind::I64(vec![30, 10, 20, 0]),
                is_sorted: false,
            })),
            arrangement: Rc::new(vec![3, 1, 2, 0]),
            monotonicity: Monotonicity::Monotonic,
        }
    }

    #[test]
    fn get_slow_follows_arrangement() {
        let ov = make_monotonic();
        let pool = StringPool::new();
        assert_eq!(ov.get_slow(&pool, 0), SqlValue::Long(0));
        assert_eq!(ov.get_slow(&pool, 3), SqlValue::Long(30));
    }

    #[test]
    fn monotonic_search_pushes_down_as_range() {
        let ov = make_monotonic();
        let pool = StringPool::new();
        match ov.search_validated(&pool, FilterOp::Eq, SqlValue::Long(20), (0, 4)) {
            RangeOrBitVector::Range(s, e) => assert_eq!((s, e), (2, 3)),
            _ => panic!(),
        }
    }

    #[test]
    fn distinct_drops_repeated_storage_rows() {
        let ov = ArrangementOverlay {
            child: Box::new(Chain::Numeric(NumericStorage {
                data: NumericKind::I64(vec![5, 7]),
                is_sorted: false,
            })),
            arrangement: Rc::new(vec![0, 1, 0, 1]),
            monotonicity: Monotonicity::NonMonotonic,
        };
        let pool = StringPool::new();
        let mut tv = TokenVec::identity_range(4);
        ov.distinct(&pool, &mut tv);
        assert_eq!(tv.len(), 2);
    }
}
