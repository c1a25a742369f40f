//! Bitmap-subset overlay: presents the child rows selected by a bitmap as
//! a dense `[0, popcount)` sequence. See SPEC_FULL.md §4.5.
//!
//! Unlike [`super::NullOverlay`] (which also wraps rank/select translation),
//! a selector's overlay size is independent of the child's size — this is
//! the layer a prior constraint's surviving rows become before the next
//! constraint runs against them. `selector_threshold_divisor` trades a
//! per-token `index_of_nth_set` call against materialising the full
//! forward lookup once, depending on how many tokens are being translated.

use super::{
    distinct_by_value, min_max_by_value, stable_sort_by_value, Chain, FilterOp, RangeOrBitVector,
    SearchValidation, SingleSearchResult,
};
use crate::bitvec::BitVector;
use crate::config::EngineConfig;
use crate::string_pool::StringPool;
use crate::token::{OrderedIndices, Token, TokenVec};
use crate::value::SqlValue;
use std::rc::Rc;

/// A bitmap selecting a subset of a child chain's rows.
///
/// `selector` is `Rc`-shared: a table typically applies the same filtered
/// row set to every column still in scope, so sibling columns' chains point
/// at the same bitmap rather than each owning a copy.
#[derive(Debug)]
pub struct SelectorOverlay {
    /// The wrapped chain.
    pub child: Box<Chain>,
    /// One bit per child row; overlay row `i` is the child row at the
    /// `i`-th set bit.
    pub selector: Rc<BitVector>,
}

impl SelectorOverlay {
    fn to_storage(&self, i: u32) -> u32 {
        self.selector.index_of_nth_set(i as usize) as u32
    }

    pub fn size(&self) -> u32 {
        self.selector.count_set_bits() as u32
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
        let mut out = BitVector::with_size(range.1 as usize);
        for i in range.0..range.1 {
            if self.child.single_search(pool, op, val, self.to_storage(i)) == SingleSearchResult::Match {
                out.set(i as usize, true);
            }
        }
        RangeOrBitVector::BitVector(out)
    }

    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        cfg: &EngineConfig,
    ) {
        let popcount = self.selector.count_set_bits() as u64;
        let divisor = cfg.selector_threshold_divisor as u64;
        if (indices.len() as u64).saturating_mul(divisor) < popcount {
            // Few tokens relative to the selector: select() each directly.
            indices.retain(|t| {
                self.child.single_search(pool, op, val, self.to_storage(t.index))
                    == SingleSearchResult::Match
            });
        } else {
            // Many tokens: pay for the forward lookup once.
            let lookup: Vec<u32> = self.selector.set_bit_indices().map(|i| i as u32).collect();
            indices.retain(|t| {
                self.child
                    .single_search(pool, op, val, lookup[t.index as usize])
                    == SingleSearchResult::Match
            });
        }
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

    fn make_overlay() -> SelectorOverlay {
        let mut selector = BitVector::with_size(10);
        for i in [1usize, 3, 4, 8] {
            selector.set(i, true);
        }
        SelectorOverlay {
            child: Box::new(Chain::Numeric(NumericStorage {
                data: NumericKind::I64(vec![10, 11, 12, 13, 14, 15, 16, 17, 18, 19]),
                is_sorted: true,
            })),
            selector: Rc::new(selector),
        }
    }

    #[test]
    fn get_slow_indirects_through_selector() {
        let ov = make_overlay();
        let pool = StringPool::new();
        assert_eq!(ov.get_slow(&pool, 0), SqlValue::Long(11));
        assert_eq!(ov.get_slow(&pool, 3), SqlValue::Long(18));
    }

    #[test]
    fn size_is_popcount() {
        let ov = make_overlay();
        assert_eq!(ov.size(), 4);
    }

    #[test]
    fn index_search_validated_sparse_path() {
        let ov = make_overlay();
        let pool = StringPool::new();
        let cfg = EngineConfig {
            selector_threshold_divisor: 1,
            ..EngineConfig::default()
        };
        let mut tv = TokenVec::identity_range(4);
        ov.index_search_validated(&pool, FilterOp::Gt, SqlValue::Long(13), &mut tv, &cfg);
        assert_eq!(tv.tokens.iter().map(|t| t.index).collect::<Vec<_>>(), vec![2, 3]);
    }
}
