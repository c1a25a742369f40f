//! Dense null overlay: same contract as [`super::NullOverlay`], but used
//! when nulls are common enough that a plain per-row check is cheaper than
//! rank/select translation and the child is addressed 1:1 with the overlay
//! (no compaction — `child.size() == is_valid.len()`, invalid rows simply
//! hold an unspecified child value that must never be read).
//! See SPEC_FULL.md §4.4.

use super::{
    distinct_by_value, min_max_by_value, stable_sort_by_value, Chain, FilterOp, RangeOrBitVector,
    SearchValidation, SingleSearchResult,
};
use crate::bitvec::BitVector;
use crate::config::EngineConfig;
use crate::string_pool::StringPool;
use crate::token::{OrderedIndices, Token, TokenVec};
use crate::value::SqlValue;

/// Like [`super::NullOverlay`], but the child is addressed directly by
/// overlay index (no rank/select): `child.get_slow(pool, i)` is only valid
/// when `is_valid.get(i)`.
#[derive(Debug)]
pub struct DenseNullOverlay {
    /// The wrapped chain, addressed 1:1 with overlay rows.
    pub child: Box<Chain>,
    /// One bit per row; set means the row is present.
    pub is_valid: BitVector,
}

impl DenseNullOverlay {
    pub fn size(&self) -> u32 {
        self.is_valid.len() as u32
    }

    pub fn validate_search_constraints(&self, op: FilterOp, val: SqlValue) -> SearchValidation {
        match op {
            FilterOp::IsNull | FilterOp::IsNotNull => SearchValidation::Ok,
            _ => self.child.validate_search_constraints(op, val),
        }
    }

    pub fn single_search(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        row: u32,
    ) -> SingleSearchResult {
        let valid = self.is_valid.get(row as usize);
        match op {
            FilterOp::IsNull => {
                return if valid {
                    SingleSearchResult::NoMatch
                } else {
                    SingleSearchResult::Match
                }
            }
            FilterOp::IsNotNull => {
                return if valid {
                    SingleSearchResult::Match
                } else {
                    SingleSearchResult::NoMatch
                }
            }
            _ => {}
        }
        if !valid {
            return SingleSearchResult::NoMatch;
        }
        self.child.single_search(pool, op, val, row)
    }

    pub fn search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        range: (u32, u32),
    ) -> RangeOrBitVector {
        match op {
            FilterOp::IsNull => {
                let mut bv = BitVector::with_size(range.1 as usize);
                for i in range.0..range.1 {
                    if !self.is_valid.get(i as usize) {
                        bv.set(i as usize, true);
                    }
                }
                return RangeOrBitVector::BitVector(bv);
            }
            FilterOp::IsNotNull => {
                let mut bv = BitVector::with_size(range.1 as usize);
                for i in range.0..range.1 {
                    if self.is_valid.get(i as usize) {
                        bv.set(i as usize, true);
                    }
                }
                return RangeOrBitVector::BitVector(bv);
            }
            _ => {}
        }
        let child_result = self.child.search_validated(pool, op, val, range);
        let mut out = child_result.into_bitvector(range.1 as usize);
        for i in range.0..range.1 {
            if !self.is_valid.get(i as usize) {
                out.set(i as usize, false);
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
        match op {
            FilterOp::IsNull => {
                indices.retain(|t| !self.is_valid.get(t.index as usize));
                return;
            }
            FilterOp::IsNotNull => {
                indices.retain(|t| self.is_valid.get(t.index as usize));
                return;
            }
            _ => {}
        }
        let valid_before: Vec<Token> = indices
            .tokens
            .iter()
            .copied()
            .filter(|t| self.is_valid.get(t.index as usize))
            .collect();
        let mut child_tokens = TokenVec {
            tokens: valid_before,
            monotonicity: indices.monotonicity,
        };
        self.child
            .index_search_validated(pool, op, val, &mut child_tokens, cfg);
        indices.tokens = child_tokens.tokens;
        indices.monotonicity = child_tokens.monotonicity;
    }

    pub fn ordered_index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        ordered: OrderedIndices,
    ) -> (u32, u32) {
        if matches!(op, FilterOp::IsNull | FilterOp::IsNotNull) {
            let null_run = ordered
                .indices
                .iter()
                .take_while(|&&i| !self.is_valid.get(i as usize))
                .count() as u32;
            return if op == FilterOp::IsNull {
                (0, null_run)
            } else {
                (null_run, ordered.indices.len() as u32)
            };
        }
        self.child.ordered_index_search_validated(pool, op, val, ordered)
    }

    fn value_of<'p>(&self, pool: &'p StringPool, i: u32) -> SqlValue<'p> {
        if self.is_valid.get(i as usize) {
            self.child.get_slow(pool, i)
        } else {
            SqlValue::Null
        }
    }

    pub fn stable_sort(&self, pool: &StringPool, tokens: &mut Vec<Token>, desc: bool) {
        stable_sort_by_value(tokens, desc, |i| self.value_of(pool, i));
    }

    pub fn distinct(&self, pool: &StringPool, indices: &mut TokenVec) {
        distinct_by_value(indices, |i| self.value_of(pool, i));
    }

    pub fn min_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.value_of(pool, i), false)
    }

    pub fn max_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.value_of(pool, i), true)
    }

    pub fn get_slow<'p>(&self, pool: &'p StringPool, index: u32) -> SqlValue<'p> {
        self.value_of(pool, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::storage::{NumericKind, NumericStorage};

    fn make_overlay() -> DenseNullOverlay {
        let mut is_valid = BitVector::with_size(5);
        for i in [1usize, 3, 4] {
            is_valid.set(i, true);
        }
        DenseNullOverlay {
            child: Box::new(Chain::Numeric(NumericStorage {
                data: NumericKind::I64(vec![0, 10, 0, 20, 30]),
                is_sorted: false,
            })),
            is_valid,
        }
    }

    #[test]
    fn is_not_null_search_validated() {
        let ov = make_overlay();
        let pool = StringPool::new();
        match ov.search_validated(&pool, FilterOp::IsNotNull, SqlValue::Null, (0, 5)) {
            RangeOrBitVector::BitVector(bv) => {
                assert_eq!(bv.set_bit_indices().collect::<Vec<_>>(), vec![1, 3, 4])
            }
            _ => panic!(),
        }
    }

    #[test]
    fn value_round_trip() {
        let ov = make_overlay();
        let pool = StringPool::new();
        assert!(ov.get_slow(&pool, 2).is_null());
        assert_eq!(ov.get_slow(&pool, 3), SqlValue::Long(20));
    }
}
