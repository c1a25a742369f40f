//! Sparse null overlay: most rows are valid, a scattered few are null.
//! See SPEC_FULL.md §4.3.

use super::{
    distinct_by_value, min_max_by_value, stable_sort_by_value, Chain, FilterOp, RangeOrBitVector,
    SearchValidation, SingleSearchResult,
};
use crate::bitvec::BitVector;
use crate::config::EngineConfig;
use crate::string_pool::StringPool;
use crate::token::{OrderedIndices, Token, TokenVec};
use crate::value::SqlValue;

/// Wraps a child chain, inserting null rows at the positions where
/// `is_valid` is clear. `is_valid.count_set_bits() == child.size()`; overlay
/// row `i` maps to storage row `is_valid.rank(i)` when `is_valid.get(i)`.
#[derive(Debug)]
pub struct NullOverlay {
    /// The wrapped chain, addressed in "storage space" (dense, no nulls).
    pub child: Box<Chain>,
    /// One bit per overlay row; set means the row is present in `child`.
    pub is_valid: BitVector,
}

impl NullOverlay {
    fn to_storage(&self, overlay_index: u32) -> u32 {
        debug_assert!(self.is_valid.get(overlay_index as usize));
        self.is_valid.rank(overlay_index as usize) as u32
    }

    fn to_overlay(&self, storage_index: u32) -> u32 {
        self.is_valid.index_of_nth_set(storage_index as usize) as u32
    }

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
        self.child.single_search(pool, op, val, self.to_storage(row))
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
        let storage_start = self.is_valid.rank(range.0 as usize) as u32;
        let storage_end = self.is_valid.rank(range.1 as usize) as u32;
        let child_result = self
            .child
            .search_validated(pool, op, val, (storage_start, storage_end));
        let storage_bv = child_result.into_bitvector(storage_end as usize);
        let mut out = BitVector::with_size(range.1 as usize);
        for s in storage_bv.set_bit_indices() {
            if s as u32 >= storage_start {
                out.set(self.to_overlay(s as u32) as usize, true);
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
        let mut child_tokens = TokenVec {
            tokens: indices
                .tokens
                .iter()
                .filter(|t| self.is_valid.get(t.index as usize))
                .map(|t| Token {
                    index: self.to_storage(t.index),
                    payload: t.payload,
                })
                .collect(),
            monotonicity: indices.monotonicity,
        };
        self.child
            .index_search_validated(pool, op, val, &mut child_tokens, cfg);
        indices.tokens = child_tokens
            .tokens
            .into_iter()
            .map(|t| Token {
                index: self.to_overlay(t.index),
                payload: t.payload,
            })
            .collect();
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
        let translated: Vec<u32> = ordered
            .indices
            .iter()
            .map(|&i| self.to_storage(i))
            .collect();
        self.child
            .ordered_index_search_validated(pool, op, val, OrderedIndices::new(&translated))
    }

    fn value_of<'p>(&self, pool: &'p StringPool, i: u32) -> SqlValue<'p> {
        if self.is_valid.get(i as usize) {
            self.child.get_slow(pool, self.to_storage(i))
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

    fn make_overlay() -> NullOverlay {
        // overlay rows: [null, 10, null, 20, 30]
        let mut is_valid = BitVector::with_size(5);
        for i in [1usize, 3, 4] {
            is_valid.set(i, true);
        }
        NullOverlay {
            child: Box::new(Chain::Numeric(NumericStorage {
                data: NumericKind::I64(vec![10, 20, 30]),
                is_sorted: true,
            })),
            is_valid,
        }
    }

    #[test]
    fn is_null_single_search() {
        let ov = make_overlay();
        let pool = StringPool::new();
        assert_eq!(
            ov.single_search(&pool, FilterOp::IsNull, SqlValue::Null, 0),
            SingleSearchResult::Match
        );
        assert_eq!(
            ov.single_search(&pool, FilterOp::IsNull, SqlValue::Null, 1),
            SingleSearchResult::NoMatch
        );
    }

    #[test]
    fn eq_translates_through_rank() {
        let ov = make_overlay();
        let pool = StringPool::new();
        assert_eq!(
            ov.single_search(&pool, FilterOp::Eq, SqlValue::Long(20), 3),
            SingleSearchResult::Match
        );
        assert_eq!(
            ov.single_search(&pool, FilterOp::Eq, SqlValue::Long(20), 2),
            SingleSearchResult::NoMatch
        );
    }

    #[test]
    fn get_slow_returns_null_for_invalid_rows() {
        let ov = make_overlay();
        let pool = StringPool::new();
        assert!(ov.get_slow(&pool, 0).is_null());
        assert_eq!(ov.get_slow(&pool, 1), SqlValue::Long(10));
    }
}
