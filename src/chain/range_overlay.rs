//! Contiguous window overlay: presents `child[offset..offset+size)` as rows
//! `[0, size)`. See SPEC_FULL.md §4.5.

use super::{
    distinct_by_value, min_max_by_value, stable_sort_by_value, Chain, FilterOp, RangeOrBitVector,
    SearchValidation, SingleSearchResult,
};
use crate::bitvec::BitVector;
use crate::config::EngineConfig;
use crate::string_pool::StringPool;
use crate::token::{OrderedIndices, Token, TokenVec};
use crate::value::SqlValue;

/// A fixed window into a child chain. Pure index translation: no rows are
/// hidden or reordered within the window.
#[derive(Debug)]
pub struct RangeOverlay {
    /// The wrapped chain.
    pub child: Box<Chain>,
    /// First child row included in the window.
    pub offset: u32,
    /// Number of rows in the window.
    pub size: u32,
}

impl RangeOverlay {
    fn to_storage(&self, i: u32) -> u32 {
        i + self.offset
    }

    pub fn size(&self) -> u32 {
        self.size
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
        let storage_range = (self.to_storage(range.0), self.to_storage(range.1));
        match self.child.search_validated(pool, op, val, storage_range) {
            RangeOrBitVector::Range(s, e) => {
                RangeOrBitVector::Range(s - self.offset, e - self.offset)
            }
            RangeOrBitVector::BitVector(bv) => {
                let mut out = BitVector::with_size(range.1 as usize);
                for i in bv.set_bit_indices_in_range(self.offset as usize, storage_range.1 as usize) {
                    out.set((i - self.offset) as usize, true);
                }
                RangeOrBitVector::BitVector(out)
            }
        }
    }

    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        cfg: &EngineConfig,
    ) {
        let mut child_tokens = TokenVec {
            tokens: indices
                .tokens
                .iter()
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
                index: t.index - self.offset,
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

    fn make_overlay() -> RangeOverlay {
        RangeOverlay {
            child: Box::new(Chain::Numeric(NumericStorage {
                data: NumericKind::I64(vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]),
                is_sorted: true,
            })),
            offset: 3,
            size: 4,
        }
    }

    #[test]
    fn get_slow_shifts_by_offset() {
        let ov = make_overlay();
        let pool = StringPool::new();
        assert_eq!(ov.get_slow(&pool, 0), SqlValue::Long(3));
        assert_eq!(ov.get_slow(&pool, 3), SqlValue::Long(6));
    }

    #[test]
    fn search_validated_shifts_range_back() {
        let ov = make_overlay();
        let pool = StringPool::new();
        match ov.search_validated(&pool, FilterOp::Eq, SqlValue::Long(5), (0, 4)) {
            RangeOrBitVector::Range(s, e) => assert_eq!((s, e), (2, 3)),
            _ => panic!(),
        }
    }
}
