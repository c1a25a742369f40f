//! Applies one constraint to a working `RowMap` against a column's chain.
//! See SPEC_FULL.md §4.7.

use crate::chain::{Chain, FilterOp, RangeOrBitVector, SearchValidation, SingleSearchResult};
use crate::config::EngineConfig;
use crate::row_map::RowMap;
use crate::string_pool::StringPool;
use crate::token::{Monotonicity, Token, TokenVec};
use crate::value::SqlValue;

/// Narrow `rm` by one constraint `(op, val)` against `chain`.
pub fn apply_constraint(
    chain: &Chain,
    pool: &StringPool,
    op: FilterOp,
    val: SqlValue,
    rm: RowMap,
    cfg: &EngineConfig,
) -> RowMap {
    if rm.is_empty() {
        return rm;
    }

    if let Some(row) = single_row(&rm) {
        return match chain.single_search(pool, op, val, row) {
            SingleSearchResult::Match => rm,
            SingleSearchResult::NoMatch => RowMap::empty(),
            SingleSearchResult::NeedsFullSearch => linear_apply(chain, pool, op, val, rm),
        };
    }

    match chain.validate_search_constraints(op, val) {
        SearchValidation::AllRowsMatch => return rm,
        SearchValidation::NoRowsMatch => return RowMap::empty(),
        SearchValidation::Ok => {}
    }

    if use_index_mode(&rm, cfg) {
        index_apply(chain, pool, op, val, rm, cfg)
    } else {
        linear_apply(chain, pool, op, val, rm)
    }
}

/// `rm` denotes exactly one row; return it, to take the `single_search`
/// shortcut.
fn single_row(rm: &RowMap) -> Option<u32> {
    (rm.len() == 1).then(|| rm.first().unwrap())
}

fn use_index_mode(rm: &RowMap, cfg: &EngineConfig) -> bool {
    match rm {
        RowMap::IndexVector(_) => true,
        RowMap::Range { start, end } => {
            let span = (*end - *start) as u64;
            let last = *end as u64;
            // A large, sparse range is cheaper to filter linearly than to
            // pay for converting it to an index vector first.
            !(last < cfg.linear_scan_span_multiplier * span.max(1))
        }
        RowMap::BitVector(_) => {
            let len = rm.len() as u64;
            let span = rm
                .iter_to_vec()
                .last()
                .map_or(0, |last| last as u64 + 1 - rm.first().map_or(0, |f| f as u64));
            len < cfg.rowmap_index_vector_threshold as u64 || len * 10 < span.max(1)
        }
    }
}

fn linear_apply(chain: &Chain, pool: &StringPool, op: FilterOp, val: SqlValue, rm: RowMap) -> RowMap {
    let first = rm.first().unwrap_or(0);
    let last_exclusive = rm.last_exclusive();
    if first >= last_exclusive {
        return RowMap::empty();
    }
    let hit = chain.search_validated(pool, op, val, (first, last_exclusive));
    let hit_rm = match hit {
        RangeOrBitVector::Range(s, e) => RowMap::range(s, e),
        RangeOrBitVector::BitVector(bv) => RowMap::BitVector(bv),
    };
    rm.intersect(&hit_rm)
}

fn index_apply(chain: &Chain, pool: &StringPool, op: FilterOp, val: SqlValue, rm: RowMap, cfg: &EngineConfig) -> RowMap {
    // The tokens here are sorted by row number (hence `Monotonic`), not by
    // column value, so `ordered_index_search_validated`'s binary search is
    // only valid where the chain itself pushes that down over a known-sorted
    // child (see `ArrangementOverlay`, which guards on its own monotonicity
    // before taking that path). `index_search_validated` is always correct
    // here: it filters token-by-token via `single_search`.
    let mut tv = TokenVec {
        tokens: rm.to_sorted_vec().into_iter().map(Token::identity).collect(),
        monotonicity: Monotonicity::Monotonic,
    };
    tv.debug_assert_monotonicity();
    chain.index_search_validated(pool, op, val, &mut tv, cfg);
    tv.debug_assert_monotonicity();
    RowMap::IndexVector(tv.tokens.into_iter().map(|t| t.index).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{IdStorage, NumericKind, NumericStorage};

    #[test]
    fn single_row_fast_path() {
        let chain = Chain::Numeric(NumericStorage {
            data: NumericKind::I64(vec![1, 2, 3]),
            is_sorted: true,
        });
        let pool = StringPool::new();
        let cfg = EngineConfig::default();
        let rm = apply_constraint(&chain, &pool, FilterOp::Eq, SqlValue::Long(2), RowMap::single_row(1), &cfg);
        assert_eq!(rm.iter_to_vec(), vec![1]);
        let rm = apply_constraint(&chain, &pool, FilterOp::Eq, SqlValue::Long(99), RowMap::single_row(1), &cfg);
        assert!(rm.is_empty());
    }

    #[test]
    fn linear_mode_intersects_range() {
        let chain = Chain::Numeric(NumericStorage {
            data: NumericKind::I64(vec![5, 1, 9, 1, 5]),
            is_sorted: false,
        });
        let pool = StringPool::new();
        let cfg = EngineConfig::default();
        let rm = apply_constraint(&chain, &pool, FilterOp::Eq, SqlValue::Long(1), RowMap::range(0, 5), &cfg);
        assert_eq!(rm.iter_to_vec(), vec![1, 3]);
    }

    #[test]
    fn index_mode_on_sorted_id_column() {
        let chain = Chain::Id(IdStorage { size: 10 });
        let pool = StringPool::new();
        let cfg = EngineConfig {
            rowmap_index_vector_threshold: 1,
            ..EngineConfig::default()
        };
        let rm = RowMap::IndexVector(vec![2, 4, 6, 8]);
        let rm = apply_constraint(&chain, &pool, FilterOp::Lt, SqlValue::Long(6), rm, &cfg);
        assert_eq!(rm.iter_to_vec(), vec![2, 4]);
    }
}
