//! A table: columns, their overlay layers, secondary indices, and the
//! `query_to_row_map` entry point. See SPEC_FULL.md §4.6.

use std::cell::OnceCell;
use std::rc::Rc;

use crate::bitvec::BitVector;
use crate::chain::{
    ArrangementOverlay, Chain, DenseNullOverlay, FilterOp, IdStorage, NullOverlay, NumericStorage,
    RangeOverlay, SelectorOverlay, SetIdStorage, StringStorage,
};
use crate::column::{Column, ColumnFlags, ColumnStorage};
use crate::config::EngineConfig;
use crate::cost;
use crate::executor::apply_constraint;
use crate::query::{OrderType, Query};
use crate::row_map::RowMap;
use crate::string_pool::StringPool;
use crate::token::{Monotonicity, Token, TokenVec};

/// The shared overlay layer a set of sibling columns currently sit behind.
/// Slot `0` is always [`OverlaySpec::Identity`].
#[derive(Debug)]
pub enum OverlaySpec {
    /// No overlay: the column's own chain (storage + optional null layer)
    /// is used as-is.
    Identity,
    /// See [`RangeOverlay`].
    Range { start: u32, end: u32 },
    /// See [`SelectorOverlay`].
    Selector(Rc<BitVector>),
    /// See [`ArrangementOverlay`].
    Arrangement(Rc<Vec<u32>>, Monotonicity),
}

/// A named secondary index: a prefix of column indices plus a materialised
/// row order sorted by those columns (most significant first).
#[derive(Debug)]
pub struct SecondaryIndex {
    /// The index's name, as referenced by a query's column-list prefix
    /// match (see §4.6 step 2).
    pub name: String,
    /// Columns the index is sorted by, most significant first.
    pub columns: Vec<usize>,
    /// Row order: `order[i]` is the table row at sorted position `i`.
    pub order: Rc<Vec<u32>>,
}

/// A table: row count, columns, overlay layers, and secondary indices.
/// Owns every storage, null-layer, and overlay this table's chains are
/// built from; `Column`s hold only indices, never back-pointers, and the
/// composed chains are built once, lazily, into `chains`.
pub struct Table {
    /// Number of logical rows (the size of the identity overlay).
    pub row_count: u32,
    /// The columns, in schema order.
    pub columns: Vec<Column>,
    /// Overlay layers; slot 0 is always `Identity`.
    pub overlay_layers: Vec<OverlaySpec>,
    /// Secondary indices available for the index-search fast path.
    pub indices: Vec<SecondaryIndex>,
    /// Tunable constants.
    pub config: EngineConfig,
    /// The shared string pool columns' `String`/`StringId` data resolves
    /// through.
    pub pool: StringPool,
    chains: OnceCell<Vec<Chain>>,
}

impl Table {
    /// Build an (initially chain-less) table. `columns[i].overlay_slot` must
    /// index into `overlay_layers`.
    pub fn new(
        row_count: u32,
        columns: Vec<Column>,
        overlay_layers: Vec<OverlaySpec>,
        indices: Vec<SecondaryIndex>,
        config: EngineConfig,
        pool: StringPool,
    ) -> Table {
        Table {
            row_count,
            columns,
            overlay_layers,
            indices,
            config,
            pool,
            chains: OnceCell::new(),
        }
    }

    /// The per-column composed chains, built lazily on first access.
    fn chains(&self) -> &[Chain] {
        self.chains
            .get_or_init(|| (0..self.columns.len()).map(|i| self.build_chain(i)).collect())
    }

    fn build_chain(&self, col_idx: usize) -> Chain {
        let col = &self.columns[col_idx];
        let mut chain = match &col.storage {
            ColumnStorage::Id { size } => Chain::Id(IdStorage { size: *size }),
            ColumnStorage::Numeric { data, is_sorted } => Chain::Numeric(NumericStorage {
                data: clone_numeric(data),
                is_sorted: *is_sorted,
            }),
            ColumnStorage::String(s) => Chain::String(StringStorage {
                data: s.data.clone(),
                is_sorted: s.is_sorted,
            }),
            ColumnStorage::SetId { data } => Chain::SetId(SetIdStorage { data: data.clone() }),
        };
        if let Some(is_valid) = &col.null_bitmap {
            chain = if col.flags.contains(ColumnFlags::DENSE) {
                Chain::DenseNull(DenseNullOverlay {
                    child: Box::new(chain),
                    is_valid: is_valid.clone(),
                })
            } else {
                Chain::Null(NullOverlay {
                    child: Box::new(chain),
                    is_valid: is_valid.clone(),
                })
            };
        }
        match &self.overlay_layers[col.overlay_slot] {
            OverlaySpec::Identity => {}
            OverlaySpec::Range { start, end } => {
                chain = Chain::RangeOv(RangeOverlay {
                    child: Box::new(chain),
                    offset: *start,
                    size: end - start,
                });
            }
            OverlaySpec::Selector(bv) => {
                chain = Chain::SelectorOv(SelectorOverlay {
                    child: Box::new(chain),
                    selector: bv.clone(),
                });
            }
            OverlaySpec::Arrangement(arr, mono) => {
                chain = Chain::ArrangementOv(ArrangementOverlay {
                    child: Box::new(chain),
                    arrangement: arr.clone(),
                    monotonicity: *mono,
                });
            }
        }
        chain
    }

    fn chain(&self, col_idx: usize) -> &Chain {
        &self.chains()[col_idx]
    }

    /// Run `query` against this table, returning the matching row set.
    /// See SPEC_FULL.md §4.6 for the numbered algorithm this implements.
    #[tracing::instrument(level = "debug", skip(self, query), fields(constraints = query.constraints.len(), cols = self.columns.len()))]
    pub fn query_to_row_map(&self, query: &Query) -> RowMap {
        let mut constraints_consumed = 0usize;

        // Step 1: id-equality fast path.
        if let Some(&(col_idx, FilterOp::Eq, crate::value::OwnedValue::Long(r))) =
            query.constraints.first()
        {
            if self.is_plain_id_column(col_idx) && r >= 0 && (r as u64) < self.row_count as u64 {
                let r = r as u32;
                let mut all_match = true;
                let mut any_no_match = false;
                for (c, op, v) in &query.constraints[1..] {
                    match self.chain(*c).single_search(&self.pool, *op, v.as_ref(&self.pool), r) {
                        crate::chain::SingleSearchResult::Match => {}
                        crate::chain::SingleSearchResult::NoMatch => {
                            any_no_match = true;
                            break;
                        }
                        crate::chain::SingleSearchResult::NeedsFullSearch => {
                            all_match = false;
                        }
                    }
                }
                if any_no_match {
                    tracing::debug!("id fast path: no match at row {r}");
                    return RowMap::empty();
                }
                if all_match {
                    tracing::debug!("id fast path: row {r} matches all constraints");
                    return self.finish(query, RowMap::single_row(r));
                }
                // Fall through: execute the remaining constraints against
                // just this one row.
                let mut rm = RowMap::single_row(r);
                for (c, op, v) in &query.constraints[1..] {
                    rm = apply_constraint(self.chain(*c), &self.pool, *op, v.as_ref(&self.pool), rm, &self.config);
                    if rm.is_empty() {
                        return RowMap::empty();
                    }
                }
                return self.finish(query, rm);
            }
        }

        // Step 2: secondary-index prefix path.
        let (mut rm, index_consumed) = self.try_index_path(query);
        constraints_consumed = constraints_consumed.max(index_consumed);

        // Step 3: remaining constraints via the executor.
        for (c, op, v) in &query.constraints[constraints_consumed..] {
            rm = apply_constraint(self.chain(*c), &self.pool, *op, v.as_ref(&self.pool), rm, &self.config);
            if rm.is_empty() {
                return RowMap::empty();
            }
        }

        self.finish(query, rm)
    }

    fn is_plain_id_column(&self, col_idx: usize) -> bool {
        let col = &self.columns[col_idx];
        matches!(col.storage, ColumnStorage::Id { .. })
            && col.null_bitmap.is_none()
            && matches!(self.overlay_layers[col.overlay_slot], OverlaySpec::Identity)
    }

    /// Walk a prefix of `query.constraints` eligible for a secondary-index
    /// lookup (non-id columns, monotonic ops, all-`Eq` prefix before the
    /// first non-`Eq`), matching it against a named index whose column list
    /// has that prefix. Returns the resulting `RowMap` (identity if no
    /// index matched) and how many leading constraints were consumed.
    fn try_index_path(&self, query: &Query) -> (RowMap, usize) {
        let mut prefix_cols = Vec::new();
        let mut seen_non_eq = false;
        for (col_idx, op, _) in &query.constraints {
            if self.is_plain_id_column(*col_idx) {
                break;
            }
            if !op.supports_ordered_index_search() {
                break;
            }
            if seen_non_eq {
                break;
            }
            if *op != FilterOp::Eq {
                seen_non_eq = true;
            }
            prefix_cols.push(*col_idx);
        }
        if prefix_cols.is_empty() {
            return (RowMap::range(0, self.row_count), 0);
        }
        let Some(index) = self
            .indices
            .iter()
            .find(|idx| idx.columns.len() >= prefix_cols.len() && idx.columns[..prefix_cols.len()] == prefix_cols[..])
        else {
            return (RowMap::range(0, self.row_count), 0);
        };

        let mut lo = 0u32;
        let mut hi = index.order.len() as u32;
        for (i, col_idx) in prefix_cols.iter().enumerate() {
            let (_, op, val) = &query.constraints[i];
            let ordered = crate::token::OrderedIndices::new(&index.order[lo as usize..hi as usize]);
            let (rel_lo, rel_hi) = self.chain(*col_idx).ordered_index_search_validated(
                &self.pool,
                *op,
                val.as_ref(&self.pool),
                ordered,
            );
            hi = lo + rel_hi;
            lo += rel_lo;
        }
        tracing::debug!(index = %index.name, consumed = prefix_cols.len(), hits = hi - lo, "secondary index hit");
        let survivors = &index.order[lo as usize..hi as usize];
        let rm = if survivors.len() >= self.config.rowmap_index_vector_threshold {
            RowMap::BitVector({
                let mut bv = BitVector::with_size(self.row_count as usize);
                for &r in survivors {
                    bv.set(r as usize, true);
                }
                bv
            })
        } else {
            let mut v = survivors.to_vec();
            v.sort_unstable();
            RowMap::IndexVector(v)
        };
        (rm, prefix_cols.len())
    }

    /// Steps 4-7: distinct, min/max shortcut, sort, limit/offset.
    fn finish(&self, query: &Query, rm: RowMap) -> RowMap {
        if rm.is_empty() {
            return rm;
        }

        if matches!(query.order_type, OrderType::Distinct | OrderType::DistinctAndSort) {
            debug_assert_eq!(query.orders.len(), 1, "distinct requires exactly one order column");
            let (col_idx, _) = query.orders[0];
            let mut tv = TokenVec {
                tokens: rm.to_sorted_vec().into_iter().map(Token::identity).collect(),
                monotonicity: Monotonicity::NonMonotonic,
            };
            self.chain(col_idx).distinct(&self.pool, &mut tv);
            if matches!(query.order_type, OrderType::DistinctAndSort) {
                let mut tokens = tv.tokens;
                self.chain(col_idx).stable_sort(&self.pool, &mut tokens, false);
                tv.tokens = tokens;
            }
            let indices: Vec<u32> = tv.tokens.iter().map(|t| t.index).collect();
            return RowMap::IndexVector(indices).apply_limit_offset(query.offset, query.limit);
        }

        if query.orders.len() == 1 && query.limit == Some(1) && matches!(query.order_type, OrderType::Sort) {
            let (col_idx, desc) = query.orders[0];
            let tv = TokenVec {
                tokens: rm.to_sorted_vec().into_iter().map(Token::identity).collect(),
                monotonicity: Monotonicity::NonMonotonic,
            };
            let picked = if desc {
                self.chain(col_idx).max_element(&self.pool, &tv)
            } else {
                self.chain(col_idx).min_element(&self.pool, &tv)
            };
            return match picked {
                Some(t) => RowMap::IndexVector(vec![t.index]).apply_limit_offset(query.offset, None),
                None => RowMap::empty(),
            };
        }

        if query.orders.is_empty() {
            return rm.apply_limit_offset(query.offset, query.limit);
        }

        let mut tokens: Vec<Token> = rm.to_sorted_vec().into_iter().map(Token::identity).collect();
        for &(col_idx, desc) in query.orders.iter().rev() {
            self.chain(col_idx).stable_sort(&self.pool, &mut tokens, desc);
        }
        let indices: Vec<u32> = tokens.iter().map(|t| t.index).collect();
        RowMap::IndexVector(indices).apply_limit_offset(query.offset, query.limit)
    }

    /// Run the §4.8 cost model for a candidate constraint/order set, for use
    /// by a host query planner. See [`crate::cost::best_index_cost`].
    pub fn best_index_cost(&self, query: &Query) -> (u64, u64, bool) {
        cost::best_index_cost(self, query)
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}

fn clone_numeric(data: &crate::chain::NumericKind) -> crate::chain::NumericKind {
    use crate::chain::NumericKind::*;
    match data {
        I32(v) => I32(v.clone()),
        U32(v) => U32(v.clone()),
        I64(v) => I64(v.clone()),
        F64(v) => F64(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::NumericKind;
    use crate::query::{OrderType, Query};
    use crate::string_pool::StringId;
    use crate::value::OwnedValue;

    fn sample_table() -> Table {
        let columns = vec![
            Column {
                name: "id".into(),
                col_type: crate::column::ColumnType::BigInt,
                flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL,
                storage: ColumnStorage::Id { size: 5 },
                null_bitmap: None,
                overlay_slot: 0,
            },
            Column {
                name: "value".into(),
                col_type: crate::column::ColumnType::BigInt,
                flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL,
                storage: ColumnStorage::Numeric {
                    data: NumericKind::I64(vec![10, 20, 20, 30, 40]),
                    is_sorted: true,
                },
                null_bitmap: None,
                overlay_slot: 0,
            },
        ];
        Table::new(5, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), StringPool::new())
    }

    #[test]
    fn no_constraints_returns_everything() {
        let table = sample_table();
        let query = Query {
            constraints: vec![],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        let rm = table.query_to_row_map(&query);
        assert_eq!(rm.iter_to_vec(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn id_fast_path_single_row() {
        let table = sample_table();
        let query = Query {
            constraints: vec![(0, FilterOp::Eq, OwnedValue::Long(2))],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        let rm = table.query_to_row_map(&query);
        assert_eq!(rm.iter_to_vec(), vec![2]);
    }

    #[test]
    fn filter_then_sort_descending() {
        let table = sample_table();
        let query = Query {
            constraints: vec![(1, FilterOp::Ge, OwnedValue::Long(20))],
            orders: vec![(1, true)],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        let rm = table.query_to_row_map(&query);
        assert_eq!(rm.iter_to_vec(), vec![4, 3, 1, 2]);
    }

    #[test]
    fn min_shortcut() {
        let table = sample_table();
        let query = Query {
            constraints: vec![],
            orders: vec![(1, false)],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: Some(1),
            offset: 0,
        };
        let rm = table.query_to_row_map(&query);
        assert_eq!(rm.iter_to_vec(), vec![0]);
    }

    // Scenarios A-G below are the SPEC_FULL.md §8 end-to-end properties.

    /// A. Id-equality join shortcut.
    #[test]
    fn scenario_a_id_equality_shortcut() {
        let columns = vec![Column {
            name: "id".into(),
            col_type: crate::column::ColumnType::BigInt,
            flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL,
            storage: ColumnStorage::Id { size: 1000 },
            null_bitmap: None,
            overlay_slot: 0,
        }];
        let table = Table::new(1000, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), StringPool::new());
        let query = Query {
            constraints: vec![(0, FilterOp::Eq, OwnedValue::Long(42))],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        assert_eq!(table.query_to_row_map(&query).iter_to_vec(), vec![42]);
    }

    /// B. Set-id column filter.
    #[test]
    fn scenario_b_set_id_column_filter() {
        let columns = vec![Column {
            name: "parent_id".into(),
            col_type: crate::column::ColumnType::BigInt,
            flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL | ColumnFlags::SET_ID,
            storage: ColumnStorage::SetId {
                data: vec![0, 0, 0, 3, 3, 5, 6, 6, 7],
            },
            null_bitmap: None,
            overlay_slot: 0,
        }];
        let table = Table::new(9, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), StringPool::new());

        let hit = Query {
            constraints: vec![(0, FilterOp::Eq, OwnedValue::Long(3))],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        assert_eq!(table.query_to_row_map(&hit).iter_to_vec(), vec![3, 4]);

        let miss = Query {
            constraints: vec![(0, FilterOp::Eq, OwnedValue::Long(4))],
            ..hit
        };
        assert!(table.query_to_row_map(&miss).is_empty());
    }

    /// C. Null overlay rank translation. Mask bits set at positions
    /// `{0,1,3,6,7,8}` (six valid rows out of ten), child storage
    /// `[5,7,3,9,2,1]`. `value > 4` matches child storage indices
    /// `{0,1,3}` (values 5,7,9), which the overlay's rank/select
    /// translation re-projects to the positions of the 0th, 1st, and 3rd
    /// set bits in the mask: `{0,1,6}`.
    #[test]
    fn scenario_c_null_overlay_rank_translation() {
        let mut is_valid = BitVector::with_size(10);
        for i in [0usize, 1, 3, 6, 7, 8] {
            is_valid.set(i, true);
        }
        let columns = vec![Column {
            name: "value".into(),
            col_type: crate::column::ColumnType::BigInt,
            flags: ColumnFlags::empty(),
            storage: ColumnStorage::Numeric {
                data: NumericKind::I64(vec![5, 7, 3, 9, 2, 1]),
                is_sorted: false,
            },
            null_bitmap: Some(is_valid),
            overlay_slot: 0,
        }];
        let table = Table::new(10, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), StringPool::new());
        let query = Query {
            constraints: vec![(0, FilterOp::Gt, OwnedValue::Long(4))],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        assert_eq!(table.query_to_row_map(&query).iter_to_vec(), vec![0, 1, 6]);
    }

    /// D. Dense-null IsNull: same mask as C but stored dense (no
    /// compaction), so `IsNull` returns exactly the clear-bit positions
    /// independent of whatever the (unread) child storage holds.
    #[test]
    fn scenario_d_dense_null_is_null() {
        let mut is_valid = BitVector::with_size(10);
        for i in [0usize, 1, 3, 6, 7, 8] {
            is_valid.set(i, true);
        }
        let columns = vec![Column {
            name: "value".into(),
            col_type: crate::column::ColumnType::BigInt,
            flags: ColumnFlags::DENSE,
            storage: ColumnStorage::Numeric {
                data: NumericKind::I64(vec![0; 10]),
                is_sorted: false,
            },
            null_bitmap: Some(is_valid),
            overlay_slot: 0,
        }];
        let table = Table::new(10, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), StringPool::new());
        let query = Query {
            constraints: vec![(0, FilterOp::IsNull, OwnedValue::Null)],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        assert_eq!(table.query_to_row_map(&query).iter_to_vec(), vec![2, 4, 5, 9]);
    }

    /// E. Distinct-and-sort over interned string ids.
    #[test]
    fn scenario_e_distinct_and_sort() {
        let mut pool = StringPool::new();
        let cats = ["a", "b", "a", "c", "b", "a"].map(|s| pool.intern(s)).to_vec();
        let columns = vec![Column {
            name: "cat".into(),
            col_type: crate::column::ColumnType::Text,
            flags: ColumnFlags::NON_NULL,
            storage: ColumnStorage::String(StringStorage {
                data: cats,
                is_sorted: false,
            }),
            null_bitmap: None,
            overlay_slot: 0,
        }];
        let table = Table::new(6, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), pool);
        let query = Query {
            constraints: vec![],
            orders: vec![(0, false)],
            order_type: OrderType::DistinctAndSort,
            cols_used: 1,
            limit: None,
            offset: 0,
        };
        assert_eq!(table.query_to_row_map(&query).iter_to_vec(), vec![0, 1, 3]);
    }

    /// F. Min/max one-row shortcut: no sort is performed, the chain's
    /// `max_element` is consulted directly.
    #[test]
    fn scenario_f_min_max_one_row_shortcut() {
        let columns = vec![Column {
            name: "ts".into(),
            col_type: crate::column::ColumnType::BigInt,
            flags: ColumnFlags::NON_NULL,
            storage: ColumnStorage::Numeric {
                data: NumericKind::I64(vec![5, 3, 8, 1, 7]),
                is_sorted: false,
            },
            null_bitmap: None,
            overlay_slot: 0,
        }];
        let table = Table::new(5, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), StringPool::new());
        let query = Query {
            constraints: vec![],
            orders: vec![(0, true)],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: Some(1),
            offset: 0,
        };
        assert_eq!(table.query_to_row_map(&query).iter_to_vec(), vec![2]);
    }

    /// G. Cost-driven reordering: a host planner that has already consulted
    /// `best_index_cost` places the id equality first in the constraint
    /// list it hands to `query_to_row_map`; the id fast path then runs the
    /// unsorted string `Ne` constraint via `single_search` against that one
    /// row only, never materialising a full-table bitvector.
    #[test]
    fn scenario_g_cost_driven_reordering() {
        let mut pool = StringPool::new();
        let needle = pool.intern("frame");
        let names: Vec<StringId> = (0..1000).map(|i| pool.intern(&format!("row{i}"))).collect();
        let columns = vec![
            Column {
                name: "id".into(),
                col_type: crate::column::ColumnType::BigInt,
                flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL,
                storage: ColumnStorage::Id { size: 1000 },
                null_bitmap: None,
                overlay_slot: 0,
            },
            Column {
                name: "name".into(),
                col_type: crate::column::ColumnType::Text,
                flags: ColumnFlags::NON_NULL,
                storage: ColumnStorage::String(StringStorage {
                    data: names,
                    is_sorted: false,
                }),
                null_bitmap: None,
                overlay_slot: 0,
            },
        ];
        let table = Table::new(1000, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), pool);

        // As already reordered by a cost-model-consulting host planner: the
        // id equality comes first.
        let reordered = Query {
            constraints: vec![
                (0, FilterOp::Eq, OwnedValue::Long(42)),
                (1, FilterOp::Ne, OwnedValue::String(needle)),
            ],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        assert_eq!(table.query_to_row_map(&reordered).iter_to_vec(), vec![42]);

        let (cost, rows, _) = table.best_index_cost(&reordered);
        assert_eq!(rows, 1);
        assert!(cost < 200, "id-first plan should be cheap, got {cost}");
    }
}
