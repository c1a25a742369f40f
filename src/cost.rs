//! The §4.8 cost model: a cheap estimator a host query planner can call
//! before deciding whether to use this table at all, independent of
//! actually running `query_to_row_map`.

use crate::chain::FilterOp;
use crate::column::{ColumnFlags, ColumnStorage};
use crate::query::Query;
use crate::table::Table;

const FIXED_SETUP_COST: u64 = 100;

fn log2_ceil(n: u64) -> u64 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros() as u64
    }
}

/// One constraint's contribution, reordered to put cheap/selective
/// constraints first: id equalities, then set-id/sorted/indexed columns,
/// then other equalities, then everything else.
fn constraint_priority(table: &Table, col_idx: usize, op: FilterOp) -> u32 {
    let col = &table.columns[col_idx];
    let is_id = matches!(col.storage, ColumnStorage::Id { .. });
    let is_set_id = col.flags.contains(ColumnFlags::SET_ID);
    let is_sorted = col.flags.contains(ColumnFlags::SORTED);
    let has_index = table.indices.iter().any(|ix| ix.columns.first() == Some(&col_idx));
    let is_eq = op == FilterOp::Eq;

    if is_id {
        0
    } else if is_set_id {
        1
    } else if has_index {
        2
    } else if is_sorted {
        3
    } else if is_eq {
        4
    } else {
        5
    }
}

/// Per-constraint `(cost, residual-row-estimate)` given the current
/// estimated row count `n` flowing into it.
fn constraint_cost(table: &Table, col_idx: usize, op: FilterOp, n: u64) -> (u64, u64) {
    let col = &table.columns[col_idx];
    let is_id = matches!(col.storage, ColumnStorage::Id { .. });
    let is_sorted = col.flags.contains(ColumnFlags::SORTED);
    let n = n.max(1);
    let log_n = log2_ceil(n).max(1);

    if is_id && op == FilterOp::Eq {
        (10, 1)
    } else if op == FilterOp::Eq && is_sorted {
        (log_n, (n / (2 * log_n)).max(1))
    } else if op == FilterOp::Eq {
        (n, (n / (2 * log_n)).max(1))
    } else if op.is_monotonic_comparison() && is_sorted {
        (log_n, (n / (2 * log_n)).max(1))
    } else {
        (n, (n / 2).max(1))
    }
}

/// Drop order-bys that are made redundant: a column already pinned by an
/// equality constraint contributes nothing to ordering, and a trailing
/// order-by on an already-sorted ascending column is a sort no-op.
fn useful_orders(table: &Table, query: &Query) -> usize {
    let eq_cols: std::collections::HashSet<usize> = query
        .constraints
        .iter()
        .filter(|(_, op, _)| *op == FilterOp::Eq)
        .map(|(c, _, _)| *c)
        .collect();

    let mut orders: Vec<(usize, bool)> = query
        .orders
        .iter()
        .copied()
        .filter(|(c, _)| !eq_cols.contains(c))
        .collect();

    while let Some(&(col, desc)) = orders.last() {
        let col_flags = table.columns[col].flags;
        if !desc && col_flags.contains(ColumnFlags::SORTED) {
            orders.pop();
        } else {
            break;
        }
    }
    orders.len()
}

/// Estimate `(cost, rows, order_by_consumed)` for `query` against `table`,
/// per SPEC_FULL.md §4.8. `order_by_consumed` is always `true`: the engine
/// handles any requested order itself.
pub fn best_index_cost(table: &Table, query: &Query) -> (u64, u64, bool) {
    let mut order: Vec<usize> = (0..query.constraints.len()).collect();
    order.sort_by_key(|&i| {
        let (col, op, _) = &query.constraints[i];
        constraint_priority(table, *col, *op)
    });

    let mut cost = FIXED_SETUP_COST;
    let mut n = table.row_count as u64;
    for i in order {
        let (col, op, _) = &query.constraints[i];
        let (c, residual) = constraint_cost(table, *col, *op, n);
        cost += c;
        n = residual.min(n);
    }

    let orders = useful_orders(table, query);
    if orders > 0 {
        let log_n = log2_ceil(n.max(1)).max(1);
        cost += orders as u64 * n.max(1) * log_n;
    }
    cost += 2 * n.max(1);

    (cost, n, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::NumericKind;
    use crate::column::{Column, ColumnType};
    use crate::config::EngineConfig;
    use crate::query::OrderType;
    use crate::string_pool::StringPool;
    use crate::table::OverlaySpec;
    use crate::value::OwnedValue;

    fn table_with_id_and_value() -> Table {
        let columns = vec![
            Column {
                name: "id".into(),
                col_type: ColumnType::BigInt,
                flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL,
                storage: ColumnStorage::Id { size: 1000 },
                null_bitmap: None,
                overlay_slot: 0,
            },
            Column {
                name: "value".into(),
                col_type: ColumnType::BigInt,
                flags: ColumnFlags::empty(),
                storage: ColumnStorage::Numeric {
                    data: NumericKind::I64(vec![0; 1000]),
                    is_sorted: false,
                },
                null_bitmap: None,
                overlay_slot: 0,
            },
        ];
        Table::new(1000, columns, vec![OverlaySpec::Identity], vec![], EngineConfig::default(), StringPool::new())
    }

    #[test]
    fn id_equality_is_cheap() {
        let table = table_with_id_and_value();
        let query = Query {
            constraints: vec![(0, FilterOp::Eq, OwnedValue::Long(5))],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        let (cost, rows, consumed) = best_index_cost(&table, &query);
        assert!(consumed);
        assert_eq!(rows, 1);
        assert!(cost < 200);
    }

    #[test]
    fn unsorted_equality_scans_full_table() {
        let table = table_with_id_and_value();
        let query = Query {
            constraints: vec![(1, FilterOp::Eq, OwnedValue::Long(7))],
            orders: vec![],
            order_type: OrderType::Sort,
            cols_used: 0,
            limit: None,
            offset: 0,
        };
        let (cost, _, _) = best_index_cost(&table, &query);
        let (id_cost, _, _) = best_index_cost(
            &table,
            &Query {
                constraints: vec![(0, FilterOp::Eq, OwnedValue::Long(7))],
                ..query.clone()
            },
        );
        assert!(cost > id_cost);
    }
}
