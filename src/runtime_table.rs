//! Builds a [`crate::table::Table`] from a stream of cells addressed by
//! column index, row by row, inferring each column's storage as data
//! arrives. See SPEC_FULL.md §4.9.

use crate::bitvec::BitVector;
use crate::chain::{NumericKind, StringStorage};
use crate::column::{Column, ColumnFlags, ColumnStorage, ColumnType};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::string_pool::{StringId, StringPool};
use crate::table::{OverlaySpec, SecondaryIndex, Table};
use crate::token::Monotonicity;
use crate::value::SqlValue;
use std::rc::Rc;

/// Per-column accumulator state. Promotion between variants is forward-only
/// (§4.9): once a column has seen a typed cell it never reverts to
/// `LeadingNulls`, and `Int`/`NullInt` only ever widen towards
/// `Double`/`NullDouble`, never the reverse.
#[derive(Debug)]
enum ColumnState {
    LeadingNulls(u32),
    Int(Vec<i64>),
    NullInt(Vec<Option<i64>>),
    Double(Vec<f64>),
    NullDouble(Vec<Option<f64>>),
    Str(Vec<StringId>),
}

fn i64_fits_f64(x: i64) -> bool {
    (x as f64) as i64 == x
}

/// Accumulates rows for a table whose column types are not known in advance
/// (e.g. trace event args) and finalises them into a [`Table`] once the
/// stream ends.
pub struct RuntimeTableBuilder {
    names: Vec<String>,
    states: Vec<ColumnState>,
    row_count: u32,
}

impl RuntimeTableBuilder {
    /// Start a builder for a table with these column names, in order.
    pub fn new(names: Vec<String>) -> RuntimeTableBuilder {
        let states = names.iter().map(|_| ColumnState::LeadingNulls(0)).collect();
        RuntimeTableBuilder {
            names,
            states,
            row_count: 0,
        }
    }

    /// Append one row. `cells` must have one entry per column, in schema
    /// order; use `SqlValue::Null` for a cell the caller has nothing to
    /// report for this row.
    pub fn append_row(&mut self, cells: &[SqlValue], pool: &mut StringPool) -> Result<(), EngineError> {
        debug_assert_eq!(cells.len(), self.states.len());
        for (col_idx, &v) in cells.iter().enumerate() {
            self.append_cell(col_idx, v, pool)?;
        }
        self.row_count += 1;
        Ok(())
    }

    fn conflict(&self, col: usize, message: impl Into<String>) -> EngineError {
        EngineError::SchemaConflict {
            col,
            col_name: self.names[col].clone(),
            message: message.into(),
        }
    }

    fn append_cell(&mut self, col: usize, v: SqlValue, pool: &mut StringPool) -> Result<(), EngineError> {
        let state = std::mem::replace(&mut self.states[col], ColumnState::Int(Vec::new()));
        self.states[col] = match (state, v) {
            (ColumnState::LeadingNulls(n), SqlValue::Null) => ColumnState::LeadingNulls(n + 1),
            (ColumnState::LeadingNulls(n), SqlValue::Long(x)) => {
                let mut v = vec![None; n as usize];
                v.push(Some(x));
                ColumnState::NullInt(v)
            }
            (ColumnState::LeadingNulls(n), SqlValue::Double(x)) => {
                let mut v = vec![None; n as usize];
                v.push(Some(x));
                ColumnState::NullDouble(v)
            }
            (ColumnState::LeadingNulls(n), SqlValue::String(s)) => {
                let mut v = vec![StringId::NULL; n as usize];
                v.push(pool.intern(s));
                ColumnState::Str(v)
            }
            (ColumnState::LeadingNulls(_), SqlValue::Bytes(_)) => {
                return Err(self.conflict(col, "byte strings are not a representable column type"));
            }

            (ColumnState::Int(mut v), SqlValue::Long(x)) => {
                v.push(x);
                ColumnState::Int(v)
            }
            (ColumnState::Int(v), SqlValue::Null) => {
                let mut v: Vec<Option<i64>> = v.into_iter().map(Some).collect();
                v.push(None);
                ColumnState::NullInt(v)
            }
            (ColumnState::Int(v), SqlValue::Double(x)) => {
                if let Some(bad) = v.iter().copied().find(|&i| !i64_fits_f64(i)) {
                    return Err(self.conflict(col, format!("prior value {bad} not exactly representable as f64")));
                }
                let mut v: Vec<f64> = v.into_iter().map(|i| i as f64).collect();
                v.push(x);
                ColumnState::Double(v)
            }
            (ColumnState::Int(_), SqlValue::String(_) | SqlValue::Bytes(_)) => {
                return Err(self.conflict(col, "string cell appended to an integer column"));
            }

            (ColumnState::NullInt(mut v), SqlValue::Long(x)) => {
                v.push(Some(x));
                ColumnState::NullInt(v)
            }
            (ColumnState::NullInt(mut v), SqlValue::Null) => {
                v.push(None);
                ColumnState::NullInt(v)
            }
            (ColumnState::NullInt(v), SqlValue::Double(x)) => {
                if let Some(bad) = v.iter().flatten().copied().find(|&i| !i64_fits_f64(i)) {
                    return Err(self.conflict(col, format!("prior value {bad} not exactly representable as f64")));
                }
                let mut v: Vec<Option<f64>> = v.into_iter().map(|o| o.map(|i| i as f64)).collect();
                v.push(Some(x));
                ColumnState::NullDouble(v)
            }
            (ColumnState::NullInt(_), SqlValue::String(_) | SqlValue::Bytes(_)) => {
                return Err(self.conflict(col, "string cell appended to an integer column"));
            }

            (ColumnState::Double(mut v), SqlValue::Double(x)) => {
                v.push(x);
                ColumnState::Double(v)
            }
            (ColumnState::Double(v), SqlValue::Long(x)) => {
                if !i64_fits_f64(x) {
                    return Err(self.conflict(col, format!("value {x} not exactly representable as f64")));
                }
                let mut v = v;
                v.push(x as f64);
                ColumnState::Double(v)
            }
            (ColumnState::Double(v), SqlValue::Null) => {
                let mut v: Vec<Option<f64>> = v.into_iter().map(Some).collect();
                v.push(None);
                ColumnState::NullDouble(v)
            }
            (ColumnState::Double(_), SqlValue::String(_) | SqlValue::Bytes(_)) => {
                return Err(self.conflict(col, "string cell appended to a double column"));
            }

            (ColumnState::NullDouble(mut v), SqlValue::Double(x)) => {
                v.push(Some(x));
                ColumnState::NullDouble(v)
            }
            (ColumnState::NullDouble(v), SqlValue::Long(x)) => {
                if !i64_fits_f64(x) {
                    return Err(self.conflict(col, format!("value {x} not exactly representable as f64")));
                }
                let mut v = v;
                v.push(Some(x as f64));
                ColumnState::NullDouble(v)
            }
            (ColumnState::NullDouble(mut v), SqlValue::Null) => {
                v.push(None);
                ColumnState::NullDouble(v)
            }
            (ColumnState::NullDouble(_), SqlValue::String(_) | SqlValue::Bytes(_)) => {
                return Err(self.conflict(col, "string cell appended to a double column"));
            }

            (ColumnState::Str(mut v), SqlValue::String(s)) => {
                v.push(pool.intern(s));
                ColumnState::Str(v)
            }
            (ColumnState::Str(mut v), SqlValue::Null) => {
                v.push(StringId::NULL);
                ColumnState::Str(v)
            }
            (ColumnState::Str(_), SqlValue::Long(_) | SqlValue::Double(_) | SqlValue::Bytes(_)) => {
                return Err(self.conflict(col, "non-string cell appended to a text column"));
            }
        };
        Ok(())
    }

    /// Finalise the accumulated columns into a queryable `Table`. Always
    /// appends a hidden, dense `_auto_id` column after the user columns.
    ///
    /// `pool` must be the same `StringPool` passed to every `append_row`
    /// call on this builder — interned `StringId`s only resolve against it.
    pub fn finish(mut self, config: EngineConfig, pool: StringPool) -> Table {
        let row_count = self.row_count;
        let mut overlay_layers = vec![OverlaySpec::Identity];
        let mut columns = Vec::with_capacity(self.names.len() + 1);

        for (i, name) in std::mem::take(&mut self.names).into_iter().enumerate() {
            let state = std::mem::replace(&mut self.states[i], ColumnState::Int(Vec::new()));
            columns.push(finalize_column(name, state, row_count, &mut overlay_layers));
        }

        columns.push(Column {
            name: "_auto_id".to_string(),
            col_type: ColumnType::BigInt,
            flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL | ColumnFlags::HIDDEN,
            storage: ColumnStorage::Id { size: row_count },
            null_bitmap: None,
            overlay_slot: 0,
        });

        Table::new(row_count, columns, overlay_layers, indices_placeholder(), config, pool)
    }
}

/// Secondary indices are not inferred by the builder; a caller that wants
/// one builds it separately once the table's row order is final.
fn indices_placeholder() -> Vec<SecondaryIndex> {
    Vec::new()
}

fn is_non_decreasing(values: impl Iterator<Item = f64>) -> bool {
    let mut prev: Option<f64> = None;
    for v in values {
        if let Some(p) = prev {
            if v < p {
                return false;
            }
        }
        prev = Some(v);
    }
    true
}

fn finalize_column(
    name: String,
    state: ColumnState,
    row_count: u32,
    overlay_layers: &mut Vec<OverlaySpec>,
) -> Column {
    match state {
        ColumnState::LeadingNulls(n) => {
            debug_assert_eq!(n, row_count, "an all-null column must have seen no typed cell");
            Column {
                name,
                col_type: ColumnType::Int,
                flags: ColumnFlags::empty(),
                storage: ColumnStorage::Numeric {
                    data: NumericKind::I64(vec![0; row_count as usize]),
                    is_sorted: false,
                },
                null_bitmap: Some(BitVector::with_size(row_count as usize)),
                overlay_slot: 0,
            }
        }
        ColumnState::Int(v) => finalize_int_column(name, v, overlay_layers),
        ColumnState::NullInt(v) => {
            let is_sorted = is_non_decreasing(v.iter().flatten().map(|&x| x as f64));
            let mut null_bitmap = BitVector::with_size(v.len());
            let data: Vec<i64> = v
                .iter()
                .enumerate()
                .map(|(i, o)| {
                    if let Some(x) = o {
                        null_bitmap.set(i, true);
                        *x
                    } else {
                        0
                    }
                })
                .collect();
            Column {
                name,
                col_type: ColumnType::BigInt,
                flags: if is_sorted { ColumnFlags::SORTED } else { ColumnFlags::empty() },
                storage: ColumnStorage::Numeric {
                    data: NumericKind::I64(data),
                    is_sorted,
                },
                null_bitmap: Some(null_bitmap),
                overlay_slot: 0,
            }
        }
        ColumnState::Double(v) => {
            let is_sorted = is_non_decreasing(v.iter().copied());
            Column {
                name,
                col_type: ColumnType::Double,
                flags: ColumnFlags::NON_NULL | if is_sorted { ColumnFlags::SORTED } else { ColumnFlags::empty() },
                storage: ColumnStorage::Numeric {
                    data: NumericKind::F64(v),
                    is_sorted,
                },
                null_bitmap: None,
                overlay_slot: 0,
            }
        }
        ColumnState::NullDouble(v) => {
            let is_sorted = is_non_decreasing(v.iter().flatten().copied());
            let mut null_bitmap = BitVector::with_size(v.len());
            let data: Vec<f64> = v
                .iter()
                .enumerate()
                .map(|(i, o)| {
                    if let Some(x) = o {
                        null_bitmap.set(i, true);
                        *x
                    } else {
                        0.0
                    }
                })
                .collect();
            Column {
                name,
                col_type: ColumnType::Double,
                flags: if is_sorted { ColumnFlags::SORTED } else { ColumnFlags::empty() },
                storage: ColumnStorage::Numeric {
                    data: NumericKind::F64(data),
                    is_sorted,
                },
                null_bitmap: Some(null_bitmap),
                overlay_slot: 0,
            }
        }
        ColumnState::Str(v) => {
            let is_sorted = v.windows(2).all(|w| w[0] <= w[1]);
            Column {
                name,
                col_type: ColumnType::Text,
                flags: ColumnFlags::DENSE | if is_sorted { ColumnFlags::SORTED } else { ColumnFlags::empty() },
                storage: ColumnStorage::String(StringStorage {
                    data: v,
                    is_sorted,
                }),
                // Nulls are represented inline via `StringId::NULL` (§4.2);
                // no separate overlay is needed.
                null_bitmap: None,
                overlay_slot: 0,
            }
        }
    }
}

/// A non-null integer column may, on closer inspection, actually be an id
/// column (§4.9): strictly increasing, starting small, not too sparse.
fn finalize_int_column(name: String, v: Vec<i64>, overlay_layers: &mut Vec<OverlaySpec>) -> Column {
    let size = v.len() as u32;
    let strictly_increasing = v.windows(2).all(|w| w[0] < w[1]);
    let starts_small = v.first().is_some_and(|&x| x >= 0 && x < (1 << 20));
    let not_too_sparse = v.last().is_some_and(|&x| x >= 0 && (x as u64) < 64 * size.max(1) as u64);

    if strictly_increasing && starts_small && not_too_sparse && !v.is_empty() {
        let dense = v.iter().enumerate().all(|(i, &x)| x as u64 == i as u64);
        if dense {
            return Column {
                name,
                col_type: ColumnType::BigInt,
                flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL,
                storage: ColumnStorage::Id { size },
                null_bitmap: None,
                overlay_slot: 0,
            };
        }
        let universe = (v.last().copied().unwrap_or(0) + 1) as u32;
        let mut bv = BitVector::with_size(universe as usize);
        for &x in &v {
            bv.set(x as usize, true);
        }
        let slot = overlay_layers.len();
        overlay_layers.push(OverlaySpec::Selector(Rc::new(bv)));
        return Column {
            name,
            col_type: ColumnType::BigInt,
            flags: ColumnFlags::SORTED | ColumnFlags::NON_NULL,
            storage: ColumnStorage::Id { size: universe },
            null_bitmap: None,
            overlay_slot: slot,
        };
    }

    let is_sorted = v.windows(2).all(|w| w[0] <= w[1]);
    let _ = Monotonicity::NonMonotonic;
    Column {
        name,
        col_type: ColumnType::BigInt,
        flags: ColumnFlags::NON_NULL | if is_sorted { ColumnFlags::SORTED } else { ColumnFlags::empty() },
        storage: ColumnStorage::Numeric {
            data: NumericKind::I64(v),
            is_sorted,
        },
        null_bitmap: None,
        overlay_slot: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_nulls_promote_to_null_int() {
        let mut pool = StringPool::new();
        let mut b = RuntimeTableBuilder::new(vec!["x".into()]);
        b.append_row(&[SqlValue::Null], &mut pool).unwrap();
        b.append_row(&[SqlValue::Long(5)], &mut pool).unwrap();
        let table = b.finish(EngineConfig::default(), pool);
        assert_eq!(table.num_columns(), 2); // x + _auto_id
    }

    #[test]
    fn int_column_promotes_on_null() {
        let mut pool = StringPool::new();
        let mut b = RuntimeTableBuilder::new(vec!["x".into()]);
        b.append_row(&[SqlValue::Long(1)], &mut pool).unwrap();
        b.append_row(&[SqlValue::Null], &mut pool).unwrap();
        b.append_row(&[SqlValue::Long(3)], &mut pool).unwrap();
        let table = b.finish(EngineConfig::default(), pool);
        assert!(table.columns[0].is_nullable());
    }

    #[test]
    fn schema_conflict_on_string_into_int_column() {
        let mut pool = StringPool::new();
        let mut b = RuntimeTableBuilder::new(vec!["x".into()]);
        b.append_row(&[SqlValue::Long(1)], &mut pool).unwrap();
        let err = b.append_row(&[SqlValue::String("oops")], &mut pool);
        assert!(matches!(err, Err(EngineError::SchemaConflict { .. })));
    }

    #[test]
    fn dense_sequential_ints_become_id_column() {
        let mut pool = StringPool::new();
        let mut b = RuntimeTableBuilder::new(vec!["id".into()]);
        for i in 0..5i64 {
            b.append_row(&[SqlValue::Long(i)], &mut pool).unwrap();
        }
        let table = b.finish(EngineConfig::default(), pool);
        assert!(matches!(table.columns[0].storage, ColumnStorage::Id { size: 5 }));
    }

    #[test]
    fn sparse_increasing_ints_become_id_with_selector() {
        let mut pool = StringPool::new();
        let mut b = RuntimeTableBuilder::new(vec!["id".into()]);
        for i in [0i64, 2, 4, 10] {
            b.append_row(&[SqlValue::Long(i)], &mut pool).unwrap();
        }
        let table = b.finish(EngineConfig::default(), pool);
        assert!(matches!(table.columns[0].storage, ColumnStorage::Id { .. }));
        assert_ne!(table.columns[0].overlay_slot, 0);
    }

    #[test]
    fn auto_id_always_present_and_hidden() {
        let mut pool = StringPool::new();
        let mut b = RuntimeTableBuilder::new(vec!["a".into()]);
        b.append_row(&[SqlValue::Long(1)], &mut pool).unwrap();
        let table = b.finish(EngineConfig::default(), pool);
        let auto = table.columns.last().unwrap();
        assert_eq!(auto.name, "_auto_id");
        assert!(auto.flags.contains(ColumnFlags::HIDDEN));
    }
}
