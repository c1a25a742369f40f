//! Terminal storage layers: the bottom of every chain. See SPEC_FULL.md §4.2.

use super::{
    distinct_by_value, min_max_by_value, stable_sort_by_value, FilterOp, RangeOrBitVector,
    SearchValidation, SingleSearchResult,
};
use crate::bitvec::BitVector;
use crate::config::EngineConfig;
use crate::string_pool::{StringId, StringPool};
use crate::token::{OrderedIndices, Token, TokenVec};
use crate::value::SqlValue;

/// `val.is_null()` handling shared by `Id`/`Numeric`/`SetId` storage:
/// `IsNull`/`IsNotNull` are only ever paired with a `Null` RHS by the
/// parser; any other op with a `Null` RHS also yields `NoRowsMatch`.
/// Returns `None` if `val` is not null, meaning the caller should continue
/// validating the op/value pair itself.
fn validate_null_rhs(op: FilterOp, val: SqlValue) -> Option<SearchValidation> {
    if val.is_null() {
        return Some(if op == FilterOp::IsNotNull {
            SearchValidation::AllRowsMatch
        } else {
            SearchValidation::NoRowsMatch
        });
    }
    debug_assert!(
        op != FilterOp::IsNull && op != FilterOp::IsNotNull,
        "IsNull/IsNotNull must be paired with a Null RHS"
    );
    None
}

/// Binary search helper: `lower_bound`/`upper_bound` equivalent over a
/// slice restricted to `[range.0, range.1)`, comparing via `key_of`.
fn lower_bound<T, K: PartialOrd>(data: &[T], range: (u32, u32), target: &K, key_of: impl Fn(&T) -> K) -> u32 {
    let (mut lo, mut hi) = (range.0 as usize, range.1 as usize);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if key_of(&data[mid]) < *target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo as u32
}

fn upper_bound<T, K: PartialOrd>(data: &[T], range: (u32, u32), target: &K, key_of: impl Fn(&T) -> K) -> u32 {
    let (mut lo, mut hi) = (range.0 as usize, range.1 as usize);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if key_of(&data[mid]) <= *target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo as u32
}

// ---------------------------------------------------------------------
// Id storage
// ---------------------------------------------------------------------

/// Notionally holds every `u32` in `[0, u32::MAX)`; `get(i) = i`.
#[derive(Debug, Clone)]
pub struct IdStorage {
    /// Logical size; bounded only by a containing overlay in practice, but
    /// a concrete table always needs a concrete bound.
    pub size: u32,
}

impl IdStorage {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn single_search(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        row: u32,
    ) -> SingleSearchResult {
        match self.validate_search_constraints(op, val) {
            SearchValidation::AllRowsMatch => return SingleSearchResult::Match,
            SearchValidation::NoRowsMatch => return SingleSearchResult::NoMatch,
            SearchValidation::Ok => {}
        }
        let SqlValue::Long(v) = val else {
            return SingleSearchResult::NeedsFullSearch;
        };
        if v < 0 {
            return SingleSearchResult::NoMatch;
        }
        let row = row as i64;
        let matches = match op {
            FilterOp::Eq => row == v,
            FilterOp::Ne => row != v,
            FilterOp::Lt => row < v,
            FilterOp::Le => row <= v,
            FilterOp::Gt => row > v,
            FilterOp::Ge => row >= v,
            _ => return SingleSearchResult::NeedsFullSearch,
        };
        if matches {
            SingleSearchResult::Match
        } else {
            SingleSearchResult::NoMatch
        }
    }

    pub fn validate_search_constraints(&self, op: FilterOp, val: SqlValue) -> SearchValidation {
        if let Some(r) = validate_null_rhs(op, val) {
            return r;
        }
        match op {
            FilterOp::Glob | FilterOp::Regex => return SearchValidation::NoRowsMatch,
            _ => {}
        }
        match val {
            SqlValue::String(_) => {
                if matches!(op, FilterOp::Lt | FilterOp::Le) {
                    SearchValidation::AllRowsMatch
                } else {
                    SearchValidation::NoRowsMatch
                }
            }
            SqlValue::Bytes(_) => SearchValidation::NoRowsMatch,
            SqlValue::Long(v) => {
                if v > u32::MAX as i64 {
                    if matches!(op, FilterOp::Lt | FilterOp::Le | FilterOp::Ne) {
                        SearchValidation::AllRowsMatch
                    } else {
                        SearchValidation::NoRowsMatch
                    }
                } else if v < 0 {
                    if matches!(op, FilterOp::Gt | FilterOp::Ge | FilterOp::Ne) {
                        SearchValidation::AllRowsMatch
                    } else {
                        SearchValidation::NoRowsMatch
                    }
                } else {
                    SearchValidation::Ok
                }
            }
            SqlValue::Double(d) => {
                if d > u32::MAX as f64 {
                    if matches!(op, FilterOp::Lt | FilterOp::Le | FilterOp::Ne) {
                        SearchValidation::AllRowsMatch
                    } else {
                        SearchValidation::NoRowsMatch
                    }
                } else if d < 0.0 {
                    if matches!(op, FilterOp::Gt | FilterOp::Ge | FilterOp::Ne) {
                        SearchValidation::AllRowsMatch
                    } else {
                        SearchValidation::NoRowsMatch
                    }
                } else {
                    SearchValidation::Ok
                }
            }
            SqlValue::Null => unreachable!("handled by validate_null_rhs"),
        }
    }

    /// Fold a double RHS to the equivalent integer constraint, per
    /// SPEC_FULL.md §4.2 ("Doubles that are not integer-representable fold
    /// to range-shifts"), mirroring `int_column_with_double`. A non-integer
    /// `Eq`/`Ne` RHS can never equal any row (ids are integers), so those
    /// resolve directly to the fixed `SearchValidation` outcome rather than
    /// truncating.
    fn double_to_long(op: FilterOp, d: f64) -> Result<(FilterOp, i64), SearchValidation> {
        let truncated = d as i64;
        if truncated as f64 == d {
            return Ok((op, truncated));
        }
        match op {
            FilterOp::Eq => Err(SearchValidation::NoRowsMatch),
            FilterOp::Ne => Err(SearchValidation::AllRowsMatch),
            FilterOp::Lt | FilterOp::Ge => Ok((op, d.ceil() as i64)),
            FilterOp::Le | FilterOp::Gt => Ok((op, d.floor() as i64)),
            _ => unreachable!("validated away"),
        }
    }

    pub fn search_validated(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        range: (u32, u32),
    ) -> RangeOrBitVector {
        let (op, v) = match val {
            SqlValue::Long(v) => (op, v),
            SqlValue::Double(d) => match Self::double_to_long(op, d) {
                Ok(ov) => ov,
                Err(SearchValidation::AllRowsMatch) => return RangeOrBitVector::Range(range.0, range.1),
                Err(_) => return RangeOrBitVector::Range(range.0, range.0),
            },
            _ => unreachable!("validated away"),
        };
        let (start, end) = range;
        match op {
            FilterOp::Eq => {
                if v < start as i64 || v >= end as i64 {
                    RangeOrBitVector::Range(start, start)
                } else {
                    RangeOrBitVector::Range(v as u32, v as u32 + 1)
                }
            }
            FilterOp::Le => RangeOrBitVector::Range(start, ((v + 1).clamp(start as i64, end as i64)) as u32),
            FilterOp::Lt => RangeOrBitVector::Range(start, (v.clamp(start as i64, end as i64)) as u32),
            FilterOp::Ge => RangeOrBitVector::Range((v.clamp(start as i64, end as i64)) as u32, end),
            FilterOp::Gt => RangeOrBitVector::Range(((v + 1).clamp(start as i64, end as i64)) as u32, end),
            FilterOp::Ne => {
                if v < start as i64 || v >= end as i64 {
                    RangeOrBitVector::Range(start, end)
                } else {
                    RangeOrBitVector::BitVector(BitVector::range_minus_subrange(
                        end as usize,
                        (start as usize, end as usize),
                        (v as usize, v as usize + 1),
                    ))
                }
            }
            _ => unreachable!("validated away"),
        }
    }

    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        _cfg: &EngineConfig,
    ) {
        indices.retain(|t| self.single_search(pool, op, val, t.index) == SingleSearchResult::Match);
    }

    pub fn ordered_index_search_validated(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        ordered: OrderedIndices,
    ) -> (u32, u32) {
        let v = val.as_long();
        let data = ordered.indices;
        let lo = lower_bound(data, (0, data.len() as u32), &v, |x| *x as i64);
        let hi = upper_bound(data, (0, data.len() as u32), &v, |x| *x as i64);
        match op {
            FilterOp::Eq => (lo, hi),
            FilterOp::Lt => (0, lo),
            FilterOp::Le => (0, hi),
            FilterOp::Ge => (lo, data.len() as u32),
            FilterOp::Gt => (hi, data.len() as u32),
            _ => unreachable!("not supported for ordered index search"),
        }
    }

    pub fn stable_sort(&self, _pool: &StringPool, tokens: &mut Vec<Token>, desc: bool) {
        if desc {
            tokens.sort_by(|a, b| b.index.cmp(&a.index));
        } else {
            tokens.sort_by(|a, b| a.index.cmp(&b.index));
        }
    }

    pub fn distinct(&self, _pool: &StringPool, indices: &mut TokenVec) {
        // The id storage is, by construction, injective: every row already
        // has a distinct value, so there is nothing to remove.
        let _ = indices;
    }

    pub fn min_element(&self, _pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        indices.tokens.iter().copied().min_by_key(|t| t.index)
    }

    pub fn max_element(&self, _pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        indices.tokens.iter().copied().max_by_key(|t| t.index)
    }

    pub fn get_slow<'p>(&self, _pool: &'p StringPool, index: u32) -> SqlValue<'p> {
        SqlValue::Long(index as i64)
    }
}

// ---------------------------------------------------------------------
// Numeric storage
// ---------------------------------------------------------------------

/// The concrete vector backing a [`NumericStorage`].
#[derive(Debug, Clone)]
pub enum NumericKind {
    /// `i32` column.
    I32(Vec<i32>),
    /// `u32` column.
    U32(Vec<u32>),
    /// `i64` column.
    I64(Vec<i64>),
    /// `f64` column.
    F64(Vec<f64>),
}

impl NumericKind {
    fn len(&self) -> usize {
        match self {
            NumericKind::I32(v) => v.len(),
            NumericKind::U32(v) => v.len(),
            NumericKind::I64(v) => v.len(),
            NumericKind::F64(v) => v.len(),
        }
    }

    fn is_double(&self) -> bool {
        matches!(self, NumericKind::F64(_))
    }

    fn at(&self, i: u32) -> SqlValue<'static> {
        match self {
            NumericKind::I32(v) => SqlValue::Long(v[i as usize] as i64),
            NumericKind::U32(v) => SqlValue::Long(v[i as usize] as i64),
            NumericKind::I64(v) => SqlValue::Long(v[i as usize]),
            NumericKind::F64(v) => SqlValue::Double(v[i as usize]),
        }
    }

    fn as_f64(&self, i: u32) -> f64 {
        match self {
            NumericKind::I32(v) => v[i as usize] as f64,
            NumericKind::U32(v) => v[i as usize] as f64,
            NumericKind::I64(v) => v[i as usize] as f64,
            NumericKind::F64(v) => v[i as usize],
        }
    }

    /// `(min, max)` representable by this kind, as `f64`, for bounds
    /// checking a constraint RHS (§4.2 "out-of-range value").
    fn bounds(&self) -> (f64, f64) {
        match self {
            NumericKind::I32(_) => (i32::MIN as f64, i32::MAX as f64),
            NumericKind::U32(_) => (u32::MIN as f64, u32::MAX as f64),
            NumericKind::I64(_) | NumericKind::F64(_) => (f64::MIN, f64::MAX),
        }
    }
}

/// A vector of `T ∈ {i32, u32, i64, f64}` with an `is_sorted` hint.
/// See SPEC_FULL.md §3, §4.2.
#[derive(Debug, Clone)]
pub struct NumericStorage {
    /// The backing vector.
    pub data: NumericKind,
    /// Whether the vector is non-decreasing. A hint: true must be truthful,
    /// but false is always a safe (if slower) answer.
    pub is_sorted: bool,
}

/// Rewrites an `Eq`/`Ne`/monotonic comparison against an int column when
/// the RHS is a non-integer double (§4.2 `int_column_with_double`).
/// Returns `None` if the comparison is already resolved to a fixed
/// validation outcome (value baked into the returned `SearchValidation`).
fn int_column_with_double(op: FilterOp, d: f64) -> Result<(FilterOp, i64), SearchValidation> {
    let truncated = d as i64;
    if truncated as f64 == d {
        return Ok((op, truncated));
    }
    match op {
        FilterOp::Eq => Err(SearchValidation::NoRowsMatch),
        FilterOp::Ne => Err(SearchValidation::AllRowsMatch),
        FilterOp::Le | FilterOp::Gt => Ok((op, d.floor() as i64)),
        FilterOp::Lt | FilterOp::Ge => Ok((op, d.ceil() as i64)),
        _ => unreachable!(),
    }
}

/// Rewrites a comparison against a double column when the RHS is an
/// integer outside `f64`'s exactly-representable range (§4.2
/// `double_column_with_int`).
fn double_column_with_int(op: FilterOp, i: i64) -> Result<(FilterOp, f64), SearchValidation> {
    let as_d = i as f64;
    if as_d as i64 == i {
        return Ok((op, as_d));
    }
    match op {
        FilterOp::Eq => Err(SearchValidation::NoRowsMatch),
        FilterOp::Ne => Err(SearchValidation::AllRowsMatch),
        FilterOp::Le | FilterOp::Gt => Ok((op, next_after(as_d, as_d - 1.0))),
        FilterOp::Lt | FilterOp::Ge => Ok((op, next_after(as_d, as_d + 1.0))),
        _ => unreachable!(),
    }
}

fn next_after(from: f64, towards: f64) -> f64 {
    if from == towards || from.is_nan() || towards.is_nan() {
        return from;
    }
    let bits = from.to_bits();
    let next_bits = if (towards > from) == (from >= 0.0) {
        bits + 1
    } else {
        bits.wrapping_sub(1)
    };
    f64::from_bits(next_bits)
}

impl NumericStorage {
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn validate_search_constraints(&self, op: FilterOp, val: SqlValue) -> SearchValidation {
        if let Some(r) = validate_null_rhs(op, val) {
            return r;
        }
        if matches!(op, FilterOp::Glob | FilterOp::Regex) {
            return SearchValidation::NoRowsMatch;
        }
        let num_val = match val {
            SqlValue::Long(v) => v as f64,
            SqlValue::Double(d) => d,
            SqlValue::String(_) => {
                return if matches!(op, FilterOp::Lt | FilterOp::Le) {
                    SearchValidation::AllRowsMatch
                } else {
                    SearchValidation::NoRowsMatch
                };
            }
            SqlValue::Bytes(_) => return SearchValidation::NoRowsMatch,
            SqlValue::Null => unreachable!(),
        };
        let (min, max) = self.data.bounds();
        if num_val > max {
            return if matches!(op, FilterOp::Lt | FilterOp::Le | FilterOp::Ne) {
                SearchValidation::AllRowsMatch
            } else {
                SearchValidation::NoRowsMatch
            };
        }
        if num_val < min {
            return if matches!(op, FilterOp::Gt | FilterOp::Ge | FilterOp::Ne) {
                SearchValidation::AllRowsMatch
            } else {
                SearchValidation::NoRowsMatch
            };
        }
        SearchValidation::Ok
    }

    pub fn single_search(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        row: u32,
    ) -> SingleSearchResult {
        match self.validate_search_constraints(op, val) {
            SearchValidation::AllRowsMatch => return SingleSearchResult::Match,
            SearchValidation::NoRowsMatch => return SingleSearchResult::NoMatch,
            SearchValidation::Ok => {}
        }
        let _ = pool;
        let cur = self.data.at(row);
        let ord = super::compare_values(cur, val);
        let matches = match op {
            FilterOp::Eq => ord == std::cmp::Ordering::Equal,
            FilterOp::Ne => ord != std::cmp::Ordering::Equal,
            FilterOp::Lt => ord == std::cmp::Ordering::Less,
            FilterOp::Le => ord != std::cmp::Ordering::Greater,
            FilterOp::Ge => ord != std::cmp::Ordering::Less,
            FilterOp::Gt => ord == std::cmp::Ordering::Greater,
            _ => return SingleSearchResult::NeedsFullSearch,
        };
        if matches {
            SingleSearchResult::Match
        } else {
            SingleSearchResult::NoMatch
        }
    }

    pub fn search_validated(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        range: (u32, u32),
    ) -> RangeOrBitVector {
        // Mismatched-type rewrites (§4.2).
        let rewritten = match (val, self.data.is_double()) {
            (SqlValue::Double(d), false) => match int_column_with_double(op, d) {
                Ok((op2, v)) => Some((op2, Val::Long(v))),
                Err(validation) => {
                    return match validation {
                        SearchValidation::AllRowsMatch => RangeOrBitVector::Range(range.0, range.1),
                        _ => RangeOrBitVector::Range(range.0, range.0),
                    };
                }
            },
            (SqlValue::Long(i), true) => match double_column_with_int(op, i) {
                Ok((op2, v)) => Some((op2, Val::Double(v))),
                Err(validation) => {
                    return match validation {
                        SearchValidation::AllRowsMatch => RangeOrBitVector::Range(range.0, range.1),
                        _ => RangeOrBitVector::Range(range.0, range.0),
                    };
                }
            },
            _ => None,
        };
        let (op, val) = match rewritten {
            Some((op, Val::Long(v))) => (op, v as f64),
            Some((op, Val::Double(v))) => (op, v),
            None => (op, val.as_double()),
        };

        if self.is_sorted {
            if op != FilterOp::Ne {
                let (lo, hi) = self.binary_range(op, val, range);
                return RangeOrBitVector::Range(lo, hi);
            }
            let (lo, hi) = self.binary_range(FilterOp::Eq, val, range);
            return RangeOrBitVector::BitVector(BitVector::range_minus_subrange(
                range.1 as usize,
                (range.0 as usize, range.1 as usize),
                (lo as usize, hi as usize),
            ));
        }

        // Unsorted: linear scan building a bitvector of length range.1.
        let mut bv = BitVector::with_size(range.1 as usize);
        for i in range.0..range.1 {
            let cur = self.data.as_f64(i);
            let matches = match op {
                FilterOp::Eq => cur == val,
                FilterOp::Ne => cur != val,
                FilterOp::Lt => cur < val,
                FilterOp::Le => cur <= val,
                FilterOp::Gt => cur > val,
                FilterOp::Ge => cur >= val,
                _ => unreachable!(),
            };
            if matches {
                bv.set(i as usize, true);
            }
        }
        RangeOrBitVector::BitVector(bv)
    }

    /// Binary search `[range.0, range.1)` for the effective range matching
    /// `op` against `val` (already resolved to `f64`). Only called when
    /// `is_sorted`.
    fn binary_range(&self, op: FilterOp, val: f64, range: (u32, u32)) -> (u32, u32) {
        let lo = lower_bound_f64(&self.data, range, val);
        let hi = upper_bound_f64(&self.data, range, val);
        match op {
            FilterOp::Eq => (lo, hi),
            FilterOp::Lt => (range.0, lo),
            FilterOp::Le => (range.0, hi),
            FilterOp::Ge => (lo, range.1),
            FilterOp::Gt => (hi, range.1),
            _ => unreachable!(),
        }
    }

    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        _cfg: &EngineConfig,
    ) {
        indices.retain(|t| self.single_search(pool, op, val, t.index) == SingleSearchResult::Match);
    }

    pub fn ordered_index_search_validated(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        ordered: OrderedIndices,
    ) -> (u32, u32) {
        let target = val.as_double();
        let data = ordered.indices;
        let n = data.len() as u32;
        let lo = lower_bound(data, (0, n), &target, |i| self.data.as_f64(*i));
        let hi = upper_bound(data, (0, n), &target, |i| self.data.as_f64(*i));
        match op {
            FilterOp::Eq => (lo, hi),
            FilterOp::Lt => (0, lo),
            FilterOp::Le => (0, hi),
            FilterOp::Ge => (lo, n),
            FilterOp::Gt => (hi, n),
            _ => unreachable!("not supported for ordered index search"),
        }
    }

    pub fn stable_sort(&self, _pool: &StringPool, tokens: &mut Vec<Token>, desc: bool) {
        stable_sort_by_value(tokens, desc, |i| self.data.at(i));
    }

    pub fn distinct(&self, _pool: &StringPool, indices: &mut TokenVec) {
        distinct_by_value(indices, |i| self.data.at(i));
    }

    pub fn min_element(&self, _pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.data.at(i), false)
    }

    pub fn max_element(&self, _pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.data.at(i), true)
    }

    pub fn get_slow<'p>(&self, _pool: &'p StringPool, index: u32) -> SqlValue<'p> {
        self.data.at(index)
    }
}

enum Val {
    Long(i64),
    Double(f64),
}

fn lower_bound_f64(data: &NumericKind, range: (u32, u32), target: f64) -> u32 {
    let (mut lo, mut hi) = range;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if data.as_f64(mid) < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

fn upper_bound_f64(data: &NumericKind, range: (u32, u32), target: f64) -> u32 {
    let (mut lo, mut hi) = range;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if data.as_f64(mid) <= target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

// ---------------------------------------------------------------------
// String storage
// ---------------------------------------------------------------------

/// A vector of interned string ids. `is_sorted` refers to lexicographic
/// order by resolved string, with `Null` (`StringId::NULL`) sorting as
/// smallest. See SPEC_FULL.md §4.2.
#[derive(Debug, Clone)]
pub struct StringStorage {
    /// The interned ids, one per row.
    pub data: Vec<StringId>,
    /// Whether `data`, resolved through the pool, is non-decreasing.
    pub is_sorted: bool,
}

impl StringStorage {
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn resolve<'p>(&self, pool: &'p StringPool, i: u32) -> SqlValue<'p> {
        match pool.get(self.data[i as usize]) {
            Some(s) => SqlValue::String(s),
            None => SqlValue::Null,
        }
    }

    pub fn validate_search_constraints(&self, op: FilterOp, val: SqlValue) -> SearchValidation {
        if let Some(r) = validate_null_rhs(op, val) {
            return r;
        }
        match val {
            SqlValue::String(pattern) => {
                if op == FilterOp::Regex {
                    #[cfg(feature = "regex")]
                    {
                        if regex::Regex::new(pattern).is_err() {
                            // Reported as a hard error by the caller before the
                            // chain is ever reached; validation alone can only
                            // say "no rows" here as a defensive fallback.
                            return SearchValidation::NoRowsMatch;
                        }
                    }
                    #[cfg(not(feature = "regex"))]
                    {
                        let _ = pattern;
                        return SearchValidation::NoRowsMatch;
                    }
                }
                SearchValidation::Ok
            }
            SqlValue::Long(_) | SqlValue::Double(_) => {
                // Any string is greater than any numeric in this dialect.
                if matches!(op, FilterOp::Gt | FilterOp::Ge) {
                    SearchValidation::AllRowsMatch
                } else if matches!(op, FilterOp::Lt | FilterOp::Le) {
                    SearchValidation::NoRowsMatch
                } else {
                    SearchValidation::NoRowsMatch
                }
            }
            SqlValue::Bytes(_) => SearchValidation::NoRowsMatch,
            SqlValue::Null => unreachable!(),
        }
    }

    pub fn single_search(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        row: u32,
    ) -> SingleSearchResult {
        match self.validate_search_constraints(op, val) {
            SearchValidation::AllRowsMatch => return SingleSearchResult::Match,
            SearchValidation::NoRowsMatch => return SingleSearchResult::NoMatch,
            SearchValidation::Ok => {}
        }
        let cur = self.resolve(pool, row);
        let matches = match op {
            FilterOp::Eq => super::compare_values(cur, val) == std::cmp::Ordering::Equal,
            FilterOp::Ne => super::compare_values(cur, val) != std::cmp::Ordering::Equal,
            FilterOp::Lt => super::compare_values(cur, val) == std::cmp::Ordering::Less,
            FilterOp::Le => super::compare_values(cur, val) != std::cmp::Ordering::Greater,
            FilterOp::Gt => super::compare_values(cur, val) == std::cmp::Ordering::Greater,
            FilterOp::Ge => super::compare_values(cur, val) != std::cmp::Ordering::Less,
            FilterOp::Glob => match cur {
                SqlValue::String(s) => glob_match(val.as_str(), s),
                _ => false,
            },
            #[cfg(feature = "regex")]
            FilterOp::Regex => match (regex::Regex::new(val.as_str()), cur) {
                (Ok(re), SqlValue::String(s)) => re.is_match(s),
                _ => false,
            },
            #[cfg(not(feature = "regex"))]
            FilterOp::Regex => false,
            _ => return SingleSearchResult::NeedsFullSearch,
        };
        if matches {
            SingleSearchResult::Match
        } else {
            SingleSearchResult::NoMatch
        }
    }

    pub fn search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        range: (u32, u32),
    ) -> RangeOrBitVector {
        // Glob/Regex always scan linearly, as do unsorted comparisons.
        if matches!(op, FilterOp::Glob | FilterOp::Regex) || !self.is_sorted {
            let mut bv = BitVector::with_size(range.1 as usize);
            for i in range.0..range.1 {
                if self.single_search(pool, op, val, i) == SingleSearchResult::Match {
                    bv.set(i as usize, true);
                }
            }
            return RangeOrBitVector::BitVector(bv);
        }
        let lo = lower_bound(&self.data, range, &val, |id| self.resolve_key(pool, *id));
        let hi = upper_bound(&self.data, range, &val, |id| self.resolve_key(pool, *id));
        match op {
            FilterOp::Eq => RangeOrBitVector::Range(lo, hi),
            FilterOp::Lt => RangeOrBitVector::Range(range.0, lo),
            FilterOp::Le => RangeOrBitVector::Range(range.0, hi),
            FilterOp::Ge => RangeOrBitVector::Range(lo, range.1),
            FilterOp::Gt => RangeOrBitVector::Range(hi, range.1),
            FilterOp::Ne => RangeOrBitVector::BitVector(BitVector::range_minus_subrange(
                range.1 as usize,
                (range.0 as usize, range.1 as usize),
                (lo as usize, hi as usize),
            )),
            _ => unreachable!(),
        }
    }

    fn resolve_key<'p>(&self, pool: &'p StringPool, id: StringId) -> SqlValue<'p> {
        match pool.get(id) {
            Some(s) => SqlValue::String(s),
            None => SqlValue::Null,
        }
    }

    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        _cfg: &EngineConfig,
    ) {
        indices.retain(|t| self.single_search(pool, op, val, t.index) == SingleSearchResult::Match);
    }

    pub fn ordered_index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        ordered: OrderedIndices,
    ) -> (u32, u32) {
        let data = ordered.indices;
        let n = data.len() as u32;
        let lo = lower_bound(data, (0, n), &val, |i| self.resolve(pool, *i));
        let hi = upper_bound(data, (0, n), &val, |i| self.resolve(pool, *i));
        match op {
            FilterOp::Eq => (lo, hi),
            FilterOp::Lt => (0, lo),
            FilterOp::Le => (0, hi),
            FilterOp::Ge => (lo, n),
            FilterOp::Gt => (hi, n),
            _ => unreachable!("not supported for ordered index search"),
        }
    }

    pub fn stable_sort(&self, pool: &StringPool, tokens: &mut Vec<Token>, desc: bool) {
        stable_sort_by_value(tokens, desc, |i| self.resolve(pool, i));
    }

    pub fn distinct(&self, pool: &StringPool, indices: &mut TokenVec) {
        distinct_by_value(indices, |i| self.resolve(pool, i));
    }

    pub fn min_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.resolve(pool, i), false)
    }

    pub fn max_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| self.resolve(pool, i), true)
    }

    pub fn get_slow<'p>(&self, pool: &'p StringPool, index: u32) -> SqlValue<'p> {
        self.resolve(pool, index)
    }
}

/// Minimal SQL `GLOB` matcher (`*` any run, `?` any one char, `[...]`
/// character classes are not supported — this dialect's GLOB is the
/// shell-style subset the host actually uses).
fn glob_match(pattern: &str, text: &str) -> bool {
    fn rec(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => rec(&p[1..], t) || (!t.is_empty() && rec(p, &t[1..])),
            (Some(b'?'), Some(_)) => rec(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => rec(&p[1..], &t[1..]),
            _ => false,
        }
    }
    rec(pattern.as_bytes(), text.as_bytes())
}

// ---------------------------------------------------------------------
// Set-id storage
// ---------------------------------------------------------------------

/// A sorted, monotonic-non-strict `Vec<u32>` where `data[i] <= i` and the
/// first occurrence of `v` is at index `v`. See SPEC_FULL.md §3, §4.2.
#[derive(Debug, Clone)]
pub struct SetIdStorage {
    /// The encoded values.
    pub data: Vec<u32>,
}

impl SetIdStorage {
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// `Eq(v)`'s matching range within `[0, size)`, or `None` if `v` has no
    /// occurrences.
    fn eq_range(&self, v: u32) -> Option<(u32, u32)> {
        let v_usize = v as usize;
        if v_usize >= self.data.len() || self.data[v_usize] != v {
            return None;
        }
        let mut hi = v_usize + 1;
        while hi < self.data.len() && self.data[hi] == v {
            hi += 1;
        }
        Some((v, hi as u32))
    }

    pub fn validate_search_constraints(&self, op: FilterOp, val: SqlValue) -> SearchValidation {
        if let Some(r) = validate_null_rhs(op, val) {
            return r;
        }
        if matches!(op, FilterOp::Glob | FilterOp::Regex) {
            return SearchValidation::NoRowsMatch;
        }
        match val {
            SqlValue::Long(v) if v >= 0 => SearchValidation::Ok,
            SqlValue::Long(_) => {
                if matches!(op, FilterOp::Gt | FilterOp::Ge | FilterOp::Ne) {
                    SearchValidation::AllRowsMatch
                } else {
                    SearchValidation::NoRowsMatch
                }
            }
            SqlValue::Double(d) => {
                if d.fract() == 0.0 && d >= 0.0 {
                    SearchValidation::Ok
                } else if d < 0.0 {
                    if matches!(op, FilterOp::Gt | FilterOp::Ge | FilterOp::Ne) {
                        SearchValidation::AllRowsMatch
                    } else {
                        SearchValidation::NoRowsMatch
                    }
                } else {
                    SearchValidation::Ok
                }
            }
            SqlValue::String(_) => {
                if matches!(op, FilterOp::Lt | FilterOp::Le) {
                    SearchValidation::AllRowsMatch
                } else {
                    SearchValidation::NoRowsMatch
                }
            }
            SqlValue::Bytes(_) => SearchValidation::NoRowsMatch,
            SqlValue::Null => unreachable!(),
        }
    }

    pub fn single_search(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        row: u32,
    ) -> SingleSearchResult {
        match self.validate_search_constraints(op, val) {
            SearchValidation::AllRowsMatch => return SingleSearchResult::Match,
            SearchValidation::NoRowsMatch => return SingleSearchResult::NoMatch,
            SearchValidation::Ok => {}
        }
        let cur = self.data[row as usize] as i64;
        let v = val.as_double() as i64;
        let matches = match op {
            FilterOp::Eq => cur == v,
            FilterOp::Ne => cur != v,
            FilterOp::Lt => cur < v,
            FilterOp::Le => cur <= v,
            FilterOp::Gt => cur > v,
            FilterOp::Ge => cur >= v,
            _ => return SingleSearchResult::NeedsFullSearch,
        };
        if matches {
            SingleSearchResult::Match
        } else {
            SingleSearchResult::NoMatch
        }
    }

    pub fn search_validated(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        range: (u32, u32),
    ) -> RangeOrBitVector {
        let v = val.as_double() as i64;
        if v < 0 || v > u32::MAX as i64 {
            // Already resolved by validate_search_constraints in practice.
            return RangeOrBitVector::Range(range.0, range.0);
        }
        let v = v as u32;
        match op {
            FilterOp::Eq => match self.eq_range(v) {
                Some((s, e)) => RangeOrBitVector::Range(s.max(range.0), e.min(range.1)),
                None => RangeOrBitVector::Range(range.0, range.0),
            },
            FilterOp::Ne => {
                let (s, e) = self.eq_range(v).unwrap_or((0, 0));
                RangeOrBitVector::BitVector(BitVector::range_minus_subrange(
                    range.1 as usize,
                    (range.0 as usize, range.1 as usize),
                    (s.max(range.0) as usize, e.min(range.1) as usize),
                ))
            }
            FilterOp::Lt => {
                let lo = lower_bound(&self.data, range, &v, |x| *x);
                RangeOrBitVector::Range(range.0, lo)
            }
            FilterOp::Le => {
                let hi = upper_bound(&self.data, range, &v, |x| *x);
                RangeOrBitVector::Range(range.0, hi)
            }
            FilterOp::Ge => {
                let lo = lower_bound(&self.data, range, &v, |x| *x);
                RangeOrBitVector::Range(lo, range.1)
            }
            FilterOp::Gt => {
                let hi = upper_bound(&self.data, range, &v, |x| *x);
                RangeOrBitVector::Range(hi, range.1)
            }
            _ => unreachable!(),
        }
    }

    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        _cfg: &EngineConfig,
    ) {
        indices.retain(|t| self.single_search(pool, op, val, t.index) == SingleSearchResult::Match);
    }

    pub fn ordered_index_search_validated(
        &self,
        _pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        ordered: OrderedIndices,
    ) -> (u32, u32) {
        let target = val.as_double() as i64 as u32;
        let data = ordered.indices;
        let n = data.len() as u32;
        let lo = lower_bound(data, (0, n), &target, |i| self.data[*i as usize]);
        let hi = upper_bound(data, (0, n), &target, |i| self.data[*i as usize]);
        match op {
            FilterOp::Eq => (lo, hi),
            FilterOp::Lt => (0, lo),
            FilterOp::Le => (0, hi),
            FilterOp::Ge => (lo, n),
            FilterOp::Gt => (hi, n),
            _ => unreachable!("not supported for ordered index search"),
        }
    }

    pub fn stable_sort(&self, _pool: &StringPool, tokens: &mut Vec<Token>, desc: bool) {
        stable_sort_by_value(tokens, desc, |i| SqlValue::Long(self.data[i as usize] as i64));
    }

    pub fn distinct(&self, _pool: &StringPool, indices: &mut TokenVec) {
        distinct_by_value(indices, |i| SqlValue::Long(self.data[i as usize] as i64));
    }

    pub fn min_element(&self, _pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| SqlValue::Long(self.data[i as usize] as i64), false)
    }

    pub fn max_element(&self, _pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        min_max_by_value(indices, |i| SqlValue::Long(self.data[i as usize] as i64), true)
    }

    pub fn get_slow<'p>(&self, _pool: &'p StringPool, index: u32) -> SqlValue<'p> {
        SqlValue::Long(self.data[index as usize] as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_id_eq_and_ne() {
        let s = SetIdStorage {
            data: vec![0, 0, 0, 3, 3, 5, 6, 6, 7],
        };
        let pool = StringPool::new();
        match s.search_validated(&pool, FilterOp::Eq, SqlValue::Long(3), (0, 9)) {
            RangeOrBitVector::Range(a, b) => assert_eq!((a, b), (3, 5)),
            _ => panic!("expected range"),
        }
        match s.search_validated(&pool, FilterOp::Eq, SqlValue::Long(4), (0, 9)) {
            RangeOrBitVector::Range(a, b) => assert_eq!(a, b),
            _ => panic!("expected empty range"),
        }
    }

    #[test]
    fn numeric_sorted_binary_search() {
        let s = NumericStorage {
            data: NumericKind::I64(vec![1, 3, 3, 5, 9]),
            is_sorted: true,
        };
        let pool = StringPool::new();
        match s.search_validated(&pool, FilterOp::Eq, SqlValue::Long(3), (0, 5)) {
            RangeOrBitVector::Range(a, b) => assert_eq!((a, b), (1, 3)),
            _ => panic!(),
        }
    }

    #[test]
    fn numeric_unsorted_linear_scan() {
        let s = NumericStorage {
            data: NumericKind::I64(vec![5, 3, 8, 1, 7]),
            is_sorted: false,
        };
        let pool = StringPool::new();
        match s.search_validated(&pool, FilterOp::Gt, SqlValue::Long(4), (0, 5)) {
            RangeOrBitVector::BitVector(bv) => {
                assert_eq!(bv.set_bit_indices().collect::<Vec<_>>(), vec![0, 2, 4])
            }
            _ => panic!(),
        }
    }

    #[test]
    fn id_storage_single_row_eq() {
        let s = IdStorage { size: 1000 };
        let pool = StringPool::new();
        assert_eq!(
            s.single_search(&pool, FilterOp::Eq, SqlValue::Long(42), 42),
            SingleSearchResult::Match
        );
        assert_eq!(
            s.single_search(&pool, FilterOp::Eq, SqlValue::Long(42), 41),
            SingleSearchResult::NoMatch
        );
    }
}
