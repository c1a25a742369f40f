//! The layered column model: storages, overlays, and the `Chain` they
//! compose into. See SPEC_FULL.md §3–§4 for the prose contract; this module
//! is the Rust encoding of it.
//!
//! Layers are a sum type rather than a trait object: a `Chain` owns its
//! entire stack inline (storage, optional null layer, optional overlay) and
//! dispatch is a pattern match, so there is no per-call vtable hop or extra
//! boxing beyond the one `Box` each recursive layer needs for its child.

mod arrangement_overlay;
mod dense_null_overlay;
mod null_overlay;
mod range_overlay;
mod selector_overlay;
mod storage;

pub use arrangement_overlay::ArrangementOverlay;
pub use dense_null_overlay::DenseNullOverlay;
pub use null_overlay::NullOverlay;
pub use range_overlay::RangeOverlay;
pub use selector_overlay::SelectorOverlay;
pub use storage::{IdStorage, NumericKind, NumericStorage, SetIdStorage, StringStorage};

use crate::config::EngineConfig;
use crate::string_pool::StringPool;
use crate::token::{OrderedIndices, Token, TokenVec};
use crate::value::SqlValue;
use crate::bitvec::BitVector;
use std::cmp::Ordering;

/// The filter operators a constraint may use. See SPEC_FULL.md §3, §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
    /// `GLOB`
    Glob,
    /// `REGEXP` (only meaningful with the `regex` feature enabled).
    Regex,
}

impl FilterOp {
    /// Is this a monotonic comparison (one that, on a sorted column, maps
    /// to a contiguous range via binary search)?
    pub fn is_monotonic_comparison(self) -> bool {
        matches!(
            self,
            FilterOp::Eq | FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge
        )
    }

    /// Ops for which `ordered_index_search` is well-defined (§4.1 invariant
    /// 4: not valid for `Ne`, `Glob`, `Regex`).
    pub fn supports_ordered_index_search(self) -> bool {
        matches!(
            self,
            FilterOp::Eq
                | FilterOp::Lt
                | FilterOp::Le
                | FilterOp::Gt
                | FilterOp::Ge
                | FilterOp::IsNull
                | FilterOp::IsNotNull
        )
    }
}

/// Outcome of [`Chain::single_search`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SingleSearchResult {
    /// Row `r` satisfies the constraint.
    Match,
    /// Row `r` does not satisfy the constraint.
    NoMatch,
    /// This layer cannot cheaply decide; caller must fall back to a full
    /// `search`/`index_search`.
    NeedsFullSearch,
}

/// Outcome of [`Chain::validate_search_constraints`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchValidation {
    /// The constraint is well-formed; proceed to `search_validated`.
    Ok,
    /// Every row matches; no need to touch storage.
    AllRowsMatch,
    /// No row matches; no need to touch storage.
    NoRowsMatch,
}

/// Outcome of [`Chain::search_validated`]: either a contiguous range, or a
/// bitvector whose length equals the input range's `end` (bits below the
/// range's `start` are always clear).
#[derive(Clone, Debug)]
pub enum RangeOrBitVector {
    /// `[start, end)`, a subset of the range that was searched.
    Range(u32, u32),
    /// A bitvector of length `range.end`.
    BitVector(BitVector),
}

impl RangeOrBitVector {
    /// Render as a bitvector of the given total length (used when the
    /// caller needs to combine this result with another bitvector).
    pub fn into_bitvector(self, len: usize) -> BitVector {
        match self {
            RangeOrBitVector::Range(s, e) => {
                let mut bv = BitVector::with_size(len);
                for i in s..e {
                    bv.set(i as usize, true);
                }
                bv
            }
            RangeOrBitVector::BitVector(mut bv) => {
                bv.resize(len, false);
                bv
            }
        }
    }
}

/// Total ordering over `SqlValue`s as used by sort/distinct/min/max:
/// `Null` sorts strictly before everything else; numerics compare
/// numerically (mixed `Long`/`Double` compare as doubles); strings compare
/// lexicographically by resolved bytes; `Bytes` is ordered by its raw
/// content after everything else (this engine never sorts by a `Bytes`
/// column, but the relation must still be total).
pub fn compare_values(a: SqlValue, b: SqlValue) -> Ordering {
    use SqlValue::*;
    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Long(x), Long(y)) => x.cmp(&y),
        (Double(x), Double(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Long(x), Double(y)) => (x as f64).partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Double(x), Long(y)) => x.partial_cmp(&(y as f64)).unwrap_or(Ordering::Equal),
        (String(x), String(y)) => x.cmp(y),
        (Bytes(x), Bytes(y)) => x.cmp(y),
        // Cross-family comparisons never occur on a single chain in
        // practice (columns are homogeneously typed); treat as equal
        // rather than panic so a stray comparison can't crash a query.
        _ => Ordering::Equal,
    }
}

/// The composed read-side view of a column: storage stacked with zero or
/// more overlays. See the module doc for why this is an enum rather than a
/// trait object.
#[derive(Debug)]
pub enum Chain {
    /// See [`IdStorage`].
    Id(IdStorage),
    /// See [`NumericStorage`].
    Numeric(NumericStorage),
    /// See [`StringStorage`].
    String(StringStorage),
    /// See [`SetIdStorage`].
    SetId(SetIdStorage),
    /// See [`NullOverlay`].
    Null(NullOverlay),
    /// See [`DenseNullOverlay`].
    DenseNull(DenseNullOverlay),
    /// See [`RangeOverlay`].
    RangeOv(RangeOverlay),
    /// See [`SelectorOverlay`].
    SelectorOv(SelectorOverlay),
    /// See [`ArrangementOverlay`].
    ArrangementOv(ArrangementOverlay),
}

macro_rules! dispatch {
    ($self:expr, $name:ident $(, $arg:expr)*) => {
        match $self {
            Chain::Id(c) => c.$name($($arg),*),
            Chain::Numeric(c) => c.$name($($arg),*),
            Chain::String(c) => c.$name($($arg),*),
            Chain::SetId(c) => c.$name($($arg),*),
            Chain::Null(c) => c.$name($($arg),*),
            Chain::DenseNull(c) => c.$name($($arg),*),
            Chain::RangeOv(c) => c.$name($($arg),*),
            Chain::SelectorOv(c) => c.$name($($arg),*),
            Chain::ArrangementOv(c) => c.$name($($arg),*),
        }
    };
}

impl Chain {
    /// Number of logical rows this chain presents.
    pub fn size(&self) -> u32 {
        dispatch!(self, size)
    }

    /// See SPEC_FULL.md §4.1.
    pub fn single_search(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        row: u32,
    ) -> SingleSearchResult {
        dispatch!(self, single_search, pool, op, val, row)
    }

    /// See SPEC_FULL.md §4.1.
    pub fn validate_search_constraints(&self, op: FilterOp, val: SqlValue) -> SearchValidation {
        dispatch!(self, validate_search_constraints, op, val)
    }

    /// See SPEC_FULL.md §4.1. Caller must have already gotten `Ok` from
    /// `validate_search_constraints` for `(op, val)`.
    pub fn search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        range: (u32, u32),
    ) -> RangeOrBitVector {
        dispatch!(self, search_validated, pool, op, val, range)
    }

    /// See SPEC_FULL.md §4.1.
    pub fn index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        indices: &mut TokenVec,
        cfg: &EngineConfig,
    ) {
        dispatch!(self, index_search_validated, pool, op, val, indices, cfg)
    }

    /// See SPEC_FULL.md §4.1. Returns `[lo, hi)` into `ordered.indices`.
    pub fn ordered_index_search_validated(
        &self,
        pool: &StringPool,
        op: FilterOp,
        val: SqlValue,
        ordered: OrderedIndices,
    ) -> (u32, u32) {
        debug_assert!(op.supports_ordered_index_search());
        dispatch!(self, ordered_index_search_validated, pool, op, val, ordered)
    }

    /// See SPEC_FULL.md §4.1.
    pub fn stable_sort(&self, pool: &StringPool, tokens: &mut Vec<Token>, desc: bool) {
        dispatch!(self, stable_sort, pool, tokens, desc)
    }

    /// See SPEC_FULL.md §4.1.
    pub fn distinct(&self, pool: &StringPool, indices: &mut TokenVec) {
        dispatch!(self, distinct, pool, indices)
    }

    /// See SPEC_FULL.md §4.1.
    pub fn min_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        dispatch!(self, min_element, pool, indices)
    }

    /// See SPEC_FULL.md §4.1.
    pub fn max_element(&self, pool: &StringPool, indices: &TokenVec) -> Option<Token> {
        dispatch!(self, max_element, pool, indices)
    }

    /// See SPEC_FULL.md §4.1. Expensive; only used by `ordered_index_search`
    /// and by callers reading back individual cells.
    pub fn get_slow<'p>(&self, pool: &'p StringPool, index: u32) -> SqlValue<'p> {
        dispatch!(self, get_slow, pool, index)
    }
}

/// Shared helper: stable sort a token vector by a value function, honouring
/// `desc`. Every terminal storage's `stable_sort` bottoms out here.
pub(crate) fn stable_sort_by_value<'p, F>(tokens: &mut Vec<Token>, desc: bool, mut value_of: F)
where
    F: FnMut(u32) -> SqlValue<'p>,
{
    if desc {
        tokens.sort_by(|a, b| value_of(b.index).partial_cmp_total(&value_of(a.index)));
    } else {
        tokens.sort_by(|a, b| value_of(a.index).partial_cmp_total(&value_of(b.index)));
    }
}

trait TotalOrd {
    fn partial_cmp_total(&self, other: &Self) -> Ordering;
}

impl<'p> TotalOrd for SqlValue<'p> {
    fn partial_cmp_total(&self, other: &Self) -> Ordering {
        compare_values(*self, *other)
    }
}

/// Shared helper: distinct by value, keeping first occurrence, used by
/// every terminal storage and by the arrangement overlay (which also needs
/// to dedupe on logical index, see `arrangement_overlay`).
pub(crate) fn distinct_by_value<'p, F>(indices: &mut TokenVec, mut value_of: F)
where
    F: FnMut(u32) -> SqlValue<'p>,
{
    let mut seen: rustc_hash::FxHashSet<SqlValueKey> = rustc_hash::FxHashSet::default();
    indices.tokens.retain(|t| {
        let key = SqlValueKey::from(value_of(t.index));
        seen.insert(key)
    });
}

/// A hashable, totally-ordered key derived from a `SqlValue`, for use in
/// `distinct`'s seen-set. Doubles are keyed by bit pattern (NaN-sensitive
/// equality is not a concern for this engine's columns).
#[derive(Clone, PartialEq, Eq, Hash)]
enum SqlValueKey {
    Null,
    Long(i64),
    Double(u64),
    String(String),
    Bytes(Vec<u8>),
}

impl<'p> From<SqlValue<'p>> for SqlValueKey {
    fn from(v: SqlValue<'p>) -> Self {
        match v {
            SqlValue::Null => SqlValueKey::Null,
            SqlValue::Long(x) => SqlValueKey::Long(x),
            SqlValue::Double(x) => SqlValueKey::Double(x.to_bits()),
            SqlValue::String(s) => SqlValueKey::String(s.to_owned()),
            SqlValue::Bytes(b) => SqlValueKey::Bytes(b.to_vec()),
        }
    }
}

/// Shared helper: min/max over a token vector by value, ties broken by
/// earliest occurrence in `indices`.
pub(crate) fn min_max_by_value<'p, F>(
    indices: &TokenVec,
    mut value_of: F,
    want_max: bool,
) -> Option<Token>
where
    F: FnMut(u32) -> SqlValue<'p>,
{
    let mut best: Option<(Token, SqlValue)> = None;
    for &t in &indices.tokens {
        let v = value_of(t.index);
        best = match best {
            None => Some((t, v)),
            Some((bt, bv)) => {
                let ord = compare_values(v, bv);
                let replace = if want_max {
                    ord == Ordering::Greater
                } else {
                    ord == Ordering::Less
                };
                if replace {
                    Some((t, v))
                } else {
                    Some((bt, bv))
                }
            }
        };
    }
    best.map(|(t, _)| t)
}
