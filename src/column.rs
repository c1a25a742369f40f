//! A column's static description: name, type, flags, and the raw storage
//! it owns before being composed into a [`crate::chain::Chain`]. See
//! SPEC_FULL.md §3.

use crate::bitvec::BitVector;
use crate::chain::{NumericKind, StringStorage};

/// Declared SQL type of a column, independent of nullability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// `BIGINT`.
    BigInt,
    /// `UNSIGNED INT`.
    UnsignedInt,
    /// `INT`.
    Int,
    /// `DOUBLE`.
    Double,
    /// `TEXT`.
    Text,
}

/// Bitset of per-column flags. Hand-rolled rather than pulled in from a
/// crate: five flags fit comfortably in a `u8`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColumnFlags(u8);

impl ColumnFlags {
    /// The column is an intrinsically sorted hint (see invariant in §3:
    /// always truthful when set, never required).
    pub const SORTED: ColumnFlags = ColumnFlags(1 << 0);
    /// The column never holds a null value.
    pub const NON_NULL: ColumnFlags = ColumnFlags(1 << 1);
    /// The column is not reported to the SQL schema surface.
    pub const HIDDEN: ColumnFlags = ColumnFlags(1 << 2);
    /// The column's null overlay is dense (same-size child, no rank
    /// translation) rather than sparse.
    pub const DENSE: ColumnFlags = ColumnFlags(1 << 3);
    /// The column is backed by `SetId` storage.
    pub const SET_ID: ColumnFlags = ColumnFlags(1 << 4);

    /// The empty flag set.
    pub const fn empty() -> ColumnFlags {
        ColumnFlags(0)
    }

    /// True if every bit set in `other` is also set in `self`.
    pub const fn contains(self, other: ColumnFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of `self` and `other`.
    pub const fn union(self, other: ColumnFlags) -> ColumnFlags {
        ColumnFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for ColumnFlags {
    type Output = ColumnFlags;
    fn bitor(self, rhs: ColumnFlags) -> ColumnFlags {
        self.union(rhs)
    }
}

/// The raw, pre-chain storage a column owns. Composed with an optional null
/// overlay and the table's active overlay into a [`crate::chain::Chain`] on
/// first query (see `Table::chains`).
#[derive(Debug)]
pub enum ColumnStorage {
    /// See [`crate::chain::IdStorage`]. `size` is the column's own row count,
    /// independent of the table's current overlay.
    Id { size: u32 },
    /// See [`crate::chain::NumericStorage`].
    Numeric { data: NumericKind, is_sorted: bool },
    /// See [`crate::chain::StringStorage`].
    String(StringStorage),
    /// See [`crate::chain::SetIdStorage`].
    SetId { data: Vec<u32> },
}

/// A column's static description. Borrowed from by `Table` when composing
/// per-query chains; never holds a chain itself (see SPEC_FULL.md §9 on
/// breaking the Column↔Table cycle).
#[derive(Debug)]
pub struct Column {
    /// The SQL-visible name.
    pub name: String,
    /// The declared type.
    pub col_type: ColumnType,
    /// Flags (`Sorted`, `NonNull`, `Hidden`, `Dense`, `SetId`).
    pub flags: ColumnFlags,
    /// The terminal storage.
    pub storage: ColumnStorage,
    /// Non-null bitmap, present iff the column is nullable. Its
    /// interpretation (sparse rank-translating vs. dense masking) is
    /// governed by `flags.contains(ColumnFlags::DENSE)`.
    pub null_bitmap: Option<BitVector>,
    /// Index into the owning table's overlay-layer list.
    pub overlay_slot: usize,
}

impl Column {
    /// `true` if `flags` declares this column nullable (has a null bitmap).
    pub fn is_nullable(&self) -> bool {
        self.null_bitmap.is_some()
    }
}
