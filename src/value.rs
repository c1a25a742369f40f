use crate::string_pool::StringId;

/// A scalar value as it appears on the wire between the host and this
/// engine: a constraint RHS, a `LIMIT`/`OFFSET` argument, or a cell read
/// back via [`crate::chain::Chain::get_slow`].
///
/// Strings are returned borrowed from the [`crate::string_pool::StringPool`]
/// that produced them; callers that need to keep a `SqlValue` past the next
/// mutation of the pool should clone the payload out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SqlValue<'a> {
    /// SQL `NULL`.
    Null,
    /// A 64-bit signed integer (also used for 32-bit int/uint columns).
    Long(i64),
    /// A double-precision float.
    Double(f64),
    /// A UTF-8 string, resolved from the string pool.
    String(&'a str),
    /// An opaque byte string. Only ever compares unequal in this engine;
    /// carried for completeness with the host's value model.
    Bytes(&'a [u8]),
}

impl<'a> SqlValue<'a> {
    /// True for [`SqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Interpret the value as an `i64`, panicking if it is not a `Long`.
    ///
    /// Mirrors the host's `SqlValue::AsLong`: used only after
    /// `validate_search_constraints` has already confirmed the type is
    /// usable, never as a first line of defence.
    pub fn as_long(&self) -> i64 {
        match self {
            SqlValue::Long(v) => *v,
            _ => panic!("SqlValue::as_long called on {self:?}"),
        }
    }

    /// Interpret the value as an `f64`, panicking if it is not numeric.
    pub fn as_double(&self) -> f64 {
        match self {
            SqlValue::Double(v) => *v,
            SqlValue::Long(v) => *v as f64,
            _ => panic!("SqlValue::as_double called on {self:?}"),
        }
    }

    /// Interpret the value as a string, panicking otherwise.
    pub fn as_str(&self) -> &'a str {
        match self {
            SqlValue::String(s) => s,
            _ => panic!("SqlValue::as_str called on {self:?}"),
        }
    }

    /// Rough type tag, used by validation to decide compatibility before
    /// touching storage.
    pub fn kind(&self) -> SqlValueKind {
        match self {
            SqlValue::Null => SqlValueKind::Null,
            SqlValue::Long(_) => SqlValueKind::Long,
            SqlValue::Double(_) => SqlValueKind::Double,
            SqlValue::String(_) => SqlValueKind::String,
            SqlValue::Bytes(_) => SqlValueKind::Bytes,
        }
    }
}

/// Type tag for [`SqlValue`], used in validation switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlValueKind {
    /// See [`SqlValue::Null`].
    Null,
    /// See [`SqlValue::Long`].
    Long,
    /// See [`SqlValue::Double`].
    Double,
    /// See [`SqlValue::String`].
    String,
    /// See [`SqlValue::Bytes`].
    Bytes,
}

/// An owned scalar, used where a `SqlValue` must outlive the pool borrow
/// (constraint storage inside a [`crate::query::Query`], runtime-table
/// builder cells).
#[derive(Clone, Debug, PartialEq)]
pub enum OwnedValue {
    /// SQL `NULL`.
    Null,
    /// A 64-bit signed integer.
    Long(i64),
    /// A double-precision float.
    Double(f64),
    /// An already-interned string id.
    String(StringId),
    /// An opaque byte string.
    Bytes(Vec<u8>),
}

impl OwnedValue {
    /// True for [`OwnedValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, OwnedValue::Null)
    }

    /// Borrow as a [`SqlValue`], resolving a `String` variant through
    /// `pool`. A dangling `StringId` (should never happen) resolves to
    /// `Null` rather than panicking.
    pub fn as_ref<'p>(&'p self, pool: &'p StringPool) -> SqlValue<'p> {
        match self {
            OwnedValue::Null => SqlValue::Null,
            OwnedValue::Long(v) => SqlValue::Long(*v),
            OwnedValue::Double(v) => SqlValue::Double(*v),
            OwnedValue::String(id) => match pool.get(*id) {
                Some(s) => SqlValue::String(s),
                None => SqlValue::Null,
            },
            OwnedValue::Bytes(b) => SqlValue::Bytes(b),
        }
    }
}
