use thiserror::Error;

/// Errors the engine can return to a caller.
///
/// Most invalid queries never reach here: [`crate::chain::SearchValidation`]
/// resolves type mismatches and out-of-range values to `AllRowsMatch` /
/// `NoRowsMatch` without touching a row. `EngineError` covers the handful of
/// conditions that cannot be folded into that classification.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A `Regex` constraint whose pattern failed to compile.
    #[error("invalid regex for column {col}: {pattern:?}: {source}")]
    InvalidRegex {
        /// Index of the column the constraint was against.
        col: usize,
        /// The offending pattern.
        pattern: String,
        /// Underlying compile error.
        #[source]
        source: regex_error::RegexError,
    },

    /// Two incompatible typed appends landed on the same runtime-table
    /// column (e.g. a string cell into a column already holding doubles).
    #[error("schema conflict in column {col} ({col_name}): {message}")]
    SchemaConflict {
        /// Index of the offending column.
        col: usize,
        /// Name of the offending column.
        col_name: String,
        /// What went wrong.
        message: String,
    },

    /// `LIMIT` or `OFFSET` argv value was not a `SqlValue::Long`.
    #[error("{which} must be an integer")]
    LimitOffsetNotLong {
        /// `"LIMIT"` or `"OFFSET"`.
        which: &'static str,
    },

    /// A constraint, order, or index referenced a column index the table
    /// does not have.
    #[error("column index {col_idx} out of range (table has {num_cols} columns)")]
    UnknownColumn {
        /// The offending index.
        col_idx: usize,
        /// Number of columns the table actually has.
        num_cols: usize,
    },

    /// The index-string protocol (§4.10/§6) could not be parsed.
    #[error("malformed index string: {0}")]
    MalformedIndexString(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Wraps whichever regex error type the `regex` feature brings in, so that
/// `EngineError` has a stable shape regardless of the feature flag.
pub mod regex_error {
    #[cfg(feature = "regex")]
    pub type RegexError = regex::Error;

    #[cfg(not(feature = "regex"))]
    #[derive(Debug)]
    pub struct RegexError(pub String);

    #[cfg(not(feature = "regex"))]
    impl std::fmt::Display for RegexError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[cfg(not(feature = "regex"))]
    impl std::error::Error for RegexError {}
}
