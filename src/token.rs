/// A unit of work for index-based chain operations.
///
/// `index` is the row a layer should translate as it descends the stack;
/// `payload` is opaque to every layer and is carried through untouched so
/// the caller (ultimately the executor) can recover which original row a
/// surviving token came from, even after several reorderings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    /// The row index at the current layer.
    pub index: u32,
    /// Caller-defined payload, preserved across layer translations.
    pub payload: u32,
}

impl Token {
    /// A token whose payload equals its index (the common case when seeding
    /// a token vector from a fresh `RowMap`).
    pub fn identity(index: u32) -> Token {
        Token {
            index,
            payload: index,
        }
    }
}

/// Whether a [`TokenVec`]'s indices are known to be strictly increasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Monotonicity {
    /// `tokens[i].index < tokens[i+1].index` for all `i`.
    Monotonic,
    /// No ordering guarantee.
    NonMonotonic,
}

impl Default for Monotonicity {
    fn default() -> Self {
        Monotonicity::NonMonotonic
    }
}

/// A vector of [`Token`]s carried through `index_search`/`distinct`/sort,
/// tagged with whether the indices are currently known sorted.
#[derive(Clone, Debug, Default)]
pub struct TokenVec {
    /// The tokens themselves.
    pub tokens: Vec<Token>,
    /// Current monotonicity state. Layers that reorder indices (e.g. an
    /// arrangement overlay whose `a` is not itself sorted) must downgrade
    /// this to `NonMonotonic` rather than leave it stale.
    pub monotonicity: Monotonicity,
}

impl TokenVec {
    /// Build a monotonic token vector `[0, n)` with `payload == index`.
    pub fn identity_range(n: u32) -> TokenVec {
        TokenVec {
            tokens: (0..n).map(Token::identity).collect(),
            monotonicity: Monotonicity::Monotonic,
        }
    }

    /// Number of surviving tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if no tokens remain.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Retain only tokens for which `keep` returns true, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(Token) -> bool) {
        self.tokens.retain(|&t| keep(t));
    }

    /// Checks (in debug builds) that `monotonicity == Monotonic` implies the
    /// indices are actually strictly increasing. Used defensively after
    /// operations that are supposed to preserve monotonicity.
    pub fn debug_assert_monotonicity(&self) {
        if matches!(self.monotonicity, Monotonicity::Monotonic) {
            debug_assert!(
                self.tokens.windows(2).all(|w| w[0].index < w[1].index),
                "TokenVec claimed Monotonic but indices were not strictly increasing"
            );
        }
    }
}

/// A borrowed, sorted slice of row indices, usable for binary-search-style
/// range reduction through the chain stack (see `ordered_index_search`).
///
/// Supplied only when the caller can prove the indices are in the order the
/// underlying chain would sort them; an arrangement overlay whose index
/// vector is marked monotonic is the only producer of these in this crate.
#[derive(Clone, Copy, Debug)]
pub struct OrderedIndices<'a> {
    /// The sorted row indices.
    pub indices: &'a [u32],
    /// Always `Monotonic` by construction; kept as a field (rather than
    /// implied) so call sites read the same as the C++ original's
    /// `OrderedIndices` struct.
    pub monotonicity: Monotonicity,
}

impl<'a> OrderedIndices<'a> {
    /// Wrap an already-sorted slice.
    pub fn new(indices: &'a [u32]) -> OrderedIndices<'a> {
        OrderedIndices {
            indices,
            monotonicity: Monotonicity::Monotonic,
        }
    }

    /// Number of indices.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
