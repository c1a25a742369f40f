use rustc_hash::FxHashMap;

/// An interned string id, as stored inline in `String` column storage.
///
/// `StringId::NULL` is a reserved sentinel: it never round-trips through
/// [`StringPool::intern`] and always resolves to `None` from
/// [`StringPool::get`]. This lets a `String` column represent SQL `NULL`
/// without a separate null overlay when that is more convenient for the
/// caller (see the runtime table builder, §4.9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StringId(u32);

impl StringId {
    /// The reserved "no string" id.
    pub const NULL: StringId = StringId(u32::MAX);

    /// Raw numeric value, for storage in a `Vec<u32>`.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Wrap a raw value previously returned by [`StringId::as_u32`].
    pub fn from_u32(v: u32) -> StringId {
        StringId(v)
    }
}

/// Interns strings to small ids so that columns can store `u32`s instead of
/// `String`s, and so that equality/ordering comparisons on interned values
/// are cheap id comparisons for `Eq`/`Ne` (ordering still needs the resolved
/// bytes, see `String` storage in `chain::storage`).
///
/// This is the crate's one concrete "external collaborator" whose interface
/// SPEC_FULL.md treats as a black box (`get`); the rest of the engine only
/// ever calls `get`/`intern` on it.
#[derive(Default)]
pub struct StringPool {
    strings: Vec<Box<str>>,
    ids: FxHashMap<Box<str>, StringId>,
}

impl StringPool {
    /// New, empty pool.
    pub fn new() -> StringPool {
        StringPool::default()
    }

    /// Intern `s`, returning its id. Interning the same bytes twice returns
    /// the same id.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.ids.get(s) {
            return *id;
        }
        let id = StringId(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.ids.insert(boxed, id);
        id
    }

    /// Resolve an id back to its string. `StringId::NULL` and any id not
    /// produced by this pool resolve to `None`.
    pub fn get(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(|s| s.as_ref())
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// True if no strings have been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut pool = StringPool::new();
        let a = pool.intern("hello");
        let b = pool.intern("hello");
        let c = pool.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.get(a), Some("hello"));
        assert_eq!(pool.get(c), Some("world"));
    }

    #[test]
    fn null_id_resolves_to_none() {
        let pool = StringPool::new();
        assert_eq!(pool.get(StringId::NULL), None);
    }
}
