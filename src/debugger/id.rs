use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Integer identifier tagged with the entity kind it addresses.
///
/// Ids are the only reference the wire protocol exchanges; the tag keeps a
/// frame id from being confused with a thread id at compile time.
pub struct Id<T> {
    raw: i64,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new(raw: i64) -> Id<T> {
        Id {
            raw,
            _kind: PhantomData,
        }
    }

    /// Untyped value as it appears on the wire.
    pub fn raw(&self) -> i64 {
        self.raw
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.raw)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<T> From<i64> for Id<T> {
    fn from(raw: i64) -> Self {
        Id::new(raw)
    }
}

/// Monotone id allocator, one per entity kind. The first id handed out is 1.
pub(super) struct IdSource<T> {
    next: i64,
    _kind: PhantomData<fn() -> T>,
}

impl<T> IdSource<T> {
    pub(super) fn new() -> IdSource<T> {
        IdSource {
            next: 1,
            _kind: PhantomData,
        }
    }

    pub(super) fn next(&mut self) -> Id<T> {
        let id = Id::new(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn ids_start_at_one_and_grow() {
        let mut source = IdSource::<Marker>::new();
        assert_eq!(source.next().raw(), 1);
        assert_eq!(source.next().raw(), 2);
        assert_eq!(source.next().raw(), 3);
    }

    #[test]
    fn ids_compare_by_value() {
        let a = Id::<Marker>::new(1);
        let b = Id::<Marker>::new(2);
        assert!(a < b);
        assert_eq!(a, Id::new(1));
        assert_eq!(b.to_string(), "2");
    }
}
