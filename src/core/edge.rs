//! Canonical edge identifiers.
//!
//! Edges are not stored explicitly; they are inferred from cells. The
//! operators still need a stable, comparable identifier for an edge: the
//! split and collapse queues key on it, and the complex overlay stores
//! feature edges as a set of them. `EdgeKey`:
//!
//! - identifies an edge purely by its two endpoint [`VertexKey`]s
//! - canonicalizes endpoint ordering so `(a, b)` and `(b, a)` map to the
//!   same edge
//! - is `Copy`/`Hash`/`Ord` for fast use in sets, maps, and priority queues

use crate::core::triangulation::VertexKey;
use slotmap::Key;

/// Canonical identifier for an (undirected) edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    v0: VertexKey,
    v1: VertexKey,
}

impl EdgeKey {
    /// Creates a new canonical edge key.
    ///
    /// The endpoints are reordered so that `v0 <= v1` under the raw slotmap
    /// key order, which also gives the stable tie-break order used by the
    /// operator queues.
    #[must_use]
    pub fn new(a: VertexKey, b: VertexKey) -> Self {
        if a.data().as_ffi() <= b.data().as_ffi() {
            Self { v0: a, v1: b }
        } else {
            Self { v0: b, v1: a }
        }
    }

    /// Returns the first (canonical) endpoint.
    #[inline]
    #[must_use]
    pub const fn v0(self) -> VertexKey {
        self.v0
    }

    /// Returns the second (canonical) endpoint.
    #[inline]
    #[must_use]
    pub const fn v1(self) -> VertexKey {
        self.v1
    }

    /// Returns the two endpoints as a tuple.
    #[inline]
    #[must_use]
    pub const fn endpoints(self) -> (VertexKey, VertexKey) {
        (self.v0, self.v1)
    }

    /// True when `v` is one of the endpoints.
    #[inline]
    #[must_use]
    pub fn contains(self, v: VertexKey) -> bool {
        self.v0 == v || self.v1 == v
    }

    /// Given one endpoint, returns the other; `None` when `v` is not an
    /// endpoint.
    #[must_use]
    pub fn opposite(self, v: VertexKey) -> Option<VertexKey> {
        if v == self.v0 {
            Some(self.v1)
        } else if v == self.v1 {
            Some(self.v0)
        } else {
            None
        }
    }
}

impl From<(VertexKey, VertexKey)> for EdgeKey {
    #[inline]
    fn from((a, b): (VertexKey, VertexKey)) -> Self {
        Self::new(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn edge_key_is_canonical() {
        let mut vertices: SlotMap<VertexKey, ()> = SlotMap::with_key();
        let a = vertices.insert(());
        let b = vertices.insert(());

        let e1 = EdgeKey::new(a, b);
        let e2 = EdgeKey::new(b, a);
        assert_eq!(e1, e2);
        assert!(e1.v0().data().as_ffi() <= e1.v1().data().as_ffi());
    }

    #[test]
    fn opposite_endpoint_lookup() {
        let mut vertices: SlotMap<VertexKey, ()> = SlotMap::with_key();
        let a = vertices.insert(());
        let b = vertices.insert(());
        let c = vertices.insert(());

        let e = EdgeKey::new(a, b);
        assert_eq!(e.opposite(a), Some(b));
        assert_eq!(e.opposite(b), Some(a));
        assert_eq!(e.opposite(c), None);
        assert!(e.contains(a) && !e.contains(c));
    }

    #[test]
    fn edge_key_works_in_sets() {
        let mut vertices: SlotMap<VertexKey, ()> = SlotMap::with_key();
        let a = vertices.insert(());
        let b = vertices.insert(());
        let c = vertices.insert(());

        let mut set = std::collections::BTreeSet::new();
        set.insert(EdgeKey::new(a, b));
        set.insert(EdgeKey::new(b, a));
        set.insert(EdgeKey::new(a, c));
        assert_eq!(set.len(), 2);
    }
}
