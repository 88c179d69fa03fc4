//! Facet handles and canonical facet identifiers.
//!
//! A facet is addressed as `(cell, i)`: the triangle of `cell` opposite its
//! vertex `i`. The same geometric facet has a second address through the
//! neighbor on the other side; [`crate::core::triangulation::Tds::mirror_facet`]
//! converts between the two. For set membership (the complex overlay) a
//! facet is identified by its unordered vertex triple instead, which is
//! stable under cell deletion and recreation.

use crate::core::triangulation::{CellKey, VertexKey};
use slotmap::Key;

/// Oriented vertex triples of the four facets of a tetrahedron.
///
/// `FACET_VERTEX_TRIPLES[i]` lists the three cell-local vertex indices of
/// the facet opposite vertex `i`, ordered so that for a positively oriented
/// cell the triple followed by vertex `i` is again positively oriented.
pub const FACET_VERTEX_TRIPLES: [[usize; 3]; 4] = [[1, 3, 2], [0, 2, 3], [0, 3, 1], [0, 1, 2]];

/// The `j`-th vertex (in consistent orientation) of the facet opposite
/// vertex `i`.
#[inline]
#[must_use]
pub const fn vertex_triple_index(i: usize, j: usize) -> usize {
    FACET_VERTEX_TRIPLES[i][j]
}

/// Address of a facet as seen from one of its two incident cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FacetHandle {
    /// The cell the facet is viewed from.
    pub cell: CellKey,
    /// Index of the opposite vertex within that cell.
    pub index: u8,
}

impl FacetHandle {
    /// Creates a facet handle.
    #[inline]
    #[must_use]
    pub const fn new(cell: CellKey, index: u8) -> Self {
        Self { cell, index }
    }
}

/// Canonical identifier for an (unordered) facet, keyed by its vertex
/// triple.
///
/// Endpoints are sorted by their raw slotmap representation, so the two
/// addresses of a shared facet map to the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacetKey([VertexKey; 3]);

impl FacetKey {
    /// Creates the canonical key for the triple `(a, b, c)`.
    #[must_use]
    pub fn new(a: VertexKey, b: VertexKey, c: VertexKey) -> Self {
        let mut t = [a, b, c];
        t.sort_unstable_by_key(|k| k.data().as_ffi());
        Self(t)
    }

    /// The three vertices in canonical order.
    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 3] {
        &self.0
    }

    /// True when `v` is one of the three vertices.
    #[inline]
    #[must_use]
    pub fn contains(&self, v: VertexKey) -> bool {
        self.0.contains(&v)
    }

    /// Returns the key with `from` replaced by `to`, or `None` when `from`
    /// is not a vertex of this facet.
    #[must_use]
    pub fn replace(&self, from: VertexKey, to: VertexKey) -> Option<Self> {
        let i = self.0.iter().position(|&v| v == from)?;
        let mut t = self.0;
        t[i] = to;
        Some(Self::new(t[0], t[1], t[2]))
    }
}
