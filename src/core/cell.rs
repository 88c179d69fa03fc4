//! Cell record stored in the triangulation arena, and subdomain tags.

use crate::core::triangulation::{CellKey, VertexKey};
use serde::{Deserialize, Serialize};
use slotmap::Key;

/// Material-region label of a cell.
///
/// `NONE` (the default) marks a cell outside every subdomain: exterior
/// regions of the input and all infinite cells. During remeshing one
/// reserved value, the imaginary index (`max input index + 1`), tags the
/// scaffold tetrahedra of the outer layer.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SubdomainIndex(pub u32);

impl SubdomainIndex {
    /// Outside all subdomains.
    pub const NONE: Self = Self(0);

    /// True when this is the exterior label.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A tetrahedral cell: four vertices and the four neighbor cells, where
/// neighbor `i` shares the facet opposite vertex `i`.
///
/// Neighbor slots are only null transiently, while a local operation
/// rewires the surrounding cells; in a valid triangulation the hull is
/// closed by infinite cells and every neighbor exists.
#[derive(Clone, Debug)]
pub struct Cell {
    vertices: [VertexKey; 4],
    neighbors: [CellKey; 4],
    subdomain: SubdomainIndex,
}

impl Cell {
    /// Creates a cell with unset neighbors.
    #[must_use]
    pub fn new(vertices: [VertexKey; 4], subdomain: SubdomainIndex) -> Self {
        Self {
            vertices,
            neighbors: [CellKey::null(); 4],
            subdomain,
        }
    }

    /// Vertex `i` of the cell (`i < 4`).
    #[inline]
    #[must_use]
    pub fn vertex(&self, i: usize) -> VertexKey {
        self.vertices[i]
    }

    /// All four vertices.
    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 4] {
        &self.vertices
    }

    /// Index of `v` in this cell, if present.
    #[must_use]
    pub fn index_of(&self, v: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&w| w == v)
    }

    /// True when `v` is one of the four vertices.
    #[inline]
    #[must_use]
    pub fn has_vertex(&self, v: VertexKey) -> bool {
        self.vertices.contains(&v)
    }

    /// Neighbor sharing the facet opposite vertex `i`.
    #[inline]
    #[must_use]
    pub fn neighbor(&self, i: usize) -> CellKey {
        self.neighbors[i]
    }

    /// Index `i` such that `neighbor(i) == c`, if `c` is a neighbor.
    #[must_use]
    pub fn index_of_neighbor(&self, c: CellKey) -> Option<usize> {
        self.neighbors.iter().position(|&n| n == c)
    }

    /// Sets vertex slot `i`.
    #[inline]
    pub fn set_vertex(&mut self, i: usize, v: VertexKey) {
        self.vertices[i] = v;
    }

    /// Sets neighbor slot `i`.
    #[inline]
    pub fn set_neighbor(&mut self, i: usize, c: CellKey) {
        self.neighbors[i] = c;
    }

    /// Subdomain label.
    #[inline]
    #[must_use]
    pub const fn subdomain(&self) -> SubdomainIndex {
        self.subdomain
    }

    /// Retags the cell.
    #[inline]
    pub fn set_subdomain(&mut self, s: SubdomainIndex) {
        self.subdomain = s;
    }
}
