//! Vertex record stored in the triangulation arena.

use crate::core::triangulation::CellKey;
use crate::geometry::point::Point;
use slotmap::Key;

/// Dimension value meaning "not yet classified".
pub const DIMENSION_UNSET: i8 = -1;

/// A vertex of the triangulation.
///
/// Besides its position, a vertex carries the dimension of the
/// lowest-dimensional complex element it belongs to (`0` corner, `1`
/// feature edge, `2` surface, `3` volume interior, `-1` unclassified) and a
/// back-reference to one incident cell for local traversal.
#[derive(Clone, Debug)]
pub struct Vertex {
    point: Point,
    in_dimension: i8,
    incident_cell: CellKey,
}

impl Vertex {
    /// Creates an unclassified vertex at `point` with no incident cell yet.
    #[must_use]
    pub fn new(point: Point) -> Self {
        Self {
            point,
            in_dimension: DIMENSION_UNSET,
            incident_cell: CellKey::null(),
        }
    }

    /// Creates a vertex with a known complex dimension.
    #[must_use]
    pub fn with_dimension(point: Point, in_dimension: i8) -> Self {
        debug_assert!((DIMENSION_UNSET..=3).contains(&in_dimension));
        Self {
            point,
            in_dimension,
            incident_cell: CellKey::null(),
        }
    }

    /// Position of the vertex.
    #[inline]
    #[must_use]
    pub const fn point(&self) -> &Point {
        &self.point
    }

    /// Moves the vertex. Callers are responsible for keeping incident cell
    /// volumes positive.
    #[inline]
    pub fn set_point(&mut self, point: Point) {
        self.point = point;
    }

    /// Dimension of the lowest-dimensional complex element this vertex
    /// belongs to, or [`DIMENSION_UNSET`].
    #[inline]
    #[must_use]
    pub const fn in_dimension(&self) -> i8 {
        self.in_dimension
    }

    /// Sets the complex dimension.
    #[inline]
    pub fn set_dimension(&mut self, dim: i8) {
        debug_assert!((DIMENSION_UNSET..=3).contains(&dim));
        self.in_dimension = dim;
    }

    /// Lowers the complex dimension to `dim` if it is currently unset or
    /// higher. Used while tagging the complex, where a vertex ends up with
    /// the minimum dimension over all elements it lies on.
    #[inline]
    pub fn lower_dimension(&mut self, dim: i8) {
        if self.in_dimension == DIMENSION_UNSET || self.in_dimension > dim {
            self.in_dimension = dim;
        }
    }

    /// One cell incident to this vertex.
    #[inline]
    #[must_use]
    pub const fn incident_cell(&self) -> CellKey {
        self.incident_cell
    }

    /// Updates the incident-cell back-reference.
    #[inline]
    pub fn set_incident_cell(&mut self, cell: CellKey) {
        self.incident_cell = cell;
    }
}
