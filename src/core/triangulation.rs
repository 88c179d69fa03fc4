//! Tetrahedral triangulation data structure.
//!
//! [`Tds`] stores vertices and cells in slotmap arenas and maintains the
//! combinatorial 3-manifold invariants: every facet is shared by exactly
//! two cells, neighbor links are involutive, and the convex hull is closed
//! by cells through one distinguished *infinite vertex*. Handles
//! ([`VertexKey`], [`CellKey`]) are generation-counted, so a handle to a
//! deleted element never aliases a later one.
//!
//! All topology-changing operations (edge split, vertex merge, bistellar
//! flips) funnel through one cavity-rewiring primitive: remove a set of
//! cells, create a set of cells, then match the facets of the new cells
//! against each other and against the recorded boundary of the cavity.
//! An operation that cannot be matched consistently is rejected before the
//! triangulation is corrupted.

use crate::core::cell::{Cell, SubdomainIndex};
use crate::core::collections::{
    CellStarBuffer, EdgeRingBuffer, FastHashMap, FastHashSet, SmallBuffer, RING_BUFFER_SIZE,
};
use crate::core::edge::EdgeKey;
use crate::core::facet::{FacetHandle, FacetKey, FACET_VERTEX_TRIPLES};
use crate::core::vertex::Vertex;
use crate::geometry::point::Point;
use crate::geometry::predicates::{orientation, Orientation};
use slotmap::{new_key_type, Key, SlotMap};
use thiserror::Error;

new_key_type! {
    /// Key type for vertices stored in the triangulation arena.
    pub struct VertexKey;
}

new_key_type! {
    /// Key type for cells stored in the triangulation arena.
    pub struct CellKey;
}

/// Walk limit for edge-ring circulation; a valid ring is far smaller.
const MAX_RING_LENGTH: usize = 128;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors reported by the structural validity audit.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriangulationValidationError {
    /// A cell references a missing or repeated vertex.
    #[error("cell {cell:?} references a missing or repeated vertex")]
    BadCellVertices {
        /// The offending cell.
        cell: CellKey,
    },
    /// A neighbor link is missing, dangling, or not involutive.
    #[error("cell {cell:?} has a broken neighbor link at facet {index}")]
    BrokenNeighborLink {
        /// The offending cell.
        cell: CellKey,
        /// Facet index of the broken link.
        index: usize,
    },
    /// A facet is not shared by exactly two cells.
    #[error("a facet is shared by {count} cells (expected exactly 2)")]
    FacetSharing {
        /// Number of incident cells found.
        count: usize,
    },
    /// A finite cell has non-positive signed volume.
    #[error("finite cell {cell:?} has non-positive volume")]
    InvertedCell {
        /// The offending cell.
        cell: CellKey,
    },
    /// A vertex back-reference points at a dead cell or one that does not
    /// contain the vertex.
    #[error("vertex {vertex:?} has a stale incident-cell reference")]
    StaleIncidentCell {
        /// The offending vertex.
        vertex: VertexKey,
    },
}

/// Errors reported while building a triangulation from raw cells.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriangulationConstructionError {
    /// A tetrahedron references a vertex index past the end of the point
    /// list.
    #[error("tetrahedron {tet} references vertex index {index} out of range")]
    VertexIndexOutOfRange {
        /// Index of the offending tetrahedron in the input.
        tet: usize,
        /// The out-of-range vertex index.
        index: usize,
    },
    /// A tetrahedron lists the same vertex twice.
    #[error("tetrahedron {tet} repeats a vertex")]
    RepeatedVertex {
        /// Index of the offending tetrahedron in the input.
        tet: usize,
    },
    /// A tetrahedron has coplanar vertices.
    #[error("tetrahedron {tet} is degenerate (coplanar vertices)")]
    DegenerateCell {
        /// Index of the offending tetrahedron in the input.
        tet: usize,
    },
    /// A facet is shared by more than two tetrahedra.
    #[error("a facet is shared by more than two tetrahedra (non-manifold input)")]
    NonManifoldFacet,
    /// The subdomain list does not match the tetrahedron list.
    #[error("subdomain list length {subdomains} does not match tetrahedron count {tets}")]
    SubdomainCountMismatch {
        /// Number of subdomain labels supplied.
        subdomains: usize,
        /// Number of tetrahedra supplied.
        tets: usize,
    },
    /// The assembled triangulation failed the structural audit.
    #[error(transparent)]
    Validation(#[from] TriangulationValidationError),
}

/// Rejection reasons for the local topology mutators.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EditError {
    /// The two vertices are not connected by an edge.
    #[error("edge not found between the given vertices")]
    EdgeNotFound,
    /// A 3-to-2 flip needs an edge ring of exactly three cells.
    #[error("edge ring is not a triple of cells")]
    RingNotTriple,
    /// The operation would rebuild cells through the infinite vertex.
    #[error("operation would touch the infinite region")]
    InfiniteRegion,
    /// A 2-to-3 flip would duplicate an edge that already exists.
    #[error("an edge between the two opposite vertices already exists")]
    EdgeExists,
    /// The operation would create an inverted or degenerate cell.
    #[error("operation would create an inverted or degenerate cell")]
    WouldInvert,
    /// Facet matching failed while rewiring the local star.
    #[error("local star rewiring failed to match facets")]
    InconsistentStar,
}

// =============================================================================
// PROTOTYPES AND RESULTS
// =============================================================================

/// Blueprint for one cell created during a local rewiring step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CellProto {
    pub vertices: [VertexKey; 4],
    pub subdomain: SubdomainIndex,
}

/// Result of a successful edge split.
#[derive(Clone, Debug)]
pub struct EdgeSplitInfo {
    /// The midpoint vertex inserted on the edge.
    pub new_vertex: VertexKey,
    /// The ring of vertices around the split edge, in circulation order.
    pub ring_vertices: SmallBuffer<VertexKey, RING_BUFFER_SIZE>,
}

// =============================================================================
// TRIANGULATION
// =============================================================================

/// A tetrahedral triangulation with a closed hull.
#[derive(Clone, Debug)]
pub struct Tds {
    vertices: SlotMap<VertexKey, Vertex>,
    cells: SlotMap<CellKey, Cell>,
    infinite: VertexKey,
}

impl Tds {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Builds a triangulation from a point list and tetrahedron index
    /// quadruples, one subdomain label per tetrahedron.
    ///
    /// Each tetrahedron is reoriented to positive volume if needed, facet
    /// adjacency is derived, and the hull is closed with infinite cells.
    /// Vertices start unclassified (`in_dimension == -1`).
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationConstructionError`] on out-of-range or
    /// repeated vertex indices, degenerate tetrahedra, facets shared by
    /// more than two tetrahedra, or a failed final audit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tetremesh::core::cell::SubdomainIndex;
    /// use tetremesh::core::triangulation::Tds;
    /// use tetremesh::geometry::point::Point;
    ///
    /// let points = [
    ///     Point::new(0.0, 0.0, 0.0),
    ///     Point::new(1.0, 0.0, 0.0),
    ///     Point::new(0.0, 1.0, 0.0),
    ///     Point::new(0.0, 0.0, 1.0),
    /// ];
    /// let tds = Tds::from_cells(&points, &[[0, 1, 2, 3]], &[SubdomainIndex(1)]).unwrap();
    /// assert_eq!(tds.number_of_finite_cells(), 1);
    /// assert!(tds.is_valid().is_ok());
    /// ```
    pub fn from_cells(
        points: &[Point],
        tets: &[[usize; 4]],
        subdomains: &[SubdomainIndex],
    ) -> Result<Self, TriangulationConstructionError> {
        if subdomains.len() != tets.len() {
            return Err(TriangulationConstructionError::SubdomainCountMismatch {
                subdomains: subdomains.len(),
                tets: tets.len(),
            });
        }

        let mut vertices: SlotMap<VertexKey, Vertex> = SlotMap::with_key();
        let keys: Vec<VertexKey> = points.iter().map(|p| vertices.insert(Vertex::new(*p))).collect();
        // The infinite vertex carries no meaningful position.
        let infinite = vertices.insert(Vertex::new(Point::ORIGIN));

        let mut cells: SlotMap<CellKey, Cell> = SlotMap::with_key();
        for (t, (tet, &sub)) in tets.iter().zip(subdomains).enumerate() {
            let mut idx = *tet;
            for &i in &idx {
                if i >= points.len() {
                    return Err(TriangulationConstructionError::VertexIndexOutOfRange {
                        tet: t,
                        index: i,
                    });
                }
            }
            if idx[0] == idx[1]
                || idx[0] == idx[2]
                || idx[0] == idx[3]
                || idx[1] == idx[2]
                || idx[1] == idx[3]
                || idx[2] == idx[3]
            {
                return Err(TriangulationConstructionError::RepeatedVertex { tet: t });
            }
            match orientation(
                &points[idx[0]],
                &points[idx[1]],
                &points[idx[2]],
                &points[idx[3]],
            ) {
                Orientation::Coplanar => {
                    return Err(TriangulationConstructionError::DegenerateCell { tet: t });
                }
                Orientation::Negative => idx.swap(2, 3),
                Orientation::Positive => {}
            }
            cells.insert(Cell::new(
                [keys[idx[0]], keys[idx[1]], keys[idx[2]], keys[idx[3]]],
                sub,
            ));
        }

        let mut tds = Self {
            vertices,
            cells,
            infinite,
        };
        tds.rebuild_adjacency()?;
        tds.is_valid()?;
        Ok(tds)
    }

    /// An empty stand-in triangulation (just the infinite vertex), used to
    /// take ownership of a caller's triangulation for the duration of a
    /// run.
    pub(crate) fn placeholder() -> Self {
        let mut vertices: SlotMap<VertexKey, Vertex> = SlotMap::with_key();
        let infinite = vertices.insert(Vertex::new(Point::ORIGIN));
        Self {
            vertices,
            cells: SlotMap::with_key(),
            infinite,
        }
    }

    // -------------------------------------------------------------------------
    // Basic access
    // -------------------------------------------------------------------------

    /// The distinguished hull-closing vertex.
    #[inline]
    #[must_use]
    pub const fn infinite_vertex(&self) -> VertexKey {
        self.infinite
    }

    /// True for the infinite vertex.
    #[inline]
    #[must_use]
    pub fn is_infinite_vertex(&self, v: VertexKey) -> bool {
        v == self.infinite
    }

    /// True when the cell references the infinite vertex.
    #[must_use]
    pub fn is_infinite_cell(&self, c: CellKey) -> bool {
        self.cells
            .get(c)
            .is_some_and(|cell| cell.has_vertex(self.infinite))
    }

    /// Vertex record for `v`, if alive.
    #[inline]
    #[must_use]
    pub fn vertex(&self, v: VertexKey) -> Option<&Vertex> {
        self.vertices.get(v)
    }

    /// Mutable vertex record for `v`, if alive.
    #[inline]
    pub fn vertex_mut(&mut self, v: VertexKey) -> Option<&mut Vertex> {
        self.vertices.get_mut(v)
    }

    /// Cell record for `c`, if alive.
    #[inline]
    #[must_use]
    pub fn cell(&self, c: CellKey) -> Option<&Cell> {
        self.cells.get(c)
    }

    /// Mutable cell record for `c`, if alive.
    #[inline]
    pub fn cell_mut(&mut self, c: CellKey) -> Option<&mut Cell> {
        self.cells.get_mut(c)
    }

    /// True when `v` is alive.
    #[inline]
    #[must_use]
    pub fn contains_vertex(&self, v: VertexKey) -> bool {
        self.vertices.contains_key(v)
    }

    /// True when `c` is alive.
    #[inline]
    #[must_use]
    pub fn contains_cell(&self, c: CellKey) -> bool {
        self.cells.contains_key(c)
    }

    /// Position of `v`. Panics on a dead key; use in contexts where the
    /// key is known alive.
    #[inline]
    #[must_use]
    pub fn point(&self, v: VertexKey) -> &Point {
        self.vertices[v].point()
    }

    /// Number of finite vertices.
    #[must_use]
    pub fn number_of_finite_vertices(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Number of finite cells.
    #[must_use]
    pub fn number_of_finite_cells(&self) -> usize {
        self.cells
            .iter()
            .filter(|(_, c)| !c.has_vertex(self.infinite))
            .count()
    }

    /// Total number of cells, infinite cells included.
    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    // -------------------------------------------------------------------------
    // Iteration
    // -------------------------------------------------------------------------

    /// Iterates over all vertices, the infinite vertex included.
    pub fn all_vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex)> {
        self.vertices.iter()
    }

    /// Iterates over finite vertices.
    pub fn finite_vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex)> {
        let infinite = self.infinite;
        self.vertices.iter().filter(move |(k, _)| *k != infinite)
    }

    /// Iterates over all cells, infinite cells included.
    pub fn all_cells(&self) -> impl Iterator<Item = (CellKey, &Cell)> {
        self.cells.iter()
    }

    /// Iterates over finite cells.
    pub fn finite_cells(&self) -> impl Iterator<Item = (CellKey, &Cell)> {
        let infinite = self.infinite;
        self.cells
            .iter()
            .filter(move |(_, c)| !c.has_vertex(infinite))
    }

    /// Iterates over finite facets, each yielded exactly once.
    ///
    /// A facet is finite when none of its three vertices is the infinite
    /// vertex; the handle may still live on an infinite cell.
    pub fn finite_facets(&self) -> impl Iterator<Item = FacetHandle> + '_ {
        let infinite = self.infinite;
        self.cells.iter().flat_map(move |(ck, cell)| {
            (0..4u8).filter_map(move |i| {
                let n = cell.neighbor(usize::from(i));
                // Yield from the side with the smaller raw key.
                if ck.data().as_ffi() >= n.data().as_ffi() {
                    return None;
                }
                let finite = FACET_VERTEX_TRIPLES[usize::from(i)]
                    .iter()
                    .all(|&j| cell.vertex(j) != infinite);
                finite.then_some(FacetHandle::new(ck, i))
            })
        })
    }

    /// Iterates over finite edges, each yielded exactly once.
    pub fn finite_edges(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        let infinite = self.infinite;
        let mut seen: FastHashSet<EdgeKey> = FastHashSet::default();
        self.cells
            .iter()
            .flat_map(|(_, cell)| {
                const PAIRS: [(usize, usize); 6] =
                    [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
                PAIRS
                    .into_iter()
                    .map(move |(i, j)| (cell.vertex(i), cell.vertex(j)))
            })
            .filter_map(move |(a, b)| {
                if a == infinite || b == infinite {
                    return None;
                }
                let e = EdgeKey::new(a, b);
                seen.insert(e).then_some(e)
            })
    }

    // -------------------------------------------------------------------------
    // Facet helpers
    // -------------------------------------------------------------------------

    /// The three vertices of a facet, in consistent orientation.
    #[must_use]
    pub fn facet_vertices(&self, f: FacetHandle) -> [VertexKey; 3] {
        let cell = &self.cells[f.cell];
        let t = FACET_VERTEX_TRIPLES[usize::from(f.index)];
        [cell.vertex(t[0]), cell.vertex(t[1]), cell.vertex(t[2])]
    }

    /// Canonical key of the facet.
    #[must_use]
    pub fn facet_key(&self, f: FacetHandle) -> FacetKey {
        let [a, b, c] = self.facet_vertices(f);
        FacetKey::new(a, b, c)
    }

    /// The same facet as seen from the neighboring cell.
    #[must_use]
    pub fn mirror_facet(&self, f: FacetHandle) -> Option<FacetHandle> {
        let cell = self.cells.get(f.cell)?;
        let n = cell.neighbor(usize::from(f.index));
        let j = self.cells.get(n)?.index_of_neighbor(f.cell)?;
        #[allow(clippy::cast_possible_truncation)]
        Some(FacetHandle::new(n, j as u8))
    }

    // -------------------------------------------------------------------------
    // Local traversal
    // -------------------------------------------------------------------------

    /// All cells incident to `v`, gathered by flooding neighbor links from
    /// the stored back-reference. Empty when `v` is dead or detached.
    #[must_use]
    pub fn incident_cells(&self, v: VertexKey) -> CellStarBuffer {
        let mut star = CellStarBuffer::new();
        let Some(vertex) = self.vertices.get(v) else {
            return star;
        };
        let start = vertex.incident_cell();
        if !self.cells.contains_key(start) {
            return star;
        }
        let mut visited: FastHashSet<CellKey> = FastHashSet::default();
        let mut stack: SmallBuffer<CellKey, 32> = SmallBuffer::new();
        visited.insert(start);
        stack.push(start);
        while let Some(ck) = stack.pop() {
            star.push(ck);
            let cell = &self.cells[ck];
            for i in 0..4 {
                if cell.vertex(i) == v {
                    continue;
                }
                // Crossing the facet opposite a vertex other than v stays
                // inside the star of v.
                let n = cell.neighbor(i);
                if self.cells.contains_key(n) && visited.insert(n) {
                    stack.push(n);
                }
            }
        }
        star
    }

    /// True when `u` and `v` are joined by an edge.
    #[must_use]
    pub fn edge_exists(&self, u: VertexKey, v: VertexKey) -> bool {
        self.incident_cells(u)
            .iter()
            .any(|&c| self.cells[c].has_vertex(v))
    }

    /// The ring of cells around edge `(u, v)` in circulation order, paired
    /// with the ring vertices (the non-edge vertex shared by consecutive
    /// cells). `None` when the edge does not exist or the ring cannot be
    /// closed.
    #[must_use]
    pub fn cells_around_edge(
        &self,
        u: VertexKey,
        v: VertexKey,
    ) -> Option<(EdgeRingBuffer, SmallBuffer<VertexKey, RING_BUFFER_SIZE>)> {
        let start = self
            .incident_cells(u)
            .into_iter()
            .find(|&c| self.cells[c].has_vertex(v))?;

        let (first, last) = other_two(&self.cells[start], u, v)?;
        let mut ring = EdgeRingBuffer::new();
        let mut verts: SmallBuffer<VertexKey, RING_BUFFER_SIZE> = SmallBuffer::new();
        ring.push(start);
        verts.push(first);

        let mut cur = start;
        let mut shared = first;
        for _ in 0..MAX_RING_LENGTH {
            let cell = &self.cells[cur];
            let (a, b) = other_two(cell, u, v)?;
            let opposite = if a == shared { b } else { a };
            let next = cell.neighbor(cell.index_of(opposite)?);
            if next == start {
                debug_assert!(ring.len() == 1 || shared == last);
                return Some((ring, verts));
            }
            let next_cell = self.cells.get(next)?;
            let (na, nb) = other_two(next_cell, u, v)?;
            let w = if na == shared { nb } else { na };
            ring.push(next);
            verts.push(w);
            cur = next;
            shared = w;
        }
        None
    }

    // -------------------------------------------------------------------------
    // Local operations
    // -------------------------------------------------------------------------

    /// Inserts a vertex at `point` on the edge `(u, v)`, subdividing every
    /// cell of the edge ring in two. The midpoint vertex is created with
    /// complex dimension `in_dimension`; child cells inherit the subdomain
    /// of their parent.
    ///
    /// # Errors
    ///
    /// [`EditError::EdgeNotFound`] when the edge does not exist,
    /// [`EditError::InconsistentStar`] when rewiring fails (the
    /// triangulation is left untouched in the first case only; the second
    /// indicates a corrupted input star).
    pub fn split_edge(
        &mut self,
        u: VertexKey,
        v: VertexKey,
        point: Point,
        in_dimension: i8,
    ) -> Result<EdgeSplitInfo, EditError> {
        let (ring, ring_vertices) = self.cells_around_edge(u, v).ok_or(EditError::EdgeNotFound)?;

        let m = self
            .vertices
            .insert(Vertex::with_dimension(point, in_dimension));

        let mut protos: SmallBuffer<CellProto, 16> = SmallBuffer::new();
        for &ck in &ring {
            let cell = &self.cells[ck];
            let mut child_u = *cell.vertices();
            let mut child_v = *cell.vertices();
            // child_u keeps u, child_v keeps v; both gain the midpoint.
            for slot in &mut child_u {
                if *slot == v {
                    *slot = m;
                }
            }
            for slot in &mut child_v {
                if *slot == u {
                    *slot = m;
                }
            }
            protos.push(CellProto {
                vertices: child_u,
                subdomain: cell.subdomain(),
            });
            protos.push(CellProto {
                vertices: child_v,
                subdomain: cell.subdomain(),
            });
        }

        self.replace_cells(&ring, &protos)?;
        Ok(EdgeSplitInfo {
            new_vertex: m,
            ring_vertices,
        })
    }

    /// Inserts a vertex at `point` in the interior of a finite cell,
    /// subdividing it into four.
    ///
    /// # Errors
    ///
    /// [`EditError::InfiniteRegion`] for an infinite cell,
    /// [`EditError::EdgeNotFound`] for a dead cell key.
    pub fn insert_in_cell(
        &mut self,
        ck: CellKey,
        point: Point,
        in_dimension: i8,
    ) -> Result<VertexKey, EditError> {
        let cell = self.cells.get(ck).ok_or(EditError::EdgeNotFound)?;
        if cell.has_vertex(self.infinite) {
            return Err(EditError::InfiniteRegion);
        }
        let verts = *cell.vertices();
        let subdomain = cell.subdomain();
        let m = self
            .vertices
            .insert(Vertex::with_dimension(point, in_dimension));

        let mut protos: SmallBuffer<CellProto, 4> = SmallBuffer::new();
        for i in 0..4 {
            let mut child = verts;
            child[i] = m;
            protos.push(CellProto {
                vertices: child,
                subdomain,
            });
        }
        self.replace_cells(&[ck], &protos)?;
        Ok(m)
    }

    /// Inserts a vertex at `point` on a finite facet, subdividing each of
    /// the two incident cells into three.
    ///
    /// # Errors
    ///
    /// [`EditError::InfiniteRegion`] when the facet touches the infinite
    /// vertex, [`EditError::InconsistentStar`] on a dangling handle.
    pub fn insert_in_facet(
        &mut self,
        f: FacetHandle,
        point: Point,
        in_dimension: i8,
    ) -> Result<VertexKey, EditError> {
        let mirror = self.mirror_facet(f).ok_or(EditError::InconsistentStar)?;
        let [t0, t1, t2] = self.facet_vertices(f);
        if [t0, t1, t2].contains(&self.infinite) {
            return Err(EditError::InfiniteRegion);
        }
        let m = self
            .vertices
            .insert(Vertex::with_dimension(point, in_dimension));

        let mut protos: SmallBuffer<CellProto, 6> = SmallBuffer::new();
        for side in [f.cell, mirror.cell] {
            let cell = &self.cells[side];
            let verts = *cell.vertices();
            let subdomain = cell.subdomain();
            for facet_vertex in [t0, t1, t2] {
                let mut child = verts;
                for slot in &mut child {
                    if *slot == facet_vertex {
                        *slot = m;
                    }
                }
                protos.push(CellProto {
                    vertices: child,
                    subdomain,
                });
            }
        }
        self.replace_cells(&[f.cell, mirror.cell], &protos)?;
        Ok(m)
    }

    /// Merges `src` into `tgt`: every cell incident to `src` is removed,
    /// and those not containing `tgt` are recreated with `src` replaced by
    /// `tgt`. The `src` vertex is deleted.
    ///
    /// This is the raw topological move behind an edge collapse. It does
    /// **not** check the link condition or cell orientations; callers must
    /// validate beforehand.
    ///
    /// # Errors
    ///
    /// [`EditError::EdgeNotFound`] when `(src, tgt)` is not an edge, and
    /// [`EditError::InconsistentStar`] when the resulting star cannot be
    /// rewired into a manifold (a failed link condition surfaces here if
    /// the caller skipped its own check).
    pub fn merge_vertices(&mut self, src: VertexKey, tgt: VertexKey) -> Result<(), EditError> {
        let star = self.incident_cells(src);
        if star.is_empty() || !star.iter().any(|&c| self.cells[c].has_vertex(tgt)) {
            return Err(EditError::EdgeNotFound);
        }

        let mut protos: SmallBuffer<CellProto, 32> = SmallBuffer::new();
        for &ck in &star {
            let cell = &self.cells[ck];
            if cell.has_vertex(tgt) {
                continue;
            }
            let mut verts = *cell.vertices();
            for slot in &mut verts {
                if *slot == src {
                    *slot = tgt;
                }
            }
            protos.push(CellProto {
                vertices: verts,
                subdomain: cell.subdomain(),
            });
        }

        self.replace_cells(&star, &protos)?;
        self.vertices.remove(src);
        Ok(())
    }

    /// 2-to-3 flip across a facet: the two cells sharing it are replaced
    /// by three cells sharing the edge between the two opposite vertices.
    ///
    /// Both cells must be finite. On success returns the three new cells.
    ///
    /// # Errors
    ///
    /// Rejected (triangulation untouched) when the facet or its opposite
    /// vertices touch the infinite vertex, when the opposite vertices are
    /// already joined by an edge, or when any of the three prospective
    /// cells would be inverted or degenerate.
    pub fn flip_2_3(&mut self, f: FacetHandle) -> Result<[CellKey; 3], EditError> {
        let mirror = self.mirror_facet(f).ok_or(EditError::InconsistentStar)?;
        let c = f.cell;
        let n = mirror.cell;
        let p = self.cells[c].vertex(usize::from(f.index));
        let q = self.cells[n].vertex(usize::from(mirror.index));
        let [t0, t1, t2] = self.facet_vertices(f);

        if [p, q, t0, t1, t2].contains(&self.infinite) {
            return Err(EditError::InfiniteRegion);
        }
        if self.edge_exists(p, q) {
            return Err(EditError::EdgeExists);
        }

        // The facet triple is oriented so that (t0, t1, t2, p) is positive;
        // the three replacement cells are positive iff segment (p, q)
        // crosses the interior of the facet.
        let (pp, pq) = (*self.point(p), *self.point(q));
        let pts = [*self.point(t0), *self.point(t1), *self.point(t2)];
        for (x, y) in [(0, 1), (1, 2), (2, 0)] {
            if orientation(&pts[x], &pts[y], &pq, &pp) != Orientation::Positive {
                return Err(EditError::WouldInvert);
            }
        }

        let subdomain = self.cells[c].subdomain();
        let protos = [
            CellProto {
                vertices: [t0, t1, q, p],
                subdomain,
            },
            CellProto {
                vertices: [t1, t2, q, p],
                subdomain,
            },
            CellProto {
                vertices: [t2, t0, q, p],
                subdomain,
            },
        ];
        let created = self.replace_cells(&[c, n], &protos)?;
        Ok([created[0], created[1], created[2]])
    }

    /// 3-to-2 flip around an edge: the three cells of the edge ring are
    /// replaced by two cells sharing the facet of the three ring vertices.
    ///
    /// On success returns the two new cells.
    ///
    /// # Errors
    ///
    /// Rejected (triangulation untouched) when the edge does not exist,
    /// the ring is not exactly three finite cells, or the two prospective
    /// cells would be inverted or degenerate.
    pub fn flip_3_2(&mut self, u: VertexKey, v: VertexKey) -> Result<[CellKey; 2], EditError> {
        let (ring, verts) = self.cells_around_edge(u, v).ok_or(EditError::EdgeNotFound)?;
        if ring.len() != 3 {
            return Err(EditError::RingNotTriple);
        }
        let [a, b, c] = [verts[0], verts[1], verts[2]];
        if [u, v, a, b, c].contains(&self.infinite) {
            return Err(EditError::InfiniteRegion);
        }

        let (pa, pb, pc) = (*self.point(a), *self.point(b), *self.point(c));
        let (pu, pv) = (*self.point(u), *self.point(v));
        let su = orientation(&pa, &pb, &pc, &pu);
        let sv = orientation(&pa, &pb, &pc, &pv);
        // u and v must lie strictly on opposite sides of the ring facet.
        let protos = match (su, sv) {
            (Orientation::Positive, Orientation::Negative) => [
                CellProto {
                    vertices: [a, b, c, u],
                    subdomain: self.cells[ring[0]].subdomain(),
                },
                CellProto {
                    vertices: [a, c, b, v],
                    subdomain: self.cells[ring[0]].subdomain(),
                },
            ],
            (Orientation::Negative, Orientation::Positive) => [
                CellProto {
                    vertices: [a, c, b, u],
                    subdomain: self.cells[ring[0]].subdomain(),
                },
                CellProto {
                    vertices: [a, b, c, v],
                    subdomain: self.cells[ring[0]].subdomain(),
                },
            ],
            _ => return Err(EditError::WouldInvert),
        };

        let created = self.replace_cells(&ring, &protos)?;
        Ok([created[0], created[1]])
    }

    // -------------------------------------------------------------------------
    // Cavity rewiring
    // -------------------------------------------------------------------------

    /// Replaces the cells in `removed` by the cells described in `protos`.
    ///
    /// Records the boundary facets of the removed region (facets whose
    /// other side survives) and matches the facets of the prospective
    /// cells against each other and against that boundary: internal facets
    /// must pair two new cells, boundary facets must pair a new cell with
    /// the recorded outside cell, and nothing may be left over. Matching
    /// is verified **before** any mutation, so a rejected rewiring leaves
    /// the triangulation untouched. On success the region is swapped out,
    /// neighbors are wired according to the match, and the incident-cell
    /// back-references of all vertices of the new cells are refreshed.
    pub(crate) fn replace_cells(
        &mut self,
        removed: &[CellKey],
        protos: &[CellProto],
    ) -> Result<SmallBuffer<CellKey, 16>, EditError> {
        let removed_set: FastHashSet<CellKey> = removed.iter().copied().collect();

        // Boundary of the cavity: facet key -> (outside cell, its facet index).
        let mut boundary: FastHashMap<FacetKey, (CellKey, usize)> = FastHashMap::default();
        for &ck in removed {
            let cell = self.cells.get(ck).ok_or(EditError::InconsistentStar)?;
            for i in 0..4 {
                let n = cell.neighbor(i);
                if removed_set.contains(&n) {
                    continue;
                }
                let t = FACET_VERTEX_TRIPLES[i];
                let key = FacetKey::new(cell.vertex(t[0]), cell.vertex(t[1]), cell.vertex(t[2]));
                let j = self
                    .cells
                    .get(n)
                    .and_then(|nc| nc.index_of_neighbor(ck))
                    .ok_or(EditError::InconsistentStar)?;
                if boundary.insert(key, (n, j)).is_some() {
                    return Err(EditError::InconsistentStar);
                }
            }
        }

        // Dry matching pass over the prototypes.
        let mut internal: Vec<((usize, usize), (usize, usize))> = Vec::new();
        let mut external: Vec<((usize, usize), (CellKey, usize))> = Vec::new();
        let mut open: FastHashMap<FacetKey, (usize, usize)> = FastHashMap::default();
        for (p, proto) in protos.iter().enumerate() {
            for i in 0..4 {
                let t = FACET_VERTEX_TRIPLES[i];
                let key = FacetKey::new(
                    proto.vertices[t[0]],
                    proto.vertices[t[1]],
                    proto.vertices[t[2]],
                );
                if let Some(partner) = open.remove(&key) {
                    internal.push((partner, (p, i)));
                } else if let Some((outside, oj)) = boundary.remove(&key) {
                    external.push(((p, i), (outside, oj)));
                } else {
                    open.insert(key, (p, i));
                }
            }
        }
        if !open.is_empty() || !boundary.is_empty() {
            return Err(EditError::InconsistentStar);
        }

        // Commit.
        for &ck in removed {
            self.cells.remove(ck);
        }
        let mut created: SmallBuffer<CellKey, 16> = SmallBuffer::new();
        for proto in protos {
            created.push(self.cells.insert(Cell::new(proto.vertices, proto.subdomain)));
        }
        for ((p0, i0), (p1, i1)) in internal {
            let (a, b) = (created[p0], created[p1]);
            self.cells[a].set_neighbor(i0, b);
            self.cells[b].set_neighbor(i1, a);
        }
        for ((p, i), (outside, oj)) in external {
            let ck = created[p];
            self.cells[ck].set_neighbor(i, outside);
            self.cells[outside].set_neighbor(oj, ck);
        }

        for &ck in &created {
            let verts = *self.cells[ck].vertices();
            for v in verts {
                self.vertices[v].set_incident_cell(ck);
            }
        }
        Ok(created)
    }

    // -------------------------------------------------------------------------
    // Global adjacency rebuild
    // -------------------------------------------------------------------------

    /// Inserts a detached vertex record. Used by the scaffold-layer
    /// construction, which rebuilds adjacency afterwards.
    pub(crate) fn insert_vertex_raw(&mut self, vertex: Vertex) -> VertexKey {
        self.vertices.insert(vertex)
    }

    /// Inserts a cell with unset neighbors. Used together with
    /// [`Tds::rebuild_adjacency`].
    pub(crate) fn insert_cell_raw(&mut self, cell: Cell) -> CellKey {
        self.cells.insert(cell)
    }

    /// Discards all infinite cells, rewires every neighbor link from
    /// scratch, closes the hull with fresh infinite cells, and refreshes
    /// all incident-cell back-references.
    pub(crate) fn rebuild_adjacency(&mut self) -> Result<(), TriangulationConstructionError> {
        let infinite = self.infinite;
        let stale: Vec<CellKey> = self
            .cells
            .iter()
            .filter(|(_, c)| c.has_vertex(infinite))
            .map(|(k, _)| k)
            .collect();
        for ck in stale {
            self.cells.remove(ck);
        }

        // Facet key -> incident (cell, facet index) pairs.
        let mut facets: FastHashMap<FacetKey, SmallBuffer<(CellKey, usize), 2>> =
            FastHashMap::default();
        for (ck, cell) in &self.cells {
            for i in 0..4 {
                let t = FACET_VERTEX_TRIPLES[i];
                let key = FacetKey::new(cell.vertex(t[0]), cell.vertex(t[1]), cell.vertex(t[2]));
                facets.entry(key).or_default().push((ck, i));
            }
        }

        let mut hull: Vec<(CellKey, usize)> = Vec::new();
        for (_, incident) in &facets {
            match incident.as_slice() {
                [(c0, i0), (c1, i1)] => {
                    self.cells[*c0].set_neighbor(*i0, *c1);
                    self.cells[*c1].set_neighbor(*i1, *c0);
                }
                [(c0, i0)] => hull.push((*c0, *i0)),
                _ => return Err(TriangulationConstructionError::NonManifoldFacet),
            }
        }

        // Close the hull: one infinite cell per boundary facet, glued to
        // its finite cell and, across each hull edge, to the adjacent
        // infinite cell.
        let mut edge_links: FastHashMap<EdgeKey, SmallBuffer<(CellKey, usize), 2>> =
            FastHashMap::default();
        for (ck, i) in hull {
            let t = FACET_VERTEX_TRIPLES[i];
            let cell = &self.cells[ck];
            // Reversed triple: the hull facet seen from outside.
            let (a, b, c) = (cell.vertex(t[0]), cell.vertex(t[2]), cell.vertex(t[1]));
            let ic = self
                .cells
                .insert(Cell::new([a, b, c, infinite], SubdomainIndex::NONE));
            self.cells[ic].set_neighbor(3, ck);
            self.cells[ck].set_neighbor(i, ic);
            for (x, y, opposite) in [(a, b, 2), (b, c, 0), (c, a, 1)] {
                edge_links
                    .entry(EdgeKey::new(x, y))
                    .or_default()
                    .push((ic, opposite));
            }
        }
        for (_, links) in &edge_links {
            match links.as_slice() {
                [(c0, i0), (c1, i1)] => {
                    self.cells[*c0].set_neighbor(*i0, *c1);
                    self.cells[*c1].set_neighbor(*i1, *c0);
                }
                _ => return Err(TriangulationConstructionError::NonManifoldFacet),
            }
        }

        for (ck, cell) in &self.cells {
            for i in 0..4 {
                self.vertices[cell.vertex(i)].set_incident_cell(ck);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Audit
    // -------------------------------------------------------------------------

    /// Structural validity audit: vertex references, neighbor involution
    /// with matching shared facets, facet sharing, positive volumes of
    /// finite cells, and incident-cell back-references.
    ///
    /// # Errors
    ///
    /// The first violated invariant, as a [`TriangulationValidationError`].
    pub fn is_valid(&self) -> Result<(), TriangulationValidationError> {
        let mut facet_counts: FastHashMap<FacetKey, usize> = FastHashMap::default();

        for (ck, cell) in &self.cells {
            let vs = cell.vertices();
            let distinct = vs[0] != vs[1]
                && vs[0] != vs[2]
                && vs[0] != vs[3]
                && vs[1] != vs[2]
                && vs[1] != vs[3]
                && vs[2] != vs[3];
            if !distinct || vs.iter().any(|&v| !self.vertices.contains_key(v)) {
                return Err(TriangulationValidationError::BadCellVertices { cell: ck });
            }

            for i in 0..4 {
                let n = cell.neighbor(i);
                let Some(ncell) = self.cells.get(n) else {
                    return Err(TriangulationValidationError::BrokenNeighborLink {
                        cell: ck,
                        index: i,
                    });
                };
                let Some(j) = ncell.index_of_neighbor(ck) else {
                    return Err(TriangulationValidationError::BrokenNeighborLink {
                        cell: ck,
                        index: i,
                    });
                };
                let t = FACET_VERTEX_TRIPLES[i];
                let mine = FacetKey::new(cell.vertex(t[0]), cell.vertex(t[1]), cell.vertex(t[2]));
                let s = FACET_VERTEX_TRIPLES[j];
                let theirs =
                    FacetKey::new(ncell.vertex(s[0]), ncell.vertex(s[1]), ncell.vertex(s[2]));
                if mine != theirs {
                    return Err(TriangulationValidationError::BrokenNeighborLink {
                        cell: ck,
                        index: i,
                    });
                }
                *facet_counts.entry(mine).or_insert(0) += 1;
            }

            if !cell.has_vertex(self.infinite) {
                let [a, b, c, d] = *vs;
                if orientation(self.point(a), self.point(b), self.point(c), self.point(d))
                    != Orientation::Positive
                {
                    return Err(TriangulationValidationError::InvertedCell { cell: ck });
                }
            }
        }

        // Each facet was counted once from each side.
        for (_, count) in facet_counts {
            if count != 2 {
                return Err(TriangulationValidationError::FacetSharing { count });
            }
        }

        for (vk, vertex) in &self.vertices {
            let ic = vertex.incident_cell();
            let ok = self.cells.get(ic).is_some_and(|c| c.has_vertex(vk));
            if !ok {
                return Err(TriangulationValidationError::StaleIncidentCell { vertex: vk });
            }
        }
        Ok(())
    }
}

/// The two vertices of `cell` that are not `u` or `v`.
fn other_two(cell: &Cell, u: VertexKey, v: VertexKey) -> Option<(VertexKey, VertexKey)> {
    let mut out: SmallBuffer<VertexKey, 2> = SmallBuffer::new();
    for i in 0..4 {
        let w = cell.vertex(i);
        if w != u && w != v {
            out.push(w);
        }
    }
    if out.len() == 2 {
        Some((out[0], out[1]))
    } else {
        None
    }
}
