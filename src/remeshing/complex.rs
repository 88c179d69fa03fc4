//! The decorated mesh complex.
//!
//! [`MeshComplex`] overlays the triangulation with the structure the
//! operators must preserve: which facets separate subdomains, which edges
//! are features (caller-constrained or where more than two subdomains
//! meet), and which vertices are corners. Cell membership is carried by
//! the cells' own subdomain tags; facet and edge membership are tracked as
//! sets of canonical keys, which survive the constant churn of cell
//! deletion and recreation underneath them.

use crate::core::cell::SubdomainIndex;
use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
use crate::core::edge::EdgeKey;
use crate::core::facet::{FacetKey, FACET_VERTEX_TRIPLES};
use crate::core::triangulation::{Tds, VertexKey};
use crate::remeshing::traits::{CellSelector, EdgeConstraintMap};
use tracing::{debug, warn};

/// Summary of complex construction.
#[derive(Clone, Copy, Debug)]
pub struct ComplexInitReport {
    /// Highest subdomain index seen on a selected cell.
    pub max_subdomain: SubdomainIndex,
    /// True when no selected cell carried a positive subdomain index; the
    /// remeshing loop is then likely to have nothing to work on.
    pub trivial_subdomains: bool,
    /// Number of selected cells.
    pub cells: usize,
    /// Number of complex (subdomain-boundary) facets.
    pub facets: usize,
    /// Number of complex (feature) edges.
    pub edges: usize,
    /// Number of corners.
    pub corners: usize,
}

/// Complex tags gathered before a collapse and applied after it.
#[derive(Clone, Debug, Default)]
pub(crate) struct CollapseTagTransfer {
    facets: SmallBuffer<FacetKey, 16>,
    edge_others: SmallBuffer<VertexKey, 4>,
}

/// A triangulation decorated with subdomain-boundary facets, feature
/// edges, and corners.
pub struct MeshComplex {
    tds: Tds,
    facets: FastHashSet<FacetKey>,
    /// Feature-edge adjacency: for each endpoint, the other endpoints of
    /// its incident complex edges.
    edge_adjacency: FastHashMap<VertexKey, SmallBuffer<VertexKey, 4>>,
    corners: FastHashMap<VertexKey, u32>,
    next_corner_id: u32,
    imaginary_index: SubdomainIndex,
}

impl MeshComplex {
    /// Builds the complex over `tds`.
    ///
    /// Tagging proceeds bottom-up through the dimensions: selected cells
    /// first (promoting unclassified vertices to dimension 3), then
    /// subdomain-boundary facets (lowering their vertices to 2), then
    /// feature edges (lowering endpoints to 1), then corners (pre-marked
    /// dimension-0 vertices and vertices where more than two feature
    /// edges meet).
    pub fn build<E, C>(tds: Tds, ecmap: &E, selector: &C) -> (Self, ComplexInitReport)
    where
        E: EdgeConstraintMap,
        C: CellSelector,
    {
        let mut complex = Self {
            tds,
            facets: FastHashSet::default(),
            edge_adjacency: FastHashMap::default(),
            corners: FastHashMap::default(),
            next_corner_id: 0,
            imaginary_index: SubdomainIndex::NONE,
        };

        // Cells.
        let mut max_si = SubdomainIndex::NONE;
        let mut selected_cells = 0usize;
        let mut promote: Vec<VertexKey> = Vec::new();
        for (_, cell) in complex.tds.finite_cells() {
            if selector.select(cell) {
                max_si = max_si.max(cell.subdomain());
                selected_cells += 1;
            }
            promote.extend_from_slice(cell.vertices());
        }
        for v in promote {
            if let Some(vertex) = complex.tds.vertex_mut(v) {
                if vertex.in_dimension() == -1 {
                    vertex.set_dimension(3);
                }
            }
        }
        complex.imaginary_index = SubdomainIndex(max_si.0 + 1);
        let trivial = max_si == SubdomainIndex::NONE;
        if trivial {
            warn!("maximal subdomain index is 0; remeshing is likely to fail");
        }

        // Facets between differing subdomains.
        let boundary_facets: Vec<FacetKey> = complex
            .tds
            .finite_facets()
            .filter_map(|f| {
                let mirror = complex.tds.mirror_facet(f)?;
                let s1 = complex.tds.cell(f.cell)?.subdomain();
                let s2 = complex.tds.cell(mirror.cell)?.subdomain();
                (s1 != s2).then(|| complex.tds.facet_key(f))
            })
            .collect();
        for key in boundary_facets {
            for &v in key.vertices() {
                if let Some(vertex) = complex.tds.vertex_mut(v) {
                    vertex.lower_dimension(2);
                }
            }
            complex.facets.insert(key);
        }

        // Feature edges: constrained by the caller, or where more than two
        // subdomains meet.
        let feature_edges: Vec<EdgeKey> = complex
            .tds
            .finite_edges()
            .filter(|&e| {
                ecmap.get(e)
                    || complex
                        .incident_subdomains_of_edge(e.v0(), e.v1())
                        .len()
                        > 2
            })
            .collect();
        for e in feature_edges {
            complex.add_complex_edge(e);
            for v in [e.v0(), e.v1()] {
                if let Some(vertex) = complex.tds.vertex_mut(v) {
                    vertex.lower_dimension(1);
                }
            }
        }

        // Corners.
        let corner_candidates: Vec<VertexKey> = complex
            .tds
            .finite_vertices()
            .filter(|(v, vertex)| {
                vertex.in_dimension() == 0 || complex.complex_edge_degree(*v) > 2
            })
            .map(|(v, _)| v)
            .collect();
        for v in corner_candidates {
            complex.register_corner(v);
        }

        let report = ComplexInitReport {
            max_subdomain: max_si,
            trivial_subdomains: trivial,
            cells: selected_cells,
            facets: complex.facets.len(),
            edges: complex.number_of_complex_edges(),
            corners: complex.corners.len(),
        };
        debug!(
            cells = report.cells,
            facets = report.facets,
            edges = report.edges,
            corners = report.corners,
            "complex ready"
        );
        (complex, report)
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// The underlying triangulation.
    #[inline]
    #[must_use]
    pub const fn tds(&self) -> &Tds {
        &self.tds
    }

    /// Mutable access to the underlying triangulation.
    #[inline]
    pub fn tds_mut(&mut self) -> &mut Tds {
        &mut self.tds
    }

    /// Consumes the complex and returns the triangulation.
    #[must_use]
    pub fn into_tds(self) -> Tds {
        self.tds
    }

    /// The reserved subdomain index tagging scaffold cells.
    #[inline]
    #[must_use]
    pub const fn imaginary_index(&self) -> SubdomainIndex {
        self.imaginary_index
    }

    /// True for a subdomain label naming a material region: neither the
    /// exterior nor the scaffold layer.
    #[inline]
    #[must_use]
    pub fn is_real_subdomain(&self, s: SubdomainIndex) -> bool {
        !s.is_none() && s != self.imaginary_index
    }

    // -------------------------------------------------------------------------
    // Membership queries
    // -------------------------------------------------------------------------

    /// True when the facet separates two subdomains.
    #[inline]
    #[must_use]
    pub fn is_complex_facet(&self, key: FacetKey) -> bool {
        self.facets.contains(&key)
    }

    /// True when the edge is a feature edge.
    #[must_use]
    pub fn is_complex_edge(&self, e: EdgeKey) -> bool {
        self.edge_adjacency
            .get(&e.v0())
            .is_some_and(|others| others.contains(&e.v1()))
    }

    /// Number of feature edges incident to `v`.
    #[must_use]
    pub fn complex_edge_degree(&self, v: VertexKey) -> usize {
        self.edge_adjacency.get(&v).map_or(0, SmallBuffer::len)
    }

    /// The other endpoints of the feature edges at `v`.
    #[must_use]
    pub fn complex_edge_neighbors(&self, v: VertexKey) -> SmallBuffer<VertexKey, 4> {
        self.edge_adjacency.get(&v).cloned().unwrap_or_default()
    }

    /// True when `v` is a corner.
    #[inline]
    #[must_use]
    pub fn is_corner(&self, v: VertexKey) -> bool {
        self.corners.contains_key(&v)
    }

    /// Number of complex facets.
    #[must_use]
    pub fn number_of_complex_facets(&self) -> usize {
        self.facets.len()
    }

    /// Number of complex edges.
    #[must_use]
    pub fn number_of_complex_edges(&self) -> usize {
        self.edge_adjacency.values().map(SmallBuffer::len).sum::<usize>() / 2
    }

    /// Iterates over the complex facet keys.
    pub fn complex_facets(&self) -> impl Iterator<Item = FacetKey> + '_ {
        self.facets.iter().copied()
    }

    /// True when the edge lies on a complex facet.
    #[must_use]
    pub fn edge_on_complex_facet(&self, u: VertexKey, v: VertexKey) -> bool {
        let Some((_, ring_vertices)) = self.tds.cells_around_edge(u, v) else {
            return false;
        };
        ring_vertices
            .iter()
            .any(|&x| self.facets.contains(&FacetKey::new(u, v, x)))
    }

    /// Distinct subdomain labels of the cells around edge `(u, v)`,
    /// infinite cells contributing the exterior label.
    #[must_use]
    pub fn incident_subdomains_of_edge(
        &self,
        u: VertexKey,
        v: VertexKey,
    ) -> SmallBuffer<SubdomainIndex, 8> {
        let mut out: SmallBuffer<SubdomainIndex, 8> = SmallBuffer::new();
        if let Some((ring, _)) = self.tds.cells_around_edge(u, v) {
            for ck in ring {
                let s = self.tds.cell(ck).map_or(SubdomainIndex::NONE, |c| c.subdomain());
                if !out.contains(&s) {
                    out.push(s);
                }
            }
        }
        out
    }

    /// Distinct subdomain labels of the cells around vertex `v`.
    #[must_use]
    pub fn incident_subdomains_of_vertex(&self, v: VertexKey) -> SmallBuffer<SubdomainIndex, 8> {
        let mut out: SmallBuffer<SubdomainIndex, 8> = SmallBuffer::new();
        for ck in self.tds.incident_cells(v) {
            let s = self.tds.cell(ck).map_or(SubdomainIndex::NONE, |c| c.subdomain());
            if !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }

    /// The complex facets incident to `v`, enumerated from its cell star.
    #[must_use]
    pub fn complex_facets_around_vertex(&self, v: VertexKey) -> SmallBuffer<FacetKey, 16> {
        let mut out: SmallBuffer<FacetKey, 16> = SmallBuffer::new();
        for ck in self.tds.incident_cells(v) {
            let Some(cell) = self.tds.cell(ck) else {
                continue;
            };
            for (i, triple) in FACET_VERTEX_TRIPLES.iter().enumerate() {
                if cell.vertex(i) == v {
                    // Facet opposite v does not contain v.
                    continue;
                }
                let key = FacetKey::new(
                    cell.vertex(triple[0]),
                    cell.vertex(triple[1]),
                    cell.vertex(triple[2]),
                );
                if self.facets.contains(&key) && !out.contains(&key) {
                    out.push(key);
                }
            }
        }
        out
    }

    // -------------------------------------------------------------------------
    // Membership updates
    // -------------------------------------------------------------------------

    /// Adds a feature edge.
    pub fn add_complex_edge(&mut self, e: EdgeKey) {
        if self.is_complex_edge(e) {
            return;
        }
        self.edge_adjacency.entry(e.v0()).or_default().push(e.v1());
        self.edge_adjacency.entry(e.v1()).or_default().push(e.v0());
    }

    /// Removes a feature edge.
    pub fn remove_complex_edge(&mut self, e: EdgeKey) {
        for (a, b) in [(e.v0(), e.v1()), (e.v1(), e.v0())] {
            if let Some(others) = self.edge_adjacency.get_mut(&a) {
                others.retain(|&mut w| w != b);
                if others.is_empty() {
                    self.edge_adjacency.remove(&a);
                }
            }
        }
    }

    /// Marks `v` as a corner, forcing its dimension to 0, and returns its
    /// corner id.
    pub fn register_corner(&mut self, v: VertexKey) -> u32 {
        if let Some(&id) = self.corners.get(&v) {
            return id;
        }
        self.next_corner_id += 1;
        let id = self.next_corner_id;
        self.corners.insert(v, id);
        if let Some(vertex) = self.tds.vertex_mut(v) {
            vertex.set_dimension(0);
        }
        id
    }

    /// Rewrites the complex sets after splitting edge `(u, v)` at `m`: a
    /// feature edge becomes two feature edges, and every complex facet of
    /// the edge ring is replaced by its two halves.
    pub(crate) fn note_edge_split(
        &mut self,
        u: VertexKey,
        v: VertexKey,
        m: VertexKey,
        ring_vertices: &[VertexKey],
    ) {
        let e = EdgeKey::new(u, v);
        if self.is_complex_edge(e) {
            self.remove_complex_edge(e);
            self.add_complex_edge(EdgeKey::new(u, m));
            self.add_complex_edge(EdgeKey::new(m, v));
        }
        for &x in ring_vertices {
            let key = FacetKey::new(u, v, x);
            if self.facets.remove(&key) {
                self.facets.insert(FacetKey::new(u, m, x));
                self.facets.insert(FacetKey::new(m, v, x));
            }
        }
    }

    /// Gathers the complex tags that must move off `src` before the
    /// collapse deletes its star.
    pub(crate) fn collect_collapse_tags(&self, src: VertexKey) -> CollapseTagTransfer {
        let mut transfer = CollapseTagTransfer::default();
        for ck in self.tds.incident_cells(src) {
            let Some(cell) = self.tds.cell(ck) else {
                continue;
            };
            for (i, triple) in FACET_VERTEX_TRIPLES.iter().enumerate() {
                if cell.vertex(i) == src {
                    continue;
                }
                let key = FacetKey::new(
                    cell.vertex(triple[0]),
                    cell.vertex(triple[1]),
                    cell.vertex(triple[2]),
                );
                if self.facets.contains(&key) && !transfer.facets.contains(&key) {
                    transfer.facets.push(key);
                }
            }
        }
        transfer.edge_others = self.complex_edge_neighbors(src);
        transfer
    }

    /// Applies the tag transfer after a successful collapse of `src` into
    /// `tgt`. Elements that contained both endpoints vanish; the rest have
    /// `src` replaced by `tgt`.
    pub(crate) fn apply_collapse_tags(
        &mut self,
        transfer: &CollapseTagTransfer,
        src: VertexKey,
        tgt: VertexKey,
    ) {
        for &key in &transfer.facets {
            self.facets.remove(&key);
            if !key.contains(tgt) {
                if let Some(renamed) = key.replace(src, tgt) {
                    self.facets.insert(renamed);
                }
            }
        }
        for &w in &transfer.edge_others {
            self.remove_complex_edge(EdgeKey::new(src, w));
            if w != tgt {
                self.add_complex_edge(EdgeKey::new(tgt, w));
            }
        }
    }

    /// Unsets the scaffold tag on every imaginary cell, removing the layer
    /// from the complex while leaving the cells in the triangulation.
    pub(crate) fn remove_imaginary_from_complex(&mut self) -> usize {
        let imaginary = self.imaginary_index;
        let retagged: Vec<_> = self
            .tds
            .finite_cells()
            .filter(|(_, c)| c.subdomain() == imaginary)
            .map(|(k, _)| k)
            .collect();
        let count = retagged.len();
        for ck in retagged {
            if let Some(cell) = self.tds.cell_mut(ck) {
                cell.set_subdomain(SubdomainIndex::NONE);
            }
        }
        count
    }
}
