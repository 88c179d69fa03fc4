//! Short-edge collapse.
//!
//! Edges shorter than the lower length bound are removed by merging one
//! endpoint (the source) into the other (the target), shortest first, with
//! the same lazy queue discipline as the split phase. The direction is
//! dictated by the complex: corners and lower-dimensional endpoints must
//! survive. A candidate is vetted combinatorially (the link condition, at
//! vertex, edge, and triangle level) and geometrically (no inverted cell,
//! no over-long replacement edge, no lost subdomain or feature) before the
//! merge is committed.

use crate::core::collections::{FastHashSet, SmallBuffer};
use crate::core::edge::EdgeKey;
use crate::core::facet::{FacetKey, FACET_VERTEX_TRIPLES};
use crate::core::triangulation::{CellKey, Tds, VertexKey};
use crate::geometry::point::Point;
use crate::geometry::predicates::{orientation, squared_distance, Orientation};
use crate::remeshing::complex::MeshComplex;
use crate::remeshing::traits::CellSelector;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

/// Collapses every eligible edge shorter than `emin`, refusing collapses
/// that would create an edge longer than `emax`. Returns the number of
/// collapses performed.
pub fn collapse_short_edges<C>(
    complex: &mut MeshComplex,
    emin: f64,
    emax: f64,
    protect_boundaries: bool,
    selector: &C,
) -> usize
where
    C: CellSelector,
{
    let sq_emin = emin * emin;
    let sq_emax = emax * emax;
    let mut queue: BinaryHeap<Reverse<(OrderedFloat<f64>, EdgeKey)>> = BinaryHeap::new();

    for e in complex.tds().finite_edges() {
        let sq = squared_distance(complex.tds().point(e.v0()), complex.tds().point(e.v1()));
        if sq < sq_emin {
            queue.push(Reverse((OrderedFloat(sq), e)));
        }
    }

    let mut collapses = 0usize;
    while let Some(Reverse((_, e))) = queue.pop() {
        let (a, b) = e.endpoints();
        if !complex.tds().contains_vertex(a) || !complex.tds().contains_vertex(b) {
            continue;
        }
        if !complex.tds().edge_exists(a, b) {
            continue;
        }
        let sq = squared_distance(complex.tds().point(a), complex.tds().point(b));
        if sq >= sq_emin {
            continue;
        }
        if !edge_in_region(complex, a, b, selector) {
            continue;
        }
        if protect_boundaries && !boundary_collapse_allowed(complex, a, b) {
            continue;
        }

        for (src, tgt) in candidate_directions(complex, a, b) {
            if !collapse_is_admissible(complex, src, tgt, sq_emax) {
                continue;
            }

            // Link vertices of the source become neighbors of the target;
            // remember them to re-queue fresh short edges.
            let link: SmallBuffer<VertexKey, 32> = link_vertices(complex.tds(), src)
                .into_iter()
                .filter(|&w| w != tgt && !complex.tds().is_infinite_vertex(w))
                .collect();

            let tags = complex.collect_collapse_tags(src);
            if complex.tds_mut().merge_vertices(src, tgt).is_err() {
                continue;
            }
            complex.apply_collapse_tags(&tags, src, tgt);
            collapses += 1;

            let pt = *complex.tds().point(tgt);
            for w in link {
                let sq = squared_distance(&pt, complex.tds().point(w));
                if sq < sq_emin {
                    queue.push(Reverse((OrderedFloat(sq), EdgeKey::new(tgt, w))));
                }
            }
            break;
        }
    }

    debug!(collapses, "collapse phase done");
    collapses
}

/// True when the edge has a selected cell of a real subdomain in its ring.
fn edge_in_region<C>(complex: &MeshComplex, u: VertexKey, v: VertexKey, selector: &C) -> bool
where
    C: CellSelector,
{
    let Some((ring, _)) = complex.tds().cells_around_edge(u, v) else {
        return false;
    };
    ring.iter().any(|&ck| {
        complex.tds().cell(ck).is_some_and(|cell| {
            complex.is_real_subdomain(cell.subdomain()) && selector.select(cell)
        })
    })
}

/// Under boundary protection, a boundary edge may only collapse along its
/// own stratum: both endpoints on the same complex dimension, and the edge
/// itself part of the element it would slide along.
fn boundary_collapse_allowed(complex: &MeshComplex, a: VertexKey, b: VertexKey) -> bool {
    let e = EdgeKey::new(a, b);
    let on_facet = complex.edge_on_complex_facet(a, b);
    if !complex.is_complex_edge(e) && !on_facet {
        return true;
    }
    let da = dimension(complex.tds(), a);
    let db = dimension(complex.tds(), b);
    if da != db || da > 2 {
        return false;
    }
    match da {
        1 => complex.is_complex_edge(e),
        2 => on_facet,
        // Corners never move; an edge between two corners cannot collapse.
        0 => false,
        _ => false,
    }
}

/// Collapse directions in priority order. Corners and lower-dimensional
/// endpoints must be the target; equal dimensions allow both directions.
fn candidate_directions(
    complex: &MeshComplex,
    a: VertexKey,
    b: VertexKey,
) -> SmallBuffer<(VertexKey, VertexKey), 2> {
    let mut out: SmallBuffer<(VertexKey, VertexKey), 2> = SmallBuffer::new();
    let ca = complex.is_corner(a);
    let cb = complex.is_corner(b);
    if ca && cb {
        return out;
    }
    if ca {
        out.push((b, a));
        return out;
    }
    if cb {
        out.push((a, b));
        return out;
    }
    let da = dimension(complex.tds(), a);
    let db = dimension(complex.tds(), b);
    if da < db {
        out.push((b, a));
    } else if db < da {
        out.push((a, b));
    } else {
        out.push((a, b));
        out.push((b, a));
    }
    out
}

fn dimension(tds: &Tds, v: VertexKey) -> i8 {
    tds.vertex(v).map_or(3, crate::core::vertex::Vertex::in_dimension)
}

/// Runs every validity check for collapsing `src` into `tgt`.
fn collapse_is_admissible(
    complex: &MeshComplex,
    src: VertexKey,
    tgt: VertexKey,
    sq_emax: f64,
) -> bool {
    let tds = complex.tds();
    if !link_condition(tds, src, tgt) {
        return false;
    }

    // Geometric vetting of the retargeted cells.
    let pt = *tds.point(tgt);
    for ck in tds.incident_cells(src) {
        let Some(cell) = tds.cell(ck) else {
            return false;
        };
        if cell.has_vertex(tgt) {
            // Dies with the collapse.
            continue;
        }
        if cell.has_vertex(tds.infinite_vertex()) {
            continue;
        }
        let pts: Vec<Point> = cell
            .vertices()
            .iter()
            .map(|&w| if w == src { pt } else { *tds.point(w) })
            .collect();
        if orientation(&pts[0], &pts[1], &pts[2], &pts[3]) != Orientation::Positive {
            return false;
        }
    }

    // No replacement edge may need an immediate re-split.
    for w in link_vertices(tds, src) {
        if w == tgt || tds.is_infinite_vertex(w) {
            continue;
        }
        if squared_distance(&pt, tds.point(w)) > sq_emax {
            return false;
        }
    }

    // Subdomain preservation: the surviving vertex must still touch every
    // subdomain the pair touched.
    let mut before: SmallBuffer<_, 8> = complex.incident_subdomains_of_vertex(src);
    for s in complex.incident_subdomains_of_vertex(tgt) {
        if !before.contains(&s) {
            before.push(s);
        }
    }
    let mut after: SmallBuffer<_, 8> = SmallBuffer::new();
    for ck in tds.incident_cells(src).into_iter().chain(tds.incident_cells(tgt)) {
        let Some(cell) = tds.cell(ck) else {
            return false;
        };
        if cell.has_vertex(src) && cell.has_vertex(tgt) {
            continue;
        }
        if !after.contains(&cell.subdomain()) {
            after.push(cell.subdomain());
        }
    }
    if before.iter().any(|s| !after.contains(s)) {
        return false;
    }

    // The target may not end up below the dimension of any complex element
    // transferred onto it.
    let tgt_dim = dimension(tds, tgt);
    if tgt_dim > 1
        && complex
            .complex_edge_neighbors(src)
            .iter()
            .any(|&w| w != tgt)
    {
        return false;
    }
    if tgt_dim > 2 && has_surviving_complex_facet(complex, src, tgt) {
        return false;
    }
    true
}

fn has_surviving_complex_facet(complex: &MeshComplex, src: VertexKey, tgt: VertexKey) -> bool {
    complex
        .complex_facets_around_vertex(src)
        .iter()
        .any(|key| !key.contains(tgt))
}

/// All vertices adjacent to `v`.
fn link_vertices(tds: &Tds, v: VertexKey) -> SmallBuffer<VertexKey, 32> {
    let mut out: SmallBuffer<VertexKey, 32> = SmallBuffer::new();
    for ck in tds.incident_cells(v) {
        if let Some(cell) = tds.cell(ck) {
            for &w in cell.vertices() {
                if w != v && !out.contains(&w) {
                    out.push(w);
                }
            }
        }
    }
    out
}

/// The classical link condition for collapsing edge `(u, v)` in a closed
/// 3-complex: the link of the edge must equal the intersection of the
/// vertex links, compared at vertex and edge level, and the vertex links
/// may share no triangle. The infinite vertex participates like any
/// other, which is what makes hull collapses come out right.
fn link_condition(tds: &Tds, u: VertexKey, v: VertexKey) -> bool {
    let Some((ring, ring_vertices)) = tds.cells_around_edge(u, v) else {
        return false;
    };

    let star_u = tds.incident_cells(u);
    let star_v = tds.incident_cells(v);

    // Vertex level.
    let lk_u: FastHashSet<VertexKey> = star_vertices(tds, &star_u, u);
    let lk_v: FastHashSet<VertexKey> = star_vertices(tds, &star_v, v);
    let lk_e: FastHashSet<VertexKey> = ring_vertices.iter().copied().collect();
    for w in lk_u.intersection(&lk_v) {
        if *w != u && *w != v && !lk_e.contains(w) {
            return false;
        }
    }

    // Edge level.
    let lke_u = star_link_edges(tds, &star_u, u);
    let lke_v = star_link_edges(tds, &star_v, v);
    let lke_e: FastHashSet<EdgeKey> = ring
        .iter()
        .filter_map(|&ck| {
            let cell = tds.cell(ck)?;
            let mut others: SmallBuffer<VertexKey, 2> = SmallBuffer::new();
            for &w in cell.vertices() {
                if w != u && w != v {
                    others.push(w);
                }
            }
            Some(EdgeKey::new(others[0], others[1]))
        })
        .collect();
    for e in lke_u.intersection(&lke_v) {
        if !e.contains(u) && !e.contains(v) && !lke_e.contains(e) {
            return false;
        }
    }

    // Triangle level: the link of an edge is a circle and carries no
    // triangles, so the vertex links may not share any.
    let lkt_u = star_link_triangles(tds, &star_u, u);
    let lkt_v = star_link_triangles(tds, &star_v, v);
    lkt_u.is_disjoint(&lkt_v)
}

fn star_vertices(tds: &Tds, star: &[CellKey], center: VertexKey) -> FastHashSet<VertexKey> {
    let mut out = FastHashSet::default();
    for &ck in star {
        if let Some(cell) = tds.cell(ck) {
            for &w in cell.vertices() {
                if w != center {
                    out.insert(w);
                }
            }
        }
    }
    out
}

fn star_link_edges(tds: &Tds, star: &[CellKey], center: VertexKey) -> FastHashSet<EdgeKey> {
    let mut out = FastHashSet::default();
    for &ck in star {
        let Some(cell) = tds.cell(ck) else {
            continue;
        };
        let Some(i) = cell.index_of(center) else {
            continue;
        };
        let t = FACET_VERTEX_TRIPLES[i];
        for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            out.insert(EdgeKey::new(cell.vertex(a), cell.vertex(b)));
        }
    }
    out
}

fn star_link_triangles(tds: &Tds, star: &[CellKey], center: VertexKey) -> FastHashSet<FacetKey> {
    let mut out = FastHashSet::default();
    for &ck in star {
        let Some(cell) = tds.cell(ck) else {
            continue;
        };
        let Some(i) = cell.index_of(center) else {
            continue;
        };
        let t = FACET_VERTEX_TRIPLES[i];
        out.insert(FacetKey::new(
            cell.vertex(t[0]),
            cell.vertex(t[1]),
            cell.vertex(t[2]),
        ));
    }
    out
}
