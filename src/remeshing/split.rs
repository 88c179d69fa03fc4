//! Long-edge subdivision.
//!
//! Edges longer than the upper length bound are bisected, longest first.
//! The queue is keyed by squared length with a stable edge-key tie-break
//! and maintained lazily: entries whose edge has since disappeared or
//! shrunk are discarded on pop, and the fresh edges created by each split
//! are pushed as they appear. Each split strictly shortens the local
//! longest edge, so the queue drains.

use crate::core::edge::EdgeKey;
use crate::core::triangulation::VertexKey;
use crate::geometry::point::Point;
use crate::geometry::predicates::squared_distance;
use crate::remeshing::complex::MeshComplex;
use crate::remeshing::traits::CellSelector;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;
use tracing::debug;

/// Splits every eligible edge longer than `emax`. Returns the number of
/// splits performed.
///
/// An edge is eligible when at least one cell of its ring is a selected
/// cell of a real subdomain (edges buried in the scaffold layer or the
/// exterior are left alone), and, under `protect_boundaries`, when it is
/// neither a feature edge nor lies on a subdomain-boundary facet.
pub fn split_long_edges<C>(complex: &mut MeshComplex, emax: f64, protect_boundaries: bool, selector: &C) -> usize
where
    C: CellSelector,
{
    let sq_emax = emax * emax;
    let mut queue: BinaryHeap<(OrderedFloat<f64>, EdgeKey)> = BinaryHeap::new();

    for e in complex.tds().finite_edges() {
        let sq = squared_distance(complex.tds().point(e.v0()), complex.tds().point(e.v1()));
        if sq > sq_emax {
            queue.push((OrderedFloat(sq), e));
        }
    }

    let mut splits = 0usize;
    while let Some((_, e)) = queue.pop() {
        let (u, v) = e.endpoints();
        // Lazy invalidation: the edge may be gone or shortened by now.
        if !complex.tds().contains_vertex(u) || !complex.tds().contains_vertex(v) {
            continue;
        }
        if !complex.tds().edge_exists(u, v) {
            continue;
        }
        let sq = squared_distance(complex.tds().point(u), complex.tds().point(v));
        if sq <= sq_emax {
            continue;
        }
        if !can_split(complex, u, v, protect_boundaries, selector) {
            continue;
        }

        let dim = midpoint_dimension(complex, u, v);
        let midpoint = Point::midpoint(complex.tds().point(u), complex.tds().point(v));
        let Ok(info) = complex.tds_mut().split_edge(u, v, midpoint, dim) else {
            continue;
        };
        complex.note_edge_split(u, v, info.new_vertex, &info.ring_vertices);
        splits += 1;

        // New edges at the midpoint: to both halves and to the ring.
        let m = info.new_vertex;
        let pm = *complex.tds().point(m);
        for w in info
            .ring_vertices
            .iter()
            .copied()
            .chain([u, v])
            .filter(|&w| !complex.tds().is_infinite_vertex(w))
        {
            let sq = squared_distance(&pm, complex.tds().point(w));
            if sq > sq_emax {
                queue.push((OrderedFloat(sq), EdgeKey::new(m, w)));
            }
        }
    }

    debug!(splits, "split phase done");
    splits
}

/// Eligibility test for splitting edge `(u, v)`.
fn can_split<C>(
    complex: &MeshComplex,
    u: VertexKey,
    v: VertexKey,
    protect_boundaries: bool,
    selector: &C,
) -> bool
where
    C: CellSelector,
{
    if protect_boundaries
        && (complex.is_complex_edge(EdgeKey::new(u, v)) || complex.edge_on_complex_facet(u, v))
    {
        return false;
    }
    let Some((ring, _)) = complex.tds().cells_around_edge(u, v) else {
        return false;
    };
    ring.iter().any(|&ck| {
        complex.tds().cell(ck).is_some_and(|cell| {
            complex.is_real_subdomain(cell.subdomain()) && selector.select(cell)
        })
    })
}

/// Complex dimension inherited by a midpoint inserted on edge `(u, v)`.
fn midpoint_dimension(complex: &MeshComplex, u: VertexKey, v: VertexKey) -> i8 {
    if complex.is_complex_edge(EdgeKey::new(u, v)) {
        1
    } else if complex.edge_on_complex_facet(u, v) {
        2
    } else {
        3
    }
}
