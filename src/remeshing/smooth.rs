//! Dimension-constrained vertex relocation.
//!
//! One smoothing pass visits every finite non-corner vertex once and
//! proposes a new position dictated by the vertex's complex dimension:
//! volume vertices move to the centroid of their neighbors in the selected
//! region, surface vertices to the tangentially projected centroid of
//! their neighbors on the same boundary surface, and feature-curve
//! vertices to the midpoint of their two neighbors along the curve.
//! Corners never move. A proposal is applied only when every incident
//! finite cell stays positively oriented and the worst incident cell
//! quality does not drop.

use crate::core::cell::Cell;
use crate::core::collections::SmallBuffer;
use crate::core::triangulation::{Tds, VertexKey};
use crate::geometry::point::Point;
use crate::geometry::predicates::{orientation, triangle_normal, Orientation};
use crate::geometry::quality::min_dihedral_angle;
use crate::remeshing::complex::MeshComplex;
use crate::remeshing::traits::CellSelector;
use tracing::debug;

/// One smoothing pass. Returns the number of vertices moved.
pub fn smooth_vertices<C>(complex: &mut MeshComplex, selector: &C) -> usize
where
    C: CellSelector,
{
    let candidates: Vec<VertexKey> = complex
        .tds()
        .finite_vertices()
        .filter(|(_, vertex)| vertex.in_dimension() >= 1)
        .map(|(v, _)| v)
        .collect();

    let mut moved = 0usize;
    for v in candidates {
        if !complex.tds().contains_vertex(v) {
            continue;
        }
        let Some(proposal) = propose_position(complex, v, selector) else {
            continue;
        };
        if accept_move(complex, v, &proposal, selector) {
            if let Some(vertex) = complex.tds_mut().vertex_mut(v) {
                vertex.set_point(proposal);
                moved += 1;
            }
        }
    }
    debug!(moved, "smooth pass done");
    moved
}

/// New position for `v` under its dimension constraint, or `None` when the
/// vertex has nothing to relax against.
fn propose_position<C>(complex: &MeshComplex, v: VertexKey, selector: &C) -> Option<Point>
where
    C: CellSelector,
{
    let dim = complex.tds().vertex(v)?.in_dimension();
    match dim {
        3 => volume_centroid(complex, v, selector),
        2 => surface_tangential_centroid(complex, v),
        1 => feature_curve_midpoint(complex, v),
        _ => None,
    }
}

/// Centroid of the neighbors of `v` over selected cells of real
/// subdomains.
fn volume_centroid<C>(complex: &MeshComplex, v: VertexKey, selector: &C) -> Option<Point>
where
    C: CellSelector,
{
    let tds = complex.tds();
    let mut neighbors: SmallBuffer<VertexKey, 32> = SmallBuffer::new();
    for ck in tds.incident_cells(v) {
        let cell = tds.cell(ck)?;
        if !complex.is_real_subdomain(cell.subdomain()) || !selector.select(cell) {
            continue;
        }
        for &w in cell.vertices() {
            if w != v && !tds.is_infinite_vertex(w) && !neighbors.contains(&w) {
                neighbors.push(w);
            }
        }
    }
    let points: Vec<Point> = neighbors.iter().map(|&w| *tds.point(w)).collect();
    Point::centroid(&points)
}

/// Cosine bound below which the incident facet normals are considered
/// incoherent: the vertex sits on a sharp crease or corner of the surface
/// and has no usable tangent plane.
const NORMAL_COHERENCE_MIN_COS: f64 = 0.5;

/// Centroid of the neighbors sharing a complex facet with `v`, projected
/// back onto the tangent plane estimated from the incident facet normals.
fn surface_tangential_centroid(complex: &MeshComplex, v: VertexKey) -> Option<Point> {
    let tds = complex.tds();
    let facets = complex.complex_facets_around_vertex(v);
    if facets.is_empty() {
        return None;
    }

    let mut neighbors: SmallBuffer<VertexKey, 16> = SmallBuffer::new();
    let mut normals: SmallBuffer<Point, 16> = SmallBuffer::new();
    for key in &facets {
        let [a, b, c] = *key.vertices();
        let n = triangle_normal(tds.point(a), tds.point(b), tds.point(c))?;
        // Facet keys are unordered; align each normal with the first one.
        let aligned = match normals.first() {
            Some(r) if n.dot(r) < 0.0 => -n,
            _ => n,
        };
        normals.push(aligned);
        for &w in key.vertices() {
            if w != v && !neighbors.contains(&w) {
                neighbors.push(w);
            }
        }
    }
    // A fan of normals that cannot be aligned pairwise marks a crease or
    // corner of the surface; there is no tangent plane to slide in.
    for (i, ni) in normals.iter().enumerate() {
        for nj in &normals[i + 1..] {
            if ni.dot(nj) < NORMAL_COHERENCE_MIN_COS {
                return None;
            }
        }
    }
    let mut normal_acc = Point::ORIGIN;
    for n in &normals {
        normal_acc += *n;
    }
    if neighbors.is_empty() {
        return None;
    }
    let points: Vec<Point> = neighbors.iter().map(|&w| *tds.point(w)).collect();
    let centroid = Point::centroid(&points)?;
    let normal = normal_acc.normalized()?;

    // Keep the move tangential: project onto the plane through the current
    // position.
    let p = *tds.point(v);
    Some(centroid - normal * (centroid - p).dot(&normal))
}

/// Midpoint of the two neighbors along the feature curve through `v`.
fn feature_curve_midpoint(complex: &MeshComplex, v: VertexKey) -> Option<Point> {
    let others = complex.complex_edge_neighbors(v);
    if others.len() != 2 {
        return None;
    }
    let tds = complex.tds();
    Some(Point::midpoint(tds.point(others[0]), tds.point(others[1])))
}

/// True when moving `v` to `p_new` keeps every incident finite cell
/// positively oriented and does not lower the worst incident quality over
/// the selected region.
fn accept_move<C>(complex: &MeshComplex, v: VertexKey, p_new: &Point, selector: &C) -> bool
where
    C: CellSelector,
{
    let tds = complex.tds();
    let star = tds.incident_cells(v);
    let mut old_quality = f64::INFINITY;
    let mut new_quality = f64::INFINITY;
    let mut any_quality_cell = false;

    for &ck in &star {
        let Some(cell) = tds.cell(ck) else {
            return false;
        };
        if cell.has_vertex(tds.infinite_vertex()) {
            continue;
        }
        let old_pts = cell_points(tds, cell, v, None);
        let new_pts = cell_points(tds, cell, v, Some(*p_new));
        if orientation(&new_pts[0], &new_pts[1], &new_pts[2], &new_pts[3])
            != Orientation::Positive
        {
            return false;
        }
        if complex.is_real_subdomain(cell.subdomain()) && selector.select(cell) {
            any_quality_cell = true;
            old_quality = old_quality.min(min_dihedral_angle(&old_pts));
            new_quality = new_quality.min(min_dihedral_angle(&new_pts));
        }
    }
    any_quality_cell && new_quality >= old_quality
}

/// Points of a cell, optionally substituting the position of `v`.
fn cell_points(tds: &Tds, cell: &Cell, v: VertexKey, replace: Option<Point>) -> [Point; 4] {
    let mut pts = [Point::ORIGIN; 4];
    for (slot, &w) in pts.iter_mut().zip(cell.vertices()) {
        *slot = if w == v {
            replace.unwrap_or(*tds.point(w))
        } else {
            *tds.point(w)
        };
    }
    pts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::SubdomainIndex;
    use crate::core::triangulation::Tds;
    use crate::remeshing::split::split_long_edges;
    use crate::remeshing::traits::{AllCellsSelected, NoConstraints};

    fn refined_tet_complex() -> MeshComplex {
        let points = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(2.0, 0.0, 0.0),
            Point::new(0.0, 2.0, 0.0),
            Point::new(0.0, 0.0, 2.0),
        ];
        let tds = Tds::from_cells(&points, &[[0, 1, 2, 3]], &[SubdomainIndex(1)]).unwrap();
        let mut complex = MeshComplex::build(tds, &NoConstraints, &AllCellsSelected).0;
        split_long_edges(&mut complex, 0.9, false, &AllCellsSelected);
        complex
    }

    #[test]
    fn smoothing_preserves_validity_and_never_inverts() {
        let mut complex = refined_tet_complex();
        smooth_vertices(&mut complex, &AllCellsSelected);
        assert!(complex.tds().is_valid().is_ok());
    }

    #[test]
    fn corners_are_never_moved() {
        let mut complex = refined_tet_complex();
        let (corner, corner_point) = {
            let (v, vertex) = complex.tds().finite_vertices().next().unwrap();
            (v, *vertex.point())
        };
        complex.register_corner(corner);

        smooth_vertices(&mut complex, &AllCellsSelected);
        assert_eq!(*complex.tds().point(corner), corner_point);
    }

    #[test]
    fn surface_vertices_stay_near_their_surface() {
        // Midpoints on the hull of the refined tetrahedron have dimension
        // 2 and may only slide tangentially, so facet planes survive:
        // points on the z = 0 face stay on it.
        let mut complex = refined_tet_complex();
        let on_base: Vec<VertexKey> = complex
            .tds()
            .finite_vertices()
            .filter(|(_, vx)| vx.in_dimension() == 2 && vx.point().z.abs() < 1e-9)
            .map(|(v, _)| v)
            .collect();
        assert!(!on_base.is_empty());

        smooth_vertices(&mut complex, &AllCellsSelected);
        for v in on_base {
            assert!(
                complex.tds().point(v).z.abs() < 1e-9,
                "surface vertex drifted off its plane"
            );
        }
    }

    #[test]
    fn quality_does_not_degrade() {
        let mut complex = refined_tet_complex();
        let before = worst_quality(&complex);
        smooth_vertices(&mut complex, &AllCellsSelected);
        assert!(worst_quality(&complex) >= before - 1e-12);
    }

    fn worst_quality(complex: &MeshComplex) -> f64 {
        complex
            .tds()
            .finite_cells()
            .map(|(_, cell)| {
                let pts = cell_points(complex.tds(), cell, VertexKey::default(), None);
                min_dihedral_angle(&pts)
            })
            .fold(f64::INFINITY, f64::min)
    }
}
