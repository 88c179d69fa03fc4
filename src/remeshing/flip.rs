//! Quality-driven topological flips.
//!
//! Two bistellar moves are tried greedily, pass after pass, until neither
//! applies: the 3-to-2 flip removes an interior edge whose ring is exactly
//! three cells, and the 2-to-3 flip replaces an interior facet by the edge
//! between its two opposite vertices. A move is accepted only when it
//! strictly raises the minimum dihedral angle over the cells it touches,
//! keeps every created cell positively oriented, and stays inside one
//! subdomain, so no complex facet or feature edge is ever consumed.

use crate::core::cell::SubdomainIndex;
use crate::core::facet::FacetHandle;
use crate::core::triangulation::{CellKey, Tds, VertexKey};
use crate::geometry::point::Point;
use crate::geometry::quality::min_dihedral_angle;
use crate::remeshing::complex::MeshComplex;
use crate::remeshing::traits::CellSelector;
use tracing::debug;

/// Upper bound on greedy passes; each pass must apply at least one flip
/// to continue, so this only guards against pathological cycling.
const MAX_FLIP_PASSES: usize = 16;

/// Applies quality-improving flips until a full pass applies none.
/// Returns the total number of flips performed.
pub fn flip_edges<C>(complex: &mut MeshComplex, selector: &C) -> usize
where
    C: CellSelector,
{
    let mut total = 0usize;
    for _ in 0..MAX_FLIP_PASSES {
        let applied = flip_pass(complex, selector);
        total += applied;
        if applied == 0 {
            break;
        }
    }
    debug!(flips = total, "flip phase done");
    total
}

fn flip_pass<C>(complex: &mut MeshComplex, selector: &C) -> usize
where
    C: CellSelector,
{
    let mut applied = 0usize;

    // 3-to-2 over interior edges with a three-cell ring.
    let edges: Vec<_> = complex.tds().finite_edges().collect();
    for e in edges {
        let (u, v) = e.endpoints();
        if !complex.tds().contains_vertex(u) || !complex.tds().contains_vertex(v) {
            continue;
        }
        if complex.is_complex_edge(e) {
            continue;
        }
        let Some(subdomain) = uniform_ring_subdomain(complex, u, v, selector) else {
            continue;
        };
        if !complex.is_real_subdomain(subdomain) {
            continue;
        }
        if try_flip_3_2(complex, u, v) {
            applied += 1;
        }
    }

    // 2-to-3 over interior facets.
    let facets: Vec<FacetHandle> = complex.tds().finite_facets().collect();
    for f in facets {
        if !complex.tds().contains_cell(f.cell) {
            continue;
        }
        if try_flip_2_3(complex, f, selector) {
            applied += 1;
        }
    }

    applied
}

/// The common subdomain of the edge ring, if the ring is finite, uniform,
/// and fully selected.
fn uniform_ring_subdomain<C>(
    complex: &MeshComplex,
    u: VertexKey,
    v: VertexKey,
    selector: &C,
) -> Option<SubdomainIndex>
where
    C: CellSelector,
{
    let (ring, _) = complex.tds().cells_around_edge(u, v)?;
    let mut subdomain = None;
    for &ck in &ring {
        if complex.tds().is_infinite_cell(ck) {
            return None;
        }
        let cell = complex.tds().cell(ck)?;
        if !selector.select(cell) {
            return None;
        }
        match subdomain {
            None => subdomain = Some(cell.subdomain()),
            Some(s) if s == cell.subdomain() => {}
            Some(_) => return None,
        }
    }
    subdomain
}

fn try_flip_3_2(complex: &mut MeshComplex, u: VertexKey, v: VertexKey) -> bool {
    let tds = complex.tds();
    let Some((ring, ring_vertices)) = tds.cells_around_edge(u, v) else {
        return false;
    };
    if ring.len() != 3 {
        return false;
    }

    let old_quality = ring
        .iter()
        .filter_map(|&ck| cell_quality(tds, ck))
        .fold(f64::INFINITY, f64::min);

    let [a, b, c] = [ring_vertices[0], ring_vertices[1], ring_vertices[2]];
    let (pa, pb, pc) = (*tds.point(a), *tds.point(b), *tds.point(c));
    let (pu, pv) = (*tds.point(u), *tds.point(v));
    let new_quality = min_dihedral_angle(&[pa, pb, pc, pu]).min(min_dihedral_angle(&[pa, pb, pc, pv]));
    if new_quality <= old_quality {
        return false;
    }

    complex.tds_mut().flip_3_2(u, v).is_ok()
}

fn try_flip_2_3<C>(complex: &mut MeshComplex, f: FacetHandle, selector: &C) -> bool
where
    C: CellSelector,
{
    let tds = complex.tds();
    if complex.is_complex_facet(tds.facet_key(f)) {
        return false;
    }
    let Some(mirror) = tds.mirror_facet(f) else {
        return false;
    };
    if tds.is_infinite_cell(f.cell) || tds.is_infinite_cell(mirror.cell) {
        return false;
    }
    let (Some(cell), Some(other)) = (tds.cell(f.cell), tds.cell(mirror.cell)) else {
        return false;
    };
    if cell.subdomain() != other.subdomain()
        || !complex.is_real_subdomain(cell.subdomain())
        || !selector.select(cell)
        || !selector.select(other)
    {
        return false;
    }

    let p = cell.vertex(usize::from(f.index));
    let q = other.vertex(usize::from(mirror.index));
    let [t0, t1, t2] = tds.facet_vertices(f);

    let old_quality = cell_quality(tds, f.cell)
        .into_iter()
        .chain(cell_quality(tds, mirror.cell))
        .fold(f64::INFINITY, f64::min);

    let (pp, pq) = (*tds.point(p), *tds.point(q));
    let pts = [*tds.point(t0), *tds.point(t1), *tds.point(t2)];
    let mut new_quality = f64::INFINITY;
    for (x, y) in [(0, 1), (1, 2), (2, 0)] {
        new_quality = new_quality.min(min_dihedral_angle(&[pts[x], pts[y], pq, pp]));
    }
    if new_quality <= old_quality {
        return false;
    }

    complex.tds_mut().flip_2_3(f).is_ok()
}

/// Minimum dihedral angle of a finite cell; `None` for infinite or dead
/// cells.
fn cell_quality(tds: &Tds, ck: CellKey) -> Option<f64> {
    let cell = tds.cell(ck)?;
    if cell.has_vertex(tds.infinite_vertex()) {
        return None;
    }
    let pts: [Point; 4] = [
        *tds.point(cell.vertex(0)),
        *tds.point(cell.vertex(1)),
        *tds.point(cell.vertex(2)),
        *tds.point(cell.vertex(3)),
    ];
    Some(min_dihedral_angle(&pts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::triangulation::Tds;
    use crate::remeshing::traits::{AllCellsSelected, NoConstraints};

    fn min_quality(complex: &MeshComplex) -> f64 {
        complex
            .tds()
            .finite_cells()
            .filter_map(|(ck, _)| cell_quality(complex.tds(), ck))
            .fold(f64::INFINITY, f64::min)
    }

    /// Three blade-like tets around a long interior edge through a small
    /// triangle: removing the edge leaves two far better cells.
    fn tall_ring(subdomains: [SubdomainIndex; 3]) -> MeshComplex {
        let points = [
            Point::new(1.0, 0.0, 0.0),      // a
            Point::new(-0.5, 0.866, 0.0),   // b
            Point::new(-0.5, -0.866, 0.0),  // c
            Point::new(0.0, 0.0, 2.0),      // u
            Point::new(0.0, 0.0, -2.0),     // v
        ];
        let tds = Tds::from_cells(
            &points,
            &[[0, 1, 3, 4], [1, 2, 3, 4], [2, 0, 3, 4]],
            &subdomains,
        )
        .unwrap();
        MeshComplex::build(tds, &NoConstraints, &AllCellsSelected).0
    }

    #[test]
    fn tall_ring_is_flipped_3_2() {
        let mut complex = tall_ring([SubdomainIndex(1); 3]);
        assert_eq!(complex.tds().number_of_finite_cells(), 3);
        let before = min_quality(&complex);

        let flips = flip_edges(&mut complex, &AllCellsSelected);
        assert!(flips >= 1);
        assert_eq!(complex.tds().number_of_finite_cells(), 2);
        assert!(complex.tds().is_valid().is_ok());
        assert!(min_quality(&complex) > before);
    }

    #[test]
    fn flat_pair_is_flipped_2_3() {
        // Two pancake cells over a wide shared facet, apexes just above
        // and below: trading the facet for the short vertical edge raises
        // the minimum dihedral angle.
        let points = [
            Point::new(1.0, 0.0, 0.0),
            Point::new(-0.5, 0.866, 0.0),
            Point::new(-0.5, -0.866, 0.0),
            Point::new(0.0, 0.0, 0.08),
            Point::new(0.0, 0.0, -0.08),
        ];
        let tds = Tds::from_cells(
            &points,
            &[[0, 1, 2, 3], [0, 1, 2, 4]],
            &[SubdomainIndex(1); 2],
        )
        .unwrap();
        let mut complex = MeshComplex::build(tds, &NoConstraints, &AllCellsSelected).0;
        let before = min_quality(&complex);

        let flips = flip_edges(&mut complex, &AllCellsSelected);
        assert!(flips >= 1);
        assert_eq!(complex.tds().number_of_finite_cells(), 3);
        assert!(complex.tds().is_valid().is_ok());
        assert!(min_quality(&complex) > before);
    }

    #[test]
    fn well_shaped_pair_is_left_alone() {
        // Two near-regular tets over a shared facet; flipping them into a
        // three-cell ring around the apex edge would create slivers.
        let points = [
            Point::new(1.0, 0.0, 0.0),
            Point::new(-0.5, 0.866, 0.0),
            Point::new(-0.5, -0.866, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(0.0, 0.0, -1.0),
        ];
        let tds = Tds::from_cells(
            &points,
            &[[0, 1, 2, 3], [0, 1, 2, 4]],
            &[SubdomainIndex(1); 2],
        )
        .unwrap();
        let mut complex = MeshComplex::build(tds, &NoConstraints, &AllCellsSelected).0;

        let flips = flip_edges(&mut complex, &AllCellsSelected);
        assert_eq!(flips, 0);
        assert_eq!(complex.tds().number_of_finite_cells(), 2);
    }

    #[test]
    fn subdomain_interfaces_are_never_flipped() {
        // The same tall ring, but with mixed subdomains: the quality gain
        // is there, the flip is still forbidden because it would consume
        // the interface facets.
        let mut complex = tall_ring([SubdomainIndex(1), SubdomainIndex(2), SubdomainIndex(1)]);
        let interfaces_before = complex.number_of_complex_facets();

        let flips = flip_edges(&mut complex, &AllCellsSelected);
        assert_eq!(flips, 0);
        assert_eq!(complex.number_of_complex_facets(), interfaces_before);
        assert_eq!(complex.tds().number_of_finite_cells(), 3);
    }
}
