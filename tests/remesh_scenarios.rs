//! End-to-end scenarios for the remeshing pipeline: fixed points,
//! refinement, feature preservation, quality recovery, corners, and
//! degenerate inputs.

use std::collections::HashSet;
use tetremesh::prelude::*;

fn unit_tet() -> Tds {
    let points = [
        Point::new(0.0, 0.0, 0.0),
        Point::new(1.0, 0.0, 0.0),
        Point::new(0.0, 1.0, 0.0),
        Point::new(0.0, 0.0, 1.0),
    ];
    Tds::from_cells(&points, &[[0, 1, 2, 3]], &[SubdomainIndex(1)]).unwrap()
}

/// Regular tetrahedron with the given edge length, on alternating cube
/// corners.
fn regular_tet(edge: f64) -> Tds {
    let s = edge / f64::sqrt(8.0);
    let points = [
        Point::new(s, s, s),
        Point::new(s, -s, -s),
        Point::new(-s, s, -s),
        Point::new(-s, -s, s),
    ];
    Tds::from_cells(&points, &[[0, 1, 2, 3]], &[SubdomainIndex(1)]).unwrap()
}

fn two_subdomain_mesh() -> Tds {
    let points = [
        Point::new(0.0, 0.0, 0.0),
        Point::new(1.0, 0.0, 0.0),
        Point::new(0.0, 1.0, 0.0),
        Point::new(0.3, 0.3, 1.0),
        Point::new(0.3, 0.3, -1.0),
    ];
    Tds::from_cells(
        &points,
        &[[0, 1, 2, 3], [0, 1, 2, 4]],
        &[SubdomainIndex(1), SubdomainIndex(2)],
    )
    .unwrap()
}

fn min_real_quality(tds: &Tds, imaginary: SubdomainIndex) -> f64 {
    tds.finite_cells()
        .filter(|(_, c)| !c.subdomain().is_none() && c.subdomain() != imaginary)
        .map(|(_, c)| {
            let [a, b, c4, d] = *c.vertices();
            min_dihedral_angle(&[
                *tds.point(a),
                *tds.point(b),
                *tds.point(c4),
                *tds.point(d),
            ])
        })
        .fold(f64::INFINITY, f64::min)
}

/// Every edge of the remeshed region has squared length at most `sq_emax`.
fn assert_region_edges_below(tds: &Tds, imaginary: SubdomainIndex, sq_emax: f64) {
    for e in tds.finite_edges() {
        if !edge_in_real_region(tds, e, imaginary) {
            continue;
        }
        let d = *tds.point(e.v1()) - *tds.point(e.v0());
        assert!(
            d.squared_norm() <= sq_emax * (1.0 + 1e-9),
            "edge longer than emax survived"
        );
    }
}

/// The edge has a cell of a positive, non-imaginary subdomain in its ring.
fn edge_in_real_region(tds: &Tds, e: EdgeKey, imaginary: SubdomainIndex) -> bool {
    tds.cells_around_edge(e.v0(), e.v1())
        .is_some_and(|(ring, _)| {
            ring.iter().any(|&ck| {
                tds.cell(ck).is_some_and(|c| {
                    !c.subdomain().is_none() && c.subdomain() != imaginary
                })
            })
        })
}

#[test]
fn scenario_well_sized_tet_is_untouched() {
    let mut tds = unit_tet();
    let positions: Vec<Point> = tds.finite_vertices().map(|(_, v)| *v.point()).collect();

    let outcome = remesh(
        &mut tds,
        &UniformSizing(1.0),
        &NoConstraints,
        &AllCellsSelected,
        &RemeshParams::default(),
    )
    .unwrap();

    assert_eq!(outcome.status, RemeshStatus::ResolutionReached);
    assert_eq!(outcome.splits, 0);
    assert_eq!(outcome.collapses, 0);
    assert_eq!(outcome.flips, 0);
    assert_eq!(outcome.smooth_moves, 0);
    assert_eq!(tds.number_of_finite_vertices(), 8); // 4 input + 4 scaffold apexes
    let after: Vec<Point> = tds
        .finite_vertices()
        .map(|(_, v)| *v.point())
        .filter(|p| positions.contains(p))
        .collect();
    assert_eq!(after.len(), 4, "input vertices moved");
}

#[test]
fn scenario_oversized_tet_splits_to_length() {
    // Edge length three times the target: the split phase alone must
    // bring every edge of the remeshed region under the upper bound, and
    // the collapse phase must not push any edge back over it.
    let tds = regular_tet(3.0);
    let sizing = UniformSizing(1.0);
    let (mut remesher, _) = AdaptiveRemesher::new(
        tds,
        &sizing,
        &NoConstraints,
        &AllCellsSelected,
        false,
    )
    .unwrap();
    remesher.preprocess().unwrap();

    let splits = remesher.split();
    assert!(splits > 0);

    let sq_emax = (4.0 / 3.0_f64).powi(2);
    let imaginary = remesher.complex().imaginary_index();
    assert_region_edges_below(remesher.complex().tds(), imaginary, sq_emax);

    // Halving a long edge can undershoot the lower bound, so the collapse
    // phase may legitimately coarsen; it must never recreate a long edge.
    remesher.collapse();
    assert_region_edges_below(remesher.complex().tds(), imaginary, sq_emax);

    remesher.postprocess();
    let tds = remesher.finalize();
    assert!(tds.is_valid().is_ok());
    assert!(tds.number_of_finite_cells() > 1);
}

#[test]
fn scenario_protected_interface_survives_remeshing() {
    let mut tds = two_subdomain_mesh();
    let before = tds.clone();

    let outcome = remesh(
        &mut tds,
        &UniformSizing(1.0),
        &NoConstraints,
        &AllCellsSelected,
        &RemeshParams {
            protect_boundaries: true,
            max_iterations: 5,
            cancel: None,
        },
    )
    .unwrap();
    assert!(tds.is_valid().is_ok());
    assert_eq!(outcome.collapses, 0);

    // Rebuild the complexes and compare: the interface facets and feature
    // edges must be identical as combinatorial sets.
    let (cx_before, _) = MeshComplex::build(before, &NoConstraints, &AllCellsSelected);
    let facets_before: HashSet<FacetKey> = cx_before.complex_facets().collect();
    let edges_before: HashSet<EdgeKey> = cx_before
        .tds()
        .finite_edges()
        .filter(|&e| cx_before.is_complex_edge(e))
        .collect();

    let (cx_after, _) = MeshComplex::build(tds, &NoConstraints, &AllCellsSelected);
    let facets_after: HashSet<FacetKey> = cx_after.complex_facets().collect();
    let edges_after: HashSet<EdgeKey> = cx_after
        .tds()
        .finite_edges()
        .filter(|&e| cx_after.is_complex_edge(e))
        .collect();

    assert_eq!(facets_before, facets_after);
    assert_eq!(edges_before, edges_after);

    // The three interface edges keep endpoints of dimension <= 2.
    for e in &edges_after {
        for v in [e.v0(), e.v1()] {
            assert!(cx_after.tds().vertex(v).unwrap().in_dimension() <= 2);
        }
    }
}

#[test]
fn scenario_degenerate_pair_recovers_quality() {
    // Two pancake-flat cells over an equilateral facet of side 1, apexes
    // barely off-plane. With the length window containing every input
    // edge, only the flip phase can act, and it must strictly raise the
    // minimum dihedral angle.
    let r = 1.0 / f64::sqrt(3.0);
    let points = [
        Point::new(r, 0.0, 0.0),
        Point::new(-r / 2.0, 0.5, 0.0),
        Point::new(-r / 2.0, -0.5, 0.0),
        Point::new(0.0, 0.0, 0.2),
        Point::new(0.0, 0.0, -0.2),
    ];
    let mut tds = Tds::from_cells(
        &points,
        &[[0, 1, 2, 3], [0, 1, 2, 4]],
        &[SubdomainIndex(1); 2],
    )
    .unwrap();

    let quality_before = min_real_quality(&tds, SubdomainIndex(u32::MAX));

    // One iteration: with every edge inside the window, the split and
    // collapse phases are no-ops and the flip phase does the repair.
    let outcome = remesh(
        &mut tds,
        &UniformSizing(0.76),
        &NoConstraints,
        &AllCellsSelected,
        &RemeshParams {
            protect_boundaries: false,
            max_iterations: 1,
            cancel: None,
        },
    )
    .unwrap();
    assert_eq!(outcome.splits, 0);
    assert_eq!(outcome.collapses, 0);

    assert!(outcome.flips >= 1);
    assert!(tds.is_valid().is_ok());
    // Scaffold cells were untagged by postprocess; imaginary index was 2.
    let quality_after = min_real_quality(&tds, SubdomainIndex(2));
    assert!(
        quality_after > quality_before,
        "minimum quality did not improve: {quality_before} -> {quality_after}"
    );
}

#[test]
fn scenario_corner_vertex_is_immovable() {
    let mut tds = unit_tet();
    let corner = tds.finite_vertices().next().map(|(k, _)| k).unwrap();
    let corner_point = *tds.point(corner);
    tds.vertex_mut(corner).unwrap().set_dimension(0);

    let outcome = remesh(
        &mut tds,
        &UniformSizing(0.5),
        &NoConstraints,
        &AllCellsSelected,
        &RemeshParams {
            protect_boundaries: false,
            max_iterations: 4,
            cancel: None,
        },
    )
    .unwrap();

    assert!(outcome.splits > 0);
    assert!(tds.is_valid().is_ok());
    assert!(tds.contains_vertex(corner), "corner vertex was deleted");
    assert_eq!(*tds.point(corner), corner_point, "corner vertex moved");
    assert_eq!(tds.vertex(corner).unwrap().in_dimension(), 0);
}

#[test]
fn scenario_untagged_input_is_nonfatal() {
    let points = [
        Point::new(0.0, 0.0, 0.0),
        Point::new(1.0, 0.0, 0.0),
        Point::new(0.0, 1.0, 0.0),
        Point::new(0.0, 0.0, 1.0),
    ];
    let mut tds = Tds::from_cells(&points, &[[0, 1, 2, 3]], &[SubdomainIndex::NONE]).unwrap();

    let outcome = remesh(
        &mut tds,
        &UniformSizing(1.0),
        &NoConstraints,
        &AllCellsSelected,
        &RemeshParams::default(),
    )
    .unwrap();

    assert!(outcome.subdomain_warning);
    assert_eq!(outcome.splits, 0);
    assert!(tds.is_valid().is_ok());
    assert_eq!(tds.number_of_finite_cells(), 1);
}

#[test]
fn remeshing_a_fixed_point_twice_is_a_noop() {
    // Protected two-subdomain mesh: every edge is on the interface or the
    // hull, so the first run already sits at the fixed point and the
    // second must accept no split or collapse either.
    let mut tds = two_subdomain_mesh();
    let params = RemeshParams {
        protect_boundaries: true,
        max_iterations: 5,
        cancel: None,
    };

    let first = remesh(
        &mut tds,
        &UniformSizing(1.0),
        &NoConstraints,
        &AllCellsSelected,
        &params,
    )
    .unwrap();
    assert_eq!(first.status, RemeshStatus::ResolutionReached);
    assert_eq!(first.splits + first.collapses, 0);

    let second = remesh(
        &mut tds,
        &UniformSizing(1.0),
        &NoConstraints,
        &AllCellsSelected,
        &params,
    )
    .unwrap();
    assert_eq!(second.status, RemeshStatus::ResolutionReached);
    assert_eq!(second.splits, 0);
    assert_eq!(second.collapses, 0);
    assert!(tds.is_valid().is_ok());
}

#[test]
fn second_pass_after_convergence_accepts_no_resize() {
    // Free remeshing of a single tetrahedron: if the first run converges,
    // a second run with the same sizing must accept no split or collapse.
    let mut tds = unit_tet();
    let params = RemeshParams {
        protect_boundaries: false,
        max_iterations: 10,
        cancel: None,
    };
    let first = remesh(
        &mut tds,
        &UniformSizing(0.9),
        &NoConstraints,
        &AllCellsSelected,
        &params,
    )
    .unwrap();
    assert!(tds.is_valid().is_ok());

    if first.status == RemeshStatus::ResolutionReached {
        let second = remesh(
            &mut tds,
            &UniformSizing(0.9),
            &NoConstraints,
            &AllCellsSelected,
            &params,
        )
        .unwrap();
        assert_eq!(second.splits, 0);
        assert_eq!(second.collapses, 0);
    }
}
