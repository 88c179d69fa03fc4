//! Property-based tests for the documented invariants: structural
//! validity after construction and after remeshing, boundary protection,
//! and subdomain conservation.

use proptest::prelude::*;
use std::collections::HashSet;
use tetremesh::prelude::*;

/// Jitter magnitude small enough that the canonical meshes stay
/// non-degenerate.
const JITTER: f64 = 0.15;

fn jitter() -> impl Strategy<Value = f64> {
    -JITTER..JITTER
}

fn jittered_point(base: [f64; 3]) -> impl Strategy<Value = Point> {
    (jitter(), jitter(), jitter())
        .prop_map(move |(dx, dy, dz)| Point::new(base[0] + dx, base[1] + dy, base[2] + dz))
}

/// A perturbed single tetrahedron in subdomain 1.
fn arb_single_tet() -> impl Strategy<Value = Tds> {
    (
        jittered_point([0.0, 0.0, 0.0]),
        jittered_point([1.0, 0.0, 0.0]),
        jittered_point([0.0, 1.0, 0.0]),
        jittered_point([0.0, 0.0, 1.0]),
    )
        .prop_filter_map("degenerate tetrahedron", |(a, b, c, d)| {
            Tds::from_cells(&[a, b, c, d], &[[0, 1, 2, 3]], &[SubdomainIndex(1)]).ok()
        })
}

/// A perturbed pair of tetrahedra sharing a facet, in two subdomains.
fn arb_two_subdomains() -> impl Strategy<Value = Tds> {
    (
        jittered_point([0.0, 0.0, 0.0]),
        jittered_point([1.0, 0.0, 0.0]),
        jittered_point([0.0, 1.0, 0.0]),
        jittered_point([0.3, 0.3, 1.0]),
        jittered_point([0.3, 0.3, -1.0]),
    )
        .prop_filter_map("degenerate pair", |(a, b, c, d, e)| {
            Tds::from_cells(
                &[a, b, c, d, e],
                &[[0, 1, 2, 3], [0, 1, 2, 4]],
                &[SubdomainIndex(1), SubdomainIndex(2)],
            )
            .ok()
        })
}

fn real_subdomains(tds: &Tds) -> HashSet<SubdomainIndex> {
    tds.finite_cells()
        .map(|(_, c)| c.subdomain())
        .filter(|s| !s.is_none())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_construction_is_valid(tds in arb_single_tet()) {
        prop_assert!(tds.is_valid().is_ok());
        prop_assert_eq!(tds.number_of_finite_cells(), 1);
        // Neighbor links are involutive through mirror_facet.
        for f in tds.finite_facets().collect::<Vec<_>>() {
            let m = tds.mirror_facet(f).unwrap();
            prop_assert_eq!(tds.mirror_facet(m).unwrap(), f);
        }
    }

    #[test]
    fn prop_remesh_yields_valid_mesh(
        tds in arb_single_tet(),
        target in 0.4f64..1.6,
        protect in any::<bool>(),
    ) {
        let mut tds = tds;
        let outcome = remesh(
            &mut tds,
            &UniformSizing(target),
            &NoConstraints,
            &AllCellsSelected,
            &RemeshParams {
                protect_boundaries: protect,
                max_iterations: 3,
                cancel: None,
            },
        );
        prop_assert!(outcome.is_ok());
        prop_assert!(tds.is_valid().is_ok());
        // The remeshed region keeps its subdomain.
        prop_assert_eq!(
            real_subdomains(&tds),
            HashSet::from([SubdomainIndex(1)])
        );
    }

    #[test]
    fn prop_protection_preserves_interface(tds in arb_two_subdomains()) {
        let before = tds.clone();
        let mut tds = tds;
        let outcome = remesh(
            &mut tds,
            &UniformSizing(1.0),
            &NoConstraints,
            &AllCellsSelected,
            &RemeshParams {
                protect_boundaries: true,
                max_iterations: 3,
                cancel: None,
            },
        );
        prop_assert!(outcome.is_ok());
        prop_assert!(tds.is_valid().is_ok());

        let (cx_before, _) = MeshComplex::build(before, &NoConstraints, &AllCellsSelected);
        let facets_before: HashSet<FacetKey> = cx_before.complex_facets().collect();
        let (cx_after, _) = MeshComplex::build(tds, &NoConstraints, &AllCellsSelected);
        let facets_after: HashSet<FacetKey> = cx_after.complex_facets().collect();
        prop_assert_eq!(facets_before, facets_after);
    }

    #[test]
    fn prop_split_respects_upper_bound(tds in arb_single_tet(), target in 0.3f64..0.8) {
        let sizing = UniformSizing(target);
        let (mut remesher, _) = AdaptiveRemesher::new(
            tds,
            &sizing,
            &NoConstraints,
            &AllCellsSelected,
            false,
        )
        .unwrap();
        remesher.preprocess().unwrap();
        remesher.split();

        let imaginary = remesher.complex().imaginary_index();
        let tds = remesher.finalize();
        prop_assert!(tds.is_valid().is_ok());

        let sq_emax = (4.0 / 3.0 * target).powi(2);
        for e in tds.finite_edges() {
            let in_region = tds.cells_around_edge(e.v0(), e.v1()).is_some_and(|(ring, _)| {
                ring.iter().any(|&ck| {
                    tds.cell(ck).is_some_and(|c| {
                        !c.subdomain().is_none() && c.subdomain() != imaginary
                    })
                })
            });
            if !in_region {
                continue;
            }
            let d = *tds.point(e.v1()) - *tds.point(e.v0());
            prop_assert!(d.squared_norm() <= sq_emax * (1.0 + 1e-9));
        }
    }

    #[test]
    fn prop_constrained_edges_become_features(tds in arb_single_tet()) {
        // Constrain one edge of the input; initialization must register it
        // as a complex edge and lower its endpoints to dimension <= 1.
        let e = tds.finite_edges().next().unwrap();
        let mut constraints = tetremesh::core::collections::FastHashSet::default();
        constraints.insert(e);

        let (cx, report) = MeshComplex::build(tds, &constraints, &AllCellsSelected);
        prop_assert!(report.edges >= 1);
        prop_assert!(cx.is_complex_edge(e));
        for v in [e.v0(), e.v1()] {
            prop_assert!(cx.tds().vertex(v).unwrap().in_dimension() <= 1);
        }
    }
}
