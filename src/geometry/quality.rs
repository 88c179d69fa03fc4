//! Geometric quality measure for tetrahedra.
//!
//! The engine uses the minimum dihedral angle (in radians) as its quality
//! measure: flips and smoothing accept a move only when it does not lower
//! the minimum dihedral angle of the affected cells. Any monotone shape
//! measure would do as long as it is used consistently; the minimum
//! dihedral angle is cheap to evaluate from facet normals and degrades to
//! zero on slivers, which is exactly the ordering the operators need.
//!
//! # References
//!
//! - Shewchuk, J.R. "What Is a Good Linear Element? Interpolation,
//!   Conditioning, Anisotropy, and Quality Measures." Eleventh
//!   International Meshing Roundtable (2002).

use crate::geometry::point::Point;

/// The six edges of a tetrahedron as index pairs, with the two facets
/// adjacent to each edge given as the indices of their opposite vertices.
const EDGE_FACETS: [((usize, usize), (usize, usize)); 6] = [
    ((0, 1), (2, 3)),
    ((0, 2), (1, 3)),
    ((0, 3), (1, 2)),
    ((1, 2), (0, 3)),
    ((1, 3), (0, 2)),
    ((2, 3), (0, 1)),
];

/// Outward normal (not normalized) of the facet opposite vertex `i`,
/// assuming the tetrahedron `(p0, p1, p2, p3)` is positively oriented.
fn facet_normal(p: &[Point; 4], opposite: usize) -> Point {
    // Facet triples in the orientation that makes the normal point away
    // from the opposite vertex for a positively oriented tetrahedron.
    const TRIPLE: [[usize; 3]; 4] = [[1, 3, 2], [0, 2, 3], [0, 3, 1], [0, 1, 2]];
    let [a, b, c] = TRIPLE[opposite];
    (p[b] - p[a]).cross(&(p[c] - p[a]))
}

/// Minimum dihedral angle of the tetrahedron, in radians.
///
/// The tetrahedron is assumed positively oriented; a degenerate cell (any
/// facet with vanishing area) yields `0.0`, ranking it below every
/// non-degenerate cell.
///
/// A regular tetrahedron attains the maximum, `acos(1/3) ≈ 1.231` rad
/// (about 70.5°).
#[must_use]
pub fn min_dihedral_angle(p: &[Point; 4]) -> f64 {
    let normals = [
        facet_normal(p, 0),
        facet_normal(p, 1),
        facet_normal(p, 2),
        facet_normal(p, 3),
    ];

    let mut min_angle = f64::INFINITY;
    for &(_, (k, l)) in &EDGE_FACETS {
        let nk = normals[k];
        let nl = normals[l];
        let denom = nk.norm() * nl.norm();
        if denom < f64::EPSILON {
            return 0.0;
        }
        // Outward normals: the interior dihedral angle is pi minus the
        // angle between them.
        let cos = (-nk.dot(&nl) / denom).clamp(-1.0, 1.0);
        let angle = cos.acos();
        if angle < min_angle {
            min_angle = angle;
        }
    }
    min_angle
}
