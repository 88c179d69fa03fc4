//! The imaginary scaffold layer.
//!
//! Boundary facets of the real domain have a tagged cell on one side and
//! the exterior on the other. Wrapping the domain in one layer of tagged
//! scaffold tetrahedra turns every such facet into an interior facet with
//! two finite incident cells, so the local operators never have to treat
//! the domain boundary as a special case.
//!
//! Two situations arise per boundary facet:
//!
//! - The exterior side is an **infinite** hull cell. A fresh tetrahedron
//!   is materialized over the facet, its apex placed by reflecting the
//!   facet's opposite vertex across the facet plane, and tagged with the
//!   imaginary index.
//! - The exterior side is a **finite** untagged cell (either genuine
//!   exterior geometry, or a scaffold cell left behind by an earlier
//!   layer whose tag was cleared). That cell is retagged with the
//!   imaginary index in place. Re-adding the layer after a postprocess
//!   therefore restores the previous layer exactly, cell for cell.

use crate::core::cell::Cell;
use crate::core::facet::FACET_VERTEX_TRIPLES;
use crate::core::triangulation::CellKey;
use crate::core::vertex::Vertex;
use crate::geometry::predicates::{reflect_across_plane, triangle_normal};
use crate::remeshing::complex::MeshComplex;
use crate::remeshing::remesher::RemeshError;
use tracing::debug;

/// Adds (or restores) the scaffold layer. Returns the number of cells the
/// layer consists of.
///
/// # Errors
///
/// [`RemeshError::DegenerateGeometry`] when a boundary facet is too
/// degenerate to carry a reflected apex, or when the rebuilt adjacency is
/// non-manifold.
pub(crate) fn add_imaginary_layer(complex: &mut MeshComplex) -> Result<usize, RemeshError> {
    let imaginary = complex.imaginary_index();
    let tds = complex.tds_mut();

    // Boundary facets of the real domain, split by what lies outside.
    let mut to_materialize: Vec<(CellKey, usize)> = Vec::new();
    let mut to_retag: Vec<CellKey> = Vec::new();
    for (ck, cell) in tds.finite_cells() {
        let s = cell.subdomain();
        if s.is_none() || s == imaginary {
            continue;
        }
        for i in 0..4 {
            let n = cell.neighbor(i);
            if tds.is_infinite_cell(n) {
                to_materialize.push((ck, i));
            } else if let Some(ncell) = tds.cell(n) {
                if ncell.subdomain().is_none() && !to_retag.contains(&n) {
                    to_retag.push(n);
                }
            }
        }
    }

    for ck in &to_retag {
        if let Some(cell) = tds.cell_mut(*ck) {
            cell.set_subdomain(imaginary);
        }
    }

    for &(ck, i) in &to_materialize {
        let Some(cell) = tds.cell(ck) else {
            continue;
        };
        let t = FACET_VERTEX_TRIPLES[i];
        let (a, b, c) = (cell.vertex(t[0]), cell.vertex(t[1]), cell.vertex(t[2]));
        let opposite = cell.vertex(i);

        let (pa, pb, pc) = (*tds.point(a), *tds.point(b), *tds.point(c));
        let normal = triangle_normal(&pa, &pb, &pc).ok_or_else(|| {
            RemeshError::DegenerateGeometry {
                detail: "boundary facet with vanishing area".to_string(),
            }
        })?;
        let apex_point = reflect_across_plane(tds.point(opposite), &pa, &normal);
        let apex = tds.insert_vertex_raw(Vertex::with_dimension(apex_point, 3));

        // The oriented facet triple faces the opposite vertex; the
        // reflected apex lies on the other side, so reverse the base.
        tds.insert_cell_raw(Cell::new([a, c, b, apex], imaginary));
    }

    let created = to_materialize.len();
    let retagged = to_retag.len();
    tds.rebuild_adjacency()
        .map_err(|e| RemeshError::DegenerateGeometry {
            detail: format!("scaffold layer produced a non-manifold hull: {e}"),
        })?;
    debug_assert!(tds.is_valid().is_ok());

    debug!(created, retagged, "imaginary layer in place");
    Ok(created + retagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::SubdomainIndex;
    use crate::core::triangulation::Tds;
    use crate::geometry::point::Point;
    use crate::remeshing::complex::MeshComplex;
    use crate::remeshing::traits::{AllCellsSelected, NoConstraints};

    fn single_tet_complex() -> MeshComplex {
        let points = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
        ];
        let tds =
            Tds::from_cells(&points, &[[0, 1, 2, 3]], &[SubdomainIndex(1)]).unwrap();
        MeshComplex::build(tds, &NoConstraints, &AllCellsSelected).0
    }

    #[test]
    fn layer_covers_every_boundary_facet() {
        let mut complex = single_tet_complex();
        let imaginary = complex.imaginary_index();
        let added = add_imaginary_layer(&mut complex).unwrap();

        // One scaffold tet per hull facet of the single tetrahedron.
        assert_eq!(added, 4);
        assert_eq!(complex.tds().number_of_finite_cells(), 5);
        assert!(complex.tds().is_valid().is_ok());

        let imaginary_cells = complex
            .tds()
            .finite_cells()
            .filter(|(_, c)| c.subdomain() == imaginary)
            .count();
        assert_eq!(imaginary_cells, 4);

        // Every complex facet now has two finite incident cells.
        for f in complex.tds().finite_facets().collect::<Vec<_>>() {
            let key = complex.tds().facet_key(f);
            if complex.is_complex_facet(key) {
                let m = complex.tds().mirror_facet(f).unwrap();
                assert!(!complex.tds().is_infinite_cell(f.cell));
                assert!(!complex.tds().is_infinite_cell(m.cell));
            }
        }
    }

    #[test]
    fn removing_and_readding_restores_the_same_layer() {
        let mut complex = single_tet_complex();
        add_imaginary_layer(&mut complex).unwrap();
        let imaginary = complex.imaginary_index();

        let tagged_before: Vec<_> = complex
            .tds()
            .finite_cells()
            .filter(|(_, c)| c.subdomain() == imaginary)
            .map(|(k, _)| k)
            .collect();
        let cells_before = complex.tds().number_of_finite_cells();

        let removed = complex.remove_imaginary_from_complex();
        assert_eq!(removed, tagged_before.len());
        // The cells stay in the triangulation, only the tag is cleared.
        assert_eq!(complex.tds().number_of_finite_cells(), cells_before);

        let readded = add_imaginary_layer(&mut complex).unwrap();
        assert_eq!(readded, tagged_before.len());
        assert_eq!(complex.tds().number_of_finite_cells(), cells_before);

        let mut tagged_after: Vec<_> = complex
            .tds()
            .finite_cells()
            .filter(|(_, c)| c.subdomain() == imaginary)
            .map(|(k, _)| k)
            .collect();
        let mut tagged_before_sorted = tagged_before;
        tagged_before_sorted.sort();
        tagged_after.sort();
        assert_eq!(tagged_after, tagged_before_sorted);
    }
}
