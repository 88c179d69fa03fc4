//! Optional MEDIT `.mesh` dumps of intermediate triangulations.
//!
//! Compiled in behind the `dump` cargo feature and invoked by the driver
//! at phase boundaries only. Dumping never changes the mesh.

use crate::core::cell::SubdomainIndex;
use crate::core::collections::FastHashMap;
use crate::core::triangulation::{Tds, VertexKey};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes the finite cells of `tds` in MEDIT `.mesh` format. Cells tagged
/// with `skip_subdomain` are omitted when given.
///
/// # Errors
///
/// Propagates I/O errors from creating or writing the file.
pub fn write_mesh(
    tds: &Tds,
    path: &Path,
    skip_subdomain: Option<SubdomainIndex>,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    let mut index: FastHashMap<VertexKey, usize> = FastHashMap::default();
    writeln!(out, "MeshVersionFormatted 1")?;
    writeln!(out, "Dimension 3")?;

    writeln!(out, "Vertices")?;
    writeln!(out, "{}", tds.number_of_finite_vertices())?;
    for (i, (v, vertex)) in tds.finite_vertices().enumerate() {
        index.insert(v, i + 1);
        let p = vertex.point();
        writeln!(out, "{} {} {} {}", p.x, p.y, p.z, vertex.in_dimension())?;
    }

    let cells: Vec<_> = tds
        .finite_cells()
        .filter(|(_, c)| skip_subdomain != Some(c.subdomain()))
        .collect();
    writeln!(out, "Tetrahedra")?;
    writeln!(out, "{}", cells.len())?;
    for (_, cell) in cells {
        let [a, b, c, d] = *cell.vertices();
        writeln!(
            out,
            "{} {} {} {} {}",
            index[&a], index[&b], index[&c], index[&d], cell.subdomain().0
        )?;
    }

    writeln!(out, "End")?;
    Ok(())
}
