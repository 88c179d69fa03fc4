//! # tetremesh
//!
//! Adaptive tetrahedral remeshing with feature preservation, inspired by
//! [CGAL](https://www.cgal.org)'s tetrahedral remeshing.
//!
//! Given a tetrahedralization of a bounded domain and a target edge
//! length, the engine transforms the mesh in place through local
//! operations until edge lengths fall into the window
//! `[4/5 · L, 4/3 · L]` around the target `L`, improving element quality
//! along the way while preserving the tagged structure of the domain:
//! subdomain boundaries, feature edges, and corners.
//!
//! # Pipeline
//!
//! 1. **Initialize**: overlay the triangulation with its complex,
//!    consisting of subdomain-boundary facets, feature edges
//!    (caller-constrained or where more than two subdomains meet), and
//!    corners. Each vertex is classified by the lowest-dimensional
//!    complex element it lies on.
//! 2. **Preprocess**: wrap the domain in a layer of *imaginary*
//!    tetrahedra so that every boundary facet has two finite incident
//!    cells and the operators need no boundary special cases.
//! 3. **Iterate**: split long edges, collapse short edges, flip for
//!    quality, and smooth vertices, until the resolution criterion holds
//!    or the iteration budget runs out.
//! 4. **Postprocess and finalize**: untag the imaginary layer and hand
//!    the triangulation back.
//!
//! # Basic usage
//!
//! ```rust
//! use tetremesh::prelude::*;
//!
//! // A single tetrahedron in subdomain 1.
//! let points = [
//!     Point::new(0.0, 0.0, 0.0),
//!     Point::new(1.0, 0.0, 0.0),
//!     Point::new(0.0, 1.0, 0.0),
//!     Point::new(0.0, 0.0, 1.0),
//! ];
//! let mut tds = Tds::from_cells(&points, &[[0, 1, 2, 3]], &[SubdomainIndex(1)]).unwrap();
//!
//! let outcome = remesh(
//!     &mut tds,
//!     &UniformSizing(1.0),
//!     &NoConstraints,
//!     &AllCellsSelected,
//!     &RemeshParams::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(outcome.status, RemeshStatus::ResolutionReached);
//! assert!(tds.is_valid().is_ok());
//! ```
//!
//! # Guarantees
//!
//! After every operator, and thus at every phase boundary:
//!
//! - the triangulation is a combinatorially valid 3-manifold (every facet
//!   shared by exactly two cells, neighbor links involutive);
//! - every finite cell has strictly positive signed volume;
//! - every vertex's classification dimension is consistent with the
//!   complex elements through it;
//! - with `protect_boundaries`, the complex facets and feature edges
//!   survive as combinatorial sets on the persisting vertices.
//!
//! Individual local operations that would violate any of this are
//! rejected and skipped; only driver-level outcomes surface to the
//! caller.

#![forbid(unsafe_code)]

/// Core data structures: the triangulation arena and its entities.
pub mod core {
    /// Collection aliases tuned for local mesh operations.
    pub mod collections;
    pub mod cell;
    pub mod edge;
    pub mod facet;
    pub mod triangulation;
    pub mod vertex;
    pub use cell::*;
    pub use edge::*;
    pub use facet::*;
    pub use triangulation::*;
    pub use vertex::*;
}

/// Geometric types and predicates over `f64` coordinates.
pub mod geometry {
    pub mod point;
    pub mod predicates;
    /// Tetrahedron quality measure used by flips and smoothing.
    pub mod quality;
    pub use point::*;
    pub use predicates::*;
    pub use quality::*;
}

/// The remeshing pipeline: complex overlay, scaffold layer, the four
/// local operators, and the driver.
pub mod remeshing {
    pub mod collapse;
    pub mod complex;
    pub(crate) mod imaginary;
    pub mod flip;
    pub mod remesher;
    pub mod smooth;
    pub mod split;
    pub mod traits;
    pub use collapse::*;
    pub use complex::*;
    pub use flip::*;
    pub use remesher::*;
    pub use smooth::*;
    pub use split::*;
    pub use traits::*;
}

/// Optional per-phase mesh dumps (cargo feature `dump`).
#[cfg(feature = "dump")]
pub mod dump;

/// Re-exports of the commonly used types.
pub mod prelude {
    pub use crate::core::cell::{Cell, SubdomainIndex};
    pub use crate::core::edge::EdgeKey;
    pub use crate::core::facet::{FacetHandle, FacetKey};
    pub use crate::core::triangulation::{
        CellKey, EditError, Tds, TriangulationConstructionError, TriangulationValidationError,
        VertexKey,
    };
    pub use crate::core::vertex::Vertex;
    pub use crate::geometry::point::Point;
    pub use crate::geometry::predicates::{orientation, signed_volume, Orientation};
    pub use crate::geometry::quality::min_dihedral_angle;
    pub use crate::remeshing::complex::{ComplexInitReport, MeshComplex};
    pub use crate::remeshing::remesher::{
        remesh, AdaptiveRemesher, RemeshError, RemeshOutcome, RemeshParams, RemeshStatus,
    };
    pub use crate::remeshing::traits::{
        AllCellsSelected, CellSelector, EdgeConstraintMap, NoConstraints, SelectorFn,
        SizingField, SizingFn, UniformSizing,
    };
}
