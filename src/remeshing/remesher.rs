//! The adaptive remeshing driver.
//!
//! [`AdaptiveRemesher`] owns the decorated complex for the duration of a
//! run and sequences the pipeline: build the complex, wrap the domain in
//! the imaginary layer, then iterate split, collapse, flip, and smooth
//! until every free edge length falls inside the target window or the
//! iteration budget runs out. [`remesh`] is the in-place entry point that
//! drives it against a caller's triangulation.
//!
//! The length window derives from the sizing field probed at the origin:
//! `emax = 4/3 · L` and `emin = 4/5 · L`, so a split at `emax` lands the
//! two halves comfortably above `emin` and a collapse at `emin` stays
//! below `emax`.

use crate::core::triangulation::{Tds, TriangulationValidationError};
use crate::geometry::point::Point;
use crate::geometry::predicates::squared_distance;
use crate::remeshing::collapse::collapse_short_edges;
use crate::remeshing::complex::{ComplexInitReport, MeshComplex};
use crate::remeshing::flip::flip_edges;
use crate::remeshing::imaginary::add_imaginary_layer;
use crate::remeshing::smooth::smooth_vertices;
use crate::remeshing::split::split_long_edges;
use crate::remeshing::traits::{CellSelector, EdgeConstraintMap, SizingField};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Ratio of the upper length bound to the target length.
const EMAX_RATIO: f64 = 4.0 / 3.0;
/// Ratio of the lower length bound to the target length.
const EMIN_RATIO: f64 = 4.0 / 5.0;

/// Fatal failures of a remeshing run.
#[derive(Debug, Error)]
pub enum RemeshError {
    /// The input triangulation failed the structural audit.
    #[error("input triangulation failed validity audit: {0}")]
    InvalidInput(#[from] TriangulationValidationError),
    /// Geometry too degenerate to proceed.
    #[error("degenerate geometry: {detail}")]
    DegenerateGeometry {
        /// What was degenerate.
        detail: String,
    },
}

/// How a remeshing run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemeshStatus {
    /// Every free edge length lies in the target window.
    ResolutionReached,
    /// The iteration budget ran out first; the mesh is the best effort so
    /// far and still valid.
    MaxIterationsExhausted,
    /// The caller's cancellation predicate fired; the mesh is valid and
    /// reflects all completed phases.
    Cancelled,
}

/// Result summary of a remeshing run.
#[derive(Clone, Copy, Debug)]
pub struct RemeshOutcome {
    /// Terminal state of the driver loop.
    pub status: RemeshStatus,
    /// Iterations actually performed.
    pub iterations: usize,
    /// True when initialization found no positive subdomain index.
    pub subdomain_warning: bool,
    /// Edge splits performed.
    pub splits: usize,
    /// Edge collapses performed.
    pub collapses: usize,
    /// Flips performed.
    pub flips: usize,
    /// Smoothing relocations performed.
    pub smooth_moves: usize,
}

/// Run parameters for [`remesh`].
pub struct RemeshParams<'a> {
    /// Freeze complex facets and feature edges.
    pub protect_boundaries: bool,
    /// Upper bound on driver iterations.
    pub max_iterations: usize,
    /// Cooperative cancellation, polled between phases.
    pub cancel: Option<&'a dyn Fn() -> bool>,
}

impl Default for RemeshParams<'static> {
    fn default() -> Self {
        Self {
            protect_boundaries: true,
            max_iterations: 10,
            cancel: None,
        }
    }
}

impl fmt::Debug for RemeshParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemeshParams")
            .field("protect_boundaries", &self.protect_boundaries)
            .field("max_iterations", &self.max_iterations)
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

/// The remeshing pipeline over one decorated complex.
pub struct AdaptiveRemesher<'a, S, C> {
    complex: MeshComplex,
    sizing: &'a S,
    selector: &'a C,
    protect_boundaries: bool,
}

impl<'a, S, C> AdaptiveRemesher<'a, S, C>
where
    S: SizingField,
    C: CellSelector,
{
    /// Validates the input and builds the decorated complex.
    ///
    /// # Errors
    ///
    /// [`RemeshError::InvalidInput`] when the triangulation fails its
    /// structural audit.
    pub fn new<E>(
        tds: Tds,
        sizing: &'a S,
        ecmap: &E,
        selector: &'a C,
        protect_boundaries: bool,
    ) -> Result<(Self, ComplexInitReport), RemeshError>
    where
        E: EdgeConstraintMap,
    {
        tds.is_valid()?;
        let (complex, report) = MeshComplex::build(tds, ecmap, selector);
        Ok((
            Self {
                complex,
                sizing,
                selector,
                protect_boundaries,
            },
            report,
        ))
    }

    /// The decorated complex.
    #[must_use]
    pub const fn complex(&self) -> &MeshComplex {
        &self.complex
    }

    /// Wraps the domain in the imaginary layer.
    ///
    /// # Errors
    ///
    /// [`RemeshError::DegenerateGeometry`] when a boundary facet cannot
    /// carry a scaffold cell.
    pub fn preprocess(&mut self) -> Result<usize, RemeshError> {
        let n = add_imaginary_layer(&mut self.complex)?;
        self.dump_step("0-preprocess");
        Ok(n)
    }

    /// Split phase.
    pub fn split(&mut self) -> usize {
        debug_assert!(self.vertex_dimensions_classified());
        let emax = EMAX_RATIO * self.target_length();
        let n = split_long_edges(&mut self.complex, emax, self.protect_boundaries, self.selector);
        debug_assert!(self.complex.tds().is_valid().is_ok());
        self.dump_step("1-split");
        n
    }

    /// Collapse phase.
    pub fn collapse(&mut self) -> usize {
        debug_assert!(self.vertex_dimensions_classified());
        let target = self.target_length();
        let n = collapse_short_edges(
            &mut self.complex,
            EMIN_RATIO * target,
            EMAX_RATIO * target,
            self.protect_boundaries,
            self.selector,
        );
        debug_assert!(self.complex.tds().is_valid().is_ok());
        self.dump_step("2-collapse");
        n
    }

    /// Flip phase.
    pub fn flip(&mut self) -> usize {
        let n = flip_edges(&mut self.complex, self.selector);
        debug_assert!(self.complex.tds().is_valid().is_ok());
        self.dump_step("3-flip");
        n
    }

    /// Smooth phase.
    pub fn smooth(&mut self) -> usize {
        let n = smooth_vertices(&mut self.complex, self.selector);
        debug_assert!(self.complex.tds().is_valid().is_ok());
        self.dump_step("4-smooth");
        n
    }

    /// True when every free edge (not protected, not buried in the
    /// scaffold or the exterior) has squared length inside the target
    /// window.
    #[must_use]
    pub fn resolution_reached(&self) -> bool {
        let target = self.target_length();
        let sq_min = (EMIN_RATIO * target).powi(2);
        let sq_max = (EMAX_RATIO * target).powi(2);
        let complex = &self.complex;
        let tds = complex.tds();

        for e in tds.finite_edges() {
            let (u, v) = e.endpoints();
            if self.protect_boundaries
                && (complex.is_complex_edge(e) || complex.edge_on_complex_facet(u, v))
            {
                continue;
            }
            let in_region = tds.cells_around_edge(u, v).is_some_and(|(ring, _)| {
                ring.iter().any(|&ck| {
                    tds.cell(ck).is_some_and(|cell| {
                        complex.is_real_subdomain(cell.subdomain())
                            && self.selector.select(cell)
                    })
                })
            });
            if !in_region {
                continue;
            }
            let sq = squared_distance(tds.point(u), tds.point(v));
            if sq < sq_min || sq > sq_max {
                return false;
            }
        }
        info!("resolution reached");
        true
    }

    /// Removes the scaffold layer from the complex. The scaffold cells
    /// stay in the triangulation, reverting to exterior cells.
    pub fn postprocess(&mut self) -> usize {
        let n = self.complex.remove_imaginary_from_complex();
        debug_assert!(self.complex.tds().is_valid().is_ok());
        self.dump_step("99-postprocess");
        n
    }

    /// Hands the triangulation back.
    #[must_use]
    pub fn finalize(self) -> Tds {
        self.complex.into_tds()
    }

    fn target_length(&self) -> f64 {
        self.sizing.value(&Point::ORIGIN)
    }

    fn vertex_dimensions_classified(&self) -> bool {
        self.complex
            .tds()
            .finite_vertices()
            .all(|(_, vertex)| (0..=3).contains(&vertex.in_dimension()))
    }

    #[cfg(feature = "dump")]
    fn dump_step(&self, stem: &str) {
        let path = std::path::PathBuf::from(format!("{stem}.mesh"));
        if let Err(e) = crate::dump::write_mesh(self.complex.tds(), &path, None) {
            tracing::warn!("mesh dump {stem} failed: {e}");
        }
        let path = std::path::PathBuf::from(format!("{stem}-no-imaginary.mesh"));
        if let Err(e) = crate::dump::write_mesh(
            self.complex.tds(),
            &path,
            Some(self.complex.imaginary_index()),
        ) {
            tracing::warn!("mesh dump {stem} failed: {e}");
        }
    }

    #[cfg(not(feature = "dump"))]
    #[allow(clippy::unused_self)]
    fn dump_step(&self, _stem: &str) {}
}

/// Remeshes `tds` in place toward the edge-length target of `sizing`.
///
/// The input is validated, decorated, wrapped in the imaginary layer, and
/// driven through up to `params.max_iterations` rounds of
/// split / collapse / flip / smooth. On return, `tds` holds the remeshed
/// triangulation regardless of how the loop ended, with scaffold cells
/// untagged. A `max_subdomain == 0` input is a non-fatal condition
/// reported through [`RemeshOutcome::subdomain_warning`].
///
/// # Errors
///
/// [`RemeshError::InvalidInput`] when the input audit fails (the input is
/// left untouched), [`RemeshError::DegenerateGeometry`] when preprocessing
/// cannot wrap the domain (the input is returned untouched apart from the
/// attempted wrap being rolled out of the complex).
pub fn remesh<S, E, C>(
    tds: &mut Tds,
    sizing: &S,
    ecmap: &E,
    selector: &C,
    params: &RemeshParams<'_>,
) -> Result<RemeshOutcome, RemeshError>
where
    S: SizingField,
    E: EdgeConstraintMap,
    C: CellSelector,
{
    tds.is_valid()?;
    let input = std::mem::replace(tds, Tds::placeholder());
    let (mut remesher, report) =
        match AdaptiveRemesher::new(input, sizing, ecmap, selector, params.protect_boundaries) {
            Ok(ok) => ok,
            Err(e) => return Err(e),
        };

    let cancelled = || params.cancel.is_some_and(|f| f());

    if let Err(e) = remesher.preprocess() {
        remesher.postprocess();
        *tds = remesher.finalize();
        return Err(e);
    }

    let mut outcome = RemeshOutcome {
        status: RemeshStatus::MaxIterationsExhausted,
        iterations: 0,
        subdomain_warning: report.trivial_subdomains,
        splits: 0,
        collapses: 0,
        flips: 0,
        smooth_moves: 0,
    };

    'driver: for i in 1..=params.max_iterations {
        outcome.iterations = i;
        debug!(iteration = i, "remeshing iteration");

        outcome.splits += remesher.split();
        if cancelled() {
            outcome.status = RemeshStatus::Cancelled;
            break 'driver;
        }
        outcome.collapses += remesher.collapse();
        if cancelled() {
            outcome.status = RemeshStatus::Cancelled;
            break 'driver;
        }
        outcome.flips += remesher.flip();
        if cancelled() {
            outcome.status = RemeshStatus::Cancelled;
            break 'driver;
        }
        outcome.smooth_moves += remesher.smooth();

        if remesher.resolution_reached() {
            outcome.status = RemeshStatus::ResolutionReached;
            break 'driver;
        }
        if cancelled() {
            outcome.status = RemeshStatus::Cancelled;
            break 'driver;
        }
    }

    remesher.postprocess();
    *tds = remesher.finalize();
    Ok(outcome)
}
