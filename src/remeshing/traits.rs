//! Collaborator interfaces consumed by the remeshing driver.
//!
//! The engine is parameterized over three caller-supplied policies: the
//! sizing field that prescribes target edge lengths, the constraint map
//! that declares feature edges, and the cell selector that delimits the
//! remeshed region. The `No*`/`All*` types are the defaults matching the
//! usual "remesh everything, no extra constraints" setup; the `*Fn`
//! wrappers lift plain closures into the respective trait.

use crate::core::cell::Cell;
use crate::core::collections::FastHashSet;
use crate::core::edge::EdgeKey;
use crate::geometry::point::Point;

/// Target edge length as a function of position.
///
/// The driver probes the field at [`Point::ORIGIN`] once per phase; a
/// position-dependent field is accepted but currently sampled at that
/// fixed point only.
pub trait SizingField {
    /// Target edge length at `p`.
    fn value(&self, p: &Point) -> f64;
}

/// Constant target edge length.
#[derive(Clone, Copy, Debug)]
pub struct UniformSizing(pub f64);

impl SizingField for UniformSizing {
    #[inline]
    fn value(&self, _p: &Point) -> f64 {
        self.0
    }
}

/// Adapter turning a closure into a [`SizingField`].
#[derive(Clone, Copy, Debug)]
pub struct SizingFn<F>(pub F);

impl<F> SizingField for SizingFn<F>
where
    F: Fn(&Point) -> f64,
{
    #[inline]
    fn value(&self, p: &Point) -> f64 {
        (self.0)(p)
    }
}

/// Caller-declared constrained (feature) edges, keyed by vertex pair.
pub trait EdgeConstraintMap {
    /// True when the edge must be preserved as a feature edge.
    fn get(&self, edge: EdgeKey) -> bool;
}

/// The default constraint map: no edge is constrained.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoConstraints;

impl EdgeConstraintMap for NoConstraints {
    #[inline]
    fn get(&self, _edge: EdgeKey) -> bool {
        false
    }
}

impl EdgeConstraintMap for FastHashSet<EdgeKey> {
    #[inline]
    fn get(&self, edge: EdgeKey) -> bool {
        self.contains(&edge)
    }
}

/// Membership test for the remeshed region.
pub trait CellSelector {
    /// True when the cell belongs to the region being remeshed.
    fn select(&self, cell: &Cell) -> bool;
}

/// The default selector: every cell inside some subdomain.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllCellsSelected;

impl CellSelector for AllCellsSelected {
    #[inline]
    fn select(&self, cell: &Cell) -> bool {
        !cell.subdomain().is_none()
    }
}

/// Adapter turning a closure into a [`CellSelector`].
#[derive(Clone, Copy, Debug)]
pub struct SelectorFn<F>(pub F);

impl<F> CellSelector for SelectorFn<F>
where
    F: Fn(&Cell) -> bool,
{
    #[inline]
    fn select(&self, cell: &Cell) -> bool {
        (self.0)(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::SubdomainIndex;
    use crate::core::triangulation::VertexKey;
    use slotmap::SlotMap;

    #[test]
    fn default_selector_follows_subdomain_tag() {
        let mut vertices: SlotMap<VertexKey, ()> = SlotMap::with_key();
        let vs = [
            vertices.insert(()),
            vertices.insert(()),
            vertices.insert(()),
            vertices.insert(()),
        ];
        let tagged = Cell::new(vs, SubdomainIndex(3));
        let exterior = Cell::new(vs, SubdomainIndex::NONE);
        assert!(AllCellsSelected.select(&tagged));
        assert!(!AllCellsSelected.select(&exterior));

        let only_three = SelectorFn(|c: &Cell| c.subdomain() == SubdomainIndex(3));
        assert!(only_three.select(&tagged));
        assert!(!only_three.select(&exterior));
    }

    #[test]
    fn constraint_set_answers_membership() {
        let mut vertices: SlotMap<VertexKey, ()> = SlotMap::with_key();
        let a = vertices.insert(());
        let b = vertices.insert(());
        let c = vertices.insert(());

        let mut set = FastHashSet::default();
        set.insert(EdgeKey::new(a, b));
        assert!(EdgeConstraintMap::get(&set, EdgeKey::new(b, a)));
        assert!(!EdgeConstraintMap::get(&set, EdgeKey::new(a, c)));
        assert!(!NoConstraints.get(EdgeKey::new(a, b)));
    }

    #[test]
    fn sizing_fields_evaluate() {
        let field = SizingFn(|p: &Point| 1.0 + p.x);
        assert_eq!(field.value(&Point::new(2.0, 0.0, 0.0)), 3.0);
        assert_eq!(UniformSizing(0.5).value(&Point::ORIGIN), 0.5);
    }
}
