//! Collection aliases tuned for local mesh operations.
//!
//! The remeshing operators spend most of their time gathering small,
//! transient neighborhoods (vertex stars, edge rings, facet fans). These
//! aliases keep those gathers on the stack and use a fast non-cryptographic
//! hash for the key maps built during neighbor rewiring.

use crate::core::triangulation::{CellKey, VertexKey};
use smallvec::SmallVec;

/// `HashMap` with the `FxHash` hasher, for hot-path key maps.
pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// `HashSet` with the `FxHash` hasher.
pub type FastHashSet<T> = rustc_hash::FxHashSet<T>;

/// Stack-allocated buffer that spills to the heap past `N` elements.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Inline capacity for vertex-star gathers. Interior vertices of a
/// well-shaped tetrahedral mesh typically have 20 to 25 incident cells.
pub const STAR_BUFFER_SIZE: usize = 32;

/// Inline capacity for edge-ring gathers. Interior edges typically have 5
/// or 6 incident cells.
pub const RING_BUFFER_SIZE: usize = 8;

/// Buffer of cell keys sized for a vertex star.
pub type CellStarBuffer = SmallBuffer<CellKey, STAR_BUFFER_SIZE>;

/// Buffer of vertex keys sized for a vertex link.
pub type VertexLinkBuffer = SmallBuffer<VertexKey, STAR_BUFFER_SIZE>;

/// Buffer of cell keys sized for an edge ring.
pub type EdgeRingBuffer = SmallBuffer<CellKey, RING_BUFFER_SIZE>;
