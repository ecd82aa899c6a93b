//! Compile-time dimensionality and mesh constants.
//!
//! The solver is built either for 2D (triangles) or 3D (tetrahedra);
//! the `three_d` cargo feature selects the latter. Everything that
//! depends on the dimension is derived from `NDIMS` here so the rest of
//! the crate can be written once against these constants.

/// Number of spatial dimensions.
#[cfg(not(feature = "three_d"))]
pub const NDIMS: usize = 2;
#[cfg(feature = "three_d")]
pub const NDIMS: usize = 3;

/// Nodes per element: 3 for triangles, 4 for tetrahedra.
pub const NODES_PER_ELEM: usize = NDIMS + 1;

/// Independent components of a symmetric tensor in Voigt storage.
///
/// 2D: {xx, zz, xz}. 3D: {xx, yy, zz, xy, xz, yz}.
pub const NSTR: usize = NDIMS * (NDIMS + 1) / 2;

/// Facets (edges in 2D, faces in 3D) per element.
pub const FACETS_PER_ELEM: usize = NDIMS + 1;

/// Nodes per facet: 2 for an edge, 3 for a triangular face.
pub const NODES_PER_FACET: usize = NDIMS;

pub const BOUNDX0: u32 = 1 << 0; // western (left in 2D)
pub const BOUNDX1: u32 = 1 << 1; // eastern (right in 2D)
pub const BOUNDY0: u32 = 1 << 2; // southern, 3D only
pub const BOUNDY1: u32 = 1 << 3; // northern, 3D only
pub const BOUNDZ0: u32 = 1 << 4; // bottom
pub const BOUNDZ1: u32 = 1 << 5; // top
pub const BOUNDN0: u32 = 1 << 6; // oblique, not parallel to any axis

pub const BOUND_ANY: u32 =
    BOUNDX0 | BOUNDX1 | BOUNDY0 | BOUNDY1 | BOUNDZ0 | BOUNDZ1 | BOUNDN0;

/// Local node numbers of each facet, ordered counter-clockwise when
/// viewed from outside the element.
#[cfg(not(feature = "three_d"))]
pub const NODE_OF_FACET: [[usize; NODES_PER_FACET]; FACETS_PER_ELEM] =
    [[1, 2], [2, 0], [0, 1]];
#[cfg(feature = "three_d")]
pub const NODE_OF_FACET: [[usize; NODES_PER_FACET]; FACETS_PER_ELEM] =
    [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

pub const YEAR2SEC: f64 = 365.2422 * 86400.0;
pub const DEG2RAD: f64 = std::f64::consts::PI / 180.0;

/// Universal gas constant (J/mol/K), used by the creep-viscosity law.
pub const GAS_CONSTANT: f64 = 8.314_462_618;

/// A node coordinate or any other per-node vector quantity.
pub type Vector = [f64; NDIMS];

/// Node indices of one element.
pub type Conn = [usize; NODES_PER_ELEM];

/// Node indices of one boundary facet.
pub type Facet = [usize; NODES_PER_FACET];

/// A symmetric tensor in Voigt storage.
pub type Tensor = [f64; NSTR];

/// Per-element shape-function gradient component, one slot per node.
pub type ShapeFn = [f64; NODES_PER_ELEM];
