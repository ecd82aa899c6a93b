//! Mesh storage, geometry kernel and mesh generation.

pub mod generator;
pub mod geometry;
pub mod triangulator;

pub use generator::create_new_mesh;
pub use geometry::{
    compute_shape_fn, compute_volume, compute_volume_n, elem_center, element_min_altitude,
    element_quality, element_volume, facet_measure, facet_normal_outward, worst_elem_quality,
};
pub use triangulator::points_to_new_mesh;

use crate::constants::*;

/// The simplicial mesh: node coordinates, element connectivity and the
/// boundary facets with their boundary tags.
///
/// All arrays are owned here; remeshing swaps in whole new arrays at
/// once and the old ones are dropped only after field transfer has
/// succeeded.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub coord: Vec<Vector>,
    pub connectivity: Vec<Conn>,
    pub segment: Vec<Facet>,
    pub segflag: Vec<u32>,
}

impl Mesh {
    pub fn nnode(&self) -> usize {
        self.coord.len()
    }

    pub fn nelem(&self) -> usize {
        self.connectivity.len()
    }

    pub fn nseg(&self) -> usize {
        self.segment.len()
    }
}
