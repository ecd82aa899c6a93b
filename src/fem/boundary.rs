//! Boundary bookkeeping: node flags, velocity boundary conditions,
//! boundary facet lists and the node-to-element support list.
//!
//! All of it is rebuilt from the segment arrays after every remeshing.

use std::collections::HashMap;

use crate::constants::*;
use crate::error::{Result, SolverError};

/// Node boundary flags: the OR of the flags of every incident segment.
/// Interior nodes end up with flag 0.
pub fn create_boundary_flags(nnode: usize, segment: &[Facet], segflag: &[u32]) -> Vec<u32> {
    let mut bcflag = vec![0u32; nnode];
    for (s, facet) in segment.iter().enumerate() {
        for &n in facet {
            bcflag[n] |= segflag[s];
        }
    }
    bcflag
}

/// Prescribe boundary velocities by flag bit.
///
/// Diverging x boundaries at +-max_vbc_val, fixed walls in y (3D), and
/// a fixed top in z; the z conditions are applied last so they win on
/// nodes that carry several flags.
pub fn apply_vbcs(bcflag: &[u32], max_vbc_val: f64, vel: &mut [Vector]) {
    for (n, v) in vel.iter_mut().enumerate() {
        let flag = bcflag[n];
        if flag == 0 {
            continue;
        }

        if flag & BOUNDX0 != 0 {
            v[0] = -max_vbc_val;
        } else if flag & BOUNDX1 != 0 {
            v[0] = max_vbc_val;
        }

        #[cfg(feature = "three_d")]
        if flag & (BOUNDY0 | BOUNDY1) != 0 {
            v[1] = 0.0;
        }

        if flag & BOUNDZ1 != 0 {
            v[NDIMS - 1] = 0.0;
        }
        // BOUNDZ0 stays free; the Wrinkler foundation carries the bottom
    }
}

/// Match every boundary segment to the element facet it lies on.
/// Returns (element, local facet, flag) triples.
pub fn create_boundary_facets(
    connectivity: &[Conn],
    segment: &[Facet],
    segflag: &[u32],
) -> Result<Vec<(usize, usize, u32)>> {
    let mut facet_map: HashMap<Facet, (usize, usize)> = HashMap::new();
    for (e, conn) in connectivity.iter().enumerate() {
        for (f, local) in NODE_OF_FACET.iter().enumerate() {
            let mut key = [0usize; NODES_PER_FACET];
            for (j, &loc) in local.iter().enumerate() {
                key[j] = conn[loc];
            }
            key.sort_unstable();
            facet_map.insert(key, (e, f));
        }
    }

    let mut bfacets = Vec::with_capacity(segment.len());
    for (s, facet) in segment.iter().enumerate() {
        let mut key = *facet;
        key.sort_unstable();
        match facet_map.get(&key) {
            Some(&(e, f)) => bfacets.push((e, f, segflag[s])),
            None => {
                return Err(SolverError::MeshInvariant(format!(
                    "boundary segment {:?} does not match any element facet",
                    facet
                )))
            }
        }
    }
    Ok(bfacets)
}

/// Elements incident to each node.
pub fn create_support(connectivity: &[Conn], nnode: usize) -> Vec<Vec<usize>> {
    let mut support = vec![Vec::new(); nnode];
    for (e, conn) in connectivity.iter().enumerate() {
        for &n in conn {
            support[n].push(e);
        }
    }
    support
}
