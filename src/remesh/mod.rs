//! Remeshing: quality trigger, boundary-preserving point and facet
//! deletion, retriangulation, tiny-element repair and field transfer.

pub mod interpolation;

use self::interpolation::{barycentric, is_inside, locate, nearest_point, SearchGrid};

use crate::config::Param;
use crate::constants::*;
use crate::error::{Result, SolverError};
use crate::mesh::geometry::{compute_volume, elem_center, worst_elem_quality};
use crate::mesh::{points_to_new_mesh, Mesh};
use crate::simulation::State;

/// Sentinel marking a facet slot as deleted.
const DELETED_NODE: usize = usize::MAX;

/// Verdict of the mesh-quality check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeshQualityVerdict {
    Good,
    /// The worst element fell below `mesh.min_quality`.
    WorstElement { elem: usize, quality: f64 },
    /// A bottom node drifted beyond a quarter resolution from the
    /// restored bottom depth.
    BottomDrift { node: usize, z: f64 },
}

/// Check whether the mesh needs rebuilding.
pub fn bad_mesh_quality(param: &Param, var: &State) -> MeshQualityVerdict {
    if param.mesh.restoring_bottom {
        let bottom = -param.mesh.zlength;
        let dist_ratio = 0.25;
        for (n, &flag) in var.bcflag.iter().enumerate() {
            if flag & BOUNDZ0 != 0 {
                let z = var.mesh.coord[n][NDIMS - 1];
                if (z - bottom).abs() > dist_ratio * param.mesh.resolution {
                    return MeshQualityVerdict::BottomDrift { node: n, z };
                }
            }
        }
    }

    let (mut q, worst) = worst_elem_quality(&var.mesh.coord, &var.mesh.connectivity);
    if cfg!(feature = "three_d") && q > 0.0 {
        // bring the 3D measure onto the 2D scale
        q = q.cbrt();
    }
    if q < param.mesh.min_quality {
        return MeshQualityVerdict::WorstElement { elem: worst, quality: q };
    }
    MeshQualityVerdict::Good
}

fn is_bottom_corner(flag: u32) -> bool {
    if flag & BOUNDZ0 == 0 {
        return false;
    }
    #[cfg(not(feature = "three_d"))]
    {
        flag & (BOUNDX0 | BOUNDX1) != 0
    }
    #[cfg(feature = "three_d")]
    {
        flag & (BOUNDX0 | BOUNDX1) != 0 && flag & (BOUNDY0 | BOUNDY1) != 0
    }
}

/// Rebuild the bottom boundary: delete every bottom node except the
/// corners (and interior nodes hugging the bottom), snap the corners to
/// the restored depth, and replace all bottom facets with fresh ones
/// spanning the corners.
fn new_bottom(
    qflags: &[u32],
    qpoints: &mut [Vector],
    bottom_depth: f64,
    min_dist: f64,
    points_to_delete: &mut Vec<usize>,
    qsegment: &mut Vec<Facet>,
    qsegflag: &mut Vec<u32>,
) -> Result<()> {
    let side_bdry = BOUNDX0 | BOUNDX1 | BOUNDY0 | BOUNDY1 | BOUNDZ1;

    let mut corners: Vec<usize> = Vec::new();
    for (i, &flag) in qflags.iter().enumerate() {
        if flag & BOUNDZ0 != 0 {
            if is_bottom_corner(flag) {
                corners.push(i);
            } else {
                points_to_delete.push(i);
            }
        } else if flag & side_bdry == 0
            && (qpoints[i][NDIMS - 1] - bottom_depth).abs() < min_dist
        {
            points_to_delete.push(i);
        }
    }

    // 2 corners in 2D, 4 in 3D
    if corners.len() != 1 << (NDIMS - 1) {
        return Err(SolverError::MeshInvariant(format!(
            "cannot find all bottom corners before remeshing, found {}",
            corners.len()
        )));
    }

    for &c in &corners {
        qpoints[c][NDIMS - 1] = bottom_depth;
    }

    for (s, flag) in qsegflag.iter().enumerate() {
        if *flag == BOUNDZ0 {
            qsegment[s] = [DELETED_NODE; NODES_PER_FACET];
        }
    }

    #[cfg(not(feature = "three_d"))]
    {
        let (left, right) = if qpoints[corners[0]][0] < qpoints[corners[1]][0] {
            (corners[0], corners[1])
        } else {
            (corners[1], corners[0])
        };
        qsegment.push([left, right]);
        qsegflag.push(BOUNDZ0);
    }
    #[cfg(feature = "three_d")]
    {
        let pick = |xflag: u32, yflag: u32| -> Result<usize> {
            corners
                .iter()
                .copied()
                .find(|&c| qflags[c] & xflag != 0 && qflags[c] & yflag != 0)
                .ok_or_else(|| {
                    SolverError::MeshInvariant(
                        "bottom corners do not span the four box corners".into(),
                    )
                })
        };
        let c00 = pick(BOUNDX0, BOUNDY0)?;
        let c10 = pick(BOUNDX1, BOUNDY0)?;
        let c11 = pick(BOUNDX1, BOUNDY1)?;
        let c01 = pick(BOUNDX0, BOUNDY1)?;
        qsegment.push([c00, c10, c11]);
        qsegment.push([c00, c11, c01]);
        qsegflag.push(BOUNDZ0);
        qsegflag.push(BOUNDZ0);
    }

    Ok(())
}

/// Delete the listed points (ascending indices): each deleted slot is
/// filled by the last point, segment references to the moved point are
/// rewritten, and the parallel flag array is compacted the same way.
fn delete_points(
    points_to_delete: &[usize],
    qpoints: &mut Vec<Vector>,
    qflags: &mut Vec<u32>,
    qsegment: &mut [Facet],
) {
    for &i in points_to_delete.iter().rev() {
        let last = qpoints.len() - 1;
        qpoints.swap_remove(i);
        qflags.swap_remove(i);
        for seg in qsegment.iter_mut() {
            for n in seg.iter_mut() {
                if *n == last {
                    *n = i;
                }
            }
        }
    }
}

/// Compact away facets marked DELETED, back to front. A facet with only
/// some components marked is a corrupted segment array.
fn delete_facets(qsegment: &mut Vec<Facet>, qsegflag: &mut Vec<u32>) -> Result<()> {
    for i in (0..qsegment.len()).rev() {
        if qsegment[i][0] == DELETED_NODE {
            if qsegment[i].iter().any(|&n| n != DELETED_NODE) {
                return Err(SolverError::MeshInvariant(
                    "segment array is corrupted: facet partially deleted".into(),
                ));
            }
            qsegment.swap_remove(i);
            qsegflag.swap_remove(i);
        }
    }
    Ok(())
}

fn find_tiny_elements(smallest_vol: f64, volume: &[f64]) -> Vec<usize> {
    volume
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v < smallest_vol)
        .map(|(e, _)| e)
        .collect()
}

/// Old points (by current q-index) lying inside any tiny element of the
/// freshly triangulated mesh. Boundary points are never deleted.
fn find_points_of_tiny_elem(
    mesh: &Mesh,
    tiny_elems: &[usize],
    qpoints: &[Vector],
    qflags: &[u32],
) -> Vec<usize> {
    let protected = BOUNDX0 | BOUNDX1 | BOUNDY0 | BOUNDY1 | BOUNDZ0 | BOUNDZ1;
    let mut points_to_delete = Vec::new();
    for (i, p) in qpoints.iter().enumerate() {
        if qflags[i] & protected != 0 {
            continue;
        }
        for &e in tiny_elems {
            let bary = barycentric(&mesh.coord, &mesh.connectivity[e], p);
            if is_inside(&bary, 1e-12) {
                points_to_delete.push(i);
                break;
            }
        }
    }
    points_to_delete
}

/// Build the new mesh from the deformed point cloud: bottom rebuild,
/// point/facet deletion, triangulation and one round of tiny-element
/// repair.
fn build_new_mesh(param: &Param, old: &Mesh, old_bcflag: &[u32]) -> Result<Mesh> {
    // refining large elements during remeshing is not wanted, so the
    // size bound is the whole domain
    let max_elem_size = param.domain_measure();
    let smallest_vol =
        param.mesh.smallest_size * param.mesh.resolution.powi(NDIMS as i32);

    let mut qpoints = old.coord.clone();
    let mut qflags = old_bcflag.to_vec();
    let mut qsegment = old.segment.clone();
    let mut qsegflag = old.segflag.clone();

    if param.mesh.restoring_bottom {
        let min_dist =
            param.mesh.smallest_size.powf(1.0 / NDIMS as f64) * param.mesh.resolution;
        let mut points_to_delete = Vec::new();
        new_bottom(
            &qflags,
            &mut qpoints,
            -param.mesh.zlength,
            min_dist,
            &mut points_to_delete,
            &mut qsegment,
            &mut qsegflag,
        )?;
        delete_points(&points_to_delete, &mut qpoints, &mut qflags, &mut qsegment);
        delete_facets(&mut qsegment, &mut qsegflag)?;
    }

    let mut mesh = points_to_new_mesh(&qpoints, &qsegment, &qsegflag, max_elem_size)?;

    // deleting non-boundary nodes to avoid keeping tiny elements
    let mut volume = vec![0.0; mesh.nelem()];
    compute_volume(&mesh.coord, &mesh.connectivity, &mut volume);
    let tiny_elems = find_tiny_elements(smallest_vol, &volume);
    if !tiny_elems.is_empty() {
        let points_to_delete =
            find_points_of_tiny_elem(&mesh, &tiny_elems, &qpoints, &qflags);
        if points_to_delete.is_empty() {
            return Err(SolverError::Remeshing(format!(
                "{} tiny elements remain but no deletable interior point",
                tiny_elems.len()
            )));
        }
        delete_points(&points_to_delete, &mut qpoints, &mut qflags, &mut qsegment);
        mesh = points_to_new_mesh(&qpoints, &qsegment, &qsegflag, max_elem_size)?;

        // the repair is attempted once; a still-tiny element is fatal
        let mut volume = vec![0.0; mesh.nelem()];
        compute_volume(&mesh.coord, &mesh.connectivity, &mut volume);
        let still_tiny = find_tiny_elements(smallest_vol, &volume);
        if !still_tiny.is_empty() {
            return Err(SolverError::Remeshing(format!(
                "tiny-element repair did not converge, {} elements below {:.3e}",
                still_tiny.len(),
                smallest_vol
            )));
        }
    }

    Ok(mesh)
}

/// Rebuild the mesh and carry the fields over.
///
/// The old mesh stays intact until the new one exists and every field
/// has been transferred; a failure leaves the state untouched apart
/// from the error.
pub fn remesh(param: &Param, var: &mut State) -> Result<()> {
    println!("  Remeshing starts...");

    let old_mesh = &var.mesh;
    let new_mesh = build_new_mesh(param, old_mesh, &var.bcflag)?;

    // element fields move by nearest old centroid, nodal fields by
    // barycentric interpolation with a nearest-node fallback
    let old_grid = SearchGrid::build(&old_mesh.coord, &old_mesh.connectivity);
    let old_centroids: Vec<Vector> = old_mesh
        .connectivity
        .iter()
        .map(|c| elem_center(&old_mesh.coord, c))
        .collect();

    let ne = new_mesh.nelem();
    let nn = new_mesh.nnode();
    let mut stress = vec![[0.0; NSTR]; ne];
    let mut strain = vec![[0.0; NSTR]; ne];
    let mut plstrain = vec![0.0; ne];
    let mut mattype = vec![0usize; ne];
    for e in 0..ne {
        let c = elem_center(&new_mesh.coord, &new_mesh.connectivity[e]);
        let src = nearest_point(&old_centroids, &c);
        stress[e] = var.stress[src];
        strain[e] = var.strain[src];
        plstrain[e] = var.plstrain[src];
        mattype[e] = var.mattype[src];
    }

    let mut temperature = vec![0.0; nn];
    let mut vel = vec![[0.0; NDIMS]; nn];
    for n in 0..nn {
        let p = new_mesh.coord[n];
        match locate(&old_grid, &old_mesh.coord, &old_mesh.connectivity, &p) {
            Some((e, bary)) => {
                let conn = &old_mesh.connectivity[e];
                let mut t = 0.0;
                let mut v = [0.0; NDIMS];
                for i in 0..NODES_PER_ELEM {
                    t += bary[i] * var.temperature[conn[i]];
                    for d in 0..NDIMS {
                        v[d] += bary[i] * var.vel[conn[i]][d];
                    }
                }
                temperature[n] = t;
                vel[n] = v;
            }
            None => {
                let src = nearest_point(&old_mesh.coord, &p);
                temperature[n] = var.temperature[src];
                vel[n] = var.vel[src];
            }
        }
    }

    // swap in the new mesh and fields, then refresh the derived state
    var.mesh = new_mesh;
    var.stress = stress;
    var.strain = strain;
    var.plstrain = plstrain;
    var.mattype = mattype;
    var.temperature = temperature;
    var.vel = vel;
    var.rebuild_derived(param)?;

    println!("  Remeshing finished.");
    Ok(())
}
