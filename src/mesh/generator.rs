//! Initial mesh creation.
//!
//! Lays out boundary points plus an interior lattice at the requested
//! resolution for the box domain [0, xlength] x [-zlength, 0] (times
//! [0, ylength] in 3D) and hands everything to the triangulator.
//! Interior rows are offset by half a spacing so the triangulation is
//! well conditioned instead of being built from cocircular squares.

use crate::config::Param;
use crate::constants::*;
use crate::error::Result;
use crate::mesh::{points_to_new_mesh, Mesh};

/// Build the initial mesh for the configured domain.
pub fn create_new_mesh(param: &Param) -> Result<Mesh> {
    let (points, segments, segflags) = box_layout(param);
    let max_elem_size = 2.0 * param.mesh.resolution.powi(NDIMS as i32);
    points_to_new_mesh(&points, &segments, &segflags, max_elem_size)
}

#[cfg(not(feature = "three_d"))]
fn box_layout(param: &Param) -> (Vec<Vector>, Vec<Facet>, Vec<u32>) {
    let xlen = param.mesh.xlength;
    let zlen = param.mesh.zlength;
    let res = param.mesh.resolution;
    let nx = (xlen / res).round().max(1.0) as usize;
    let nz = (zlen / res).round().max(1.0) as usize;
    let dx = xlen / nx as f64;
    let dz = zlen / nz as f64;

    // counter-clockwise boundary ring, corners not duplicated
    let mut points: Vec<Vector> = Vec::new();
    let mut segments: Vec<Facet> = Vec::new();
    let mut segflags: Vec<u32> = Vec::new();

    for i in 0..nx {
        points.push([i as f64 * dx, -zlen]); // bottom, left to right
    }
    for i in 0..nz {
        points.push([xlen, -zlen + i as f64 * dz]); // right, upward
    }
    for i in 0..nx {
        points.push([xlen - i as f64 * dx, 0.0]); // top, right to left
    }
    for i in 0..nz {
        points.push([0.0, -(i as f64) * dz]); // left, downward
    }
    let ring = points.len();
    for i in 0..ring {
        segments.push([i, (i + 1) % ring]);
        let side = if i < nx {
            BOUNDZ0
        } else if i < nx + nz {
            BOUNDX1
        } else if i < 2 * nx + nz {
            BOUNDZ1
        } else {
            BOUNDX0
        };
        segflags.push(side);
    }

    // interior lattice, alternate rows shifted by dx/2
    for i in 1..nz {
        let z = -zlen + i as f64 * dz;
        let shift = if i % 2 == 1 { 0.5 * dx } else { 0.0 };
        for j in 1..nx {
            let x = j as f64 * dx + shift;
            if x < xlen - 0.25 * dx {
                points.push([x, z]);
            }
        }
    }

    (points, segments, segflags)
}

#[cfg(feature = "three_d")]
fn box_layout(param: &Param) -> (Vec<Vector>, Vec<Facet>, Vec<u32>) {
    let xlen = param.mesh.xlength;
    let ylen = param.ylength();
    let zlen = param.mesh.zlength;
    let res = param.mesh.resolution;
    let nx = (xlen / res).round().max(1.0) as usize;
    let ny = (ylen / res).round().max(1.0) as usize;
    let nz = (zlen / res).round().max(1.0) as usize;
    let dx = xlen / nx as f64;
    let dy = ylen / ny as f64;
    let dz = zlen / nz as f64;

    // full lattice of surface + interior points; surface points are
    // indexed through a grid map so the face facets can refer to them
    let mut points: Vec<Vector> = Vec::new();
    let mut index = vec![vec![vec![usize::MAX; nz + 1]; ny + 1]; nx + 1];
    for i in 0..=nx {
        for j in 0..=ny {
            for k in 0..=nz {
                let on_surface =
                    i == 0 || i == nx || j == 0 || j == ny || k == 0 || k == nz;
                let shift = if !on_surface && k % 2 == 1 { 0.25 * dx } else { 0.0 };
                let p = [
                    i as f64 * dx + shift,
                    j as f64 * dy,
                    -zlen + k as f64 * dz,
                ];
                index[i][j][k] = points.len();
                points.push(p);
            }
        }
    }

    let mut segments: Vec<Facet> = Vec::new();
    let mut segflags: Vec<u32> = Vec::new();
    let quad = |a: usize, b: usize, c: usize, d: usize, flag: u32,
                segments: &mut Vec<Facet>,
                segflags: &mut Vec<u32>| {
        segments.push([a, b, c]);
        segments.push([a, c, d]);
        segflags.push(flag);
        segflags.push(flag);
    };

    for j in 0..ny {
        for k in 0..nz {
            quad(
                index[0][j][k],
                index[0][j + 1][k],
                index[0][j + 1][k + 1],
                index[0][j][k + 1],
                BOUNDX0,
                &mut segments,
                &mut segflags,
            );
            quad(
                index[nx][j][k],
                index[nx][j + 1][k],
                index[nx][j + 1][k + 1],
                index[nx][j][k + 1],
                BOUNDX1,
                &mut segments,
                &mut segflags,
            );
        }
    }
    for i in 0..nx {
        for k in 0..nz {
            quad(
                index[i][0][k],
                index[i + 1][0][k],
                index[i + 1][0][k + 1],
                index[i][0][k + 1],
                BOUNDY0,
                &mut segments,
                &mut segflags,
            );
            quad(
                index[i][ny][k],
                index[i + 1][ny][k],
                index[i + 1][ny][k + 1],
                index[i][ny][k + 1],
                BOUNDY1,
                &mut segments,
                &mut segflags,
            );
        }
    }
    for i in 0..nx {
        for j in 0..ny {
            quad(
                index[i][j][0],
                index[i + 1][j][0],
                index[i + 1][j + 1][0],
                index[i][j + 1][0],
                BOUNDZ0,
                &mut segments,
                &mut segflags,
            );
            quad(
                index[i][j][nz],
                index[i + 1][j][nz],
                index[i + 1][j + 1][nz],
                index[i][j + 1][nz],
                BOUNDZ1,
                &mut segments,
                &mut segflags,
            );
        }
    }

    (points, segments, segflags)
}

#[cfg(test)]
#[cfg(not(feature = "three_d"))]
mod tests {
    use super::*;
    use crate::mesh::geometry::element_volume;
    use approx::assert_relative_eq;

    fn test_param(xlength: f64, zlength: f64, resolution: f64) -> Param {
        let cfg = format!(
            r#"
            [sim]
            max_steps = 1
            output_step_interval = 1

            [mesh]
            xlength = {}
            zlength = {}
            resolution = {}

            [mat]
            rheology_type = "elastic"
            "#,
            xlength, zlength, resolution
        );
        Param::from_toml_str(&cfg).expect("valid test config")
    }

    #[test]
    fn initial_mesh_fills_the_domain() {
        let param = test_param(4e4, 1e4, 1e3);
        let mesh = create_new_mesh(&param).expect("mesh generation succeeds");

        assert!(mesh.nelem() > 0);
        let total: f64 = mesh
            .connectivity
            .iter()
            .map(|c| element_volume(&mesh.coord, c))
            .sum();
        assert_relative_eq!(total, 4e8, max_relative = 1e-9);

        for conn in &mesh.connectivity {
            assert!(element_volume(&mesh.coord, conn) > 0.0);
        }

        // boundary ring: 2 * (nx + nz) facets
        assert_eq!(mesh.nseg(), 2 * (40 + 10));
    }

    #[test]
    fn element_sizes_are_near_the_resolution() {
        let param = test_param(1e4, 1e4, 1e3);
        let mesh = create_new_mesh(&param).unwrap();
        let res2 = 1e6;
        for conn in &mesh.connectivity {
            let v = element_volume(&mesh.coord, conn);
            assert!(
                v > 0.05 * res2 && v < 2.0 * res2,
                "element volume {} far from resolution^2 {}",
                v,
                res2
            );
        }
    }
}
