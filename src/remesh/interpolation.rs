//! Field transfer between meshes: point location on a uniform bin
//! grid, barycentric interpolation of nodal fields and
//! nearest-centroid transfer of element fields.

use crate::constants::*;

/// Uniform bin grid over element bounding boxes, for O(1) average
/// point-in-element queries.
pub struct SearchGrid {
    lo: Vector,
    cell: f64,
    dims: [usize; NDIMS],
    cells: Vec<Vec<usize>>,
}

impl SearchGrid {
    pub fn build(coord: &[Vector], connectivity: &[Conn]) -> Self {
        let mut lo = [f64::INFINITY; NDIMS];
        let mut hi = [f64::NEG_INFINITY; NDIMS];
        for p in coord {
            for d in 0..NDIMS {
                lo[d] = lo[d].min(p[d]);
                hi[d] = hi[d].max(p[d]);
            }
        }
        // pad so boundary points bin cleanly
        let mut span: f64 = 0.0;
        for d in 0..NDIMS {
            span = span.max(hi[d] - lo[d]);
        }
        let pad = 1e-6 * span.max(1.0);
        for d in 0..NDIMS {
            lo[d] -= pad;
            hi[d] += pad;
        }

        // aim for a few elements per cell
        let target = (connectivity.len().max(1) as f64)
            .powf(1.0 / NDIMS as f64)
            .ceil() as usize;
        let mut dims = [1usize; NDIMS];
        let mut cell: f64 = 0.0;
        for d in 0..NDIMS {
            cell = cell.max((hi[d] - lo[d]) / target as f64);
        }
        let mut ncells = 1;
        for d in 0..NDIMS {
            dims[d] = (((hi[d] - lo[d]) / cell).ceil() as usize).max(1);
            ncells *= dims[d];
        }

        let mut cells = vec![Vec::new(); ncells];
        for (e, conn) in connectivity.iter().enumerate() {
            let mut elo = [f64::INFINITY; NDIMS];
            let mut ehi = [f64::NEG_INFINITY; NDIMS];
            for &n in conn {
                for d in 0..NDIMS {
                    elo[d] = elo[d].min(coord[n][d]);
                    ehi[d] = ehi[d].max(coord[n][d]);
                }
            }
            let ilo = clamp_index(&lo, cell, &dims, &elo);
            let ihi = clamp_index(&lo, cell, &dims, &ehi);
            for flat in index_range(&ilo, &ihi, &dims) {
                cells[flat].push(e);
            }
        }

        Self { lo, cell, dims, cells }
    }

    /// Element candidates whose bounding box covers the cell of `p`.
    pub fn candidates(&self, p: &Vector) -> &[usize] {
        let idx = clamp_index(&self.lo, self.cell, &self.dims, p);
        let mut flat = 0;
        for d in (0..NDIMS).rev() {
            flat = flat * self.dims[d] + idx[d];
        }
        &self.cells[flat]
    }
}

fn clamp_index(lo: &Vector, cell: f64, dims: &[usize; NDIMS], p: &Vector) -> [usize; NDIMS] {
    let mut idx = [0usize; NDIMS];
    for d in 0..NDIMS {
        let i = ((p[d] - lo[d]) / cell).floor();
        idx[d] = (i.max(0.0) as usize).min(dims[d] - 1);
    }
    idx
}

fn index_range(
    ilo: &[usize; NDIMS],
    ihi: &[usize; NDIMS],
    dims: &[usize; NDIMS],
) -> Vec<usize> {
    let mut out = Vec::new();
    #[cfg(not(feature = "three_d"))]
    for j in ilo[1]..=ihi[1] {
        for i in ilo[0]..=ihi[0] {
            out.push(j * dims[0] + i);
        }
    }
    #[cfg(feature = "three_d")]
    for k in ilo[2]..=ihi[2] {
        for j in ilo[1]..=ihi[1] {
            for i in ilo[0]..=ihi[0] {
                out.push((k * dims[1] + j) * dims[0] + i);
            }
        }
    }
    out
}

/// Barycentric coordinates of `p` in the element.
pub fn barycentric(coord: &[Vector], conn: &Conn, p: &Vector) -> [f64; NODES_PER_ELEM] {
    let p0 = coord[conn[0]];
    #[cfg(not(feature = "three_d"))]
    {
        let a = [coord[conn[1]][0] - p0[0], coord[conn[1]][1] - p0[1]];
        let b = [coord[conn[2]][0] - p0[0], coord[conn[2]][1] - p0[1]];
        let det = a[0] * b[1] - b[0] * a[1];
        if det == 0.0 {
            return [-1.0; NODES_PER_ELEM];
        }
        let r = [p[0] - p0[0], p[1] - p0[1]];
        let xi = (r[0] * b[1] - b[0] * r[1]) / det;
        let eta = (a[0] * r[1] - r[0] * a[1]) / det;
        [1.0 - xi - eta, xi, eta]
    }
    #[cfg(feature = "three_d")]
    {
        use nalgebra::{Matrix3, Vector3};
        let cols = [
            Vector3::new(
                coord[conn[1]][0] - p0[0],
                coord[conn[1]][1] - p0[1],
                coord[conn[1]][2] - p0[2],
            ),
            Vector3::new(
                coord[conn[2]][0] - p0[0],
                coord[conn[2]][1] - p0[1],
                coord[conn[2]][2] - p0[2],
            ),
            Vector3::new(
                coord[conn[3]][0] - p0[0],
                coord[conn[3]][1] - p0[1],
                coord[conn[3]][2] - p0[2],
            ),
        ];
        let m = Matrix3::from_columns(&cols);
        let inv = match m.try_inverse() {
            Some(inv) => inv,
            None => return [-1.0; NODES_PER_ELEM],
        };
        let r = Vector3::new(p[0] - p0[0], p[1] - p0[1], p[2] - p0[2]);
        let xi = inv * r;
        [1.0 - xi[0] - xi[1] - xi[2], xi[0], xi[1], xi[2]]
    }
}

/// Whether barycentric coordinates lie inside the closed element, with
/// a small tolerance for points on facets.
pub fn is_inside(bary: &[f64; NODES_PER_ELEM], tol: f64) -> bool {
    bary.iter().all(|&l| l >= -tol && l <= 1.0 + tol)
}

/// Locate `p` in the mesh; returns the element and its barycentric
/// coordinates, or None when `p` falls outside the convex hull.
pub fn locate(
    grid: &SearchGrid,
    coord: &[Vector],
    connectivity: &[Conn],
    p: &Vector,
) -> Option<(usize, [f64; NODES_PER_ELEM])> {
    for &e in grid.candidates(p) {
        let bary = barycentric(coord, &connectivity[e], p);
        if is_inside(&bary, 1e-10) {
            return Some((e, bary));
        }
    }
    // points sitting exactly on a facet can fall between bins
    for &e in grid.candidates(p) {
        let bary = barycentric(coord, &connectivity[e], p);
        if is_inside(&bary, 1e-6) {
            return Some((e, bary));
        }
    }
    None
}

/// Index of the point in `points` closest to `q`.
pub fn nearest_point(points: &[Vector], q: &Vector) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, p) in points.iter().enumerate() {
        let mut d = 0.0;
        for k in 0..NDIMS {
            d += (p[k] - q[k]) * (p[k] - q[k]);
        }
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}
