//! Built-in mesh generation behind the narrow triangulation interface.
//!
//! [`points_to_new_mesh`] takes a point cloud plus the boundary facets
//! (with their boundary tags) and returns a conforming simplicial mesh
//! of the region they enclose. The caller owns the returned arrays.
//! In 2D this is an incremental Bowyer-Watson Delaunay triangulation
//! with constrained-segment recovery by edge flipping, removal of the
//! outside region by flood fill, and centroid refinement of elements
//! larger than `max_elem_size`. In 3D it is Bowyer-Watson without facet
//! recovery, which is sufficient for box-shaped domains.
//!
//! A production deployment can swap a Triangle/TetGen-class library
//! behind the same entry point; the rest of the solver only relies on
//! the contract stated here.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::constants::*;
use crate::error::{Result, SolverError};
use crate::mesh::geometry::element_volume;
use crate::mesh::Mesh;

/// Triangulate `points` into a conforming mesh bounded by `segments`.
///
/// The input segments reappear, with their `segflags`, as the boundary
/// facets of the output; interior points are preserved; points may be
/// added by refinement (2D) when an element exceeds `max_elem_size`.
pub fn points_to_new_mesh(
    points: &[Vector],
    segments: &[Facet],
    segflags: &[u32],
    max_elem_size: f64,
) -> Result<Mesh> {
    let mesh = triangulate(points, segments, segflags, max_elem_size)?;
    if mesh.nelem() == 0 {
        return Err(SolverError::Remeshing(
            "triangulation produced no elements".into(),
        ));
    }
    Ok(mesh)
}

/// Deterministic symmetry-breaking jitter. Regular point lattices are
/// full of cocircular quadruples; nudging each point by a relative
/// 1e-9 of the domain size makes the incircle predicate decisive. The
/// output mesh keeps the original coordinates.
fn jittered(points: &[Vector], scale: f64) -> Vec<Vector> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut q = *p;
            let mut h = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            for c in q.iter_mut() {
                h ^= h >> 33;
                h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
                let u = (h >> 11) as f64 / (1u64 << 53) as f64; // in [0,1)
                *c += (u - 0.5) * 1e-9 * scale;
            }
            q
        })
        .collect()
}

fn bbox_diagonal(points: &[Vector]) -> f64 {
    let mut lo = [f64::INFINITY; NDIMS];
    let mut hi = [f64::NEG_INFINITY; NDIMS];
    for p in points {
        for d in 0..NDIMS {
            lo[d] = lo[d].min(p[d]);
            hi[d] = hi[d].max(p[d]);
        }
    }
    let mut s = 0.0;
    for d in 0..NDIMS {
        s += (hi[d] - lo[d]) * (hi[d] - lo[d]);
    }
    s.sqrt()
}

// ---------------------------------------------------------------- 2D --

/// Split constrained segments whose diametral circle contains another
/// point, inserting midpoints until the boundary spacing matches the
/// local point density. This is what regenerates bottom nodes after the
/// remesher collapsed the bottom boundary to its corner span.
#[cfg(not(feature = "three_d"))]
fn split_encroached_segments(
    points: &mut Vec<Vector>,
    segments: &mut Vec<Facet>,
    segflags: &mut Vec<u32>,
) {
    let mut rounds = 0;
    loop {
        let mut split_any = false;
        let mut s = 0;
        while s < segments.len() {
            let [a, b] = segments[s];
            let (pa, pb) = (points[a], points[b]);
            let encroached = points.iter().enumerate().any(|(i, p)| {
                i != a
                    && i != b
                    && (pa[0] - p[0]) * (pb[0] - p[0]) + (pa[1] - p[1]) * (pb[1] - p[1])
                        < 0.0
            });
            if encroached {
                let mid = [0.5 * (pa[0] + pb[0]), 0.5 * (pa[1] + pb[1])];
                let m = points.len();
                points.push(mid);
                segments[s] = [a, m];
                segments.push([m, b]);
                segflags.push(segflags[s]);
                split_any = true;
            }
            s += 1;
        }
        rounds += 1;
        if !split_any || rounds > 30 {
            return;
        }
    }
}

#[cfg(not(feature = "three_d"))]
fn triangulate(
    points: &[Vector],
    segments: &[Facet],
    segflags: &[u32],
    max_elem_size: f64,
) -> Result<Mesh> {
    if points.len() < 3 {
        return Err(SolverError::Remeshing(
            "need at least 3 points to triangulate".into(),
        ));
    }
    let mut in_pts: Vec<Vector> = points.to_vec();
    let mut in_segs: Vec<Facet> = segments.to_vec();
    let mut in_flags: Vec<u32> = segflags.to_vec();
    split_encroached_segments(&mut in_pts, &mut in_segs, &mut in_flags);
    let points = &in_pts[..];
    let segments = &in_segs[..];
    let segflags = &in_flags[..];

    let npoints = points.len();
    let diag = bbox_diagonal(points);
    let mut pts = jittered(points, diag);

    // super-triangle, far outside the cloud
    let mut lo = [f64::INFINITY; 2];
    for p in &pts {
        lo[0] = lo[0].min(p[0]);
        lo[1] = lo[1].min(p[1]);
    }
    let big = 10.0 * diag.max(1.0);
    let s0 = pts.len();
    pts.push([lo[0] - big, lo[1] - big]);
    pts.push([lo[0] + 3.0 * big, lo[1] - big]);
    pts.push([lo[0] - big, lo[1] + 3.0 * big]);

    let constrained: HashSet<(usize, usize)> =
        segments.iter().map(|s| edge_key(s[0], s[1])).collect();

    let mut tris: Vec<[usize; 3]> = vec![[s0, s0 + 1, s0 + 2]];
    for i in 0..npoints {
        insert_point(&mut tris, &pts, i, &HashSet::new());
    }

    for seg in segments {
        recover_segment(&mut tris, &pts, seg[0], seg[1])?;
    }

    let mut inside = classify_inside(&tris, s0, &constrained);

    // refine oversized interior triangles at their centroid
    let mut rounds = 0;
    loop {
        let oversized: Vec<usize> = tris
            .iter()
            .enumerate()
            .filter(|&(t, tri)| {
                inside[t] && triangle_area(&pts, tri) > max_elem_size
            })
            .map(|(t, _)| t)
            .collect();
        if oversized.is_empty() || rounds >= 10_000 {
            break;
        }
        rounds += 1;
        // insert one centroid per round; the cavity search invalidates
        // the remaining indices
        let tri = tris[oversized[0]];
        let c = [
            (pts[tri[0]][0] + pts[tri[1]][0] + pts[tri[2]][0]) / 3.0,
            (pts[tri[0]][1] + pts[tri[1]][1] + pts[tri[2]][1]) / 3.0,
        ];
        pts.push(c);
        insert_point(&mut tris, &pts, pts.len() - 1, &constrained);
        inside = classify_inside(&tris, s0, &constrained);
    }

    // emit: original coordinates, refinement points appended as-is
    let mut coord: Vec<Vector> = points.to_vec();
    coord.extend(pts[s0 + 3..].iter().copied());

    let mut connectivity: Vec<Conn> = Vec::new();
    for (t, tri) in tris.iter().enumerate() {
        if !inside[t] {
            continue;
        }
        let mut conn = [tri[0], tri[1], tri[2]];
        // re-index: refinement points sit after the 3 super vertices
        for n in conn.iter_mut() {
            if *n > s0 + 2 {
                *n -= 3;
            }
        }
        if element_volume(&coord, &conn) < 0.0 {
            conn.swap(1, 2);
        }
        connectivity.push(conn);
    }

    Ok(Mesh {
        coord,
        connectivity,
        segment: segments.to_vec(),
        segflag: segflags.to_vec(),
    })
}

#[cfg(not(feature = "three_d"))]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

#[cfg(not(feature = "three_d"))]
fn triangle_area(pts: &[Vector], t: &[usize; 3]) -> f64 {
    let (a, b, c) = (pts[t[0]], pts[t[1]], pts[t[2]]);
    0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])).abs()
}

/// d strictly inside the circumcircle of ccw triangle (a, b, c).
#[cfg(not(feature = "three_d"))]
fn in_circumcircle(a: Vector, b: Vector, c: Vector, d: Vector) -> bool {
    let (ax, ay) = (a[0] - d[0], a[1] - d[1]);
    let (bx, by) = (b[0] - d[0], b[1] - d[1]);
    let (cx, cy) = (c[0] - d[0], c[1] - d[1]);
    let det = (ax * ax + ay * ay) * (bx * cy - cx * by)
        - (bx * bx + by * by) * (ax * cy - cx * ay)
        + (cx * cx + cy * cy) * (ax * by - bx * ay);
    det > 0.0
}

#[cfg(not(feature = "three_d"))]
fn orient(a: Vector, b: Vector, c: Vector) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

/// Bowyer-Watson insertion. The cavity never grows across an edge in
/// `constrained`, so recovered segments survive later insertions.
#[cfg(not(feature = "three_d"))]
fn insert_point(
    tris: &mut Vec<[usize; 3]>,
    pts: &[Vector],
    p: usize,
    constrained: &HashSet<(usize, usize)>,
) {
    // seed with the triangle containing p: with constrained edges in
    // play the cavity must start on p's side of every constraint
    let contains = |t: &[usize; 3]| {
        (0..3).all(|i| orient(pts[t[i]], pts[t[(i + 1) % 3]], pts[p]) >= 0.0)
    };
    let seed = match tris
        .iter()
        .position(contains)
        .or_else(|| {
            tris.iter()
                .position(|t| in_circumcircle(pts[t[0]], pts[t[1]], pts[t[2]], pts[p]))
        }) {
        Some(s) => s,
        None => return, // duplicate or degenerate point, drop it
    };

    // adjacency over shared edges
    let mut edge_to_tris: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (t, tri) in tris.iter().enumerate() {
        for i in 0..3 {
            edge_to_tris
                .entry(edge_key(tri[i], tri[(i + 1) % 3]))
                .or_default()
                .push(t);
        }
    }

    // grow the cavity by BFS, blocked at constrained edges
    let mut in_cavity = vec![false; tris.len()];
    in_cavity[seed] = true;
    let mut queue = VecDeque::from([seed]);
    while let Some(t) = queue.pop_front() {
        let tri = tris[t];
        for i in 0..3 {
            let key = edge_key(tri[i], tri[(i + 1) % 3]);
            if constrained.contains(&key) {
                continue;
            }
            for &u in &edge_to_tris[&key] {
                if !in_cavity[u]
                    && in_circumcircle(
                        pts[tris[u][0]],
                        pts[tris[u][1]],
                        pts[tris[u][2]],
                        pts[p],
                    )
                {
                    in_cavity[u] = true;
                    queue.push_back(u);
                }
            }
        }
    }

    // cavity boundary: edges used by exactly one cavity triangle
    let mut boundary: Vec<(usize, usize)> = Vec::new();
    for (t, tri) in tris.iter().enumerate() {
        if !in_cavity[t] {
            continue;
        }
        for i in 0..3 {
            let (a, b) = (tri[i], tri[(i + 1) % 3]);
            let both_in = edge_to_tris[&edge_key(a, b)]
                .iter()
                .filter(|&&u| in_cavity[u])
                .count()
                == 2;
            if !both_in {
                boundary.push((a, b));
            }
        }
    }

    let mut next: Vec<[usize; 3]> = tris
        .iter()
        .enumerate()
        .filter(|&(t, _)| !in_cavity[t])
        .map(|(_, tri)| *tri)
        .collect();
    for (a, b) in boundary {
        let mut tri = [a, b, p];
        if orient(pts[tri[0]], pts[tri[1]], pts[tri[2]]) < 0.0 {
            tri.swap(0, 1);
        }
        next.push(tri);
    }
    *tris = next;
}

/// Proper intersection of open segments (a,b) and (c,d).
#[cfg(not(feature = "three_d"))]
fn segments_cross(pts: &[Vector], a: usize, b: usize, c: usize, d: usize) -> bool {
    if a == c || a == d || b == c || b == d {
        return false;
    }
    let o1 = orient(pts[a], pts[b], pts[c]);
    let o2 = orient(pts[a], pts[b], pts[d]);
    let o3 = orient(pts[c], pts[d], pts[a]);
    let o4 = orient(pts[c], pts[d], pts[b]);
    (o1 * o2 < 0.0) && (o3 * o4 < 0.0)
}

/// Restore the constrained edge (a, b) by flipping crossing edges.
#[cfg(not(feature = "three_d"))]
fn recover_segment(
    tris: &mut Vec<[usize; 3]>,
    pts: &[Vector],
    a: usize,
    b: usize,
) -> Result<()> {
    for _attempt in 0..10_000 {
        let mut edge_to_tris: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (t, tri) in tris.iter().enumerate() {
            for i in 0..3 {
                edge_to_tris
                    .entry(edge_key(tri[i], tri[(i + 1) % 3]))
                    .or_default()
                    .push(t);
            }
        }
        if edge_to_tris.contains_key(&edge_key(a, b)) {
            return Ok(());
        }

        // flip one flippable crossing edge
        let mut flipped = false;
        for (&(u, v), owners) in edge_to_tris.iter() {
            if owners.len() != 2 || !segments_cross(pts, a, b, u, v) {
                continue;
            }
            let (t0, t1) = (owners[0], owners[1]);
            let x = opposite_vertex(&tris[t0], u, v);
            let y = opposite_vertex(&tris[t1], u, v);
            // flip only if the quad (u, x, v, y) is strictly convex
            if orient(pts[x], pts[y], pts[u]) * orient(pts[x], pts[y], pts[v]) < 0.0 {
                tris[t0] = ccw(pts, [x, y, u]);
                tris[t1] = ccw(pts, [x, y, v]);
                flipped = true;
                break;
            }
        }
        if !flipped {
            return Err(SolverError::Remeshing(format!(
                "cannot recover boundary segment ({}, {})",
                a, b
            )));
        }
    }
    Err(SolverError::Remeshing(format!(
        "segment recovery did not converge for ({}, {})",
        a, b
    )))
}

#[cfg(not(feature = "three_d"))]
fn opposite_vertex(tri: &[usize; 3], u: usize, v: usize) -> usize {
    *tri.iter().find(|&&n| n != u && n != v).expect("triangle has a third vertex")
}

#[cfg(not(feature = "three_d"))]
fn ccw(pts: &[Vector], mut tri: [usize; 3]) -> [usize; 3] {
    if orient(pts[tri[0]], pts[tri[1]], pts[tri[2]]) < 0.0 {
        tri.swap(0, 1);
    }
    tri
}

/// Flood fill from the super-triangle across unconstrained edges; what
/// remains unreached is the interior of the domain.
#[cfg(not(feature = "three_d"))]
fn classify_inside(
    tris: &[[usize; 3]],
    super_start: usize,
    constrained: &HashSet<(usize, usize)>,
) -> Vec<bool> {
    let mut edge_to_tris: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (t, tri) in tris.iter().enumerate() {
        for i in 0..3 {
            edge_to_tris
                .entry(edge_key(tri[i], tri[(i + 1) % 3]))
                .or_default()
                .push(t);
        }
    }

    let mut outside = vec![false; tris.len()];
    let mut queue = VecDeque::new();
    for (t, tri) in tris.iter().enumerate() {
        if tri.iter().any(|&n| n >= super_start) {
            outside[t] = true;
            queue.push_back(t);
        }
    }
    while let Some(t) = queue.pop_front() {
        let tri = tris[t];
        for i in 0..3 {
            let key = edge_key(tri[i], tri[(i + 1) % 3]);
            if constrained.contains(&key) {
                continue;
            }
            for &u in &edge_to_tris[&key] {
                if !outside[u] {
                    outside[u] = true;
                    queue.push_back(u);
                }
            }
        }
    }
    outside.iter().map(|&o| !o).collect()
}

// ---------------------------------------------------------------- 3D --

#[cfg(feature = "three_d")]
fn triangulate(
    points: &[Vector],
    segments: &[Facet],
    segflags: &[u32],
    _max_elem_size: f64,
) -> Result<Mesh> {
    let npoints = points.len();
    if npoints < 4 {
        return Err(SolverError::Remeshing(
            "need at least 4 points to tetrahedralize".into(),
        ));
    }
    let diag = bbox_diagonal(points);
    let mut pts = jittered(points, diag);

    let mut lo = [f64::INFINITY; 3];
    for p in &pts {
        for d in 0..3 {
            lo[d] = lo[d].min(p[d]);
        }
    }
    let big = 10.0 * diag.max(1.0);
    let s0 = pts.len();
    pts.push([lo[0] - big, lo[1] - big, lo[2] - big]);
    pts.push([lo[0] + 4.0 * big, lo[1] - big, lo[2] - big]);
    pts.push([lo[0] - big, lo[1] + 4.0 * big, lo[2] - big]);
    pts.push([lo[0] - big, lo[1] - big, lo[2] + 4.0 * big]);

    let mut tets: Vec<[usize; 4]> = vec![[s0, s0 + 1, s0 + 2, s0 + 3]];
    for i in 0..npoints {
        insert_point3(&mut tets, &pts, i);
    }

    let constrained: HashSet<[usize; 3]> = segments.iter().map(|s| face_key(s)).collect();
    let inside = classify_inside3(&tets, s0, &constrained);

    let coord: Vec<Vector> = points.to_vec();
    let mut connectivity: Vec<Conn> = Vec::new();
    for (t, tet) in tets.iter().enumerate() {
        if !inside[t] {
            continue;
        }
        let mut conn = *tet;
        if element_volume(&coord, &conn) < 0.0 {
            conn.swap(2, 3);
        }
        connectivity.push(conn);
    }

    Ok(Mesh {
        coord,
        connectivity,
        segment: segments.to_vec(),
        segflag: segflags.to_vec(),
    })
}

#[cfg(feature = "three_d")]
fn face_key(f: &[usize; 3]) -> [usize; 3] {
    let mut k = *f;
    k.sort_unstable();
    k
}

#[cfg(feature = "three_d")]
fn orient3(a: Vector, b: Vector, c: Vector, d: Vector) -> f64 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let w = [d[0] - a[0], d[1] - a[1], d[2] - a[2]];
    u[0] * (v[1] * w[2] - v[2] * w[1]) - u[1] * (v[0] * w[2] - v[2] * w[0])
        + u[2] * (v[0] * w[1] - v[1] * w[0])
}

/// e strictly inside the circumsphere of positively oriented (a,b,c,d).
#[cfg(feature = "three_d")]
fn in_circumsphere(pts: &[Vector], tet: &[usize; 4], e: usize) -> bool {
    use nalgebra::Matrix4;
    let p = pts[e];
    let mut m = Matrix4::zeros();
    for (row, &n) in tet.iter().enumerate() {
        let q = pts[n];
        let dx = q[0] - p[0];
        let dy = q[1] - p[1];
        let dz = q[2] - p[2];
        m[(row, 0)] = dx;
        m[(row, 1)] = dy;
        m[(row, 2)] = dz;
        m[(row, 3)] = dx * dx + dy * dy + dz * dz;
    }
    let sign = orient3(pts[tet[0]], pts[tet[1]], pts[tet[2]], pts[tet[3]]).signum();
    m.determinant() * sign > 0.0
}

#[cfg(feature = "three_d")]
fn insert_point3(tets: &mut Vec<[usize; 4]>, pts: &[Vector], p: usize) {
    let bad: Vec<usize> = (0..tets.len())
        .filter(|&t| in_circumsphere(pts, &tets[t], p))
        .collect();
    if bad.is_empty() {
        return;
    }
    let in_cavity: HashSet<usize> = bad.iter().copied().collect();

    // faces used by exactly one cavity tet form the cavity hull
    let mut face_count: HashMap<[usize; 3], ([usize; 3], usize)> = HashMap::new();
    for &t in &bad {
        let tet = tets[t];
        for f in 0..4 {
            let face = [
                tet[NODE_OF_FACET[f][0]],
                tet[NODE_OF_FACET[f][1]],
                tet[NODE_OF_FACET[f][2]],
            ];
            let entry = face_count.entry(face_key(&face)).or_insert((face, 0));
            entry.1 += 1;
        }
    }

    let mut next: Vec<[usize; 4]> = (0..tets.len())
        .filter(|t| !in_cavity.contains(t))
        .map(|t| tets[t])
        .collect();
    for (_, (face, count)) in face_count {
        if count != 1 {
            continue;
        }
        let mut tet = [face[0], face[1], face[2], p];
        if orient3(pts[tet[0]], pts[tet[1]], pts[tet[2]], pts[tet[3]]) < 0.0 {
            tet.swap(0, 1);
        }
        next.push(tet);
    }
    *tets = next;
}

#[cfg(feature = "three_d")]
fn classify_inside3(
    tets: &[[usize; 4]],
    super_start: usize,
    constrained: &HashSet<[usize; 3]>,
) -> Vec<bool> {
    let mut face_to_tets: HashMap<[usize; 3], Vec<usize>> = HashMap::new();
    for (t, tet) in tets.iter().enumerate() {
        for f in 0..4 {
            let face = face_key(&[
                tet[NODE_OF_FACET[f][0]],
                tet[NODE_OF_FACET[f][1]],
                tet[NODE_OF_FACET[f][2]],
            ]);
            face_to_tets.entry(face).or_default().push(t);
        }
    }

    let mut outside = vec![false; tets.len()];
    let mut queue = VecDeque::new();
    for (t, tet) in tets.iter().enumerate() {
        if tet.iter().any(|&n| n >= super_start) {
            outside[t] = true;
            queue.push_back(t);
        }
    }
    while let Some(t) = queue.pop_front() {
        let tet = tets[t];
        for f in 0..4 {
            let face = face_key(&[
                tet[NODE_OF_FACET[f][0]],
                tet[NODE_OF_FACET[f][1]],
                tet[NODE_OF_FACET[f][2]],
            ]);
            if constrained.contains(&face) {
                continue;
            }
            for &u in &face_to_tets[&face] {
                if !outside[u] {
                    outside[u] = true;
                    queue.push_back(u);
                }
            }
        }
    }
    outside.iter().map(|&o| !o).collect()
}
