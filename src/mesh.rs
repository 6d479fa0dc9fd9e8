//! Triangulation of classified maps into watertight solids.
//!
//! A map becomes an indexed triangle sheet (one vertex per cell, two
//! triangles per interior quad). The repair pass then welds coincident
//! vertices, drops duplicate and degenerate faces, closes boundary loops
//! and repairs face orientation, leaving a closed mesh whose volume
//! diagnostics are meaningful.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use thiserror::Error;

use crate::grid::Grid;

/// Vertices closer than this are considered the same point during welding.
const WELD_EPSILON: f64 = 1e-8;

/// Squared doubled-area threshold below which a face counts as degenerate.
const AREA_EPSILON: f64 = 1e-24;

#[derive(Debug, Error)]
pub enum MeshRepairError {
    #[error("non-manifold edge ({0}, {1}): shared by more than two faces")]
    NonManifoldEdge(usize, usize),

    #[error("boundary loop could not be closed")]
    OpenBoundary,

    #[error("face winding cannot be made consistent")]
    Unorientable,

    #[error("no faces left after removing degenerate geometry")]
    Empty,
}

/// An indexed triangle mesh. Built once per classified map; mutated only by
/// the in-place repair pass.
pub struct Mesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<[usize; 3]>,
}

/// What the repair pass did, for progress reporting.
#[derive(Clone, Copy, Debug, Default)]
pub struct RepairReport {
    /// Vertices merged away by welding.
    pub welded: usize,
    /// Degenerate and duplicate faces removed.
    pub dropped: usize,
    /// Faces added to close boundary loops.
    pub patched: usize,
}

// =============================================================================
// MESH CONSTRUCTION
// =============================================================================

/// Triangulate a classified map into a height-scaled triangle sheet.
///
/// Cell `(i, j)` becomes the vertex `(j, i, value * height_scale)` at index
/// `i * size + j`; each interior quad is split along its `(i,j+1)-(i+1,j)`
/// diagonal with consistent upward winding.
pub fn build(map: &Grid<f64>, height_scale: f64) -> Mesh {
    let size = map.size();

    let rows: Vec<Vec<[f64; 3]>> = (0..size)
        .into_par_iter()
        .map(|i| {
            (0..size)
                .map(|j| [j as f64, i as f64, map.get(i, j) * height_scale])
                .collect()
        })
        .collect();
    let vertices: Vec<[f64; 3]> = rows.into_iter().flatten().collect();

    let mut faces = Vec::with_capacity(2 * size.saturating_sub(1).pow(2));
    for i in 0..size.saturating_sub(1) {
        for j in 0..size - 1 {
            let idx1 = i * size + j;
            let idx2 = i * size + j + 1;
            let idx3 = (i + 1) * size + j;
            let idx4 = (i + 1) * size + j + 1;
            faces.push([idx1, idx2, idx3]);
            faces.push([idx2, idx4, idx3]);
        }
    }

    Mesh { vertices, faces }
}

// =============================================================================
// REPAIR PASS
// =============================================================================

impl Mesh {
    /// Repair the mesh into a watertight solid: weld vertices, drop
    /// degenerate and duplicate faces, fill boundary holes, then make the
    /// face orientation consistent and outward.
    pub fn repair(&mut self) -> Result<RepairReport, MeshRepairError> {
        let mut report = RepairReport::default();

        report.welded = self.weld_vertices(WELD_EPSILON);
        report.dropped = self.drop_degenerate_faces() + self.drop_duplicate_faces();
        if self.faces.is_empty() {
            return Err(MeshRepairError::Empty);
        }
        report.patched = self.fill_holes()?;
        self.fix_normals()?;

        if !self.is_watertight() {
            return Err(MeshRepairError::OpenBoundary);
        }
        Ok(report)
    }

    /// Merge vertices closer than `epsilon` and remap faces onto the kept
    /// set. Returns the number of vertices merged away.
    fn weld_vertices(&mut self, epsilon: f64) -> usize {
        let quantize = |v: f64| (v / epsilon).round() as i64;

        let mut lookup: HashMap<(i64, i64, i64), usize> = HashMap::new();
        let mut remap = vec![0usize; self.vertices.len()];
        let mut kept: Vec<[f64; 3]> = Vec::with_capacity(self.vertices.len());

        for (idx, v) in self.vertices.iter().enumerate() {
            let key = (quantize(v[0]), quantize(v[1]), quantize(v[2]));
            match lookup.get(&key) {
                Some(&canonical) => remap[idx] = canonical,
                None => {
                    lookup.insert(key, kept.len());
                    remap[idx] = kept.len();
                    kept.push(*v);
                }
            }
        }

        let merged = self.vertices.len() - kept.len();
        self.vertices = kept;
        for face in &mut self.faces {
            for corner in face.iter_mut() {
                *corner = remap[*corner];
            }
        }
        merged
    }

    /// Drop faces with repeated corners or (near-)zero area.
    fn drop_degenerate_faces(&mut self) -> usize {
        let before = self.faces.len();
        let vertices = &self.vertices;
        self.faces.retain(|f| {
            if f[0] == f[1] || f[1] == f[2] || f[2] == f[0] {
                return false;
            }
            let n = cross(
                sub(vertices[f[1]], vertices[f[0]]),
                sub(vertices[f[2]], vertices[f[0]]),
            );
            dot(n, n) > AREA_EPSILON
        });
        before - self.faces.len()
    }

    /// Drop faces covering the same vertex triple, regardless of winding.
    fn drop_duplicate_faces(&mut self) -> usize {
        let before = self.faces.len();
        let mut seen: HashSet<[usize; 3]> = HashSet::with_capacity(self.faces.len());
        self.faces.retain(|f| {
            let mut key = *f;
            key.sort_unstable();
            seen.insert(key)
        });
        before - self.faces.len()
    }

    /// Close every boundary loop with a fan patch. Patch faces traverse the
    /// loop in reverse, so each new edge pairs with the sheet edge it seals.
    /// Returns the number of faces added.
    fn fill_holes(&mut self) -> Result<usize, MeshRepairError> {
        let undirected = self.undirected_edge_counts();
        if let Some((&(a, b), _)) = undirected.iter().find(|(_, &count)| count > 2) {
            return Err(MeshRepairError::NonManifoldEdge(a, b));
        }

        // Directed boundary edges, keyed by their start vertex. A vertex
        // with two outgoing boundary edges means branching loops.
        let mut next: HashMap<usize, usize> = HashMap::new();
        for face in &self.faces {
            for (a, b) in face_edges(face) {
                if undirected[&undirected_key(a, b)] == 1 && next.insert(a, b).is_some() {
                    return Err(MeshRepairError::NonManifoldEdge(a, b));
                }
            }
        }

        let mut patched = 0;
        loop {
            let Some(&start) = next.keys().next() else {
                break;
            };
            let mut cycle = vec![start];
            let mut cursor = next.remove(&start).ok_or(MeshRepairError::OpenBoundary)?;
            while cursor != start {
                cycle.push(cursor);
                cursor = next.remove(&cursor).ok_or(MeshRepairError::OpenBoundary)?;
            }
            if cycle.len() < 3 {
                return Err(MeshRepairError::OpenBoundary);
            }
            for k in 1..cycle.len() - 1 {
                self.faces.push([cycle[0], cycle[k + 1], cycle[k]]);
                patched += 1;
            }
        }
        Ok(patched)
    }

    /// Make face winding consistent across shared edges, then flip globally
    /// so the enclosed volume is positive (outward normals).
    fn fix_normals(&mut self) -> Result<(), MeshRepairError> {
        // (low, high) edge -> faces touching it, with traversal direction.
        let mut edge_faces: HashMap<(usize, usize), Vec<(usize, bool)>> = HashMap::new();
        for (fi, face) in self.faces.iter().enumerate() {
            for (a, b) in face_edges(face) {
                edge_faces
                    .entry(undirected_key(a, b))
                    .or_default()
                    .push((fi, a < b));
            }
        }
        for (&(a, b), touching) in &edge_faces {
            if touching.len() > 2 {
                return Err(MeshRepairError::NonManifoldEdge(a, b));
            }
        }

        // Two faces agree when they traverse the shared edge in opposite
        // directions; propagate flips from an arbitrary seed per component.
        let mut flip: Vec<Option<bool>> = vec![None; self.faces.len()];
        let mut stack = Vec::new();
        for seed in 0..self.faces.len() {
            if flip[seed].is_some() {
                continue;
            }
            flip[seed] = Some(false);
            stack.push(seed);
            while let Some(fi) = stack.pop() {
                let own_flip = flip[fi].expect("visited face has a flip state");
                for (a, b) in face_edges(&self.faces[fi]) {
                    let own_dir = (a < b) != own_flip;
                    for &(other, dir) in &edge_faces[&undirected_key(a, b)] {
                        if other == fi {
                            continue;
                        }
                        let need_flip = dir == own_dir;
                        match flip[other] {
                            None => {
                                flip[other] = Some(need_flip);
                                stack.push(other);
                            }
                            Some(existing) if existing != need_flip => {
                                return Err(MeshRepairError::Unorientable);
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }

        for (fi, face) in self.faces.iter_mut().enumerate() {
            if flip[fi] == Some(true) {
                face.swap(1, 2);
            }
        }

        if self.signed_volume() < 0.0 {
            for face in &mut self.faces {
                face.swap(1, 2);
            }
        }
        Ok(())
    }

    /// A mesh is watertight when every directed edge occurs exactly once and
    /// is paired with its reverse.
    pub fn is_watertight(&self) -> bool {
        if self.faces.is_empty() {
            return false;
        }
        let mut directed = HashSet::new();
        for face in &self.faces {
            for (a, b) in face_edges(face) {
                if a == b || !directed.insert((a, b)) {
                    return false;
                }
            }
        }
        directed.iter().all(|&(a, b)| directed.contains(&(b, a)))
    }

    fn undirected_edge_counts(&self) -> HashMap<(usize, usize), u32> {
        let mut counts = HashMap::new();
        for face in &self.faces {
            for (a, b) in face_edges(face) {
                *counts.entry(undirected_key(a, b)).or_insert(0) += 1;
            }
        }
        counts
    }

    // =========================================================================
    // VOLUME DIAGNOSTICS
    // =========================================================================

    /// Enclosed volume of the (repaired) mesh. A valid terrain solid has
    /// a volume strictly between zero and its bounding-box volume.
    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    fn signed_volume(&self) -> f64 {
        let mut total = 0.0;
        for face in &self.faces {
            let v0 = self.vertices[face[0]];
            let v1 = self.vertices[face[1]];
            let v2 = self.vertices[face[2]];
            total += dot(v0, cross(v1, v2));
        }
        total / 6.0
    }

    pub fn bounding_box_volume(&self) -> f64 {
        if self.vertices.is_empty() {
            return 0.0;
        }
        let mut min = [f64::MAX; 3];
        let mut max = [f64::MIN; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        (max[0] - min[0]) * (max[1] - min[1]) * (max[2] - min[2])
    }

    /// Volume of the convex hull of the vertex cloud, via incremental hull
    /// construction. Returns 0 for degenerate (flat or collinear) clouds.
    pub fn convex_hull_volume(&self) -> f64 {
        hull_volume(&self.vertices)
    }
}

// =============================================================================
// CONVEX HULL
// =============================================================================

fn hull_volume(points: &[[f64; 3]]) -> f64 {
    let Some(mut faces) = initial_tetrahedron(points) else {
        return 0.0;
    };

    let mut extent = 0.0f64;
    for p in points {
        for axis in 0..3 {
            extent = extent.max(p[axis].abs());
        }
    }
    // Visibility tolerance scales with orient() magnitudes, which are cubic
    // in the coordinate scale.
    let eps = 1e-10 * extent.powi(3).max(1.0);

    for p in 0..points.len() {
        let visible: HashSet<usize> = faces
            .iter()
            .enumerate()
            .filter(|&(_, face)| orient(points, face, points[p]) > eps)
            .map(|(fi, _)| fi)
            .collect();
        if visible.is_empty() {
            continue;
        }

        // Horizon: directed edges of the visible region whose reverse lies
        // outside it.
        let mut region_edges: HashSet<(usize, usize)> = HashSet::new();
        for &fi in &visible {
            for edge in face_edges(&faces[fi]) {
                region_edges.insert(edge);
            }
        }

        let mut rebuilt: Vec<[usize; 3]> = faces
            .iter()
            .enumerate()
            .filter(|(fi, _)| !visible.contains(fi))
            .map(|(_, face)| *face)
            .collect();
        for &(a, b) in &region_edges {
            if !region_edges.contains(&(b, a)) {
                rebuilt.push([a, b, p]);
            }
        }
        faces = rebuilt;
    }

    let hull = Mesh {
        vertices: points.to_vec(),
        faces,
    };
    hull.volume()
}

/// Find four non-coplanar points and return the outward-oriented faces of
/// their tetrahedron. `None` if the cloud is degenerate.
fn initial_tetrahedron(points: &[[f64; 3]]) -> Option<Vec<[usize; 3]>> {
    if points.len() < 4 {
        return None;
    }

    let i0 = 0;
    let i1 = (0..points.len()).max_by(|&a, &b| {
        let da = dist2(points[a], points[i0]);
        let db = dist2(points[b], points[i0]);
        da.partial_cmp(&db).expect("finite coordinates")
    })?;
    if dist2(points[i1], points[i0]) <= 0.0 {
        return None;
    }

    let axis = sub(points[i1], points[i0]);
    let i2 = (0..points.len()).max_by(|&a, &b| {
        let da = line_dist2(points[a], points[i0], axis);
        let db = line_dist2(points[b], points[i0], axis);
        da.partial_cmp(&db).expect("finite coordinates")
    })?;
    if line_dist2(points[i2], points[i0], axis) <= 0.0 {
        return None;
    }

    let base = [i0, i1, i2];
    let i3 = (0..points.len()).max_by(|&a, &b| {
        let da = orient(points, &base, points[a]).abs();
        let db = orient(points, &base, points[b]).abs();
        da.partial_cmp(&db).expect("finite coordinates")
    })?;
    if orient(points, &base, points[i3]).abs() <= 0.0 {
        return None;
    }

    let corners = [i0, i1, i2, i3];
    let mut faces = vec![[i0, i1, i2], [i0, i1, i3], [i0, i2, i3], [i1, i2, i3]];
    for face in &mut faces {
        let opposite = corners
            .iter()
            .copied()
            .find(|c| !face.contains(c))
            .expect("tetrahedron has four distinct corners");
        if orient(points, face, points[opposite]) > 0.0 {
            face.swap(1, 2);
        }
    }
    Some(faces)
}

/// Signed volume-like test: positive when `p` lies on the outward side of
/// the face plane.
fn orient(points: &[[f64; 3]], face: &[usize; 3], p: [f64; 3]) -> f64 {
    let a = points[face[0]];
    let n = cross(sub(points[face[1]], a), sub(points[face[2]], a));
    dot(n, sub(p, a))
}

fn line_dist2(p: [f64; 3], origin: [f64; 3], axis: [f64; 3]) -> f64 {
    let c = cross(axis, sub(p, origin));
    dot(c, c)
}

fn dist2(a: [f64; 3], b: [f64; 3]) -> f64 {
    let d = sub(a, b);
    dot(d, d)
}

// =============================================================================
// VECTOR HELPERS
// =============================================================================

fn face_edges(face: &[usize; 3]) -> [(usize, usize); 3] {
    [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])]
}

fn undirected_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
