//! Mesh decimation by edge collapse with quadric error metrics (QEM).
//!
//! Vertices on open or non-manifold edges are locked, so fragment borders at
//! block faces keep their exact positions.

use super::geometry::Mesh;
use glam::DVec3;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Quadric error matrix (4x4 symmetric matrix stored as 10 values).
#[derive(Debug, Clone, Copy, Default)]
struct Quadric {
    // [a b c d]
    // [  e f g]
    // [    h i]
    // [      j]
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
    i: f64,
    j: f64,
}

impl Quadric {
    /// Quadric of the plane `n . p + d = 0` with unit normal `n`.
    fn from_plane(n: DVec3, d: f64) -> Self {
        Self {
            a: n.x * n.x,
            b: n.x * n.y,
            c: n.x * n.z,
            d: n.x * d,
            e: n.y * n.y,
            f: n.y * n.z,
            g: n.y * d,
            h: n.z * n.z,
            i: n.z * d,
            j: d * d,
        }
    }

    fn add(&mut self, other: &Self) {
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
        self.d += other.d;
        self.e += other.e;
        self.f += other.f;
        self.g += other.g;
        self.h += other.h;
        self.i += other.i;
        self.j += other.j;
    }

    /// Sum of squared distances from `p` to the planes of this quadric.
    fn evaluate(&self, p: DVec3) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        x * (x * self.a + 2.0 * (y * self.b + z * self.c + self.d))
            + y * (y * self.e + 2.0 * (z * self.f + self.g))
            + z * (z * self.h + 2.0 * self.i)
            + self.j
    }

    /// The point of minimum error, or `None` if the system is singular.
    fn optimal_point(&self) -> Option<DVec3> {
        let det = self.a * (self.e * self.h - self.f * self.f) - self.b * (self.b * self.h - self.c * self.f)
            + self.c * (self.b * self.f - self.c * self.e);
        if det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;

        let m00 = (self.e * self.h - self.f * self.f) * inv_det;
        let m01 = (self.c * self.f - self.b * self.h) * inv_det;
        let m02 = (self.b * self.f - self.c * self.e) * inv_det;
        let m11 = (self.a * self.h - self.c * self.c) * inv_det;
        let m12 = (self.b * self.c - self.a * self.f) * inv_det;
        let m22 = (self.a * self.e - self.b * self.b) * inv_det;

        let point = DVec3::new(
            -(m00 * self.d + m01 * self.g + m02 * self.i),
            -(m01 * self.d + m11 * self.g + m12 * self.i),
            -(m02 * self.d + m12 * self.g + m22 * self.i),
        );
        point.is_finite().then_some(point)
    }
}

/// An edge collapse candidate in the priority queue.
#[derive(Debug, Clone)]
struct EdgeCollapse {
    v1: u32,
    v2: u32,
    cost: f64,
    target: DVec3,
    /// Vertex versions at the time the candidate was computed.
    stamps: (u32, u32),
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior
        other.cost.partial_cmp(&self.cost).unwrap_or(Ordering::Equal)
    }
}

/// Reduce `mesh` to about `1 / factor` of its triangles.
///
/// Collapses whose quadric error exceeds `max_error` (a distance, compared
/// squared) are not performed, so the result may keep more triangles than
/// the target. A factor of 1 or less returns the mesh unchanged.
pub fn simplify(mesh: &Mesh, factor: f64, max_error: f64) -> Mesh {
    let original = mesh.triangle_count();
    if factor <= 1.0 || original == 0 {
        return mesh.clone();
    }
    let target = (original as f64 / factor).ceil() as usize;

    let mut state = Decimation::new(mesh);
    let collapses = state.run(target, max_error * max_error);
    let result = state.into_mesh();

    log::debug!(
        "Simplified {} -> {} triangles with {} collapses",
        original,
        result.triangle_count(),
        collapses
    );
    result
}

struct Decimation {
    positions: Vec<DVec3>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<usize>>,
    quadrics: Vec<Quadric>,
    removed: Vec<bool>,
    locked: Vec<bool>,
    versions: Vec<u32>,
    active_faces: usize,
    heap: BinaryHeap<EdgeCollapse>,
}

impl Decimation {
    fn new(mesh: &Mesh) -> Self {
        let positions: Vec<DVec3> = mesh
            .positions
            .iter()
            .map(|p| DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
            .collect();
        let faces: Vec<[u32; 3]> = mesh.triangles().collect();
        let vertex_count = positions.len();

        let mut vertex_faces = vec![Vec::new(); vertex_count];
        let mut quadrics = vec![Quadric::default(); vertex_count];
        let mut edge_faces: HashMap<(u32, u32), usize> = HashMap::new();

        for (face_idx, face) in faces.iter().enumerate() {
            for k in 0..3 {
                vertex_faces[face[k] as usize].push(face_idx);
                *edge_faces.entry(normalize_edge(face[k], face[(k + 1) % 3])).or_default() += 1;
            }

            if let Some((normal, d)) = face_plane(&positions, face) {
                let q = Quadric::from_plane(normal, d);
                for &v in face {
                    quadrics[v as usize].add(&q);
                }
            }
        }

        let mut locked = vec![false; vertex_count];
        for (&(v1, v2), &count) in &edge_faces {
            if count != 2 {
                locked[v1 as usize] = true;
                locked[v2 as usize] = true;
            }
        }

        let active_faces = faces.len();
        let mut state = Self {
            positions,
            face_alive: vec![true; faces.len()],
            faces,
            vertex_faces,
            quadrics,
            removed: vec![false; vertex_count],
            locked,
            versions: vec![0; vertex_count],
            active_faces,
            heap: BinaryHeap::new(),
        };

        let mut edges: Vec<(u32, u32)> = edge_faces.into_keys().collect();
        edges.sort_unstable();
        for (v1, v2) in edges {
            state.push_candidate(v1, v2);
        }
        state
    }

    fn push_candidate(&mut self, v1: u32, v2: u32) {
        if self.locked[v1 as usize] || self.locked[v2 as usize] {
            return;
        }

        let mut combined = self.quadrics[v1 as usize];
        combined.add(&self.quadrics[v2 as usize]);

        let p1 = self.positions[v1 as usize];
        let p2 = self.positions[v2 as usize];
        let (target, cost) = [combined.optimal_point(), Some(p1), Some(p2), Some((p1 + p2) * 0.5)]
            .into_iter()
            .flatten()
            .map(|p| (p, combined.evaluate(p)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .unwrap_or(((p1 + p2) * 0.5, 0.0));

        self.heap.push(EdgeCollapse {
            v1,
            v2,
            cost: cost.max(0.0),
            target,
            stamps: (self.versions[v1 as usize], self.versions[v2 as usize]),
        });
    }

    fn run(&mut self, target: usize, max_cost: f64) -> usize {
        let mut collapses = 0;
        while self.active_faces > target {
            let Some(collapse) = self.heap.pop() else {
                break;
            };
            let (v1, v2) = (collapse.v1, collapse.v2);
            if self.removed[v1 as usize]
                || self.removed[v2 as usize]
                || collapse.stamps != (self.versions[v1 as usize], self.versions[v2 as usize])
            {
                continue;
            }
            if collapse.cost > max_cost {
                break;
            }
            if !self.is_collapse_valid(v1, v2, collapse.target) {
                continue;
            }

            self.collapse(v1, v2, collapse.target);
            collapses += 1;
        }
        collapses
    }

    fn alive_faces_of(&self, v: u32) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(|&f| self.face_alive[f])
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut neighbors: Vec<u32> = self
            .alive_faces_of(v)
            .flat_map(|f| self.faces[f])
            .filter(|&u| u != v)
            .collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    fn is_collapse_valid(&self, v1: u32, v2: u32, target: DVec3) -> bool {
        // Link condition: the only shared neighbors are the apexes of the
        // faces on the edge itself.
        let shared_faces = self
            .alive_faces_of(v1)
            .filter(|&f| self.faces[f].contains(&v2))
            .count();
        let n1 = self.neighbors(v1);
        let shared_neighbors = self
            .neighbors(v2)
            .iter()
            .filter(|u| n1.binary_search(*u).is_ok())
            .count();
        if shared_neighbors != shared_faces {
            return false;
        }

        // Two faces must not fold onto each other, as happens when a
        // tetrahedron loses an edge.
        let around_v1: Vec<[u32; 3]> = self.alive_faces_of(v1).map(|f| sorted_face(self.faces[f])).collect();
        let folds = self
            .alive_faces_of(v2)
            .filter(|&f| !self.faces[f].contains(&v1))
            .any(|f| {
                let moved = self.faces[f].map(|u| if u == v2 { v1 } else { u });
                around_v1.contains(&sorted_face(moved))
            });
        if folds {
            return false;
        }

        // No surviving face may flip or degenerate.
        for v in [v1, v2] {
            for f in self.alive_faces_of(v) {
                let face = self.faces[f];
                if face.contains(&v1) && face.contains(&v2) {
                    continue;
                }
                let before = triangle_normal(face.map(|u| self.positions[u as usize]));
                let after = triangle_normal(face.map(|u| {
                    if u == v1 || u == v2 {
                        target
                    } else {
                        self.positions[u as usize]
                    }
                }));
                if after.length_squared() < 1e-12 || before.dot(after) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    /// Merge `v2` into `v1`, moving `v1` to `target`.
    fn collapse(&mut self, v1: u32, v2: u32, target: DVec3) {
        self.positions[v1 as usize] = target;
        let q2 = self.quadrics[v2 as usize];
        self.quadrics[v1 as usize].add(&q2);
        self.removed[v2 as usize] = true;

        let moved = std::mem::take(&mut self.vertex_faces[v2 as usize]);
        for f in moved {
            if !self.face_alive[f] {
                continue;
            }
            if self.faces[f].contains(&v1) {
                self.face_alive[f] = false;
                self.active_faces -= 1;
            } else {
                for u in self.faces[f].iter_mut() {
                    if *u == v2 {
                        *u = v1;
                    }
                }
                self.vertex_faces[v1 as usize].push(f);
            }
        }
        let alive = &self.face_alive;
        self.vertex_faces[v1 as usize].retain(|&f| alive[f]);

        self.versions[v1 as usize] += 1;
        self.versions[v2 as usize] += 1;

        for u in self.neighbors(v1) {
            self.push_candidate(v1, u);
        }
    }

    fn into_mesh(self) -> Mesh {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut mesh = Mesh::new();

        for (face, _) in self.faces.iter().zip(&self.face_alive).filter(|&(_, &alive)| alive) {
            let mut indices = [0u32; 3];
            for (slot, &v) in indices.iter_mut().zip(face) {
                if remap[v as usize] == u32::MAX {
                    remap[v as usize] = mesh.add_vertex(self.positions[v as usize].as_vec3().to_array());
                }
                *slot = remap[v as usize];
            }
            mesh.add_triangle(indices[0], indices[1], indices[2]);
        }
        mesh
    }
}

fn sorted_face(mut face: [u32; 3]) -> [u32; 3] {
    face.sort_unstable();
    face
}

fn normalize_edge(v1: u32, v2: u32) -> (u32, u32) {
    if v1 < v2 {
        (v1, v2)
    } else {
        (v2, v1)
    }
}

fn triangle_normal([p0, p1, p2]: [DVec3; 3]) -> DVec3 {
    (p1 - p0).cross(p2 - p0)
}

/// Unit normal and offset of the face's plane, or `None` if degenerate.
fn face_plane(positions: &[DVec3], face: &[u32; 3]) -> Option<(DVec3, f64)> {
    let p0 = positions[face[0] as usize];
    let normal = triangle_normal(face.map(|v| positions[v as usize]));
    let len = normal.length();
    if len < 1e-10 {
        return None;
    }
    let n = normal / len;
    Some((n, -n.dot(p0)))
}
