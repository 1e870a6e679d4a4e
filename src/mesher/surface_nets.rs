//! Isosurface extraction for one labeled object using naive surface nets.
//!
//! Each voxel center is a lattice point that is either inside (carries the
//! object's label) or outside. For every unit cube of the lattice whose
//! corners disagree, one vertex is placed at the centroid of the crossing
//! edge midpoints, and every lattice edge with a sign change emits a quad
//! joining the four cubes around it.
//!
//! Lattice points outside the working region are never sampled, so an object
//! touching the region's border yields an open surface there.

use super::geometry::Mesh;
use crate::types::{Extent, ObjectId, Volume, Voxel};
use glam::Vec3;
use std::collections::HashMap;

/// Extract the boundary surface of object `id` inside `region` of `labels`.
///
/// Vertex positions are in the frame of `labels` (x, y, z), with voxel
/// centers at integer coordinates. Labels are sampled in place; the only
/// buffers grow with the surface, not with the region.
pub fn extract_surface<T: Voxel>(labels: &Volume<T>, id: ObjectId, region: &Extent) -> Mesh {
    let [nz, ny, nx] = region.shape();
    let field = ObjectField {
        labels,
        id,
        origin: region.origin(),
        dims: [nx, ny, nz],
    };
    let [oz, oy, ox] = field.origin;
    field.surface_nets(Vec3::new(ox as f32, oy as f32, oz as f32))
}

/// Inside/outside view of one object over a region, addressed as
/// `[i, j, k]` = x, y, z relative to the region origin.
struct ObjectField<'a, T> {
    labels: &'a Volume<T>,
    id: ObjectId,
    /// Region origin, Z, Y, X.
    origin: [usize; 3],
    dims: [usize; 3],
}

impl<T: Voxel> ObjectField<'_, T> {
    fn inside(&self, [i, j, k]: [usize; 3]) -> bool {
        let [oz, oy, ox] = self.origin;
        self.labels.get([oz + k, oy + j, ox + i]).to_label() == self.id
    }

    fn surface_nets(&self, offset: Vec3) -> Mesh {
        let mut mesh = Mesh::new();
        if self.dims.iter().any(|&n| n < 2) {
            return mesh;
        }

        let mut vertex_of: HashMap<[usize; 3], u32> = HashMap::new();
        let mut surface_points = Vec::new();

        for i in 0..self.dims[0] - 1 {
            for j in 0..self.dims[1] - 1 {
                for k in 0..self.dims[2] - 1 {
                    let p = [i, j, k];
                    if let Some(centroid) = self.cube_vertex(p) {
                        let position = Vec3::new(i as f32, j as f32, k as f32) + centroid + offset;
                        vertex_of.insert(p, mesh.add_vertex(position.to_array()));
                        surface_points.push(p);
                    }
                }
            }
        }

        for &p in &surface_points {
            let [i, j, k] = p;
            // Edges parallel with the X axis
            if j != 0 && k != 0 {
                self.maybe_make_quad(&mut mesh, &vertex_of, p, 0, 1, 2);
            }
            // Edges parallel with the Y axis
            if i != 0 && k != 0 {
                self.maybe_make_quad(&mut mesh, &vertex_of, p, 1, 2, 0);
            }
            // Edges parallel with the Z axis
            if i != 0 && j != 0 {
                self.maybe_make_quad(&mut mesh, &vertex_of, p, 2, 0, 1);
            }
        }
        mesh
    }

    /// The surface point inside the cube with minimal corner `min_corner`,
    /// relative to that corner, or `None` if all corners agree.
    fn cube_vertex(&self, min_corner: [usize; 3]) -> Option<Vec3> {
        let mut corners = [false; 8];
        for (idx, corner) in CUBE_CORNERS.iter().enumerate() {
            corners[idx] = self.inside([0, 1, 2].map(|a| min_corner[a] + corner[a]));
        }

        let num_inside = corners.iter().filter(|&&c| c).count();
        if num_inside == 0 || num_inside == 8 {
            return None;
        }

        let mut count = 0;
        let mut sum = Vec3::ZERO;
        for &[c1, c2] in &CUBE_EDGES {
            if corners[c1] != corners[c2] {
                count += 1;
                sum += 0.5 * (CUBE_CORNER_VECTORS[c1] + CUBE_CORNER_VECTORS[c2]);
            }
        }
        Some(sum / count as f32)
    }

    // The surface point of cube p is one corner of the quad around the edge
    // from p one step along `axis`. The other three are the cubes reached by
    // stepping backwards along the two orthogonal axes `b` and `c`.
    fn maybe_make_quad(
        &self,
        mesh: &mut Mesh,
        vertex_of: &HashMap<[usize; 3], u32>,
        p: [usize; 3],
        axis: usize,
        b: usize,
        c: usize,
    ) {
        let mut next = p;
        next[axis] += 1;
        let outward = match (self.inside(p), self.inside(next)) {
            (true, false) => true,
            (false, true) => false,
            _ => return,
        };

        let back = |mut q: [usize; 3], a: usize| {
            q[a] -= 1;
            q
        };
        // Viewed face-front:
        // v1 v3
        // v2 v4
        let (Some(&v1), Some(&v2), Some(&v3), Some(&v4)) = (
            vertex_of.get(&p),
            vertex_of.get(&back(p, b)),
            vertex_of.get(&back(p, c)),
            vertex_of.get(&back(back(p, b), c)),
        ) else {
            return;
        };
        let position = |v: u32| Vec3::from(mesh.positions[v as usize]);

        // Split the quad along the shorter diagonal.
        let quad = if position(v1).distance_squared(position(v4)) < position(v2).distance_squared(position(v3)) {
            if outward {
                [v1, v2, v4, v1, v4, v3]
            } else {
                [v1, v4, v2, v1, v3, v4]
            }
        } else if outward {
            [v2, v4, v3, v2, v3, v1]
        } else {
            [v2, v3, v4, v2, v1, v3]
        };
        mesh.indices.extend_from_slice(&quad);
    }
}

const CUBE_CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [0, 0, 1],
    [0, 1, 0],
    [0, 1, 1],
    [1, 0, 0],
    [1, 0, 1],
    [1, 1, 0],
    [1, 1, 1],
];

const CUBE_CORNER_VECTORS: [Vec3; 8] = [
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 1.0, 1.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(1.0, 0.0, 1.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(1.0, 1.0, 1.0),
];

const CUBE_EDGES: [[usize; 2]; 12] = [
    [0b000, 0b001],
    [0b000, 0b010],
    [0b000, 0b100],
    [0b001, 0b011],
    [0b001, 0b101],
    [0b010, 0b011],
    [0b010, 0b110],
    [0b011, 0b111],
    [0b100, 0b101],
    [0b100, 0b110],
    [0b101, 0b111],
    [0b110, 0b111],
];

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_labels(shape: [usize; 3], lo: usize, hi: usize, id: ObjectId) -> Volume<ObjectId> {
        let mut labels = Volume::new(shape);
        for z in lo..hi {
            for y in lo..hi {
                for x in lo..hi {
                    labels.set([z, y, x], id);
                }
            }
        }
        labels
    }

    fn signed_volume(mesh: &Mesh) -> f32 {
        mesh.triangles()
            .map(|[a, b, c]| {
                let a = Vec3::from(mesh.positions[a as usize]);
                let b = Vec3::from(mesh.positions[b as usize]);
                let c = Vec3::from(mesh.positions[c as usize]);
                a.dot(b.cross(c)) / 6.0
            })
            .sum()
    }

    fn edge_use_counts(mesh: &Mesh) -> HashMap<(u32, u32), usize> {
        let mut counts = HashMap::new();
        for [a, b, c] in mesh.triangles() {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                *counts.entry((u.min(v), u.max(v))).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn test_single_voxel_is_closed_and_outward() {
        let labels = cube_labels([3, 3, 3], 1, 2, 7);
        let mesh = extract_surface(&labels, 7, &Extent::full([3, 3, 3]));

        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(edge_use_counts(&mesh).values().all(|&n| n == 2));
        assert!(signed_volume(&mesh) > 0.0);
    }

    #[test]
    fn test_enclosed_cube_surface() {
        let labels = cube_labels([6, 6, 6], 1, 5, 3);
        let mesh = extract_surface(&labels, 3, &Extent::full([6, 6, 6]));

        assert!(!mesh.is_empty());
        assert!(edge_use_counts(&mesh).values().all(|&n| n == 2));
        assert!(signed_volume(&mesh) > 0.0);

        let (min, max) = mesh.bounds().unwrap();
        for axis in 0..3 {
            assert!(min[axis] > 0.0 && min[axis] < 1.0);
            assert!(max[axis] > 4.0 && max[axis] < 5.0);
        }
    }

    #[test]
    fn test_region_border_is_left_open() {
        // The object fills the lower Z half and touches the region's z = 0 face.
        let mut labels: Volume<ObjectId> = Volume::new([4, 4, 4]);
        for y in 1..3 {
            for x in 1..3 {
                labels.set([0, y, x], 1);
                labels.set([1, y, x], 1);
            }
        }
        let mesh = extract_surface(&labels, 1, &Extent::full([4, 4, 4]));

        let counts = edge_use_counts(&mesh);
        assert!(counts.values().any(|&n| n == 1), "expected boundary edges");
        assert!(counts.values().all(|&n| n <= 2));
    }

    #[test]
    fn test_other_labels_are_outside() {
        let mut labels = cube_labels([3, 3, 3], 1, 2, 5);
        labels.set([0, 0, 0], 9);
        let only_five = extract_surface(&labels, 5, &Extent::full([3, 3, 3]));
        assert_eq!(only_five.triangle_count(), 12);
    }

    #[test]
    fn test_sub_region_offset() {
        let labels = cube_labels([6, 6, 6], 3, 4, 2);
        let mesh = extract_surface(&labels, 2, &Extent::new((2, 5), (2, 5), (2, 5)));

        let (min, max) = mesh.bounds().unwrap();
        assert!(min.iter().all(|&v| v > 2.0 && v < 3.0));
        assert!(max.iter().all(|&v| v > 3.0 && v < 4.0));
    }

    #[test]
    fn test_thin_region_yields_nothing() {
        let labels = cube_labels([1, 4, 4], 0, 1, 1);
        let mesh = extract_surface(&labels, 1, &Extent::full([1, 4, 4]));
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_samples_narrow_voxel_types() {
        let mut labels = Volume::<u8>::new([3, 3, 3]);
        labels.set([1, 1, 1], 4);
        let mesh = extract_surface(&labels, 4, &Extent::full([3, 3, 3]));
        assert_eq!(mesh.triangle_count(), 12);
        assert!(signed_volume(&mesh) > 0.0);
    }
}
