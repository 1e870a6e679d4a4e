//! STL export, ASCII and binary.

use crate::error::Result;
use crate::mesher::geometry::Mesh;
use glam::Vec3;
use std::fmt::Write;
use std::fs;
use std::path::Path;

fn facets(mesh: &Mesh) -> impl Iterator<Item = (Vec3, [Vec3; 3])> + '_ {
    mesh.triangles().map(|t| {
        let [a, b, c] = t.map(|i| Vec3::from(mesh.positions[i as usize]));
        ((b - a).cross(c - a).normalize_or_zero(), [a, b, c])
    })
}

/// Export a mesh to ASCII STL text.
pub fn export_stl_ascii(mesh: &Mesh, name: &str) -> String {
    let mut stl = String::with_capacity(64 + mesh.triangle_count() * 256);
    writeln!(stl, "solid {}", name).unwrap();
    for (normal, vertices) in facets(mesh) {
        writeln!(stl, "  facet normal {} {} {}", normal.x, normal.y, normal.z).unwrap();
        writeln!(stl, "    outer loop").unwrap();
        for v in vertices {
            writeln!(stl, "      vertex {} {} {}", v.x, v.y, v.z).unwrap();
        }
        writeln!(stl, "    endloop").unwrap();
        writeln!(stl, "  endfacet").unwrap();
    }
    writeln!(stl, "endsolid {}", name).unwrap();
    stl
}

/// Export a mesh to binary STL.
pub fn export_stl_binary(mesh: &Mesh, name: &str) -> Vec<u8> {
    let mut stl = Vec::with_capacity(84 + mesh.triangle_count() * 50);

    let mut header = [0u8; 80];
    let label = name.as_bytes();
    let len = label.len().min(80);
    header[..len].copy_from_slice(&label[..len]);
    stl.extend_from_slice(&header);
    stl.extend_from_slice(&(mesh.triangle_count() as u32).to_le_bytes());

    for (normal, vertices) in facets(mesh) {
        for v in std::iter::once(normal).chain(vertices) {
            for c in v.to_array() {
                stl.extend_from_slice(&c.to_le_bytes());
            }
        }
        stl.extend_from_slice(&0u16.to_le_bytes()); // attribute byte count
    }
    stl
}

pub fn write_stl_ascii(path: &Path, mesh: &Mesh, name: &str) -> Result<()> {
    fs::write(path, export_stl_ascii(mesh, name))?;
    Ok(())
}

pub fn write_stl_binary(path: &Path, mesh: &Mesh, name: &str) -> Result<()> {
    fs::write(path, export_stl_binary(mesh, name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_vertex([0.0, 0.0, 0.0]);
        mesh.add_vertex([1.0, 0.0, 0.0]);
        mesh.add_vertex([0.0, 1.0, 0.0]);
        mesh.add_triangle(0, 1, 2);
        mesh
    }

    #[test]
    fn test_ascii() {
        let stl = export_stl_ascii(&triangle(), "part");
        assert!(stl.starts_with("solid part\n"));
        assert!(stl.contains("facet normal 0 0 1\n"));
        assert_eq!(stl.matches("vertex ").count(), 3);
        assert!(stl.trim_end().ends_with("endsolid part"));
    }

    #[test]
    fn test_binary_layout() {
        let mut mesh = triangle();
        mesh.merge(&triangle());
        let stl = export_stl_binary(&mesh, "part");

        assert_eq!(stl.len(), 84 + 2 * 50);
        assert_eq!(&stl[..4], b"part");
        assert_eq!(u32::from_le_bytes([stl[80], stl[81], stl[82], stl[83]]), 2);

        // Normal z of the first facet
        let nz = f32::from_le_bytes([stl[92], stl[93], stl[94], stl[95]]);
        assert_eq!(nz, 1.0);
        // Second vertex x of the first facet
        let x = f32::from_le_bytes([stl[108], stl[109], stl[110], stl[111]]);
        assert_eq!(x, 1.0);
    }
}
