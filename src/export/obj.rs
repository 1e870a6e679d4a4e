//! Wavefront OBJ export and import.
//!
//! Only positions and triangle faces are written. Reading goes through
//! `tobj`, which triangulates polygons and resolves relative indices.

use crate::error::{Result, VolumeError};
use crate::mesher::geometry::Mesh;
use std::fmt::Write;
use std::fs;
use std::path::Path;
use tobj::{Mesh as ObjMesh, GPU_LOAD_OPTIONS};

/// Export a mesh to OBJ text.
pub fn export_obj(mesh: &Mesh, name: &str) -> String {
    // ~40 bytes per vertex line, ~30 per face
    let mut obj = String::with_capacity(128 + mesh.vertex_count() * 40 + mesh.triangle_count() * 30);

    writeln!(obj, "# Volume Mesher OBJ Export").unwrap();
    writeln!(obj, "# Vertices: {}", mesh.vertex_count()).unwrap();
    writeln!(obj, "# Triangles: {}", mesh.triangle_count()).unwrap();
    writeln!(obj, "o {}", name).unwrap();

    for p in &mesh.positions {
        writeln!(obj, "v {} {} {}", p[0], p[1], p[2]).unwrap();
    }
    for [i0, i1, i2] in mesh.triangles() {
        writeln!(obj, "f {} {} {}", i0 + 1, i1 + 1, i2 + 1).unwrap();
    }
    obj
}

pub fn write_obj(path: &Path, mesh: &Mesh, name: &str) -> Result<()> {
    fs::write(path, export_obj(mesh, name))?;
    Ok(())
}

/// Read every model of an OBJ file into one triangle mesh.
pub fn read_obj(path: &Path) -> Result<Mesh> {
    let (models, _) = tobj::load_obj(path, &GPU_LOAD_OPTIONS)
        .map_err(|e| VolumeError::MeshParse(format!("{:?}: {}", path, e)))?;

    let mut mesh = Mesh::new();
    for model in models {
        mesh.merge(&mesh_from_tobj_mesh(model.mesh));
    }
    Ok(mesh)
}

fn mesh_from_tobj_mesh(mesh: ObjMesh) -> Mesh {
    Mesh {
        positions: mesh
            .positions
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect(),
        indices: mesh.indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_export_contents() {
        let mut mesh = Mesh::new();
        mesh.add_vertex([0.0, 0.5, 1.0]);
        mesh.add_vertex([1.0, 0.0, 0.0]);
        mesh.add_vertex([0.0, 1.0, 0.0]);
        mesh.add_triangle(0, 1, 2);

        let obj = export_obj(&mesh, "_3_0_0_64");
        assert!(obj.contains("o _3_0_0_64"));
        assert!(obj.contains("v 0 0.5 1\n"));
        assert!(obj.contains("f 1 2 3\n"));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_3_0_0_64.obj");
        write_obj(&path, &mesh, "_3_0_0_64").unwrap();
        assert_eq!(read_obj(&path).unwrap(), mesh);
    }

    #[test]
    fn test_read_polygons_and_relative_indices() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quad.obj");
        fs::write(&path, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\nf -4 -3 -1\n").unwrap();

        let mesh = read_obj(&path).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3, 0, 1, 3]);
    }

    #[test]
    fn test_read_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.obj");
        fs::write(&path, "v 0 zero 0\nf 1 1 1\n").unwrap();
        assert!(matches!(read_obj(&path), Err(VolumeError::MeshParse(_))));

        let missing = read_obj(&dir.path().join("missing.obj"));
        assert!(matches!(missing, Err(VolumeError::MeshParse(_))));
    }
}
