//! Mesh export formats.
//!
//! This module provides exporters for OBJ, STL and GLB.

pub mod gltf;
pub mod obj;
pub mod stl;

pub use gltf::export_glb;
pub use obj::{export_obj, read_obj, write_obj};
pub use stl::{export_stl_ascii, export_stl_binary, write_stl_ascii, write_stl_binary};

use crate::error::Result;
use crate::mesher::geometry::Mesh;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// An on-disk mesh format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Obj,
    Stl,
    Glb,
}

impl MeshFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Obj => "obj",
            MeshFormat::Stl => "stl",
            MeshFormat::Glb => "glb",
        }
    }
}

/// Write `mesh` to `path` in `format`. STL is written as ASCII when `ascii`
/// is set and as binary otherwise.
pub fn write_mesh(path: &Path, mesh: &Mesh, name: &str, format: MeshFormat, ascii: bool) -> Result<()> {
    match format {
        MeshFormat::Obj => write_obj(path, mesh, name),
        MeshFormat::Stl if ascii => write_stl_ascii(path, mesh, name),
        MeshFormat::Stl => write_stl_binary(path, mesh, name),
        MeshFormat::Glb => {
            fs::write(path, export_glb(mesh)?)?;
            Ok(())
        }
    }
}
