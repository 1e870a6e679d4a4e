//! Zip archives of combined meshes.

use crate::error::Result;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

fn is_combined_mesh(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(stem, ext)| stem.ends_with(".combined") && matches!(ext, "obj" | "stl" | "glb"))
}

/// Write every `{id}.combined.*` mesh in `dir` into the zip file `zip_path`.
/// Returns the number of files archived.
pub fn archive_combined_meshes(dir: impl AsRef<Path>, zip_path: impl AsRef<Path>) -> Result<usize> {
    let dir = dir.as_ref();
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| is_combined_mesh(name))
        .collect();
    names.sort();

    let mut zip = ZipWriter::new(BufWriter::new(File::create(zip_path.as_ref())?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for name in &names {
        zip.start_file(name.as_str(), options)?;
        io::copy(&mut File::open(dir.join(name))?, &mut zip)?;
    }
    zip.finish()?;

    log::info!("Archived {} meshes into {:?}", names.len(), zip_path.as_ref());
    Ok(names.len())
}
