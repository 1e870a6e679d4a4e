//! Combining per-block fragments into one mesh per object.

use super::fragments::FragmentStore;
use super::geometry::Mesh;
use crate::error::{Result, VolumeError};
use crate::export::{write_mesh, MeshFormat};
use crate::pool::WorkerPool;
use crate::types::ObjectId;
use std::path::{Path, PathBuf};

/// Concatenate meshes. Indices are offset by the running vertex count.
///
/// Vertices on block seams are not welded, so a combined surface is a union
/// of pieces rather than one connected mesh.
pub fn combine_fragments(fragments: &[Mesh]) -> Mesh {
    let mut combined = Mesh {
        positions: Vec::with_capacity(fragments.iter().map(Mesh::vertex_count).sum()),
        indices: Vec::with_capacity(fragments.iter().map(|m| m.indices.len()).sum()),
    };
    for fragment in fragments {
        combined.merge(fragment);
    }
    combined
}

/// Outcome of combining every object of a fragment store.
#[derive(Debug, Default)]
pub struct CombineReport {
    /// Objects whose combined meshes were written.
    pub combined: Vec<ObjectId>,
    /// Objects seen without any fragment.
    pub skipped: Vec<ObjectId>,
    /// Objects that failed to load or write, with the error.
    pub failed: Vec<(ObjectId, VolumeError)>,
}

/// Load, concatenate and write the combined mesh of one object. Returns the
/// paths written.
pub fn combine_object(
    store: &FragmentStore,
    object_id: ObjectId,
    formats: &[MeshFormat],
) -> Result<Vec<PathBuf>> {
    let keys = store.fragments_of(object_id)?;
    let fragments = keys
        .iter()
        .map(|key| store.load(key))
        .collect::<Result<Vec<_>>>()?;
    let combined = combine_fragments(&fragments);
    log::debug!(
        "Object {}: {} fragments, {} triangles",
        object_id,
        keys.len(),
        combined.triangle_count()
    );

    let name = object_id.to_string();
    let mut written = Vec::with_capacity(formats.len());
    for &format in formats {
        let path = store.combined_path(object_id, format);
        write_mesh(&path, &combined, &name, format, false)?;
        written.push(path);
    }
    Ok(written)
}

/// Combine every object seen by `store`, one object per task. Failures are
/// collected per object and never abort the others.
pub fn combine_all(store: &FragmentStore, formats: &[MeshFormat], pool: &WorkerPool) -> Result<CombineReport> {
    let objects = store.seen_objects();
    log::info!("Combining {} objects in {:?}", objects.len(), store.dir());

    let outcomes = pool.try_map(&objects, |&id| Ok((id, combine_object(store, id, formats))))?;

    let mut report = CombineReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(_) => report.combined.push(id),
            Err(VolumeError::CombineMissingFragment(_)) => {
                log::warn!("Object {} has no mesh fragments, skipping", id);
                report.skipped.push(id);
            }
            Err(e) => {
                log::warn!("Failed to combine object {}: {}", id, e);
                report.failed.push((id, e));
            }
        }
    }
    Ok(report)
}

/// Combine the fragments already present in `dir`, for example after a run
/// whose combine step was interrupted.
pub fn combine_directory(dir: impl AsRef<Path>, formats: &[MeshFormat], parallelism: usize) -> Result<CombineReport> {
    let pool = WorkerPool::new(parallelism)?;
    let store = FragmentStore::scan(dir)?;
    combine_all(&store, formats, &pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::fragments::FragmentKey;
    use crate::types::Extent;
    use std::fs;
    use tempfile::TempDir;

    fn triangle(offset: f32) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_vertex([offset, 0.0, 0.0]);
        mesh.add_vertex([offset + 1.0, 0.0, 0.0]);
        mesh.add_vertex([offset, 1.0, 0.0]);
        mesh.add_triangle(0, 1, 2);
        mesh
    }

    #[test]
    fn test_concatenate_offsets_indices() {
        let combined = combine_fragments(&[triangle(0.0), triangle(5.0)]);
        assert_eq!(combined.vertex_count(), 6);
        assert_eq!(combined.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(combined.positions[3], [5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_single_fragment_is_identity() {
        assert_eq!(combine_fragments(&[triangle(2.0)]), triangle(2.0));
        assert!(combine_fragments(&[]).is_empty());
    }

    #[test]
    fn test_combine_all_reports_each_object() {
        let dir = TempDir::new().unwrap();
        let store = FragmentStore::create(dir.path(), &[]).unwrap();
        store.write(FragmentKey::new(1, &Extent::full([4, 4, 4])), &triangle(0.0)).unwrap();
        store
            .write(FragmentKey::new(1, &Extent::new((0, 4), (0, 4), (4, 8))), &triangle(4.0))
            .unwrap();
        store.write(FragmentKey::new(2, &Extent::full([4, 4, 4])), &triangle(0.0)).unwrap();
        store.mark_seen(3);
        // A fragment that no longer parses
        store.write(FragmentKey::new(4, &Extent::full([4, 4, 4])), &triangle(0.0)).unwrap();
        fs::write(dir.path().join("_4_0_0_0.obj"), "v 0 zero 0\nf 1 1 1\n").unwrap();

        let pool = WorkerPool::new(2).unwrap();
        let report = combine_all(&store, &[MeshFormat::Obj, MeshFormat::Stl], &pool).unwrap();

        assert_eq!(report.combined, vec![1, 2]);
        assert_eq!(report.skipped, vec![3]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 4);
        assert!(matches!(report.failed[0].1, VolumeError::MeshParse(_)));

        let combined = crate::export::read_obj(&dir.path().join("1.combined.obj")).unwrap();
        assert_eq!(combined.triangle_count(), 2);
        // Binary STL: header, count, 50 bytes per facet
        let stl = fs::read(dir.path().join("1.combined.stl")).unwrap();
        assert_eq!(stl.len(), 84 + 2 * 50);
    }

    #[test]
    fn test_combine_directory_rescans() {
        let dir = TempDir::new().unwrap();
        {
            let store = FragmentStore::create(dir.path(), &[MeshFormat::Stl]).unwrap();
            store.write(FragmentKey::new(7, &Extent::full([2, 2, 2])), &triangle(0.0)).unwrap();
        }

        let report = combine_directory(dir.path(), &[MeshFormat::Stl, MeshFormat::Glb], 1).unwrap();
        assert_eq!(report.combined, vec![7]);
        assert!(dir.path().join("7.combined.stl").exists());
        assert!(dir.path().join("7.combined.glb").exists());
        assert!(!dir.path().join("7.combined.obj").exists());
    }
}
