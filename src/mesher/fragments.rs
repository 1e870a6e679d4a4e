//! Per-block mesh fragments buffered on disk.

use super::geometry::Mesh;
use crate::error::{Result, VolumeError};
use crate::export::{read_obj, write_mesh, MeshFormat};
use crate::types::{Extent, ObjectId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifies the part of one object's surface meshed within one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentKey {
    pub object_id: ObjectId,
    /// Lower corner of the block, x, y, z.
    pub block_origin: [usize; 3],
}

impl FragmentKey {
    pub fn new(object_id: ObjectId, block: &Extent) -> Self {
        let [z, y, x] = block.origin();
        Self {
            object_id,
            block_origin: [x, y, z],
        }
    }

    /// File name without extension: `_{id}_{x}_{y}_{z}`.
    pub fn file_stem(&self) -> String {
        let [x, y, z] = self.block_origin;
        format!("_{}_{}_{}_{}", self.object_id, x, y, z)
    }

    pub fn file_name(&self, format: MeshFormat) -> String {
        format!("{}.{}", self.file_stem(), format.extension())
    }

    /// Recover a key from a fragment file name such as `_3_0_64_128.obj`.
    pub fn parse(file_name: &str) -> Option<(Self, MeshFormat)> {
        let (stem, extension) = file_name.rsplit_once('.')?;
        let format = match extension {
            "obj" => MeshFormat::Obj,
            "stl" => MeshFormat::Stl,
            "glb" => MeshFormat::Glb,
            _ => return None,
        };

        let mut fields = stem.strip_prefix('_')?.split('_');
        let object_id = fields.next()?.parse().ok()?;
        let mut block_origin = [0usize; 3];
        for value in &mut block_origin {
            *value = fields.next()?.parse().ok()?;
        }
        if fields.next().is_some() {
            return None;
        }
        Some((
            Self {
                object_id,
                block_origin,
            },
            format,
        ))
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

#[derive(Debug, Default)]
struct FragmentIndex {
    seen: BTreeSet<ObjectId>,
    fragments: BTreeMap<ObjectId, Vec<FragmentKey>>,
}

/// A directory of fragment files plus the in-memory index of what was
/// written to it.
///
/// Fragments are always written as OBJ, which is what is read back when
/// combining; other formats are written alongside on request.
pub struct FragmentStore {
    dir: PathBuf,
    formats: Vec<MeshFormat>,
    index: Mutex<FragmentIndex>,
}

impl FragmentStore {
    pub fn create(dir: impl AsRef<Path>, formats: &[MeshFormat]) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut all_formats = vec![MeshFormat::Obj];
        all_formats.extend(formats.iter().copied().filter(|f| *f != MeshFormat::Obj));
        Ok(Self {
            dir,
            formats: all_formats,
            index: Mutex::new(FragmentIndex::default()),
        })
    }

    /// Index the OBJ fragments already present in `dir`.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Self::create(dir, &[])?;
        let mut count = 0;
        {
            let mut index = store.index.lock();
            for entry in fs::read_dir(&store.dir)? {
                let name = entry?.file_name();
                if let Some((key, MeshFormat::Obj)) = FragmentKey::parse(&name.to_string_lossy()) {
                    index.seen.insert(key.object_id);
                    index.fragments.entry(key.object_id).or_default().push(key);
                    count += 1;
                }
            }
            for keys in index.fragments.values_mut() {
                keys.sort();
            }
        }
        log::info!("Found {} fragments in {:?}", count, store.dir);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record that `object_id` occurred, whether or not it yields a fragment.
    pub fn mark_seen(&self, object_id: ObjectId) {
        self.index.lock().seen.insert(object_id);
    }

    /// Write a fragment in every configured format and index it.
    pub fn write(&self, key: FragmentKey, mesh: &Mesh) -> Result<()> {
        let name = key.file_stem();
        for &format in &self.formats {
            write_mesh(&self.dir.join(key.file_name(format)), mesh, &name, format, true)?;
        }

        let mut index = self.index.lock();
        index.seen.insert(key.object_id);
        index.fragments.entry(key.object_id).or_default().push(key);
        Ok(())
    }

    pub fn load(&self, key: &FragmentKey) -> Result<Mesh> {
        read_obj(&self.dir.join(key.file_name(MeshFormat::Obj)))
    }

    /// Every object seen so far, ascending.
    pub fn seen_objects(&self) -> Vec<ObjectId> {
        self.index.lock().seen.iter().copied().collect()
    }

    /// The fragments recorded for `object_id`, sorted by block origin.
    pub fn fragments_of(&self, object_id: ObjectId) -> Result<Vec<FragmentKey>> {
        let mut keys = self
            .index
            .lock()
            .fragments
            .get(&object_id)
            .cloned()
            .unwrap_or_default();
        if keys.is_empty() {
            return Err(VolumeError::CombineMissingFragment(object_id));
        }
        keys.sort();
        Ok(keys)
    }

    pub fn fragment_count(&self) -> usize {
        self.index.lock().fragments.values().map(Vec::len).sum()
    }

    /// Path of the combined mesh of `object_id`: `{id}.combined.{ext}`.
    pub fn combined_path(&self, object_id: ObjectId, format: MeshFormat) -> PathBuf {
        self.dir
            .join(format!("{}.combined.{}", object_id, format.extension()))
    }
}
