use std::collections::HashMap;

use lumen_core::FileId;

use crate::path::VfsPath;

/// Interns paths to stable [`FileId`]s and tracks where each id currently
/// lives.
///
/// The registry is the canonicalization point: local paths are lexically
/// normalized before every lookup, so two spellings of the same file intern
/// to one id even when a caller builds [`VfsPath::Local`] by hand instead of
/// going through [`VfsPath::local`].
///
/// Ids follow a file's identity, not its spelling. A rename keeps the id and
/// remaps it to the new location; a removed file's id is retired and never
/// reused, so a later file at the same path is a different file to consumers
/// holding old ids.
#[derive(Debug, Default)]
pub struct FileIdRegistry {
    path_to_id: HashMap<VfsPath, FileId>,
    // Indexed by raw id. `None` once the file was removed or overwritten.
    locations: Vec<Option<VfsPath>>,
}

impl FileIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stable id for `path`, allocating one if the path has never
    /// been seen.
    pub fn file_id(&mut self, path: VfsPath) -> FileId {
        let path = canonical(path);
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }

        let raw = u32::try_from(self.locations.len()).expect("file id space exhausted");
        let id = FileId::from_raw(raw);
        self.locations.push(Some(path.clone()));
        self.path_to_id.insert(path, id);
        id
    }

    /// Returns the id for `path` without allocating.
    pub fn get_id(&self, path: &VfsPath) -> Option<FileId> {
        self.path_to_id.get(&canonical(path.clone())).copied()
    }

    /// Returns the current location of `id`, or `None` once the file was
    /// removed.
    pub fn get_path(&self, id: FileId) -> Option<&VfsPath> {
        self.locations.get(id.to_raw() as usize)?.as_ref()
    }

    /// Remaps an interned file to a new location, keeping its id.
    ///
    /// A file already interned at `to` is overwritten by the move and its id
    /// is retired. Returns `None` when `from` was never interned; callers
    /// typically fall back to interning `to` as a fresh file.
    pub fn rename(&mut self, from: &VfsPath, to: VfsPath) -> Option<FileId> {
        let from = canonical(from.clone());
        let id = self.path_to_id.remove(&from)?;

        let to = canonical(to);
        if let Some(overwritten) = self.path_to_id.insert(to.clone(), id) {
            self.locations[overwritten.to_raw() as usize] = None;
        }
        self.locations[id.to_raw() as usize] = Some(to);
        Some(id)
    }

    /// Forgets `path`, retiring its id.
    ///
    /// Returns the retired id so consumers can drop the corresponding node;
    /// `None` when the path was never interned.
    pub fn remove(&mut self, path: &VfsPath) -> Option<FileId> {
        let path = canonical(path.clone());
        let id = self.path_to_id.remove(&path)?;
        self.locations[id.to_raw() as usize] = None;
        Some(id)
    }
}

fn canonical(path: VfsPath) -> VfsPath {
    match path {
        VfsPath::Local(raw) => VfsPath::local(raw),
        uri @ VfsPath::Uri(_) => uri,
    }
}
