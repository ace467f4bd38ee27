use lumen_core::FileId;

use crate::path::VfsPath;

/// What happened to a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
    /// The file now lives at the change's `path`; `from` is where it was.
    Moved { from: VfsPath },
}

/// A normalized change to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub path: VfsPath,
    pub kind: FileChangeKind,
}

impl FileChange {
    /// Every path touched by this change. For moves this includes both the
    /// old and the new location.
    pub fn paths(&self) -> impl Iterator<Item = &VfsPath> {
        let moved_from = match &self.kind {
            FileChangeKind::Moved { from } => Some(from),
            _ => None,
        };
        std::iter::once(&self.path).chain(moved_from)
    }
}

/// A change notification delivered by the VFS to tree consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Content roots changed; the whole tree must be treated as invalid.
    /// No itemized file list accompanies this.
    RootsChanged,
    /// One or more itemized file changes.
    Files(Vec<FileChange>),
}

/// A structural element (a syntax node, a tree node, an editor document) that
/// may be backed by a file.
///
/// This is the seam [`crate::FileNodeUpdater::update_from_element`] consumes:
/// elements without a backing file (synthetic nodes, in-memory fragments) are
/// simply not interesting to a file tree.
pub trait HasBackingFile {
    fn backing_file(&self) -> Option<FileId>;
}
