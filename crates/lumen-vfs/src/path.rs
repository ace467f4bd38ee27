use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A path that can be resolved by the VFS.
///
/// Local paths are lexically normalized on construction so the same file
/// always interns to the same [`crate::FileId`] regardless of how the caller
/// spelled the path. Normalization never hits the filesystem and does not
/// resolve symlinks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VfsPath {
    /// A file on the local OS file system.
    Local(PathBuf),
    /// A URI an external implementation can resolve (remote schemes, editor
    /// scratch buffers, and the like).
    Uri(String),
}

impl VfsPath {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::Local(normalize_local_path(&path))
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    pub fn as_local_path(&self) -> Option<&Path> {
        match self {
            VfsPath::Local(path) => Some(path),
            VfsPath::Uri(_) => None,
        }
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsPath::Local(path) => write!(f, "{}", path.display()),
            VfsPath::Uri(uri) => f.write_str(uri),
        }
    }
}

/// Lexically normalizes a local path: drops `.` components and resolves `..`
/// against a preceding normal component.
fn normalize_local_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let resolvable = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if resolvable {
                    normalized.pop();
                } else {
                    normalized.push(Component::ParentDir);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
