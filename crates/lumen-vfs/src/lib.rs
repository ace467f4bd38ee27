//! Virtual file system change model for Lumen.
//!
//! This crate owns:
//! - Representing file change events ([`FileChange`], [`ChangeEvent`]) in a
//!   backend-neutral form.
//! - Stable [`FileId`] allocation and reverse mapping ([`FileIdRegistry`]).
//! - Turning bursts of change notifications into calm, batched tree updates
//!   ([`FileNodeUpdater`]).
//!
//! OS watcher integration is deliberately out of scope here; whatever produces
//! events is expected to feed them in through [`FileNodeUpdater::apply_event`]
//! or the finer-grained `update_from_*` entry points.

mod change;
mod file_id;
mod path;
mod updater;

pub use change::{ChangeEvent, FileChange, FileChangeKind, HasBackingFile};
pub use file_id::FileIdRegistry;
pub use lumen_core::FileId;
pub use path::VfsPath;
pub use updater::{FileNodeUpdater, UpdateBatch, UpdaterConfig};
