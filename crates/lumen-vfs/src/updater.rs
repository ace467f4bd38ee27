//! Debounced coalescing of file change notifications.
//!
//! File trees are expensive to refresh and change notifications arrive in
//! bursts (branch switches, build output churn). [`FileNodeUpdater`]
//! accumulates notifications into a single pending batch and hands the batch
//! to its consumer only once no further changes have arrived for a full delay
//! window, or when a caller demands an immediate flush.
//!
//! All consumer callbacks run on a single [`Invoker`], so the update callback
//! never races itself and root/itemized dispatches arrive in call order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use lumen_core::FileId;
use lumen_scheduler::Invoker;

use crate::change::{ChangeEvent, FileChange, FileChangeKind, HasBackingFile};
use crate::file_id::FileIdRegistry;

/// Tuning knobs for [`FileNodeUpdater`].
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Quiet period that must elapse with no new changes before a batch is
    /// dispatched. Defaults to 10 ms; `LUMEN_FILE_NODE_UPDATER_DELAY_MS`
    /// overrides it.
    pub delay: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let delay_ms = std::env::var("LUMEN_FILE_NODE_UPDATER_DELAY_MS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(10);
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// A finalized batch of coalesced changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateBatch {
    /// Full-tree invalidation. When set, the itemized set is advisory only
    /// and consumers should rebuild from the roots.
    pub from_root: bool,
    /// Distinct files touched since the previous dispatch.
    pub files: HashSet<FileId>,
}

struct PendingBatch {
    files: HashSet<FileId>,
    from_root: bool,
    /// Set size recorded when the deferred check was (re)scheduled; growth
    /// past it means more changes arrived during the wait.
    watermark: usize,
    opened_at: Instant,
}

impl PendingBatch {
    fn new() -> Self {
        Self {
            files: HashSet::new(),
            from_root: false,
            watermark: 0,
            opened_at: Instant::now(),
        }
    }
}

/// Coalesces file change notifications into debounced batch updates.
///
/// Producers may call the `update_from_*` methods from any thread. The
/// `on_update` callback supplied at construction receives each finalized
/// [`UpdateBatch`] on the invoker thread.
#[derive(Clone)]
pub struct FileNodeUpdater {
    inner: Arc<UpdaterInner>,
}

struct UpdaterInner {
    invoker: Invoker,
    delay: Duration,
    on_update: Box<dyn Fn(UpdateBatch) + Send + Sync>,
    pending: Mutex<Option<PendingBatch>>,
}

impl FileNodeUpdater {
    pub fn new(
        invoker: Invoker,
        config: UpdaterConfig,
        on_update: impl Fn(UpdateBatch) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(UpdaterInner {
                invoker,
                delay: config.delay,
                on_update: Box::new(on_update),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Marks the pending batch as a full-tree invalidation.
    pub fn update_from_root(&self) {
        self.update(None, true);
    }

    /// Adds one file to the pending batch.
    pub fn update_from_file(&self, file: FileId) {
        self.update(Some(file), false);
    }

    /// Resolves a structural element to its backing file and records it.
    /// Elements without a backing file are ignored.
    pub fn update_from_element(&self, element: &dyn HasBackingFile) {
        if let Some(file) = element.backing_file() {
            self.update_from_file(file);
        }
    }

    /// Records the file touched by a normalized change, keeping the
    /// registry's id mappings in step with the change kind: a move keeps the
    /// file's id and remaps it to the new location, a deletion retires the id
    /// (the dispatch still carries it so consumers can drop the node), and a
    /// deletion of a file the registry never saw has no node to drop and is
    /// ignored.
    pub fn update_from_change(&self, change: &FileChange, registry: &mut FileIdRegistry) {
        match &change.kind {
            FileChangeKind::Created | FileChangeKind::Modified => {
                self.update_from_file(registry.file_id(change.path.clone()));
            }
            FileChangeKind::Deleted => {
                if let Some(id) = registry.remove(&change.path) {
                    self.update_from_file(id);
                }
            }
            FileChangeKind::Moved { from } => {
                let id = registry
                    .rename(from, change.path.clone())
                    .unwrap_or_else(|| registry.file_id(change.path.clone()));
                self.update_from_file(id);
            }
        }
    }

    /// Feeds a whole change event through the coalescer.
    pub fn apply_event(&self, event: &ChangeEvent, registry: &mut FileIdRegistry) {
        match event {
            ChangeEvent::RootsChanged => self.update_from_root(),
            ChangeEvent::Files(changes) => {
                for change in changes {
                    self.update_from_change(change, registry);
                }
            }
        }
    }

    /// Flushes whatever is pending right now, bypassing the debounce wait.
    ///
    /// `on_done` runs on the invoker after the update callback returns. When
    /// nothing is pending the callback still receives an empty batch, so
    /// "`on_update` before `on_done`" holds unconditionally.
    pub fn update_immediately(&self, on_done: impl FnOnce() + Send + 'static) {
        let this = self.clone();
        self.inner
            .invoker
            .run_or_invoke_later(move || this.check(true, Some(Box::new(on_done))));
    }

    fn update(&self, file: Option<FileId>, from_root: bool) {
        let newly_opened = {
            let mut pending = self.inner.pending.lock();
            let newly_opened = pending.is_none();
            let batch = pending.get_or_insert_with(PendingBatch::new);
            if from_root {
                batch.from_root = true;
            } else if let Some(file) = file {
                batch.files.insert(file);
            }
            if newly_opened {
                batch.watermark = batch.files.len();
            }
            newly_opened
        };

        if newly_opened {
            self.schedule_check();
        }
    }

    fn schedule_check(&self) {
        let this = self.clone();
        self.inner
            .invoker
            .spawn_after(self.inner.delay, move || this.check(false, None));
    }

    /// Runs on the invoker. Decides whether the pending batch is quiet enough
    /// to dispatch, must keep waiting, or was already flushed.
    fn check(&self, now: bool, on_done: Option<Box<dyn FnOnce() + Send>>) {
        let mut reschedule = false;
        let batch = {
            let mut pending = self.inner.pending.lock();
            match pending.take() {
                // Nothing pending: an immediate flush still dispatches an
                // empty batch; a deferred check was simply superseded by a
                // concurrent flush and detects that here.
                None => now.then(|| UpdateBatch {
                    from_root: false,
                    files: HashSet::new(),
                }),
                Some(mut open) => {
                    if open.from_root || now || open.watermark == open.files.len() {
                        tracing::debug!(
                            target = "lumen.vfs",
                            from_root = open.from_root,
                            files = open.files.len(),
                            forced = now,
                            waited_ms = open.opened_at.elapsed().as_millis() as u64,
                            "dispatching coalesced file changes"
                        );
                        Some(UpdateBatch {
                            from_root: open.from_root,
                            files: open.files,
                        })
                    } else {
                        // Grew during the wait: keep the batch open and check
                        // again after another full delay window.
                        open.watermark = open.files.len();
                        *pending = Some(open);
                        reschedule = true;
                        None
                    }
                }
            }
        };

        if reschedule {
            self.schedule_check();
        }
        if let Some(batch) = batch {
            (self.inner.on_update)(batch);
        }
        if let Some(on_done) = on_done {
            on_done();
        }
    }
}
