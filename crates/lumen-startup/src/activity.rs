use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

/// Records named timing spans during platform startup.
///
/// The tracker owns an arena of span records; an [`Activity`] is a handle into
/// that arena. Timestamps are nanosecond offsets from the tracker's origin,
/// read from a monotonic clock, so `start`/`end` values are totally ordered
/// across threads.
///
/// Spans may legitimately share boundary timestamps (a split via
/// [`Activity::end_and_start`] produces `end == start` by construction), so
/// consumers reconstructing a tree must use the parent hint to break ties, not
/// the timestamps alone.
#[derive(Clone)]
pub struct ActivityTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    origin: Instant,
    spans: Mutex<Vec<SpanRecord>>,
}

struct SpanRecord {
    name: String,
    start: u64,
    end: Option<u64>,
    parent: Option<usize>,
    category: Option<String>,
    plugin_id: Option<String>,
    thread_id: thread::ThreadId,
    thread_name: String,
    description: Option<String>,
}

/// Read-only copy of one span record, as returned by
/// [`ActivityTracker::snapshot`].
#[derive(Debug, Clone)]
pub struct ActivitySpan {
    pub name: String,
    /// Nanosecond offset from the tracker origin.
    pub start: u64,
    /// Nanosecond offset from the tracker origin; `None` while the span is
    /// still open.
    pub end: Option<u64>,
    /// Arena index of the creating span. A hint for tree reconstruction, not
    /// an ownership edge.
    pub parent: Option<usize>,
    pub category: Option<String>,
    pub plugin_id: Option<String>,
    pub thread_id: thread::ThreadId,
    pub thread_name: String,
    pub description: Option<String>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                origin: Instant::now(),
                spans: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Begins a root span attributed to `plugin_id` (if any).
    pub fn start(&self, name: impl Into<String>, plugin_id: Option<&str>) -> Activity {
        self.start_record(name.into(), None, None, plugin_id.map(str::to_owned))
    }

    /// Begins a root span carrying a classification category, inherited by
    /// children created via [`Activity::start_child`].
    pub fn start_with_category(
        &self,
        name: impl Into<String>,
        category: impl Into<String>,
        plugin_id: Option<&str>,
    ) -> Activity {
        self.start_record(
            name.into(),
            None,
            Some(category.into()),
            plugin_id.map(str::to_owned),
        )
    }

    /// Copies out every span recorded so far, open ones included.
    ///
    /// Records are in creation order, which is also non-decreasing `start`
    /// order.
    pub fn snapshot(&self) -> Vec<ActivitySpan> {
        let spans = self.inner.spans.lock();
        spans
            .iter()
            .map(|record| ActivitySpan {
                name: record.name.clone(),
                start: record.start,
                end: record.end,
                parent: record.parent,
                category: record.category.clone(),
                plugin_id: record.plugin_id.clone(),
                thread_id: record.thread_id,
                thread_name: record.thread_name.clone(),
                description: record.description.clone(),
            })
            .collect()
    }

    fn now(&self) -> u64 {
        u64::try_from(self.inner.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn start_record(
        &self,
        name: String,
        parent: Option<usize>,
        category: Option<String>,
        plugin_id: Option<String>,
    ) -> Activity {
        // The clock is read under the arena lock so that arena order is also
        // start order, even with racing producer threads.
        let mut spans = self.inner.spans.lock();
        let start = self.now();
        let index = push_record(&mut spans, name, start, parent, category, plugin_id);
        Activity {
            tracker: self.clone(),
            index,
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn push_record(
    spans: &mut Vec<SpanRecord>,
    name: String,
    start: u64,
    parent: Option<usize>,
    category: Option<String>,
    plugin_id: Option<String>,
) -> usize {
    let current = thread::current();
    let index = spans.len();
    spans.push(SpanRecord {
        name,
        start,
        end: None,
        parent,
        category,
        plugin_id,
        thread_id: current.id(),
        thread_name: current.name().unwrap_or("unnamed").to_owned(),
        description: None,
    });
    index
}

/// Handle to one open (or ended) span owned by an [`ActivityTracker`].
///
/// Ending a span twice is a caller bug and panics. Callers are responsible for
/// not racing `end()` against itself on the same handle from two threads; the
/// double-end assertion runs under the tracker lock and will fire for the
/// loser.
pub struct Activity {
    tracker: ActivityTracker,
    index: usize,
}

impl Activity {
    /// Begins a child span starting now, inheriting this span's category and
    /// plugin attribution and recording this span as the parent hint.
    pub fn start_child(&self, name: impl Into<String>) -> Activity {
        let mut spans = self.tracker.inner.spans.lock();
        let start = self.tracker.now();
        let (category, plugin_id) = {
            let parent = &spans[self.index];
            (parent.category.clone(), parent.plugin_id.clone())
        };
        let index = push_record(
            &mut spans,
            name.into(),
            start,
            Some(self.index),
            category,
            plugin_id,
        );
        Activity {
            tracker: self.tracker.clone(),
            index,
        }
    }

    /// Closes the span at the current monotonic time.
    ///
    /// Panics if the span was already ended.
    pub fn end(&self) {
        let mut spans = self.tracker.inner.spans.lock();
        let end = self.tracker.now();
        let record = &mut spans[self.index];
        assert!(
            record.end.is_none(),
            "activity {:?} ended twice",
            record.name
        );
        record.end = Some(end);
    }

    /// Closes this span and opens a sibling whose `start` is exactly this
    /// span's `end`.
    ///
    /// One clock read serves both timestamps, so the sibling can neither
    /// overlap its predecessor nor leave a gap. Category, plugin attribution
    /// and the parent hint carry over.
    pub fn end_and_start(&self, name: impl Into<String>) -> Activity {
        let mut spans = self.tracker.inner.spans.lock();
        let now = self.tracker.now();
        let (parent, category, plugin_id) = {
            let record = &mut spans[self.index];
            assert!(
                record.end.is_none(),
                "activity {:?} ended twice",
                record.name
            );
            record.end = Some(now);
            (
                record.parent,
                record.category.clone(),
                record.plugin_id.clone(),
            )
        };
        let index = push_record(&mut spans, name.into(), now, parent, category, plugin_id);
        Activity {
            tracker: self.tracker.clone(),
            index,
        }
    }

    /// Attaches free-form text to the span. Allowed before or after `end`.
    pub fn set_description(&self, description: impl Into<String>) {
        let mut spans = self.tracker.inner.spans.lock();
        spans[self.index].description = Some(description.into());
    }

    pub fn name(&self) -> String {
        self.tracker.inner.spans.lock()[self.index].name.clone()
    }

    /// Nanosecond offset of the span start from the tracker origin.
    pub fn start(&self) -> u64 {
        self.tracker.inner.spans.lock()[self.index].start
    }

    /// Nanosecond offset of the span end, or `None` while still open.
    pub fn end_timestamp(&self) -> Option<u64> {
        self.tracker.inner.spans.lock()[self.index].end
    }

    pub fn category(&self) -> Option<String> {
        self.tracker.inner.spans.lock()[self.index].category.clone()
    }

    pub fn plugin_id(&self) -> Option<String> {
        self.tracker.inner.spans.lock()[self.index]
            .plugin_id
            .clone()
    }

    /// Arena index of this span, usable to match parent hints in snapshots.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_is_not_before_start() {
        let tracker = ActivityTracker::new();
        let activity = tracker.start("bootstrap", None);
        activity.end();
        assert!(activity.end_timestamp().unwrap() >= activity.start());
    }

    #[test]
    #[should_panic(expected = "ended twice")]
    fn double_end_panics() {
        let tracker = ActivityTracker::new();
        let activity = tracker.start("bootstrap", None);
        activity.end();
        activity.end();
    }

    #[test]
    fn end_and_start_shares_the_boundary_timestamp() {
        let tracker = ActivityTracker::new();
        let first = tracker.start_with_category("load components", "appInit", Some("core"));
        let second = first.end_and_start("init components");

        assert_eq!(second.start(), first.end_timestamp().unwrap());
        assert_eq!(second.category().as_deref(), Some("appInit"));
        assert_eq!(second.plugin_id().as_deref(), Some("core"));
    }

    #[test]
    #[should_panic(expected = "ended twice")]
    fn end_and_start_rejects_an_already_ended_span() {
        let tracker = ActivityTracker::new();
        let activity = tracker.start("bootstrap", None);
        activity.end();
        let _ = activity.end_and_start("next");
    }

    #[test]
    fn child_inherits_attribution_and_records_parent_hint() {
        let tracker = ActivityTracker::new();
        let parent = tracker.start_with_category("open project", "project", Some("vcs"));
        let child = parent.start_child("load modules");
        child.end();
        parent.end();

        let spans = tracker.snapshot();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].parent, Some(parent.index()));
        assert_eq!(spans[1].category.as_deref(), Some("project"));
        assert_eq!(spans[1].plugin_id.as_deref(), Some("vcs"));
        assert!(spans[1].start >= spans[0].start);
    }

    #[test]
    fn description_is_settable_after_end() {
        let tracker = ActivityTracker::new();
        let activity = tracker.start("indexing", None);
        activity.end();
        activity.set_description("4021 files");

        let spans = tracker.snapshot();
        assert_eq!(spans[0].description.as_deref(), Some("4021 files"));
    }

    #[test]
    fn spans_can_be_ended_on_another_thread() {
        let tracker = ActivityTracker::new();
        let activity = tracker.start("background warmup", None);

        thread::spawn(move || activity.end()).join().unwrap();

        let spans = tracker.snapshot();
        assert!(spans[0].end.is_some());
    }

    #[test]
    fn concurrent_starts_keep_the_arena_start_ordered() {
        let tracker = ActivityTracker::new();
        let mut workers = Vec::new();
        for worker in 0..4 {
            let tracker = tracker.clone();
            workers.push(thread::spawn(move || {
                for i in 0..64 {
                    tracker.start(format!("w{worker}-{i}"), None).end();
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let spans = tracker.snapshot();
        assert_eq!(spans.len(), 4 * 64);
        for pair in spans.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn snapshot_is_in_non_decreasing_start_order() {
        let tracker = ActivityTracker::new();
        let a = tracker.start("a", None);
        let b = a.start_child("b");
        b.end();
        let c = a.end_and_start("c");
        c.end();

        let spans = tracker.snapshot();
        for pair in spans.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }
}
