use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::activity::ActivitySpan;

/// JSON-exportable form of a startup trace, for offline analysis and the
/// perf-regression pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupTraceReport {
    pub spans: Vec<TraceSpanEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpanEntry {
    pub name: String,
    pub start_ns: u64,
    pub end_ns: Option<u64>,
    /// Index into `spans` of the creating span, after sorting.
    pub parent: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plugin_id: Option<String>,
    pub thread: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

impl StartupTraceReport {
    /// Builds a report from a tracker snapshot.
    ///
    /// Spans are sorted by `(start, end)`, open spans last among equal starts;
    /// parent hints are remapped to the sorted positions.
    pub fn from_snapshot(snapshot: &[ActivitySpan]) -> Self {
        let mut order: Vec<usize> = (0..snapshot.len()).collect();
        order.sort_by_key(|&index| {
            let span = &snapshot[index];
            (span.start, span.end.unwrap_or(u64::MAX))
        });

        let mut new_position = vec![0_usize; snapshot.len()];
        for (position, &old_index) in order.iter().enumerate() {
            new_position[old_index] = position;
        }

        let spans = order
            .iter()
            .map(|&old_index| {
                let span = &snapshot[old_index];
                TraceSpanEntry {
                    name: span.name.clone(),
                    start_ns: span.start,
                    end_ns: span.end,
                    parent: span.parent.map(|parent| new_position[parent]),
                    category: span.category.clone(),
                    plugin_id: span.plugin_id.clone(),
                    thread: format!("{} ({:?})", span.thread_name, span.thread_id),
                    description: span.description.clone(),
                }
            })
            .collect();

        Self { spans }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serializing startup trace report")
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("writing startup trace report to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityTracker;

    #[test]
    fn report_preserves_parent_hints_across_sorting() {
        let tracker = ActivityTracker::new();
        let root = tracker.start_with_category("open project", "project", None);
        let child = root.start_child("load modules");
        child.end();
        let sibling = root.end_and_start("restore editors");
        sibling.end();

        let report = StartupTraceReport::from_snapshot(&tracker.snapshot());
        assert_eq!(report.spans.len(), 3);

        let root_position = report
            .spans
            .iter()
            .position(|span| span.name == "open project")
            .unwrap();
        let child_entry = report
            .spans
            .iter()
            .find(|span| span.name == "load modules")
            .unwrap();
        assert_eq!(child_entry.parent, Some(root_position));
        assert_eq!(child_entry.category.as_deref(), Some("project"));

        for pair in report.spans.windows(2) {
            assert!(pair[0].start_ns <= pair[1].start_ns);
        }
    }

    #[test]
    fn report_round_trips_through_json() {
        let tracker = ActivityTracker::new();
        let activity = tracker.start("bootstrap", Some("core"));
        activity.set_description("cold start");
        activity.end();

        let report = StartupTraceReport::from_snapshot(&tracker.snapshot());
        let json = report.to_json().unwrap();
        let parsed: StartupTraceReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn report_is_written_to_disk() {
        let tracker = ActivityTracker::new();
        tracker.start("bootstrap", None).end();
        let report = StartupTraceReport::from_snapshot(&tracker.snapshot());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("startup-trace.json");
        report.write_json(&path).unwrap();

        let parsed: StartupTraceReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, report);
    }
}
