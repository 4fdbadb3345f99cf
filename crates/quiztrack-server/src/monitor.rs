use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use quiztrack_core::event::{EventKind, SaveStatus};

/// One accepted tracking call as seen by the debug monitor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEntry {
    pub event: EventKind,
    pub quiz_id: String,
    pub site: String,
    pub utm_campaign: Option<String>,
    pub session_id: Option<String>,
    pub saved: SaveStatus,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuizTally {
    pub views: i64,
    pub completes: i64,
}

/// Bounded in-memory ring buffer of recent tracking calls.
///
/// Held in `AppState` rather than a process global so tests get a fresh
/// buffer per app. When full, the oldest entry is evicted.
pub struct EventMonitor {
    capacity: usize,
    entries: Mutex<VecDeque<MonitorEntry>>,
}

impl EventMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, entry: MonitorEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Newest first.
    pub async fn recent(&self) -> Vec<MonitorEntry> {
        self.entries.lock().await.iter().rev().cloned().collect()
    }
}

/// Per-quiz counts over a monitor snapshot.
pub fn summarize(entries: &[MonitorEntry]) -> BTreeMap<String, QuizTally> {
    let mut summary: BTreeMap<String, QuizTally> = BTreeMap::new();
    for entry in entries {
        let tally = summary.entry(entry.quiz_id.clone()).or_default();
        match entry.event {
            EventKind::View => tally.views += 1,
            EventKind::Complete => tally.completes += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(quiz_id: &str, event: EventKind) -> MonitorEntry {
        MonitorEntry {
            event,
            quiz_id: quiz_id.to_string(),
            site: "x.com".to_string(),
            utm_campaign: None,
            session_id: None,
            saved: SaveStatus::Stored,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let monitor = EventMonitor::new(3);
        for quiz in ["a", "b", "c", "d"] {
            monitor.push(entry(quiz, EventKind::View)).await;
        }
        let recent = monitor.recent().await;
        let ids: Vec<&str> = recent.iter().map(|e| e.quiz_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "b"]);
        assert_eq!(monitor.len().await, 3);
    }

    #[tokio::test]
    async fn zero_capacity_keeps_nothing() {
        let monitor = EventMonitor::new(0);
        monitor.push(entry("a", EventKind::View)).await;
        assert!(monitor.is_empty().await);
    }

    #[test]
    fn summary_counts_per_quiz() {
        let entries = vec![
            entry("a", EventKind::View),
            entry("a", EventKind::View),
            entry("a", EventKind::Complete),
            entry("b", EventKind::View),
        ];
        let summary = summarize(&entries);
        assert_eq!(summary["a"], QuizTally { views: 2, completes: 1 });
        assert_eq!(summary["b"], QuizTally { views: 1, completes: 0 });
    }
}
