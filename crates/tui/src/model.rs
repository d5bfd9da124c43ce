#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{mpsc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use runboard_core::{DomainMapping, Execution, Job, Project, Revision, Service, WorkerPool};
use runboard_ops::CancelHandle;

use crate::tasks::Ticket;

/// Everything a background task or the indicator hands to the UI thread.
#[derive(Debug)]
pub enum UiUpdate {
    /// Exactly one per task run.
    Completed { ticket: Ticket, outcome: Result<Payload, String> },
    Indicator(Paint),
    LogLine { tail: u64, line: String },
    LogFailed { tail: u64, error: String },
    LogEnded { tail: u64 },
}

/// Successful task results.
#[derive(Debug)]
pub enum Payload {
    Startup { projects: Result<Vec<Project>, String>, services: Vec<Service> },
    Projects(Vec<Project>),
    Services(Vec<Service>),
    ServiceDetail { service: Service, revisions: Vec<Revision> },
    Jobs(Vec<Job>),
    JobDetail { job: Job, executions: Vec<Execution> },
    WorkerPools(Vec<WorkerPool>),
    DomainMappings(Vec<DomainMapping>),
    ServiceScaled(Service),
    WorkerPoolScaled(WorkerPool),
    JobExecuted(Execution),
}

/// What the indicator asks the UI thread to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paint {
    Frame { text: String, context: Option<String> },
    Final(String),
    Clear,
}

/// The single hand-off from any thread onto the UI thread.
pub trait UpdateSink: Send + Sync {
    fn send(&self, update: UiUpdate);
}

/// Production sink: the terminal loop drains the receiving end.
pub struct ChannelSink(Mutex<mpsc::Sender<UiUpdate>>);

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<UiUpdate>) -> Self {
        Self(Mutex::new(tx))
    }
}

impl UpdateSink for ChannelSink {
    fn send(&self, update: UiUpdate) {
        let tx = self.0.lock().unwrap_or_else(|p| p.into_inner());
        // receiver gone means the UI is shutting down
        let _ = tx.send(update);
    }
}

/// Keeps every update so a test can apply them when it chooses.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<UiUpdate>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything recorded so far, oldest first.
    pub fn drain(&self) -> Vec<UiUpdate> {
        std::mem::take(&mut *self.updates.lock().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.updates.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UpdateSink for RecordingSink {
    fn send(&self, update: UiUpdate) {
        self.updates.lock().unwrap_or_else(|p| p.into_inner()).push(update);
    }
}

/// Rows of one list page plus the selected index.
#[derive(Debug, Clone)]
pub struct Table<T> {
    pub rows: Vec<T>,
    pub selected: usize,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { rows: Vec::new(), selected: 0 }
    }
}

impl<T> Table<T> {
    pub fn selected_row(&self) -> Option<&T> {
        self.rows.get(self.selected)
    }

    pub fn next(&mut self) {
        if !self.rows.is_empty() {
            self.selected = (self.selected + 1).min(self.rows.len() - 1);
        }
    }

    pub fn prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Swap in fresh rows, keeping the selection on the row `same` matches when possible.
    pub fn replace(&mut self, rows: Vec<T>, same: impl Fn(&T, &T) -> bool) {
        let keep = self.rows.get(self.selected).and_then(|old| rows.iter().position(|r| same(old, r)));
        self.rows = rows;
        self.selected = keep.unwrap_or(0).min(self.rows.len().saturating_sub(1));
    }
}

/// The log modal's live state. Dropping it cancels the tail.
pub struct LogsState {
    pub tail: u64,
    pub title: String,
    pub lines: VecDeque<String>,
    pub cap: usize,
    pub failed: Option<String>,
    pub ended: bool,
    pub last_timestamp: watch::Receiver<Option<DateTime<Utc>>>,
    pub cancel: Option<CancelHandle>,
}

impl LogsState {
    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Modal title: the workload, when the newest entry arrived, and whether the tail ended.
    pub fn heading(&self) -> String {
        let mut title = format!(" {} ", self.title);
        if let Some(ts) = *self.last_timestamp.borrow() {
            title.push_str(&format!("last {} ", ts.format("%H:%M:%S")));
        }
        if self.ended {
            title.push_str("(ended) ");
        }
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_keeps_selection_by_identity() {
        let mut t = Table { rows: vec!["a", "b", "c"], selected: 1 };
        t.replace(vec!["x", "b"], |a, b| a == b);
        assert_eq!(t.selected_row(), Some(&"b"));
        t.replace(vec!["y"], |a, b| a == b);
        assert_eq!(t.selected, 0);
        t.replace(Vec::new(), |a, b| a == b);
        assert_eq!(t.selected_row(), None);
    }

    #[test]
    fn table_navigation_clamps() {
        let mut t = Table { rows: vec![1, 2], selected: 0 };
        t.prev();
        assert_eq!(t.selected, 0);
        t.next();
        t.next();
        assert_eq!(t.selected, 1);
    }

    #[test]
    fn logs_heading_shows_newest_entry_time() {
        use chrono::TimeZone;
        let (tx, rx) = watch::channel(None);
        let mut logs = LogsState {
            tail: 1,
            title: "Logs: api (eu)".into(),
            lines: VecDeque::new(),
            cap: 10,
            failed: None,
            ended: false,
            last_timestamp: rx,
            cancel: None,
        };
        assert_eq!(logs.heading(), " Logs: api (eu) ");
        tx.send_replace(Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 2).unwrap()));
        logs.ended = true;
        assert_eq!(logs.heading(), " Logs: api (eu) last 09:30:02 (ended) ");
    }

    #[test]
    fn recording_sink_drains_in_order() {
        let sink = RecordingSink::new();
        sink.send(UiUpdate::LogEnded { tail: 1 });
        sink.send(UiUpdate::LogEnded { tail: 2 });
        assert_eq!(sink.len(), 2);
        let got: Vec<u64> = sink
            .drain()
            .into_iter()
            .map(|u| match u {
                UiUpdate::LogEnded { tail } => tail,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(got, vec![1, 2]);
        assert!(sink.is_empty());
    }
}
