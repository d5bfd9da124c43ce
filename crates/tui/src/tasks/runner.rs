//! Background tasks with exactly-once completion delivery.
//!
//! Every [`TaskRunner::run`] bumps the generation of its slot and returns a [`Ticket`].
//! The task's outcome always comes back as one `UiUpdate::Completed`, including when the
//! work panics. Earlier tasks in the same slot are not cancelled; the UI thread asks
//! [`TaskRunner::is_current`] and drops what is stale.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tracing::{debug, error};

use runboard_api::{ApiError, ApiResult};

use crate::model::{Payload, UiUpdate, UpdateSink};

/// Logical owner of a task's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The first load behind the curtain.
    Startup,
    /// Whatever the visible page shows (lists and dashboards).
    Foreground,
    /// Scale and execute.
    Mutation,
    /// The project picker's list.
    Projects,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Startup => "startup",
            Slot::Foreground => "foreground",
            Slot::Mutation => "mutation",
            Slot::Projects => "projects",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub slot: Slot,
    pub generation: u64,
}

pub struct TaskRunner {
    sink: Arc<dyn UpdateSink>,
    handle: Handle,
    generations: HashMap<Slot, u64>,
}

impl TaskRunner {
    /// Must be created inside a tokio runtime; tasks are spawned onto it.
    pub fn new(sink: Arc<dyn UpdateSink>) -> Self {
        Self { sink, handle: Handle::current(), generations: HashMap::new() }
    }

    pub fn run<F>(&mut self, slot: Slot, work: F) -> Ticket
    where
        F: Future<Output = ApiResult<Payload>> + Send + 'static,
    {
        let generation = self.generations.entry(slot).or_insert(0);
        *generation += 1;
        let ticket = Ticket { slot, generation: *generation };
        debug!(slot = slot.as_str(), generation = ticket.generation, "task: start");
        let sink = self.sink.clone();
        let handle = self.handle.clone();
        self.handle.spawn(async move {
            let started = Instant::now();
            let outcome = match handle.spawn(work).await {
                Ok(res) => res.map_err(|e| e.to_string()),
                Err(join_err) => {
                    let msg = panic_message(join_err);
                    error!(slot = slot.as_str(), "task crashed: {msg}");
                    Err(format!("{} task crashed: {msg}", slot.as_str()))
                }
            };
            let label = if outcome.is_ok() { "ok" } else { "error" };
            counter!("tasks_completed_total", 1u64, "slot" => slot.as_str(), "outcome" => label);
            histogram!("task_duration_ms", started.elapsed().as_millis() as f64);
            sink.send(UiUpdate::Completed { ticket, outcome });
        });
        ticket
    }

    /// Like [`run`](Self::run), failing with `ApiError::Timeout` after `limit`.
    pub fn run_with_timeout<F>(&mut self, slot: Slot, limit: Duration, work: F) -> Ticket
    where
        F: Future<Output = ApiResult<Payload>> + Send + 'static,
    {
        self.run(slot, async move {
            match tokio::time::timeout(limit, work).await {
                Ok(res) => res,
                Err(_) => Err(ApiError::Timeout(limit)),
            }
        })
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.generations.get(&ticket.slot).copied() == Some(ticket.generation)
    }
}

fn panic_message(join_err: JoinError) -> String {
    if !join_err.is_panic() {
        return "task cancelled".to_string();
    }
    match join_err.into_panic().downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&str>() {
            Ok(s) => s.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordingSink;

    async fn completions(sink: &RecordingSink, n: usize) -> Vec<(Ticket, Result<Payload, String>)> {
        let mut out = Vec::new();
        for _ in 0..200 {
            for u in sink.drain() {
                if let UiUpdate::Completed { ticket, outcome } = u {
                    out.push((ticket, outcome));
                }
            }
            if out.len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        out
    }

    #[tokio::test]
    async fn one_completion_per_run_and_generations_advance() {
        let sink = Arc::new(RecordingSink::new());
        let mut runner = TaskRunner::new(sink.clone());
        let first = runner.run(Slot::Foreground, async { Ok(Payload::Services(Vec::new())) });
        let second = runner.run(Slot::Foreground, async { Err(ApiError::NotFound("x".into())) });
        assert_eq!((first.generation, second.generation), (1, 2));
        assert!(!runner.is_current(&first));
        assert!(runner.is_current(&second));

        let got = completions(&sink, 2).await;
        assert_eq!(got.len(), 2);
        let failed = got.iter().find(|(t, _)| *t == second).map(|(_, o)| o.as_ref().err().cloned());
        assert_eq!(failed, Some(Some("not_found: x".to_string())));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn slots_are_independent() {
        let sink = Arc::new(RecordingSink::new());
        let mut runner = TaskRunner::new(sink);
        let a = runner.run(Slot::Foreground, async { Ok(Payload::Jobs(Vec::new())) });
        let b = runner.run(Slot::Mutation, async { Ok(Payload::Jobs(Vec::new())) });
        assert!(runner.is_current(&a));
        assert!(runner.is_current(&b));
    }

    #[tokio::test]
    async fn panic_still_completes_once() {
        let sink = Arc::new(RecordingSink::new());
        let mut runner = TaskRunner::new(sink.clone());
        runner.run(Slot::Mutation, async {
            if true {
                panic!("boom");
            }
            Ok(Payload::Jobs(Vec::new()))
        });
        let got = completions(&sink, 1).await;
        assert_eq!(got.len(), 1);
        let err = got[0].1.as_ref().err().cloned().unwrap_or_default();
        assert!(err.contains("boom"), "{err}");
    }

    #[tokio::test]
    async fn mutation_timeout() {
        let sink = Arc::new(RecordingSink::new());
        let mut runner = TaskRunner::new(sink.clone());
        runner.run_with_timeout(Slot::Mutation, Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Payload::Jobs(Vec::new()))
        });
        let got = completions(&sink, 1).await;
        let err = got[0].1.as_ref().err().cloned().unwrap_or_default();
        assert!(err.starts_with("timed out"), "{err}");
    }
}
