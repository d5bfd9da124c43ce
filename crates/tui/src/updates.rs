#![forbid(unsafe_code)]

use std::sync::mpsc;

use metrics::counter;
use tracing::{debug, info, warn};

use runboard_core::region::Regional;

use crate::model::{Paint, Payload, UiUpdate};
use crate::nav::{ModalId, PageId};
use crate::picker::Picker;
use crate::tasks::{Slot, Ticket};
use crate::App;

/// Drain queued updates onto the app (bounded per frame).
pub fn process_updates(app: &mut App, rx: &mpsc::Receiver<UiUpdate>) -> usize {
    let mut processed = 0usize;
    while processed < 256 {
        match rx.try_recv() {
            Ok(u) => {
                app.apply_update(u);
                processed += 1;
            }
            Err(_) => break,
        }
    }
    processed
}

fn by_name_then_region<T: Regional>(rows: &mut [T]) {
    rows.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.region().cmp(b.region())));
}

fn same<T: Regional>(a: &T, b: &T) -> bool {
    a.name() == b.name() && a.region() == b.region()
}

impl App {
    /// Apply one update on the UI thread.
    pub fn apply_update(&mut self, update: UiUpdate) {
        match update {
            UiUpdate::Completed { ticket, outcome } => self.on_completed(ticket, outcome),
            UiUpdate::Indicator(paint) => match paint {
                Paint::Frame { text, context } => {
                    self.status = Some(text);
                    self.status_context = context;
                }
                Paint::Final(msg) => {
                    self.status = None;
                    self.status_context = None;
                    self.notice = Some(msg);
                }
                Paint::Clear => {
                    self.status = None;
                    self.status_context = None;
                }
            },
            UiUpdate::LogLine { tail, line } => {
                if let Some(logs) = self.logs.as_mut().filter(|l| l.tail == tail) {
                    logs.push(line);
                }
            }
            UiUpdate::LogFailed { tail, error } => {
                if let Some(logs) = self.logs.as_mut().filter(|l| l.tail == tail) {
                    logs.failed = Some(error);
                }
            }
            UiUpdate::LogEnded { tail } => {
                if let Some(logs) = self.logs.as_mut().filter(|l| l.tail == tail) {
                    logs.ended = true;
                }
            }
        }
    }

    fn on_completed(&mut self, ticket: Ticket, outcome: Result<Payload, String>) {
        if !self.runner.is_current(&ticket) {
            counter!("tasks_stale_total", 1u64, "slot" => ticket.slot.as_str());
            debug!(slot = ticket.slot.as_str(), generation = ticket.generation, "task: stale completion dropped");
            return;
        }
        self.pending.remove(&ticket.slot);
        let done_msg = match &outcome {
            Ok(Payload::JobExecuted(e)) => format!("Execution {} started", e.name),
            Ok(Payload::ServiceScaled(s)) => format!("Scaled {} ({})", s.name, s.scaling.summary()),
            Ok(Payload::WorkerPoolScaled(p)) => format!("Scaled {} to {}", p.name, p.manual_instances.unwrap_or(0)),
            _ => String::new(),
        };
        if self.pending.is_empty() {
            self.indicator.stop(&done_msg);
        } else if !done_msg.is_empty() {
            self.notice = Some(done_msg);
        }
        match outcome {
            Ok(payload) => self.on_payload(payload),
            Err(e) => self.on_failed(ticket.slot, e),
        }
    }

    fn on_failed(&mut self, slot: Slot, error: String) {
        warn!(slot = slot.as_str(), %error, "task failed");
        match slot {
            Slot::Startup => {
                self.nav.switch_to(PageId::Services);
                self.last_error = Some(error);
            }
            // Only the form that submitted the mutation takes its error.
            Slot::Mutation => {
                if let Some(form) = self.service_form.as_mut().filter(|f| f.submitting) {
                    form.submitting = false;
                    form.error = Some(error);
                } else if let Some(form) = self.pool_form.as_mut().filter(|f| f.submitting) {
                    form.submitting = false;
                    form.error = Some(error);
                } else {
                    self.last_error = Some(error);
                }
            }
            Slot::Foreground | Slot::Projects => self.last_error = Some(error),
        }
    }

    fn on_payload(&mut self, payload: Payload) {
        match payload {
            Payload::Startup { projects, mut services } => {
                match projects {
                    Ok(p) => self.projects = p,
                    Err(e) => self.last_error = Some(format!("loading projects: {e}")),
                }
                by_name_then_region(&mut services);
                info!(services = services.len(), projects = self.projects.len(), "startup: loaded");
                self.services.replace(services, same);
                self.nav.switch_to(PageId::Services);
            }
            Payload::Projects(rows) => {
                self.projects = rows;
                if self.nav.modal() == Some(ModalId::Projects) {
                    let query = std::mem::take(&mut self.picker.query);
                    self.picker = Picker::projects(&self.projects);
                    self.picker.query = query;
                }
            }
            Payload::Services(mut rows) => {
                by_name_then_region(&mut rows);
                self.services.replace(rows, same);
            }
            Payload::ServiceDetail { service, revisions } => {
                self.service_focus = Some(service);
                self.revisions.replace(revisions, |a, b| a.name == b.name);
            }
            Payload::Jobs(mut rows) => {
                by_name_then_region(&mut rows);
                self.jobs.replace(rows, same);
            }
            Payload::JobDetail { job, executions } => {
                self.job_focus = Some(job);
                self.executions.replace(executions, |a, b| a.name == b.name);
            }
            Payload::WorkerPools(mut rows) => {
                by_name_then_region(&mut rows);
                self.worker_pools.replace(rows, same);
            }
            Payload::DomainMappings(mut rows) => {
                by_name_then_region(&mut rows);
                self.domain_mappings.replace(rows, same);
            }
            Payload::ServiceScaled(svc) => {
                info!(service = %svc.name, scaling = %svc.scaling.summary(), "service scaled");
                if self.service_focus.as_ref().map(|s| same(s, &svc)).unwrap_or(false) {
                    self.service_focus = Some(svc);
                }
                if self.nav.modal() == Some(ModalId::ServiceScale) {
                    self.close_modal();
                }
                self.refresh();
            }
            Payload::WorkerPoolScaled(pool) => {
                info!(worker_pool = %pool.name, instances = ?pool.manual_instances, "worker pool scaled");
                if self.nav.modal() == Some(ModalId::WorkerPoolScale) {
                    self.close_modal();
                }
                self.refresh();
            }
            Payload::JobExecuted(exec) => {
                info!(execution = %exec.name, job = %exec.job, "job executed");
                self.switch_to(PageId::Jobs);
            }
        }
    }
}
