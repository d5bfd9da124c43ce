//! Runboard terminal UI.
//!
//! [`App`] is the session controller: it owns the navigation state, the busy indicator,
//! the task runner and every page's rows. Background work reports back through an
//! [`UpdateSink`]; the terminal loop drains the queue with [`process_updates`], tests use a
//! [`RecordingSink`] and call [`App::apply_update`] themselves.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::info;

use runboard_api::Clients;
use runboard_core::{
    AccountInfo, DomainMapping, Execution, Job, Project, Revision, Service, WorkerPool,
};
use runboard_ops::TailOptions;

mod actions;
mod forms;
mod indicator;
mod keys;
mod model;
mod nav;
mod picker;
mod render;
mod tasks;
mod term;
mod updates;
mod util;

pub use forms::{FormFields, ScaleFormError, ServiceScaleForm, WorkerPoolScaleForm};
pub use indicator::{Indicator, IndicatorState, GLYPHS};
pub use keys::KeyOutcome;
pub use model::{ChannelSink, LogsState, Paint, Payload, RecordingSink, Table, UiUpdate, UpdateSink};
pub use nav::{ModalId, NavError, NavState, Navigator, PageId, ServiceTab, View};
pub use picker::{PickItem, Picker};
pub use tasks::{Slot, TaskRunner, Ticket};
pub use term::run;
pub use updates::process_updates;

/// Runtime knobs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub spinner_period: Duration,
    /// Upper bound for scale and execute calls.
    pub mutation_timeout: Duration,
    pub tail: TailOptions,
    /// Where picks are saved; `None` keeps them in memory.
    pub config_path: Option<PathBuf>,
    /// Hand URLs to the desktop opener; otherwise only show them.
    pub open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spinner_period: Duration::from_millis(100),
            mutation_timeout: Duration::from_secs(120),
            tail: TailOptions::default(),
            config_path: None,
            open_browser: false,
        }
    }
}

impl Settings {
    /// Defaults overridden by `RUN_SPINNER_MS`, `RUN_MUTATION_TIMEOUT_SECS` and the log knobs.
    pub fn from_env() -> Self {
        let d = Self::default();
        let spinner_period = std::env::var("RUN_SPINNER_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(d.spinner_period);
        let mutation_timeout = std::env::var("RUN_MUTATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.mutation_timeout);
        Self {
            spinner_period,
            mutation_timeout,
            tail: TailOptions::from_env(),
            config_path: Some(runboard_persist::default_path()),
            open_browser: true,
        }
    }
}

pub struct App {
    clients: Clients,
    info: AccountInfo,
    settings: Settings,
    sink: Arc<dyn UpdateSink>,
    handle: Handle,
    runner: TaskRunner,
    indicator: Indicator,
    nav: Navigator,
    // slots whose current ticket has not completed yet
    pending: HashSet<Slot>,
    // pages
    services: Table<Service>,
    jobs: Table<Job>,
    worker_pools: Table<WorkerPool>,
    domain_mappings: Table<DomainMapping>,
    service_focus: Option<Service>,
    service_tab: ServiceTab,
    revisions: Table<Revision>,
    job_focus: Option<Job>,
    executions: Table<Execution>,
    projects: Vec<Project>,
    // modals
    picker: Picker,
    logs: Option<LogsState>,
    next_tail: u64,
    service_form: Option<ServiceScaleForm>,
    pool_form: Option<WorkerPoolScaleForm>,
    dns: Option<DomainMapping>,
    // status
    status: Option<String>,
    status_context: Option<String>,
    notice: Option<String>,
    last_error: Option<String>,
    last_opened: Option<String>,
    quit: bool,
}

impl App {
    /// Must be called inside a tokio runtime; background work is spawned onto it.
    pub fn new(clients: Clients, info: AccountInfo, sink: Arc<dyn UpdateSink>, settings: Settings) -> Self {
        info!(user = %info.user, project = %info.project, region = %info.region, "runboard ui starting");
        Self {
            runner: TaskRunner::new(sink.clone()),
            indicator: Indicator::new(sink.clone(), settings.spinner_period),
            handle: Handle::current(),
            clients,
            info,
            settings,
            sink,
            nav: Navigator::new(),
            pending: HashSet::new(),
            services: Table::default(),
            jobs: Table::default(),
            worker_pools: Table::default(),
            domain_mappings: Table::default(),
            service_focus: None,
            service_tab: ServiceTab::default(),
            revisions: Table::default(),
            job_focus: None,
            executions: Table::default(),
            projects: Vec::new(),
            picker: Picker::default(),
            logs: None,
            next_tail: 0,
            service_form: None,
            pool_form: None,
            dns: None,
            status: None,
            status_context: None,
            notice: None,
            last_error: None,
            last_opened: None,
            quit: false,
        }
    }

    pub fn info(&self) -> &AccountInfo {
        &self.info
    }

    pub fn nav(&self) -> &Navigator {
        &self.nav
    }

    pub fn page(&self) -> PageId {
        self.nav.page()
    }

    pub fn modal(&self) -> Option<ModalId> {
        self.nav.modal()
    }

    pub fn indicator(&self) -> &Indicator {
        &self.indicator
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn services(&self) -> &Table<Service> {
        &self.services
    }

    pub fn jobs(&self) -> &Table<Job> {
        &self.jobs
    }

    pub fn worker_pools(&self) -> &Table<WorkerPool> {
        &self.worker_pools
    }

    pub fn domain_mappings(&self) -> &Table<DomainMapping> {
        &self.domain_mappings
    }

    pub fn service_focus(&self) -> Option<&Service> {
        self.service_focus.as_ref()
    }

    pub fn service_tab(&self) -> ServiceTab {
        self.service_tab
    }

    pub fn revisions(&self) -> &Table<Revision> {
        &self.revisions
    }

    pub fn executions(&self) -> &Table<Execution> {
        &self.executions
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn picker(&self) -> &Picker {
        &self.picker
    }

    pub fn logs(&self) -> Option<&LogsState> {
        self.logs.as_ref()
    }

    pub fn service_form(&self) -> Option<&ServiceScaleForm> {
        self.service_form.as_ref()
    }

    pub fn pool_form(&self) -> Option<&WorkerPoolScaleForm> {
        self.pool_form.as_ref()
    }

    /// Spinner text as last painted.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_opened(&self) -> Option<&str> {
        self.last_opened.as_deref()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Slots with a current task still running.
    pub fn is_pending(&self, slot: Slot) -> bool {
        self.pending.contains(&slot)
    }
}
