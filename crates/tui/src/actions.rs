#![forbid(unsafe_code)]

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use runboard_api::{
    ApiResult, ExecutionClient, JobClient, ProjectClient, RevisionClient, ServiceClient,
    WorkerPoolClient,
};
use runboard_core::links::{self, LogTarget};
use runboard_core::Scope;
use runboard_persist::Config;

use crate::forms::{ServiceScaleForm, WorkerPoolScaleForm};
use crate::model::{LogsState, Payload};
use crate::nav::{ModalId, PageId, ServiceTab};
use crate::picker::Picker;
use crate::tasks::logs::start_log_pump;
use crate::tasks::Slot;
use crate::{util, App};

const LOG_LINES_CAP: usize = 2000;

impl App {
    /// Raise the curtain: load projects and services concurrently, then show the service list.
    pub fn start(&mut self) {
        self.indicator.start("Please wait");
        self.indicator.set_context(Some("Projects...".into()));
        let clients = self.clients.clone();
        let indicator = self.indicator.clone();
        let project = self.info.project.clone();
        let scope = self.info.region.clone();
        self.runner.run(Slot::Startup, async move {
            let projects = async {
                let res = clients.projects.list().await;
                indicator.set_context(Some("Services...".into()));
                res
            };
            let (projects, services) = tokio::join!(projects, clients.list_services(&project, &scope));
            Ok(Payload::Startup { projects: projects.map_err(|e| e.to_string()), services: services? })
        });
        self.pending.insert(Slot::Startup);
    }

    /// Mount `page` and refresh it in the foreground slot.
    pub fn switch_to(&mut self, page: PageId) {
        if self.nav.modal().is_some() {
            self.close_modal();
        }
        self.nav.switch_to(page);
        self.last_error = None;
        self.refresh();
    }

    /// Re-run the current page's load.
    pub fn refresh(&mut self) {
        let Some((message, work)) = self.page_load() else {
            debug!(page = ?self.nav.page(), "refresh: nothing to load");
            return;
        };
        self.indicator.start(message);
        self.runner.run(Slot::Foreground, work);
        self.pending.insert(Slot::Foreground);
    }

    fn page_load(&self) -> Option<(String, BoxFuture<'static, ApiResult<Payload>>)> {
        let clients = self.clients.clone();
        let project = self.info.project.clone();
        let scope = self.info.region.clone();
        let load = match self.nav.page() {
            PageId::Loader => return None,
            PageId::Services => (
                "Loading services...".to_string(),
                async move { clients.list_services(&project, &scope).await.map(Payload::Services) }.boxed(),
            ),
            PageId::Jobs => (
                "Loading jobs...".to_string(),
                async move { clients.list_jobs(&project, &scope).await.map(Payload::Jobs) }.boxed(),
            ),
            PageId::WorkerPools => (
                "Loading worker pools...".to_string(),
                async move { clients.list_worker_pools(&project, &scope).await.map(Payload::WorkerPools) }.boxed(),
            ),
            PageId::DomainMappings => (
                "Loading domain mappings...".to_string(),
                async move {
                    clients.list_domain_mappings(&project, &scope).await.map(Payload::DomainMappings)
                }
                .boxed(),
            ),
            PageId::ServiceDashboard => {
                let svc = self.service_focus.clone()?;
                let project = if svc.project.is_empty() { project } else { svc.project.clone() };
                (
                    format!("Loading {}...", svc.name),
                    async move {
                        let (service, revisions) = tokio::try_join!(
                            clients.services.get(&project, &svc.region, &svc.name),
                            clients.revisions.list(&project, &svc.region, &svc.name),
                        )?;
                        Ok(Payload::ServiceDetail { service, revisions })
                    }
                    .boxed(),
                )
            }
            PageId::JobDashboard => {
                let job = self.job_focus.clone()?;
                let project = if job.project.is_empty() { project } else { job.project.clone() };
                (
                    format!("Loading {}...", job.name),
                    async move {
                        let executions = clients.executions.list(&project, &job.region, &job.name).await?;
                        Ok(Payload::JobDetail { job, executions })
                    }
                    .boxed(),
                )
            }
        };
        Some(load)
    }

    pub fn open_service_dashboard(&mut self) {
        let svc = match self.nav.page() {
            PageId::Services => self.services.selected_row().cloned(),
            _ => self.service_focus.clone(),
        };
        let Some(svc) = svc else { return };
        self.service_focus = Some(svc);
        self.service_tab = ServiceTab::default();
        self.revisions = Default::default();
        self.switch_to(PageId::ServiceDashboard);
    }

    pub fn open_job_dashboard(&mut self) {
        let Some(job) = self.jobs.selected_row().cloned() else { return };
        self.job_focus = Some(job);
        self.executions = Default::default();
        self.switch_to(PageId::JobDashboard);
    }

    /// Esc on a dashboard.
    pub fn back(&mut self) {
        if let Some(parent) = self.nav.page().parent() {
            self.switch_to(parent);
        }
    }

    fn open(&mut self, modal: ModalId) -> bool {
        match self.nav.open_modal(modal) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, ?modal, "nav: modal rejected");
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Close the modal and release what it held (the log tail is cancelled on drop).
    pub fn close_modal(&mut self) {
        let Some(m) = self.nav.close_modal() else { return };
        match m {
            ModalId::Logs => self.logs = None,
            ModalId::ServiceScale => self.service_form = None,
            ModalId::WorkerPoolScale => self.pool_form = None,
            ModalId::DomainMappingInfo => self.dns = None,
            ModalId::Projects | ModalId::Regions => self.picker = Picker::default(),
        }
    }

    pub fn open_project_picker(&mut self) {
        if !self.open(ModalId::Projects) {
            return;
        }
        self.picker = Picker::projects(&self.projects);
        let clients = self.clients.clone();
        self.indicator.start("Loading projects...");
        self.runner.run(Slot::Projects, async move { clients.projects.list().await.map(Payload::Projects) });
        self.pending.insert(Slot::Projects);
    }

    pub fn open_region_picker(&mut self) {
        if self.open(ModalId::Regions) {
            self.picker = Picker::regions();
        }
    }

    /// Enter in a picker.
    pub fn pick(&mut self) {
        let Some(modal) = self.nav.modal() else { return };
        let Some(value) = self.picker.selected_item().map(|i| i.value.clone()) else { return };
        match modal {
            ModalId::Projects => self.info.project = value,
            ModalId::Regions => self.info.region = Scope::parse(&value),
            _ => return,
        }
        info!(project = %self.info.project, region = %self.info.region, "selection changed");
        self.save_config();
        let page = self.nav.page().parent().unwrap_or(self.nav.page());
        self.switch_to(page);
    }

    fn save_config(&mut self) {
        let Some(path) = self.settings.config_path.clone() else { return };
        let cfg = Config { project: self.info.project.clone(), region: self.info.region.as_str().to_string() };
        if let Err(e) = cfg.save_to(&path) {
            warn!(error = %e, "config: save failed");
            self.last_error = Some(format!("saving config: {e:#}"));
        }
    }

    /// The workload whose logs `l` should show on this page.
    fn log_target(&self) -> Option<(LogTarget, String, String, String)> {
        match self.nav.page() {
            PageId::Services => self
                .services
                .selected_row()
                .map(|s| (LogTarget::Service, s.name.clone(), s.region.clone(), s.project.clone())),
            PageId::ServiceDashboard => self
                .service_focus
                .as_ref()
                .map(|s| (LogTarget::Service, s.name.clone(), s.region.clone(), s.project.clone())),
            PageId::Jobs => self
                .jobs
                .selected_row()
                .map(|j| (LogTarget::Job, j.name.clone(), j.region.clone(), j.project.clone())),
            PageId::JobDashboard => self
                .job_focus
                .as_ref()
                .map(|j| (LogTarget::Job, j.name.clone(), j.region.clone(), j.project.clone())),
            _ => None,
        }
    }

    pub fn open_logs(&mut self) {
        let Some((target, name, region, project)) = self.log_target() else { return };
        if !self.open(ModalId::Logs) {
            return;
        }
        let project = if project.is_empty() { self.info.project.clone() } else { project };
        let filter = links::log_filter(target, &name, &region);
        self.next_tail += 1;
        let tail = self.next_tail;
        let (cancel, last_timestamp) = start_log_pump(
            &self.handle,
            self.clients.logs.clone(),
            project,
            filter,
            self.settings.tail.clone(),
            tail,
            self.sink.clone(),
        );
        self.logs = Some(LogsState {
            tail,
            title: format!("Logs: {name} ({region})"),
            lines: Default::default(),
            cap: LOG_LINES_CAP,
            failed: None,
            ended: false,
            last_timestamp,
            cancel: Some(cancel),
        });
    }

    pub fn open_scale(&mut self) {
        match self.nav.page() {
            PageId::Services | PageId::ServiceDashboard => {
                let svc = if self.nav.page() == PageId::Services {
                    self.services.selected_row().cloned()
                } else {
                    self.service_focus.clone()
                };
                let Some(svc) = svc else { return };
                if self.open(ModalId::ServiceScale) {
                    self.service_form = Some(ServiceScaleForm::from_service(&svc, &self.info.project));
                }
            }
            PageId::WorkerPools => {
                let Some(pool) = self.worker_pools.selected_row().cloned() else { return };
                if self.open(ModalId::WorkerPoolScale) {
                    self.pool_form = Some(WorkerPoolScaleForm::from_pool(&pool, &self.info.project));
                }
            }
            _ => {}
        }
    }

    pub fn submit_service_scale(&mut self) {
        let Some(form) = self.service_form.as_mut() else { return };
        if form.submitting {
            return;
        }
        let request = match form.request() {
            Ok(r) => r,
            Err(e) => {
                form.error = Some(e.to_string());
                return;
            }
        };
        form.error = None;
        form.submitting = true;
        let (name, region, project) = (form.name.clone(), form.region.clone(), form.project.clone());
        let clients = self.clients.clone();
        self.indicator.start(format!("Scaling {name}..."));
        self.runner.run_with_timeout(Slot::Mutation, self.settings.mutation_timeout, async move {
            clients.services.update_scaling(&project, &region, &name, request).await.map(Payload::ServiceScaled)
        });
        self.pending.insert(Slot::Mutation);
    }

    pub fn submit_pool_scale(&mut self) {
        let Some(form) = self.pool_form.as_mut() else { return };
        if form.submitting {
            return;
        }
        let instances = match form.request() {
            Ok(n) => n,
            Err(e) => {
                form.error = Some(e.to_string());
                return;
            }
        };
        form.error = None;
        form.submitting = true;
        let (name, region, project) = (form.name.clone(), form.region.clone(), form.project.clone());
        let clients = self.clients.clone();
        self.indicator.start(format!("Scaling {name}..."));
        self.runner.run_with_timeout(Slot::Mutation, self.settings.mutation_timeout, async move {
            clients
                .worker_pools
                .update_scaling(&project, &region, &name, instances)
                .await
                .map(Payload::WorkerPoolScaled)
        });
        self.pending.insert(Slot::Mutation);
    }

    pub fn execute_job(&mut self) {
        let job = match self.nav.page() {
            PageId::Jobs => self.jobs.selected_row().cloned(),
            PageId::JobDashboard => self.job_focus.clone(),
            _ => None,
        };
        let Some(job) = job else { return };
        let clients = self.clients.clone();
        let project = if job.project.is_empty() { self.info.project.clone() } else { job.project.clone() };
        self.indicator.start(format!("Executing {}...", job.name));
        self.runner.run_with_timeout(Slot::Mutation, self.settings.mutation_timeout, async move {
            clients.jobs.execute(&project, &job.region, &job.name).await.map(Payload::JobExecuted)
        });
        self.pending.insert(Slot::Mutation);
    }

    pub fn open_dns_info(&mut self) {
        let Some(dm) = self.domain_mappings.selected_row().cloned() else { return };
        if self.open(ModalId::DomainMappingInfo) {
            self.dns = Some(dm);
        }
    }

    pub fn open_domain(&mut self) {
        if let Some(dm) = self.domain_mappings.selected_row() {
            let url = format!("https://{}", dm.name);
            self.open_url(url);
        }
    }

    /// Ctrl+Z: console page for the selected resource, or for the list.
    pub fn open_console(&mut self) {
        let p = self.info.project.clone();
        let url = match self.nav.page() {
            PageId::Services => match self.services.selected_row() {
                Some(s) => links::console_service(&p, &s.region, &s.name),
                None => links::console(&p),
            },
            PageId::ServiceDashboard => match &self.service_focus {
                Some(s) => links::console_service(&p, &s.region, &s.name),
                None => links::console(&p),
            },
            PageId::Jobs => match self.jobs.selected_row() {
                Some(j) => links::console_job(&p, &j.region, &j.name),
                None => links::console_jobs(&p),
            },
            PageId::JobDashboard => match &self.job_focus {
                Some(j) => links::console_job(&p, &j.region, &j.name),
                None => links::console_jobs(&p),
            },
            PageId::WorkerPools => match self.worker_pools.selected_row() {
                Some(w) => links::console_worker_pool(&p, &w.region, &w.name),
                None => links::console_worker_pools(&p),
            },
            PageId::DomainMappings | PageId::Loader => links::console(&p),
        };
        self.open_url(url);
    }

    pub fn open_release_notes(&mut self) {
        self.open_url(links::RELEASE_NOTES_URL.to_string());
    }

    fn open_url(&mut self, url: String) {
        info!(%url, "opening browser");
        self.notice = Some(format!("Opening {url}"));
        if self.settings.open_browser {
            if let Err(e) = util::open_in_browser(&url) {
                self.last_error = Some(format!("opening {url}: {e}"));
            }
        }
        self.last_opened = Some(url);
    }

    /// Stop everything the session started.
    pub fn shutdown(&mut self) {
        self.close_modal();
        self.indicator.stop("");
        self.quit = true;
        info!("runboard ui stopping");
    }
}
