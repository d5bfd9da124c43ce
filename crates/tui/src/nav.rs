//! Navigation: which page is mounted, which modal (at most one) sits above it.

#![forbid(unsafe_code)]

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageId {
    /// Startup curtain; swallows input.
    Loader,
    Services,
    ServiceDashboard,
    Jobs,
    JobDashboard,
    WorkerPools,
    DomainMappings,
}

impl PageId {
    pub fn title(&self) -> &'static str {
        match self {
            PageId::Loader => "Loading",
            PageId::Services => "Services",
            PageId::ServiceDashboard => "Service",
            PageId::Jobs => "Jobs",
            PageId::JobDashboard => "Job",
            PageId::WorkerPools => "Worker Pools",
            PageId::DomainMappings => "Domain Mappings",
        }
    }

    /// Dashboards return to this list on Esc.
    pub fn parent(&self) -> Option<PageId> {
        match self {
            PageId::ServiceDashboard => Some(PageId::Services),
            PageId::JobDashboard => Some(PageId::Jobs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalId {
    Projects,
    Regions,
    Logs,
    ServiceScale,
    WorkerPoolScale,
    DomainMappingInfo,
}

/// Tabs of the service dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceTab {
    #[default]
    Revisions,
    Networking,
    Security,
}

impl ServiceTab {
    pub const ALL: [ServiceTab; 3] = [ServiceTab::Revisions, ServiceTab::Networking, ServiceTab::Security];

    pub fn title(&self) -> &'static str {
        match self {
            ServiceTab::Revisions => "Revisions",
            ServiceTab::Networking => "Networking",
            ServiceTab::Security => "Security",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|t| t == self).unwrap_or(0)
    }

    /// Neighbouring tab, wrapping at both ends.
    pub fn step(&self, forward: bool) -> ServiceTab {
        let n = Self::ALL.len();
        let i = if forward { self.index() + 1 } else { self.index() + n - 1 };
        Self::ALL[i % n]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Page(PageId),
    Modal(ModalId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Base,
    Modal(ModalId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavError {
    #[error("close the open {open:?} dialog first")]
    ModalOpen { open: ModalId, requested: ModalId },
    #[error("still loading")]
    Loading,
}

/// `(current, previous)` with single-level history.
#[derive(Debug)]
pub struct Navigator {
    page: PageId,
    state: NavState,
    previous: Option<View>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self { page: PageId::Loader, state: NavState::Base, previous: None }
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The view receiving input.
    pub fn current(&self) -> View {
        match self.state {
            NavState::Base => View::Page(self.page),
            NavState::Modal(m) => View::Modal(m),
        }
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn modal(&self) -> Option<ModalId> {
        match self.state {
            NavState::Base => None,
            NavState::Modal(m) => Some(m),
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.page == PageId::Loader
    }

    /// Mount `page`, dropping any modal above the old one.
    pub fn switch_to(&mut self, page: PageId) {
        self.previous = Some(self.current());
        self.page = page;
        self.state = NavState::Base;
        debug!(page = ?page, previous = ?self.previous, "nav: switch");
    }

    pub fn open_modal(&mut self, modal: ModalId) -> Result<(), NavError> {
        if self.is_loading() {
            return Err(NavError::Loading);
        }
        if let NavState::Modal(open) = self.state {
            return Err(NavError::ModalOpen { open, requested: modal });
        }
        self.previous = Some(View::Page(self.page));
        self.state = NavState::Modal(modal);
        debug!(modal = ?modal, page = ?self.page, "nav: modal open");
        Ok(())
    }

    /// Remove the modal and give focus back to the page that opened it.
    pub fn close_modal(&mut self) -> Option<ModalId> {
        let NavState::Modal(m) = self.state else { return None };
        if let Some(View::Page(caller)) = self.previous {
            self.page = caller;
        }
        self.state = NavState::Base;
        self.previous = Some(View::Modal(m));
        debug!(modal = ?m, page = ?self.page, "nav: modal closed");
        Some(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_records_previous() {
        let mut nav = Navigator::new();
        assert!(nav.is_loading());
        nav.switch_to(PageId::Services);
        nav.switch_to(PageId::Jobs);
        assert_eq!(nav.current(), View::Page(PageId::Jobs));
        assert_eq!(nav.previous, Some(View::Page(PageId::Services)));
    }

    #[test]
    fn second_modal_is_rejected() {
        let mut nav = Navigator::new();
        nav.switch_to(PageId::Services);
        nav.open_modal(ModalId::Logs).unwrap();
        let err = nav.open_modal(ModalId::Projects).unwrap_err();
        assert_eq!(err, NavError::ModalOpen { open: ModalId::Logs, requested: ModalId::Projects });
        assert_eq!(nav.current(), View::Modal(ModalId::Logs));
    }

    #[test]
    fn close_restores_caller() {
        let mut nav = Navigator::new();
        nav.switch_to(PageId::Jobs);
        nav.open_modal(ModalId::Regions).unwrap();
        assert_eq!(nav.previous, Some(View::Page(PageId::Jobs)));
        assert_eq!(nav.close_modal(), Some(ModalId::Regions));
        assert_eq!(nav.current(), View::Page(PageId::Jobs));
        assert_eq!(nav.close_modal(), None);
        nav.open_modal(ModalId::Projects).unwrap();
    }

    #[test]
    fn close_returns_to_the_recorded_caller() {
        let mut nav = Navigator::new();
        nav.switch_to(PageId::Services);
        nav.open_modal(ModalId::Logs).unwrap();
        nav.page = PageId::Jobs;
        assert_eq!(nav.close_modal(), Some(ModalId::Logs));
        assert_eq!(nav.current(), View::Page(PageId::Services));
        assert_eq!(nav.previous, Some(View::Modal(ModalId::Logs)));
    }

    #[test]
    fn service_tabs_wrap() {
        assert_eq!(ServiceTab::default().step(true), ServiceTab::Networking);
        assert_eq!(ServiceTab::Security.step(true), ServiceTab::Revisions);
        assert_eq!(ServiceTab::Revisions.step(false), ServiceTab::Security);
    }

    #[test]
    fn no_modal_behind_the_curtain() {
        let mut nav = Navigator::new();
        assert_eq!(nav.open_modal(ModalId::Projects), Err(NavError::Loading));
    }

    #[test]
    fn switch_drops_modal() {
        let mut nav = Navigator::new();
        nav.switch_to(PageId::Services);
        nav.open_modal(ModalId::ServiceScale).unwrap();
        nav.switch_to(PageId::Services);
        assert_eq!(nav.state(), NavState::Base);
        assert_eq!(nav.previous, Some(View::Modal(ModalId::ServiceScale)));
    }
}
