//! Key routing: curtain, then global shortcuts, then the modal or the page.

#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::trace;

use runboard_core::ScalingMode;

use crate::forms::FormFields;
use crate::nav::{ModalId, PageId};
use crate::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Consumed,
    /// Nobody wanted it.
    Ignored,
    Quit,
}

impl App {
    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('c') {
            self.shutdown();
            return KeyOutcome::Quit;
        }
        if self.nav.is_loading() {
            return KeyOutcome::Consumed;
        }
        if let (true, KeyCode::Char(c)) = (ctrl, key.code) {
            return if self.global_shortcut(c.to_ascii_lowercase()) {
                KeyOutcome::Consumed
            } else {
                KeyOutcome::Ignored
            };
        }
        let consumed = match self.nav.modal() {
            Some(m) => self.modal_key(m, key),
            None => self.page_key(key),
        };
        if consumed {
            KeyOutcome::Consumed
        } else {
            trace!(?key, "key: unhandled");
            KeyOutcome::Ignored
        }
    }

    /// Ctrl shortcuts. Only the pickers are considered while a modal is open, and the
    /// navigator turns those down.
    fn global_shortcut(&mut self, c: char) -> bool {
        match c {
            'p' => self.open_project_picker(),
            'r' => self.open_region_picker(),
            _ if self.nav.modal().is_some() => return false,
            's' => self.switch_to(PageId::Services),
            'j' => self.switch_to(PageId::Jobs),
            'w' => self.switch_to(PageId::WorkerPools),
            'd' => self.switch_to(PageId::DomainMappings),
            'z' => self.open_console(),
            'l' => self.open_release_notes(),
            _ => return false,
        }
        true
    }

    fn page_key(&mut self, key: KeyEvent) -> bool {
        let page = self.nav.page();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(page, false),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(page, true),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Esc if page.parent().is_some() => self.back(),
            KeyCode::Tab | KeyCode::Right if page == PageId::ServiceDashboard => {
                self.service_tab = self.service_tab.step(true)
            }
            KeyCode::BackTab | KeyCode::Left if page == PageId::ServiceDashboard => {
                self.service_tab = self.service_tab.step(false)
            }
            KeyCode::Enter => match page {
                PageId::Services => self.open_service_dashboard(),
                PageId::Jobs => self.open_job_dashboard(),
                PageId::DomainMappings => self.open_dns_info(),
                _ => return false,
            },
            KeyCode::Char('l') => match page {
                PageId::Services | PageId::ServiceDashboard | PageId::Jobs | PageId::JobDashboard => {
                    self.open_logs()
                }
                _ => return false,
            },
            KeyCode::Char('s') => match page {
                PageId::Services | PageId::ServiceDashboard | PageId::WorkerPools => self.open_scale(),
                _ => return false,
            },
            KeyCode::Char('x') => match page {
                PageId::Jobs | PageId::JobDashboard => self.execute_job(),
                _ => return false,
            },
            KeyCode::Char('o') if page == PageId::DomainMappings => self.open_domain(),
            _ => return false,
        }
        true
    }

    fn move_selection(&mut self, page: PageId, down: bool) {
        macro_rules! step {
            ($t:expr) => {
                if down {
                    $t.next()
                } else {
                    $t.prev()
                }
            };
        }
        match page {
            PageId::Services => step!(self.services),
            PageId::Jobs => step!(self.jobs),
            PageId::WorkerPools => step!(self.worker_pools),
            PageId::DomainMappings => step!(self.domain_mappings),
            PageId::ServiceDashboard => step!(self.revisions),
            PageId::JobDashboard => step!(self.executions),
            PageId::Loader => {}
        }
    }

    fn modal_key(&mut self, modal: ModalId, key: KeyEvent) -> bool {
        if key.code == KeyCode::Esc {
            self.close_modal();
            return true;
        }
        match modal {
            ModalId::Projects | ModalId::Regions => match key.code {
                KeyCode::Enter => self.pick(),
                KeyCode::Up => self.picker.prev(),
                KeyCode::Down => self.picker.next(),
                KeyCode::Backspace => self.picker.pop(),
                KeyCode::Char(c) => self.picker.push(c),
                _ => return false,
            },
            ModalId::Logs => return false,
            ModalId::DomainMappingInfo => match key.code {
                KeyCode::Enter => self.close_modal(),
                _ => return false,
            },
            ModalId::ServiceScale => {
                let Some(form) = self.service_form.as_mut() else { return false };
                match key.code {
                    KeyCode::Enter => self.submit_service_scale(),
                    KeyCode::Tab | KeyCode::Down => form.focus_next(),
                    KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') if form.focus == 0 => form.toggle_mode(),
                    KeyCode::Char('m') if form.focus == 0 => form.mode = ScalingMode::Manual,
                    KeyCode::Char('a') if form.focus == 0 => form.mode = ScalingMode::Automatic,
                    KeyCode::Backspace => form.backspace(),
                    KeyCode::Char(c) => form.type_char(c),
                    _ => return false,
                }
            }
            ModalId::WorkerPoolScale => {
                let Some(form) = self.pool_form.as_mut() else { return false };
                match key.code {
                    KeyCode::Enter => self.submit_pool_scale(),
                    KeyCode::Backspace => form.backspace(),
                    KeyCode::Char(c) => form.type_char(c),
                    _ => return false,
                }
            }
        }
        true
    }
}
