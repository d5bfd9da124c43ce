#![forbid(unsafe_code)]

use std::io;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing::{info, warn};

use runboard_api::Clients;
use runboard_core::AccountInfo;

use crate::keys::KeyOutcome;
use crate::model::ChannelSink;
use crate::updates::process_updates;
use crate::{render, App, Settings};

const POLL: Duration = Duration::from_millis(50);

fn restore() {
    if let Err(e) = terminal::disable_raw_mode() {
        warn!(error = %e, "terminal: disable raw mode failed");
    }
    if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen) {
        warn!(error = %e, "terminal: leave alternate screen failed");
    }
}

/// Run the dashboard on the calling thread until the user quits. Needs an entered tokio
/// runtime for background work.
pub fn run(clients: Clients, info: AccountInfo, settings: Settings) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut app = App::new(clients, info, Arc::new(ChannelSink::new(tx)), settings);

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore();
        original_hook(panic_info);
    }));

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    app.start();
    let result = event_loop(&mut terminal, &mut app, &rx);

    app.shutdown();
    restore();
    terminal.show_cursor()?;
    info!("terminal restored");
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    rx: &mpsc::Receiver<crate::UiUpdate>,
) -> Result<()> {
    loop {
        process_updates(app, rx);
        terminal.draw(|f| render::draw(f, app))?;
        if app.should_quit() {
            return Ok(());
        }
        if !event::poll(POLL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if app.handle_key(key) == KeyOutcome::Quit {
                return Ok(());
            }
        }
    }
}
