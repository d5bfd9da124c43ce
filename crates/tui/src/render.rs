#![forbid(unsafe_code)]

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Tabs, Wrap,
};
use ratatui::Frame;

use runboard_core::columns::Tabular;
use runboard_core::ScalingMode;

use crate::model::Table as Rows;
use crate::nav::{ModalId, PageId, ServiceTab};
use crate::App;

const ACCENT: Color = Color::Cyan;

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.size();
    if app.nav().is_loading() {
        draw_curtain(f, area, app);
        return;
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5), Constraint::Length(3)])
        .split(area);
    draw_header(f, chunks[0], app);
    draw_page(f, chunks[1], app);
    draw_footer(f, chunks[2], app);
    if let Some(modal) = app.modal() {
        draw_modal(f, area, app, modal);
    }
}

fn draw_curtain(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = vec![Line::from(Span::styled("Cloud Run", Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)))];
    lines.push(Line::from(app.status().unwrap_or("Please wait").to_string()));
    if let Some(ctx) = &app.status_context {
        lines.push(Line::from(Span::styled(ctx.clone(), Style::default().fg(Color::DarkGray))));
    }
    let rect = centered(40, 20, area);
    f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::ALL)), rect);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let info = app.info();
    let label = Style::default().fg(Color::DarkGray);
    let line = Line::from(vec![
        Span::styled("User: ", label),
        Span::raw(info.user.clone()),
        Span::styled("  Project: ", label),
        Span::raw(info.project.clone()),
        Span::styled("  Region: ", label),
        Span::raw(info.region.as_str().to_string()),
    ]);
    let title = format!(" {} ", app.page().title());
    f.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(title)), area);
}

fn draw_page(f: &mut Frame, area: Rect, app: &App) {
    match app.page() {
        PageId::Services => draw_rows(f, area, app.services(), "No services found"),
        PageId::Jobs => draw_rows(f, area, app.jobs(), "No jobs found"),
        PageId::WorkerPools => draw_rows(f, area, app.worker_pools(), "No worker pools found"),
        PageId::DomainMappings => draw_rows(f, area, app.domain_mappings(), "No domain mappings found"),
        PageId::ServiceDashboard => draw_service_dashboard(f, area, app),
        PageId::JobDashboard => {
            let chunks = split_summary(area);
            let summary = match &app.job_focus {
                Some(j) => vec![
                    Line::from(format!("{} ({})", j.name, j.region)),
                    Line::from(format!("Status: {}", j.status())),
                    Line::from(format!("Created by {}", j.creator)),
                ],
                None => Vec::new(),
            };
            f.render_widget(Paragraph::new(summary).block(Block::default().borders(Borders::ALL)), chunks[0]);
            draw_rows(f, chunks[1], app.executions(), "No executions");
        }
        PageId::Loader => {}
    }
}

fn draw_service_dashboard(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Length(1), Constraint::Min(3)])
        .split(area);
    let summary = match app.service_focus() {
        Some(s) => vec![
            Line::from(format!("{} ({})", s.name, s.region)),
            Line::from(format!("Scaling: {}", s.scaling.summary())),
            Line::from(format!("Last deployed by {}", s.last_modifier)),
        ],
        None => Vec::new(),
    };
    f.render_widget(Paragraph::new(summary).block(Block::default().borders(Borders::ALL)), chunks[0]);

    let titles: Vec<Line> = ServiceTab::ALL.iter().map(|t| Line::from(t.title())).collect();
    let selected = ServiceTab::ALL.iter().position(|t| *t == app.service_tab()).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().fg(Color::Black).bg(ACCENT));
    f.render_widget(tabs, chunks[1]);

    let body = chunks[2];
    match app.service_tab() {
        ServiceTab::Revisions => {
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(66), Constraint::Percentage(34)])
                .split(body);
            draw_rows(f, cols[0], app.revisions(), "No revisions");
            let lines = revision_detail(app);
            let block = Block::default().borders(Borders::ALL).title(" Revision Details ");
            f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }).block(block), cols[1]);
        }
        ServiceTab::Networking => {
            let mut lines = Vec::new();
            if let Some(s) = app.service_focus() {
                lines.push(labelled("URL", s.uri.clone()));
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled("Traffic", Style::default().add_modifier(Modifier::BOLD))));
                for t in &s.traffic {
                    let mut row = format!("{:>4}%  {}", t.percent, t.target());
                    if !t.tag.is_empty() {
                        row.push_str(&format!("  tag {}", t.tag));
                    }
                    if !t.uri.is_empty() {
                        row.push_str(&format!("  {}", t.uri));
                    }
                    lines.push(Line::from(row));
                }
            }
            f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::ALL)), body);
        }
        ServiceTab::Security => {
            let lines = match app.service_focus() {
                Some(s) => vec![
                    labelled("Created by", s.creator.clone()),
                    labelled("Last modified by", s.last_modifier.clone()),
                ],
                None => Vec::new(),
            };
            f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::ALL)), body);
        }
    }
}

fn labelled(label: &str, value: String) -> Line<'static> {
    Line::from(vec![Span::styled(format!("{label}: "), Style::default().fg(ACCENT)), Span::raw(value)])
}

/// Detail lines for the selected revision, with its traffic share.
fn revision_detail(app: &App) -> Vec<Line<'static>> {
    let Some(rev) = app.revisions().selected_row() else { return Vec::new() };
    let mut lines: Vec<Line> = rev.details().into_iter().map(|(l, v)| labelled(l, v)).collect();
    if let Some(svc) = app.service_focus() {
        let (share, tags) = svc.traffic_for(&rev.name);
        lines.push(labelled("Traffic", share));
        if !tags.is_empty() {
            lines.push(labelled("Tags", tags));
        }
    }
    lines
}

fn split_summary(area: Rect) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(6), Constraint::Min(3)])
        .split(area)
}

fn draw_rows<T: Tabular>(f: &mut Frame, area: Rect, rows: &Rows<T>, empty: &str) {
    let block = Block::default().borders(Borders::ALL);
    if rows.rows.is_empty() {
        f.render_widget(Paragraph::new(empty.to_string()).block(block), area);
        return;
    }
    let header = Row::new(T::columns().iter().map(|c| c.label))
        .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));
    let widths: Vec<Constraint> = T::columns().iter().map(|c| Constraint::Percentage(c.width)).collect();
    let body = rows.rows.iter().map(|r| Row::new(r.cells()));
    let table = Table::new(body, widths)
        .header(header)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = TableState::default();
    state.select(Some(rows.selected));
    f.render_stateful_widget(table, area, &mut state);
}

fn shortcuts(page: PageId) -> &'static str {
    match page {
        PageId::Services => "enter dashboard  l logs  s scale  r refresh",
        PageId::ServiceDashboard => "esc back  tab next tab  l logs  s scale  r refresh",
        PageId::Jobs => "enter dashboard  l logs  x execute  r refresh",
        PageId::JobDashboard => "esc back  l logs  x execute  r refresh",
        PageId::WorkerPools => "s scale  r refresh",
        PageId::DomainMappings => "enter dns  o open  r refresh",
        PageId::Loader => "",
    }
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let help = Span::styled(
        format!("^S services ^J jobs ^W pools ^D domains ^P project ^R region ^Z console ^C quit  {}", shortcuts(app.page())),
        Style::default().fg(Color::DarkGray),
    );
    let status = match (app.status(), &app.status_context, app.notice()) {
        (Some(s), Some(ctx), _) => Some(format!("{s} {ctx}")),
        (Some(s), None, _) => Some(s.to_string()),
        (None, _, Some(n)) => Some(n.to_string()),
        _ => None,
    };
    let mut lines = vec![Line::from(help)];
    let mut second = Vec::new();
    if let Some(s) = status {
        second.push(Span::styled(s, Style::default().fg(ACCENT)));
    }
    if let Some(e) = app.last_error() {
        second.push(Span::styled(format!("  {e}"), Style::default().fg(Color::Red)));
    }
    lines.push(Line::from(second));
    f.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::TOP)), area);
}

fn draw_modal(f: &mut Frame, area: Rect, app: &App, modal: ModalId) {
    let rect = match modal {
        ModalId::Logs => centered(90, 80, area),
        ModalId::DomainMappingInfo => centered(80, 50, area),
        _ => centered(50, 50, area),
    };
    f.render_widget(Clear, rect);
    match modal {
        ModalId::Projects | ModalId::Regions => draw_picker(f, rect, app, modal),
        ModalId::Logs => draw_logs(f, rect, app),
        ModalId::ServiceScale => draw_service_form(f, rect, app),
        ModalId::WorkerPoolScale => draw_pool_form(f, rect, app),
        ModalId::DomainMappingInfo => draw_dns(f, rect, app),
    }
}

fn draw_picker(f: &mut Frame, area: Rect, app: &App, modal: ModalId) {
    let picker = app.picker();
    let title = match modal {
        ModalId::Projects => " Select project ",
        _ => " Select region ",
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);
    f.render_widget(Paragraph::new(format!("> {}", picker.query)), chunks[0]);
    let items: Vec<ListItem> = picker.visible().into_iter().map(|i| ListItem::new(i.label.clone())).collect();
    let list = List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    state.select(Some(picker.selected));
    f.render_stateful_widget(list, chunks[1], &mut state);
}

fn draw_logs(f: &mut Frame, area: Rect, app: &App) {
    let Some(logs) = app.logs() else { return };
    let block = Block::default().borders(Borders::ALL).title(logs.heading());
    let height = block.inner(area).height as usize;
    let mut lines: Vec<Line> = logs.lines.iter().rev().take(height).rev().map(|l| Line::from(l.clone())).collect();
    if let Some(e) = &logs.failed {
        lines.push(Line::from(Span::styled(e.clone(), Style::default().fg(Color::Red))));
    }
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_service_form(f: &mut Frame, area: Rect, app: &App) {
    let Some(form) = app.service_form() else { return };
    let focused = |i: usize| {
        if form.focus == i {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    };
    let mode = match form.mode {
        ScalingMode::Automatic => "(x) Automatic  ( ) Manual",
        ScalingMode::Manual => "( ) Automatic  (x) Manual",
    };
    let mut lines = vec![
        Line::from(format!("{} ({})", form.name, form.region)),
        Line::from(""),
        Line::from(Span::styled(format!("Mode: {mode}"), focused(0))),
    ];
    for (i, (label, value)) in form.fields().into_iter().enumerate() {
        lines.push(Line::from(Span::styled(format!("{label}: {value}"), focused(i + 1))));
    }
    push_form_status(&mut lines, form.submitting, form.error.as_deref());
    let block = Block::default().borders(Borders::ALL).title(" Scale service ");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_pool_form(f: &mut Frame, area: Rect, app: &App) {
    let Some(form) = app.pool_form() else { return };
    let mut lines = vec![
        Line::from(format!("{} ({})", form.name, form.region)),
        Line::from(""),
        Line::from(Span::styled(format!("Instances: {}", form.instances), Style::default().fg(ACCENT))),
    ];
    push_form_status(&mut lines, form.submitting, form.error.as_deref());
    let block = Block::default().borders(Borders::ALL).title(" Scale worker pool ");
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn push_form_status(lines: &mut Vec<Line<'static>>, submitting: bool, error: Option<&str>) {
    lines.push(Line::from(""));
    if submitting {
        lines.push(Line::from("Submitting..."));
    }
    if let Some(e) = error {
        lines.push(Line::from(Span::styled(e.to_string(), Style::default().fg(Color::Red))));
    }
    lines.push(Line::from(Span::styled("enter submit  esc cancel", Style::default().fg(Color::DarkGray))));
}

fn draw_dns(f: &mut Frame, area: Rect, app: &App) {
    let Some(dm) = &app.dns else { return };
    let block = Block::default().borders(Borders::ALL).title(format!(" DNS records for {} ", dm.name));
    if dm.records.is_empty() {
        let p = Paragraph::new("No DNS records reported yet").wrap(Wrap { trim: true }).block(block);
        f.render_widget(p, area);
        return;
    }
    let header = Row::new(["TYPE", "NAME", "DATA"]).style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));
    let rows = dm
        .records
        .iter()
        .map(|r| Row::new([r.kind.clone(), r.name.clone(), r.rrdata.clone()]));
    let widths = [Constraint::Percentage(15), Constraint::Percentage(35), Constraint::Percentage(50)];
    f.render_widget(Table::new(rows, widths).header(header).block(block), area);
}

fn centered(pct_x: u16, pct_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - pct_y) / 2),
            Constraint::Percentage(pct_y),
            Constraint::Percentage((100 - pct_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - pct_x) / 2),
            Constraint::Percentage(pct_x),
            Constraint::Percentage((100 - pct_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_rect_is_inside() {
        let area = Rect::new(0, 0, 100, 50);
        let r = centered(50, 50, area);
        assert!(r.x >= 20 && r.right() <= 80);
        assert!(r.y >= 10 && r.bottom() <= 40);
    }
}
