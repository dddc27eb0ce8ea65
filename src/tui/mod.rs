//! Minimal reference TUI (SPEC_FULL.md §2): a single scrolling session
//! table, a status line, and an event tail — deliberately thin, proving the
//! provider contracts work end-to-end rather than being the deliverable UI
//! (spec.md §1 excludes "the terminal UI rendering engine" as an external
//! collaborator). Styled with the teacher's `tui/theme.rs` conventions,
//! recolored in `theme.rs` onto cost/burn-rate semantics.

mod theme;

use crate::analytics::classify_threshold;
use crate::domain::Severity;
use crate::killswitch::{KillSwitch, KillSwitchOutcome, KillSwitchState};
use crate::providers::DashboardProviders;
use crate::signal::SignalSender;
use crate::store::SessionStore;
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table},
    Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use theme::{gauge_bar, status_marker, INFO_DIM, OK_GREEN, WARN_AMBER};
use tokio_util::sync::CancellationToken;

/// Thresholds used to color the burn-rate gauge, taken from `display.cost_color_*`.
#[derive(Debug, Clone, Copy)]
pub struct CostThresholds {
    pub green_below: f64,
    pub yellow_below: f64,
}

/// Runs the dashboard on the calling (dedicated) OS thread, bridging into
/// the providers' async calls via `handle.block_on`. Quits on `q`/`Esc`,
/// which also triggers `cancel` so the background tasks shut down together.
///
/// # Errors
/// Returns an error if terminal setup, rendering, or input polling fails.
pub fn run(
    handle: tokio::runtime::Handle,
    providers: DashboardProviders,
    store: Arc<SessionStore>,
    thresholds: CostThresholds,
    refresh: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &handle, &providers, &store, thresholds, refresh, &cancel);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

/// Tracks the session-table cursor and the kill switch's own state machine
/// (spec.md §4.9), so `k`/`y`/`n` on the selected row drives stop → confirm
/// → kill-or-continue without blocking the render loop on user input.
struct UiState {
    selected: usize,
    kill_switch: KillSwitch,
    last_outcome: Option<String>,
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    handle: &tokio::runtime::Handle,
    providers: &DashboardProviders,
    store: &Arc<SessionStore>,
    thresholds: CostThresholds,
    refresh: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut ui = UiState { selected: 0, kill_switch: KillSwitch::new(SignalSender), last_outcome: None };

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let sessions = handle.block_on(providers.state.sessions());
        let burn_rate = handle.block_on(providers.burn_rate.snapshot());
        let stats = handle.block_on(providers.stats.snapshot());
        let alerts = providers.alerts.active();
        let events = providers.events.recent(200);
        if !sessions.is_empty() {
            ui.selected = ui.selected.min(sessions.len() - 1);
        }

        terminal.draw(|f| {
            let layout = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(0),
                    Constraint::Length(8),
                    Constraint::Length(3),
                ])
                .split(f.area());

            render_status_line(f, layout[0], &stats, &burn_rate, thresholds);
            render_session_table(f, layout[1], &sessions, ui.selected);
            render_event_tail(f, layout[2], &events);
            render_help_line(f, layout[3], &alerts, &ui);
        })?;

        if event::poll(refresh)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match (key.code, ui.kill_switch.state()) {
                        (KeyCode::Char('q' | 'Q'), KillSwitchState::Idle) | (KeyCode::Esc, KillSwitchState::Idle) => {
                            cancel.cancel();
                            return Ok(());
                        }
                        (KeyCode::Up, _) => ui.selected = ui.selected.saturating_sub(1),
                        (KeyCode::Down, _) => {
                            if !sessions.is_empty() {
                                ui.selected = (ui.selected + 1).min(sessions.len() - 1);
                            }
                        }
                        (KeyCode::Char('k' | 'K'), KillSwitchState::Idle) => {
                            if let Some(session) = sessions.get(ui.selected) {
                                if let Some(pid) = session.pid {
                                    let outcome =
                                        handle.block_on(ui.kill_switch.initiate(store, pid, session.session_id.clone()));
                                    ui.last_outcome = Some(describe_outcome("stop", &outcome));
                                }
                            }
                        }
                        (KeyCode::Char('y' | 'Y'), KillSwitchState::AwaitingConfirmation) => {
                            let outcome = ui.kill_switch.confirm();
                            ui.last_outcome = Some(describe_outcome("kill", &outcome));
                        }
                        (KeyCode::Char('n' | 'N'), KillSwitchState::AwaitingConfirmation)
                        | (KeyCode::Esc, KillSwitchState::AwaitingConfirmation) => {
                            let outcome = ui.kill_switch.cancel();
                            ui.last_outcome = Some(describe_outcome("resume", &outcome));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn describe_outcome(action: &str, outcome: &KillSwitchOutcome) -> String {
    match outcome {
        KillSwitchOutcome::Stopped => "process stopped, press y to kill or n to resume".to_string(),
        KillSwitchOutcome::Killed => "process killed".to_string(),
        KillSwitchOutcome::Resumed => "process resumed".to_string(),
        KillSwitchOutcome::AlreadyExited => "session already exited".to_string(),
        KillSwitchOutcome::Failed(reason) => format!("failed to {action}: {reason}"),
    }
}

fn render_status_line(
    f: &mut ratatui::Frame,
    area: Rect,
    stats: &crate::providers::StatsSnapshot,
    burn_rate: &crate::analytics::BurnRateSnapshot,
    thresholds: CostThresholds,
) {
    let color = classify_threshold(burn_rate.hourly_rate, thresholds.green_below, thresholds.yellow_below);
    let (marker, rate_color) = theme::severity_marker(color);
    let gauge = gauge_bar((burn_rate.hourly_rate / thresholds.yellow_below.max(1.0) * 100.0).min(100.0), 12);

    let line = Line::from(vec![
        Span::styled(format!(" {marker} "), Style::default().fg(rate_color).add_modifier(Modifier::BOLD)),
        Span::styled(format!("${:.2}/hr", burn_rate.hourly_rate), Style::default().fg(rate_color)),
        Span::raw(" "),
        Span::styled(gauge, Style::default().fg(rate_color)),
        Span::raw("    "),
        Span::styled("sessions ", Style::default().fg(INFO_DIM)),
        Span::styled(format!("{}", stats.session_count), Style::default().fg(OK_GREEN)),
        Span::raw("    "),
        Span::styled("total cost ", Style::default().fg(INFO_DIM)),
        Span::styled(format!("${:.2}", stats.total_cost), Style::default().fg(OK_GREEN)),
        Span::raw("    "),
        Span::styled("tokens ", Style::default().fg(INFO_DIM)),
        Span::styled(format!("{}", stats.total_tokens), Style::default().fg(OK_GREEN)),
        Span::raw("    "),
        Span::styled("dropped ", Style::default().fg(INFO_DIM)),
        Span::styled(
            format!("{}", stats.dropped_store_writes + stats.dropped_without_session),
            Style::default().fg(if stats.dropped_store_writes + stats.dropped_without_session > 0 { WARN_AMBER } else { INFO_DIM }),
        ),
    ]);
    let widget = Paragraph::new(vec![line]).block(Block::default().borders(Borders::ALL).title("aiwatch"));
    f.render_widget(widget, area);
}

fn render_session_table(
    f: &mut ratatui::Frame,
    area: Rect,
    sessions: &[crate::providers::SessionView],
    selected: usize,
) {
    let rows: Vec<Row> = sessions
        .iter()
        .enumerate()
        .map(|(i, session)| {
            let (marker, color) = status_marker(session.status);
            let cursor = if i == selected { ">" } else { " " };
            let mut style = Style::default().fg(color);
            if i == selected {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Row::new(vec![
                format!("{cursor}{marker} {}", session.session_id.short()),
                session.pid.map_or_else(|| "-".to_string(), |p| p.to_string()),
                session.binary_name.clone().unwrap_or_else(|| "-".to_string()),
                session.model.clone().unwrap_or_else(|| "-".to_string()),
                format!("${:.2}", session.total_cost),
                format!("{}", session.total_tokens),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Length(16),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
    )
    .header(
        Row::new(vec!["SESSION", "PID", "BINARY", "MODEL", "COST", "TOKENS"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Sessions"));

    f.render_widget(table, area);
}

fn render_event_tail(f: &mut ratatui::Frame, area: Rect, events: &[crate::store::ring_buffer::RingEvent]) {
    let lines: Vec<Line> = events.iter().rev().map(|e| Line::from(e.formatted_text.clone())).collect();
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Events"));
    f.render_widget(widget, area);
}

fn render_help_line(f: &mut ratatui::Frame, area: Rect, alerts: &[crate::domain::Alert], ui: &UiState) {
    let mut spans = match ui.kill_switch.state() {
        KillSwitchState::Idle => vec![
            Span::styled("[Q/Esc]", Style::default().fg(WARN_AMBER)),
            Span::raw(" Quit  "),
            Span::styled("[↑/↓]", Style::default().fg(WARN_AMBER)),
            Span::raw(" Select  "),
            Span::styled("[K]", Style::default().fg(WARN_AMBER)),
            Span::raw(" Stop selected    "),
        ],
        KillSwitchState::AwaitingConfirmation => vec![
            Span::styled("[Y]", Style::default().fg(theme::CRITICAL_RED)),
            Span::raw(" Kill  "),
            Span::styled("[N/Esc]", Style::default().fg(WARN_AMBER)),
            Span::raw(" Resume    "),
        ],
    };
    if let Some(message) = &ui.last_outcome {
        spans.push(Span::styled(message.clone(), Style::default().fg(INFO_DIM)));
    } else if alerts.is_empty() {
        spans.push(Span::styled("no active alerts", Style::default().fg(INFO_DIM)));
    } else {
        for alert in alerts.iter().take(3) {
            let color = if alert.severity == Severity::Critical { theme::CRITICAL_RED } else { WARN_AMBER };
            spans.push(Span::styled(format!("{}  ", alert.message), Style::default().fg(color)));
        }
    }
    let widget = Paragraph::new(vec![Line::from(spans)]).block(Block::default().borders(Borders::ALL));
    f.render_widget(widget, area);
}
