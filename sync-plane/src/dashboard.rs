//! Terminal dashboard for the sync plane

use crate::metrics::{truncate_label, LogEntry, LogLevel, Metrics, ServerStatus};
use crate::network::{self, NetworkEvent, PlaneConfig};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, List, ListItem, Paragraph, Row, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Table,
    },
    Frame, Terminal,
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// Lines moved by PgUp/PgDn
const PAGE: usize = 10;

const KEY_HINTS: [(&str, &str); 4] = [
    (" Q ", " Quit  "),
    (" ↑↓ ", " Scroll  "),
    (" PgUp/Dn ", " Page  "),
    (" A ", " Follow: "),
];

/// View state: log position and where the plane is listening
struct DashboardState {
    /// Entries skipped from the newest end (0 = newest visible)
    log_offset: usize,
    /// Stick to the newest entry as logs arrive
    follow: bool,
    listen_addr: Option<String>,
    failure: Option<String>,
}

impl DashboardState {
    fn new() -> Self {
        Self {
            log_offset: 0,
            follow: true,
            listen_addr: None,
            failure: None,
        }
    }

    fn apply(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Ready { addr } => self.listen_addr = Some(addr),
            NetworkEvent::Failed(reason) => self.failure = Some(reason),
        }
        if self.follow {
            self.log_offset = 0;
        }
    }

    fn older(&mut self, lines: usize, log_count: usize) {
        if log_count == 0 {
            return;
        }
        self.log_offset = (self.log_offset + lines).min(log_count - 1);
        self.follow = false;
    }

    fn newer(&mut self, lines: usize) {
        self.log_offset = self.log_offset.saturating_sub(lines);
        self.follow = self.log_offset == 0;
    }

    /// Returns true when the key asks to quit
    fn handle_key(&mut self, key: KeyEvent, log_count: usize) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Up | KeyCode::Char('k') => self.older(1, log_count),
            KeyCode::Down | KeyCode::Char('j') => self.newer(1),
            KeyCode::PageUp => self.older(PAGE, log_count),
            KeyCode::PageDown => self.newer(PAGE),
            KeyCode::Home => self.older(log_count, log_count),
            KeyCode::End => self.newer(self.log_offset),
            KeyCode::Char('a') => {
                self.follow = !self.follow;
                if self.follow {
                    self.log_offset = 0;
                }
            }
            _ => {}
        }
        false
    }
}

/// Run the dashboard; the listener runs in the background until quit
pub async fn run(
    config: PlaneConfig,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<NetworkEvent>();
    let network = {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(e) = network::run_with_dashboard(config, metrics, event_tx).await {
                eprintln!("Network error: {}", e);
            }
        })
    };

    let mut state = DashboardState::new();
    loop {
        while let Ok(event) = event_rx.try_recv() {
            state.apply(event);
        }

        terminal.draw(|f| draw(f, &metrics.read(), &state))?;

        if !event::poll(REDRAW_INTERVAL)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                let log_count = metrics.read().logs.len();
                if state.handle_key(key, log_count) {
                    break;
                }
            }
        }
    }

    network.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn draw(f: &mut Frame, m: &Metrics, state: &DashboardState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, rows[0], m, state);
    draw_counters(f, rows[1], m, state);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[2]);
    draw_rooms(f, body[0], m);
    draw_activity(f, body[1], m, state);

    draw_key_hints(f, rows[3], state);
}

fn draw_header(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let (label, color) = match m.status {
        ServerStatus::Starting => ("STARTING", Color::Yellow),
        ServerStatus::Running => ("RUNNING", Color::Green),
        ServerStatus::Error => ("ERROR", Color::Red),
    };

    let mut spans = vec![
        Span::styled("Sync Plane", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled(label, Style::default().fg(color)),
        Span::raw("  │  up "),
        Span::styled(m.uptime(), Style::default().fg(Color::Cyan)),
    ];
    if let Some(reason) = &state.failure {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(reason.clone(), Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "));
    f.render_widget(header, area);
}

/// "label: value" pair for the counter panels
fn stat<'a>(label: &'a str, value: String, color: Color) -> Vec<Span<'a>> {
    vec![
        Span::raw(label),
        Span::styled(value, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ]
}

fn draw_counters(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let addr = state
        .listen_addr
        .clone()
        .or_else(|| m.bind_addr.clone())
        .unwrap_or_else(|| "binding...".to_string());
    let key = if m.master_key_configured {
        Span::styled("set", Style::default().fg(Color::Green))
    } else {
        Span::styled("missing, rooms read-only", Style::default().fg(Color::Red))
    };

    let mut clients = stat("Clients ", m.connected_clients.to_string(), Color::Green);
    clients.extend(stat("  total ", m.total_connections.to_string(), Color::White));
    clients.extend(stat("  peak ", m.peak_connections.to_string(), Color::Magenta));

    let server = Paragraph::new(vec![
        Line::from(stat("Listen ", addr, Color::Cyan)),
        Line::from(vec![Span::raw("Master key "), key]),
        Line::from(clients),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Server "));
    f.render_widget(server, halves[0]);

    let mut joins = stat("Joins ", m.total_joins.to_string(), Color::Yellow);
    joins.extend(stat("  as master ", m.master_grants.to_string(), Color::Yellow));
    let mut refused = stat("Rejected writes ", m.rejected_writes.to_string(), Color::Magenta);
    refused.extend(stat("  bad messages ", m.protocol_errors.to_string(), Color::Red));

    let traffic = Paragraph::new(vec![
        Line::from(joins),
        Line::from(stat(
            "Broadcasts ",
            format!("{} ({} deliveries, {} dropped)", m.broadcasts, m.deliveries, m.dropped_frames),
            Color::Cyan,
        )),
        Line::from(refused),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Traffic "));
    f.render_widget(traffic, halves[1]);
}

fn draw_rooms(f: &mut Frame, area: Rect, m: &Metrics) {
    let rows = m.rooms.iter().map(|room| {
        let master = if room.has_master {
            Cell::from("yes").style(Style::default().fg(Color::Green))
        } else {
            Cell::from("no").style(Style::default().fg(Color::DarkGray))
        };
        Row::new(vec![
            Cell::from(truncate_label(&room.name)),
            Cell::from(room.members.to_string()),
            master,
        ])
    });

    let table = Table::new(
        rows,
        [Constraint::Min(12), Constraint::Length(7), Constraint::Length(6)],
    )
    .header(
        Row::new(vec!["Room", "Members", "Master"])
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Rooms ({}) ", m.rooms.len())),
    );
    f.render_widget(table, area);
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Info => Color::Blue,
        LogLevel::Warning => Color::Yellow,
        LogLevel::Error => Color::Red,
        LogLevel::Connection => Color::Green,
        LogLevel::Room => Color::Magenta,
    }
}

fn log_item(entry: &LogEntry) -> ListItem<'_> {
    ListItem::new(Line::from(vec![
        Span::styled(
            entry.timestamp.format("%H:%M:%S ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{:<5} ", entry.level.as_str()),
            Style::default().fg(level_color(entry.level)),
        ),
        Span::raw(entry.message.as_str()),
    ]))
}

fn draw_activity(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let height = area.height.saturating_sub(2) as usize;
    let total = m.logs.len();

    let items: Vec<ListItem> = m
        .logs
        .iter()
        .rev()
        .skip(state.log_offset)
        .take(height)
        .map(log_item)
        .collect();

    let position = if state.follow {
        "live".to_string()
    } else {
        format!("{}/{}", total.saturating_sub(state.log_offset), total)
    };
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Activity [{}] ", position)),
    );
    f.render_widget(list, area);

    if total > height {
        let mut scroll = ScrollbarState::new(total)
            .position(total.saturating_sub(state.log_offset + height));
        f.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area.inner(Margin { vertical: 1, horizontal: 0 }),
            &mut scroll,
        );
    }
}

fn draw_key_hints(f: &mut Frame, area: Rect, state: &DashboardState) {
    let key_style = Style::default().fg(Color::Black).bg(Color::White);
    let mut spans: Vec<Span> = KEY_HINTS
        .iter()
        .flat_map(|(key, label)| [Span::styled(*key, key_style), Span::raw(*label)])
        .collect();

    let (follow, color) = if state.follow {
        ("on", Color::Green)
    } else {
        ("off", Color::Yellow)
    };
    spans.push(Span::styled(follow, Style::default().fg(color)));

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_scrolling_disables_follow() {
        let mut state = DashboardState::new();
        assert!(!state.handle_key(key(KeyCode::Up), 50));
        assert_eq!(state.log_offset, 1);
        assert!(!state.follow);

        state.handle_key(key(KeyCode::PageUp), 50);
        assert_eq!(state.log_offset, 11);

        state.handle_key(key(KeyCode::Home), 50);
        assert_eq!(state.log_offset, 49);

        state.handle_key(key(KeyCode::End), 50);
        assert_eq!(state.log_offset, 0);
        assert!(state.follow);
    }

    #[test]
    fn test_scrolling_with_no_logs() {
        let mut state = DashboardState::new();
        state.handle_key(key(KeyCode::Up), 0);
        assert_eq!(state.log_offset, 0);
        assert!(state.follow);
    }

    #[test]
    fn test_quit_keys() {
        let mut state = DashboardState::new();
        assert!(state.handle_key(key(KeyCode::Char('q')), 0));
        assert!(state.handle_key(key(KeyCode::Esc), 0));
        assert!(state.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), 0));
        assert!(!state.handle_key(key(KeyCode::Char('c')), 0));
    }
}
