//! Kiosk TUI - full-screen check-in display
//!
//! Runs the scan coordinator in-process and renders its screen state:
//! - Result panel (green welcome / red failure), hidden after the dwell
//! - Scanner status and operator notices
//! - Session selector (Tab cycles the configured sessions)
//! - Roster sync (F5 opens a masked password prompt)
//!
//! The terminal acts as a keyboard-wedge scanner: typed characters followed
//! by Enter are one scan.

use checkin_kiosk::domain::types::{ResultStyle, ScannerStatus, ScreenState};
use checkin_kiosk::infra::{Config, Metrics};
use checkin_kiosk::io::{BackendClient, ChannelScanner, DecoderSource};
use checkin_kiosk::services::{ScanCoordinator, SessionSelector, SyncStatus, SyncTrigger};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// Kiosk TUI - full-screen check-in display
#[derive(Parser, Debug)]
#[command(name = "kiosk-tui", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/kiosk.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the backend base URL from the config file
    #[arg(long)]
    backend_url: Option<String>,

    /// Session class to start with
    #[arg(short, long)]
    session: Option<String>,
}

/// Longest scan the input line accepts
const MAX_INPUT_LEN: usize = 256;

/// What a key press asks the main loop to do
#[derive(Debug, PartialEq, Eq)]
enum Action {
    None,
    Quit,
    Scan(String),
    CycleSession,
    Sync(String),
}

/// Input state local to the terminal
#[derive(Debug, Default)]
struct InputState {
    /// Characters typed since the last Enter
    scan_buffer: String,
    /// `Some` while the sync password prompt is open
    password: Option<String>,
    sync_enabled: bool,
}

impl InputState {
    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Action::Quit;
        }

        if let Some(password) = self.password.as_mut() {
            match key.code {
                KeyCode::Char(c) => password.push(c),
                KeyCode::Backspace => {
                    password.pop();
                }
                KeyCode::Enter => {
                    let password = self.password.take().unwrap_or_default();
                    if !password.is_empty() {
                        return Action::Sync(password);
                    }
                }
                KeyCode::Esc => self.password = None,
                _ => {}
            }
            return Action::None;
        }

        match key.code {
            KeyCode::Esc => Action::Quit,
            KeyCode::Tab => Action::CycleSession,
            KeyCode::F(5) if self.sync_enabled => {
                self.password = Some(String::new());
                Action::None
            }
            KeyCode::Char(c) => {
                if self.scan_buffer.len() < MAX_INPUT_LEN {
                    self.scan_buffer.push(c);
                }
                Action::None
            }
            KeyCode::Backspace => {
                self.scan_buffer.pop();
                Action::None
            }
            KeyCode::Enter => Action::Scan(std::mem::take(&mut self.scan_buffer)),
            _ => Action::None,
        }
    }
}

/// Snapshot handed to the draw functions
struct View<'a> {
    site: &'a str,
    screen: &'a ScreenState,
    sync: &'a SyncStatus,
    input: &'a InputState,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(Config::resolve_config_path);
    let mut config = Config::load_from_path(&config_path);
    if let Some(url) = &args.backend_url {
        config = config.with_backend_url(url);
    }

    let metrics = Arc::new(Metrics::new());
    let client = Arc::new(BackendClient::new(&config)?);

    let sessions = SessionSelector::new(&config);
    if let Some(session) = &args.session {
        sessions.select(session)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let coordinator =
        ScanCoordinator::new(&config, client.clone(), sessions.subscribe(), metrics.clone());
    let screen_rx = coordinator.subscribe();

    let trigger = Arc::new(SyncTrigger::new(client, metrics));
    let sync_rx = trigger.subscribe();

    let (scan_tx, scanner) = ChannelScanner::channel(32);
    let (event_tx, event_rx) = mpsc::channel(64);
    let settings = config.scan_settings().clone();
    let scanner_shutdown = shutdown_rx.clone();
    let scanner_handle = tokio::spawn(async move {
        Box::new(scanner).start(settings, event_tx, scanner_shutdown).await;
    });
    let coordinator_handle = tokio::spawn(coordinator.run(event_rx, shutdown_rx));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut input = InputState { sync_enabled: config.sync_enabled(), ..InputState::default() };
    let result = run_ui(
        &mut terminal,
        config.site_id(),
        &mut input,
        screen_rx,
        sync_rx,
        &sessions,
        &scan_tx,
        &trigger,
    )
    .await;

    let _ = shutdown_tx.send(true);
    drop(scan_tx);
    scanner_handle.abort();
    coordinator_handle.abort();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    site: &str,
    input: &mut InputState,
    screen_rx: watch::Receiver<ScreenState>,
    sync_rx: watch::Receiver<SyncStatus>,
    sessions: &SessionSelector,
    scan_tx: &mpsc::Sender<String>,
    trigger: &Arc<SyncTrigger<BackendClient>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        let screen = screen_rx.borrow().clone();
        let sync = sync_rx.borrow().clone();
        terminal.draw(|f| {
            draw_ui(f, &View { site, screen: &screen, sync: &sync, input: &*input })
        })?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match input.handle_key(key) {
                        Action::None => {}
                        Action::Quit => return Ok(()),
                        Action::Scan(text) => {
                            // A full channel drops the read, like a camera frame that was never decoded
                            let _ = scan_tx.try_send(text);
                        }
                        Action::CycleSession => {
                            sessions.cycle_next();
                        }
                        Action::Sync(password) => {
                            let trigger = trigger.clone();
                            tokio::spawn(async move {
                                trigger.trigger(Some(password.as_str())).await;
                            });
                        }
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn draw_ui(f: &mut Frame, view: &View) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Scanner status / notice
            Constraint::Min(5),    // Result
            Constraint::Length(3), // Input line
            Constraint::Length(3), // Sync status
        ])
        .split(f.area());

    draw_header(f, chunks[0], view);
    draw_status_panel(f, chunks[1], view);
    draw_result_panel(f, chunks[2], view);
    draw_input_panel(f, chunks[3], view);
    draw_sync_panel(f, chunks[4], view);
}

fn draw_header(f: &mut Frame, area: Rect, view: &View) {
    let (session_text, session_color) = match &view.screen.session {
        Some(s) => (s.clone(), Color::Yellow),
        None => ("none".to_string(), Color::Red),
    };

    let mut spans = vec![
        Span::styled("Check-in Kiosk ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("| "),
        Span::raw(view.site.to_string()),
        Span::raw(" | Session: "),
        Span::styled(session_text, Style::default().fg(session_color)),
        Span::raw(" | Tab: session"),
    ];
    if view.input.sync_enabled {
        spans.push(Span::raw(" | F5: sync"));
    }
    spans.push(Span::raw(" | Esc: quit"));

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_status_panel(f: &mut Frame, area: Rect, view: &View) {
    let line = match (&view.screen.notice, &view.screen.scanner) {
        (_, ScannerStatus::Failed(message)) => {
            Line::from(Span::styled(message.clone(), Style::default().fg(Color::Red)))
        }
        (Some(notice), _) => Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        (None, ScannerStatus::Loading) => {
            Line::from(Span::styled("Starting scanner…", Style::default().fg(Color::Gray)))
        }
        (None, ScannerStatus::Ready) => {
            Line::from(Span::styled("Scanner ready", Style::default().fg(Color::Green)))
        }
    };

    let status = Paragraph::new(line)
        .block(Block::default().title(" Scanner ").borders(Borders::ALL));
    f.render_widget(status, area);
}

fn draw_result_panel(f: &mut Frame, area: Rect, view: &View) {
    let block = Block::default().title(" Result ").borders(Borders::ALL);

    let paragraph = match &view.screen.result {
        Some(result) => {
            let bg = match result.style {
                ResultStyle::Success => Color::Green,
                ResultStyle::Failure => Color::Red,
            };
            // Vertically centre the message inside the block
            let pad = area.height.saturating_sub(3) / 2;
            let mut lines: Vec<Line> = (0..pad).map(|_| Line::from("")).collect();
            lines.push(Line::from(Span::styled(
                result.message.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            )));
            Paragraph::new(lines)
                .style(Style::default().bg(bg))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .block(block.border_style(Style::default().fg(bg)))
        }
        None => Paragraph::new(Line::from(Span::styled(
            "Scan your QR code",
            Style::default().fg(Color::DarkGray),
        )))
        .alignment(Alignment::Center)
        .block(block),
    };

    f.render_widget(paragraph, area);
}

fn draw_input_panel(f: &mut Frame, area: Rect, view: &View) {
    let (title, text) = match &view.input.password {
        Some(password) => (" Sync password (Enter: sync, Esc: cancel) ", "*".repeat(password.chars().count())),
        None => (" Scan ", view.input.scan_buffer.clone()),
    };

    let input = Paragraph::new(Line::from(vec![Span::raw(text), Span::styled("_", Style::default().fg(Color::DarkGray))]))
        .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(input, area);
}

fn draw_sync_panel(f: &mut Frame, area: Rect, view: &View) {
    let color = match view.sync {
        SyncStatus::Idle => Color::DarkGray,
        SyncStatus::Pending => Color::Yellow,
        SyncStatus::Done(result) => match result.style {
            ResultStyle::Success => Color::Green,
            ResultStyle::Failure => Color::Red,
        },
    };

    let sync = Paragraph::new(Line::from(Span::styled(view.sync.text().to_string(), Style::default().fg(color))))
        .block(Block::default().title(" Sync ").borders(Borders::ALL));
    f.render_widget(sync, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_str(input: &mut InputState, s: &str) {
        for c in s.chars() {
            assert_eq!(input.handle_key(press(KeyCode::Char(c))), Action::None);
        }
    }

    #[test]
    fn test_typed_line_becomes_scan() {
        let mut input = InputState::default();
        type_str(&mut input, "5551234");
        input.handle_key(press(KeyCode::Backspace));
        assert_eq!(input.handle_key(press(KeyCode::Enter)), Action::Scan("555123".to_string()));
        assert!(input.scan_buffer.is_empty());
    }

    #[test]
    fn test_sync_prompt_requires_sync_enabled() {
        let mut input = InputState::default();
        input.handle_key(press(KeyCode::F(5)));
        assert!(input.password.is_none());

        input.sync_enabled = true;
        input.handle_key(press(KeyCode::F(5)));
        assert_eq!(input.password.as_deref(), Some(""));
    }

    #[test]
    fn test_sync_prompt_submit_and_cancel() {
        let mut input = InputState { sync_enabled: true, ..InputState::default() };

        input.handle_key(press(KeyCode::F(5)));
        type_str(&mut input, "secret");
        assert_eq!(input.handle_key(press(KeyCode::Enter)), Action::Sync("secret".to_string()));
        assert!(input.password.is_none());

        input.handle_key(press(KeyCode::F(5)));
        type_str(&mut input, "oops");
        assert_eq!(input.handle_key(press(KeyCode::Esc)), Action::None);
        assert!(input.password.is_none());

        // Empty submission closes the prompt without a request
        input.handle_key(press(KeyCode::F(5)));
        assert_eq!(input.handle_key(press(KeyCode::Enter)), Action::None);
        assert!(input.password.is_none());
    }

    #[test]
    fn test_prompt_keys_do_not_reach_scan_buffer() {
        let mut input = InputState { sync_enabled: true, ..InputState::default() };
        input.handle_key(press(KeyCode::F(5)));
        type_str(&mut input, "pw");
        input.handle_key(press(KeyCode::Esc));
        assert!(input.scan_buffer.is_empty());
    }

    #[test]
    fn test_quit_keys() {
        let mut input = InputState::default();
        assert_eq!(input.handle_key(press(KeyCode::Esc)), Action::Quit);
        assert_eq!(
            input.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Action::Quit
        );
        assert_eq!(input.handle_key(press(KeyCode::Tab)), Action::CycleSession);
    }
}
