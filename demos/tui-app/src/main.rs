//! Terminal client for a compile cloud backend.
//!
//! Run with: cargo run -p compile-cloud-tui -- --origin http://localhost:8080
//!
//! Keys: Ctrl+N connect, F5 or Ctrl+R run, Ctrl+S stop, Enter sends input,
//! Ctrl+C quits.

use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use ansi_to_tui::IntoText;
use anyhow::{Context, Result};
use clap::Parser;
use compile_cloud_core::{ClientConfig, Endpoint, EventStore, SessionEvent, Severity, Status};
use compile_cloud_session::{SessionHandle, SessionSnapshot};
use compile_cloud_transport::WebSocketTransport;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const DEFAULT_SOURCE: &str = r#"#include <stdio.h>

int main(void) {
    char name[64];
    printf("What is your name? ");
    fflush(stdout);
    if (scanf("%63s", name) == 1) {
        printf("\033[32mHello, %s!\033[0m\n", name);
    }
    return 0;
}
"#;

#[derive(Debug, Parser)]
#[command(name = "compile-cloud-tui", about = "Run C programs on a compile cloud backend")]
struct Args {
    /// Full WebSocket endpoint, e.g. ws://localhost:8080/terminal
    #[arg(long, env = "COMPILE_CLOUD_ENDPOINT")]
    endpoint: Option<String>,

    /// Page origin the endpoint is derived from
    #[arg(long, env = "COMPILE_CLOUD_ORIGIN", default_value = "http://localhost:8080")]
    origin: String,

    /// Delay before reconnecting after a stop
    #[arg(long, env = "COMPILE_CLOUD_RECONNECT_DELAY_MS", default_value_t = 500)]
    reconnect_delay_ms: u64,

    /// Source file to run; a built-in program is used when absent
    #[arg(long)]
    source: Option<PathBuf>,

    /// Write tracing output to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write every session event as a JSON line to this file on exit
    #[arg(long)]
    transcript: Option<PathBuf>,
}

impl Args {
    fn client_config(&self) -> Result<ClientConfig> {
        let endpoint = match &self.endpoint {
            Some(raw) => Endpoint::parse(raw)?,
            None => Endpoint::from_page_origin(&self.origin)?,
        };
        Ok(ClientConfig::new(endpoint)
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms)))
    }

    fn load_source(&self) -> Result<String> {
        match &self.source {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display())),
            None => Ok(DEFAULT_SOURCE.to_string()),
        }
    }
}

// The terminal is owned by the UI, so logs only go to a file.
fn init_logging(path: Option<&PathBuf>) -> Result<()> {
    let Some(path) = path else { return Ok(()) };
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;
    let config = args.client_config()?;
    let source = args.load_source()?;
    tracing::info!(endpoint = %config.endpoint, "starting compile cloud client");

    let store = Arc::new(EventStore::new());
    let (session, task) =
        compile_cloud_session::spawn(&config, WebSocketTransport::new(), Arc::clone(&store));

    // The draw loop is synchronous; bridge the store's stream into a channel it can drain.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut events = store.history_plus_stream();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if events_tx.send(event).is_err() {
                break;
            }
        }
    });

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config.endpoint.as_str(), source);
    let result = run_app(&mut terminal, &mut app, &session, events_rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let _ = session.shutdown();
    let _ = task.await;

    if let Some(path) = &args.transcript {
        write_transcript(path, &store.get_history())?;
    }
    result
}

fn write_transcript(path: &Path, events: &[SessionEvent]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    for event in events {
        writeln!(file, "{}", event.to_json_line()?)?;
    }
    tracing::info!(events = events.len(), path = %path.display(), "wrote transcript");
    Ok(())
}

struct App {
    endpoint: String,
    source: String,
    build_log: Vec<String>,
    output: String,
    input: String,
    output_scroll: u16,
    follow_output: bool,
    status: Status,
}

impl App {
    fn new(endpoint: &str, source: String) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            source,
            build_log: Vec::new(),
            output: String::new(),
            input: String::new(),
            output_scroll: 0,
            follow_output: true,
            status: Status::DISCONNECTED,
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StatusChanged { severity, label } => {
                self.status = Status::new(severity, label);
            }
            SessionEvent::RunStarted => {
                self.build_log.clear();
                self.output.clear();
                self.output_scroll = 0;
                self.follow_output = true;
            }
            SessionEvent::BuildLogAppended { text } => self.build_log.push(text),
            SessionEvent::OutputAppended { chunk } => self.output.push_str(&chunk),
            SessionEvent::RunEnded { outcome } => {
                let payload = outcome.as_payload();
                if payload.is_empty() {
                    self.build_log.push("[run finished]".to_string());
                } else {
                    self.build_log.push(format!("[run finished: {payload}]"));
                }
            }
            SessionEvent::ErrorReported { text } => {
                self.build_log.push(format!("[ERROR] {text}"));
            }
            SessionEvent::InputEchoed { text } => {
                self.output.push_str(&format!("\n[Input Sent: {text}]\n"));
            }
            SessionEvent::LocalNotice { text } => {
                self.build_log.push(format!("[System] {text}"));
            }
        }
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    session: &SessionHandle,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    session.connect()?;

    loop {
        while let Ok(event) = events.try_recv() {
            app.apply(event);
        }

        let snapshot = session.snapshot();
        terminal.draw(|f| ui(f, app, &snapshot))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match key {
            KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => return Ok(()),
            KeyEvent {
                code: KeyCode::Char('n'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => {
                if snapshot.controls.can_connect {
                    session.connect()?;
                }
            }
            KeyEvent {
                code: KeyCode::F(5),
                ..
            }
            | KeyEvent {
                code: KeyCode::Char('r'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => session.run(app.source.clone())?,
            KeyEvent {
                code: KeyCode::Char('s'),
                modifiers: KeyModifiers::CONTROL,
                ..
            } => session.stop()?,
            KeyEvent {
                code: KeyCode::Char(c),
                modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                ..
            } => {
                if snapshot.controls.input_enabled {
                    app.input.push(c);
                }
            }
            KeyEvent {
                code: KeyCode::Backspace,
                ..
            } => {
                app.input.pop();
            }
            KeyEvent {
                code: KeyCode::Enter,
                ..
            } => {
                if snapshot.controls.input_enabled {
                    session.send_input(std::mem::take(&mut app.input))?;
                }
            }
            KeyEvent {
                code: KeyCode::PageUp,
                ..
            } => {
                app.follow_output = false;
                app.output_scroll = app.output_scroll.saturating_sub(10);
            }
            KeyEvent {
                code: KeyCode::PageDown,
                ..
            } => {
                app.output_scroll = app.output_scroll.saturating_add(10);
            }
            KeyEvent {
                code: KeyCode::End,
                ..
            } => app.follow_output = true,
            _ => {}
        }
    }
}

const fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Ok => Color::Green,
        Severity::Warn => Color::Yellow,
        Severity::Err => Color::Red,
    }
}

/// Program output with its colour escapes applied.
fn output_text(raw: &str) -> Text<'static> {
    raw.into_text().unwrap_or_else(|err| {
        tracing::debug!(error = %err, "output is not valid ANSI, showing raw");
        Text::raw(raw.to_string())
    })
}

fn bottom_scroll(line_count: usize, height: u16) -> u16 {
    let visible = height.saturating_sub(2);
    u16::try_from(line_count)
        .unwrap_or(u16::MAX)
        .saturating_sub(visible)
}

fn ui(f: &mut Frame, app: &mut App, snapshot: &SessionSnapshot) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // Build log + output
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(f.area());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[0]);

    let build_lines: Vec<Line> = app.build_log.iter().map(|s| Line::from(s.as_str())).collect();
    let build_scroll = bottom_scroll(build_lines.len(), panes[0].height);
    let build_log = Paragraph::new(build_lines)
        .block(Block::default().borders(Borders::ALL).title("Build log"))
        .wrap(Wrap { trim: false })
        .scroll((build_scroll, 0));
    f.render_widget(build_log, panes[0]);

    let output_lines = output_text(&app.output);
    if app.follow_output {
        app.output_scroll = bottom_scroll(output_lines.lines.len(), panes[1].height);
    }
    let output = Paragraph::new(output_lines)
        .block(Block::default().borders(Borders::ALL).title("Output"))
        .wrap(Wrap { trim: false })
        .scroll((app.output_scroll, 0));
    f.render_widget(output, panes[1]);

    let input_style = if snapshot.controls.input_enabled {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let input = Paragraph::new(app.input.as_str())
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title("Input"));
    f.render_widget(input, rows[1]);

    if snapshot.controls.input_enabled {
        let width = u16::try_from(app.input.chars().count()).unwrap_or(u16::MAX);
        f.set_cursor_position((rows[1].x.saturating_add(width).saturating_add(1), rows[1].y + 1));
    }

    let key = |enabled: bool| {
        if enabled {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(
            app.status.label,
            Style::default()
                .fg(severity_color(app.status.severity))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" {} | ", app.endpoint)),
        Span::styled("^N", key(snapshot.controls.can_connect)),
        Span::raw(" connect "),
        Span::styled("F5", key(snapshot.controls.can_run)),
        Span::raw(" run "),
        Span::styled("^S", key(snapshot.controls.can_stop)),
        Span::raw(" stop "),
        Span::styled("^C", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ]));
    f.render_widget(status, rows[2]);
}

#[cfg(test)]
mod tests {
    use compile_cloud_core::RunOutcome;

    use super::*;

    #[test]
    fn test_run_started_clears_panes() {
        let mut app = App::new("ws://localhost:8080/terminal", String::new());
        app.apply(SessionEvent::BuildLogAppended { text: "old".into() });
        app.apply(SessionEvent::OutputAppended { chunk: "old".into() });
        app.apply(SessionEvent::RunStarted);
        assert!(app.build_log.is_empty());
        assert!(app.output.is_empty());
    }

    #[test]
    fn test_events_render_into_panes() {
        let mut app = App::new("ws://localhost:8080/terminal", String::new());
        app.apply(SessionEvent::status(Status::RUNNING));
        app.apply(SessionEvent::OutputAppended { chunk: "Name? ".into() });
        app.apply(SessionEvent::InputEchoed { text: "Ada".into() });
        app.apply(SessionEvent::RunEnded {
            outcome: RunOutcome::Success,
        });
        app.apply(SessionEvent::ErrorReported { text: "boom".into() });

        assert_eq!(app.status, Status::RUNNING);
        assert_eq!(app.output, "Name? \n[Input Sent: Ada]\n");
        assert_eq!(app.build_log, ["[run finished: SUCCESS]", "[ERROR] boom"]);
    }

    #[test]
    fn test_output_colours() {
        let text = output_text("\u{1b}[31;1m*** PROCESS KILLED ***\u{1b}[0m\n\u{1b}[38;5;208mhot");
        assert_eq!(text.lines.len(), 2);

        let killed = &text.lines[0].spans[0];
        assert_eq!(killed.content, "*** PROCESS KILLED ***");
        assert_eq!(killed.style.fg, Some(Color::Red));
        assert!(killed.style.add_modifier.contains(Modifier::BOLD));

        let hot = &text.lines[1].spans[0];
        assert_eq!(hot.content, "hot");
        assert_eq!(hot.style.fg, Some(Color::Indexed(208)));
    }

    #[test]
    fn test_transcript_is_json_lines() {
        let dir = std::env::temp_dir().join(format!("compile-cloud-tui-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("transcript.jsonl");

        write_transcript(
            &path,
            &[
                SessionEvent::RunStarted,
                SessionEvent::OutputAppended { chunk: "hi".into() },
            ],
        )
        .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            [
                r#"{"type":"run_started"}"#,
                r#"{"type":"output_appended","chunk":"hi"}"#
            ]
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_endpoint_flag_wins_over_origin() {
        let args = Args::parse_from([
            "compile-cloud-tui",
            "--endpoint",
            "wss://example.com/terminal",
            "--origin",
            "http://other:8080",
        ]);
        let config = args.client_config().unwrap();
        assert_eq!(config.endpoint.as_str(), "wss://example.com/terminal");
    }
}
