// Single-page interactive shell: type a username, press Enter, and the
// profile is fetched on a background thread while the UI keeps drawing.
//
// Every Enter spawns its own worker. Workers are not deduplicated or
// cancelled; whichever finishes last owns the output pane.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use serde_json::json;

use crate::api::ScratchApi;
use crate::error::Error;
use crate::fetch::fetch_public_profile;

/// Fetch `username` and describe the result as text for the output pane.
pub fn fetch_summary(api: &dyn ScratchApi, username: &str) -> String {
    match fetch_public_profile(api, username) {
        Ok(record) => {
            let summary = json!({
                "id": record.id,
                "username": record.username,
                "about_me": record.about_me,
                "wiwo": record.wiwo,
                "country": record.country,
                "join_date": record.join_date,
            });
            serde_json::to_string_pretty(&summary).unwrap_or_else(|e| format!("Error: {}", e))
        }
        Err(e @ Error::Retrieval { .. }) => format!("Failed to fetch user: {}", e),
        Err(e) => format!("Error: {}", e),
    }
}

/// Fetch on a new thread and hand the text to `on_done` from that thread.
pub fn spawn_fetch<F>(api: Arc<dyn ScratchApi>, username: String, on_done: F) -> JoinHandle<()>
where
    F: FnOnce(String) + Send + 'static,
{
    thread::spawn(move || {
        let text = fetch_summary(api.as_ref(), &username);
        on_done(text);
    })
}

pub struct Shell {
    api: Arc<dyn ScratchApi>,
    pub input: String,
    pub output: String,
    pub should_quit: bool,
    results_tx: Sender<String>,
    results_rx: Receiver<String>,
}

impl Shell {
    pub fn new(api: Arc<dyn ScratchApi>) -> Self {
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            api,
            input: String::new(),
            output: "Ready.".into(),
            should_quit: false,
            results_tx,
            results_rx,
        }
    }

    /// Start a fetch for the current input.
    pub fn submit(&mut self) -> Option<JoinHandle<()>> {
        let username = self.input.trim().to_string();
        if username.is_empty() {
            self.output = "Please enter a username".into();
            return None;
        }
        self.output = "Fetching...".into();
        let tx = self.results_tx.clone();
        Some(spawn_fetch(self.api.clone(), username, move |text| {
            // The receiver only disappears when the shell is closing.
            let _ = tx.send(text);
        }))
    }

    /// Pull finished results into the output pane. Returns whether anything
    /// arrived.
    pub fn drain_results(&mut self) -> bool {
        let mut changed = false;
        while let Ok(text) = self.results_rx.try_recv() {
            self.output = text;
            changed = true;
        }
        changed
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            KeyCode::Enter => {
                self.submit();
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    pub fn draw(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(frame.area());

        let input = Paragraph::new(Line::from(vec![
            Span::raw(self.input.as_str()),
            Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Username "),
        );
        frame.render_widget(input, chunks[0]);

        let output = Paragraph::new(self.output.as_str())
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Scratch user info "),
            );
        frame.render_widget(output, chunks[1]);

        let hints = Paragraph::new(Line::from(vec![
            Span::styled("Enter", Style::default().fg(Color::Cyan)),
            Span::raw(" fetch  "),
            Span::styled("Esc", Style::default().fg(Color::Cyan)),
            Span::raw(" quit"),
        ]));
        frame.render_widget(hints, chunks[2]);
    }

    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        while !self.should_quit {
            self.drain_results();
            terminal.draw(|frame| self.draw(frame))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }
        }
        Ok(())
    }
}
