//! TUI application state and main event loop

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::call::handle::CallHandle;
use crate::call::{CallSnapshot, CallState};

use super::ui;

/// Target frame rate for UI updates (~30 fps)
const FRAME_DURATION_MS: u64 = 33;

/// Application state
pub struct App {
    handle: CallHandle,
    /// Latest session snapshot, refreshed each frame
    pub snapshot: CallSnapshot,
    /// Whether the app should exit
    pub should_exit: bool,
}

impl App {
    fn new(handle: CallHandle) -> Self {
        let snapshot = handle.snapshot();
        Self {
            handle,
            snapshot,
            should_exit: false,
        }
    }

    fn refresh(&mut self) {
        self.snapshot = self.handle.snapshot();
    }

    /// Handle input events
    pub fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::from_millis(FRAME_DURATION_MS))? {
            match event::read()? {
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                    self.handle_key(key_event.code);
                }
                Event::Resize(_, _) => {
                    // Terminal resized - will be handled on next draw
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') => {
                self.handle.hang_up();
                self.should_exit = true;
            }
            KeyCode::Char('a') => {
                if self.snapshot.state() == CallState::IncomingRinging {
                    self.handle.accept_call();
                }
            }
            KeyCode::Char('d') => {
                if self.snapshot.state() == CallState::IncomingRinging {
                    self.handle.decline_call();
                }
            }
            KeyCode::Char('h') => self.handle.hang_up(),
            KeyCode::Char('m') => {
                let on = self.snapshot.devices.microphone_enabled;
                self.handle.set_microphone_enabled(!on);
            }
            KeyCode::Char('c') => {
                let on = self.snapshot.devices.camera_enabled;
                self.handle.set_camera_enabled(!on);
            }
            _ => {}
        }
    }

    /// Render the UI
    pub fn render(&self, frame: &mut ratatui::Frame) {
        ui::render(frame, self);
    }
}

/// Run the TUI application with panic-safe terminal restore
pub async fn run(handle: CallHandle) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = catch_unwind(AssertUnwindSafe(|| run_app(&mut terminal, handle)));
    ratatui::restore();

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

fn run_app(terminal: &mut DefaultTerminal, handle: CallHandle) -> Result<()> {
    let mut app = App::new(handle);

    while !app.should_exit {
        app.refresh();
        terminal.draw(|frame| app.render(frame))?;
        app.handle_events()?;
    }

    Ok(())
}
