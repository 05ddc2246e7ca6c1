//! UI rendering for the in-call screen

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};

use crate::call::{CallSnapshot, CallState};

use super::app::App;

/// Returns status indicator symbol and color for the current call state
fn state_indicator(state: CallState) -> (&'static str, Color) {
    match state {
        CallState::Connected => ("*", Color::Green),
        CallState::Connecting => ("~", Color::Yellow),
        CallState::OutgoingRinging | CallState::IncomingRinging => ("o", Color::Yellow),
        CallState::Ending | CallState::Ended | CallState::Failed | CallState::Idle => {
            ("-", Color::Gray)
        }
    }
}

fn state_label(snapshot: &CallSnapshot) -> String {
    match snapshot.state() {
        CallState::Idle => "No call".to_string(),
        CallState::OutgoingRinging => {
            let peer = snapshot
                .pending_invite
                .as_ref()
                .map(|i| i.peer_display_name.as_str())
                .unwrap_or("peer");
            format!("Calling {}...", peer)
        }
        CallState::IncomingRinging => {
            let peer = snapshot
                .pending_invite
                .as_ref()
                .map(|i| i.peer_display_name.as_str())
                .unwrap_or("peer");
            format!("Incoming call from {}: (a)ccept / (d)ecline", peer)
        }
        CallState::Connecting => "Connecting...".to_string(),
        CallState::Connected => "In call".to_string(),
        CallState::Ending => "Ending...".to_string(),
        CallState::Ended | CallState::Failed => snapshot
            .session
            .as_ref()
            .and_then(|s| s.end_reason)
            .map(|r| r.describe().to_string())
            .unwrap_or_else(|| "Call ended".to_string()),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Layout: header (1 line) + participant list + status bar (1 line)
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);
    render_participants(main_area, frame.buffer_mut(), app);
    render_status(status_area, frame.buffer_mut(), app);
}

/// Render the header bar
fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = Span::styled(
        " Huddle Call",
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let (symbol, color) = state_indicator(app.snapshot.state());
    let state = Span::styled(
        format!(" {} {} ", symbol, state_label(&app.snapshot)),
        Style::default().fg(color),
    );

    let header = Paragraph::new(Line::from(vec![title, Span::raw("  "), state]))
        .style(Style::default().bg(Color::DarkGray));
    header.render(area, buf);
}

/// Render the participant roster
fn render_participants(area: Rect, buf: &mut Buffer, app: &App) {
    let block = Block::default().borders(Borders::ALL).title(" Participants ");
    let inner = block.inner(area);
    block.render(area, buf);

    let Some(session) = app.snapshot.session.as_ref() else {
        Paragraph::new("No active call. Press q to quit.").render(inner, buf);
        return;
    };

    let mut participants: Vec<_> = session.participants.values().collect();
    participants.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let lines: Vec<Line> = participants
        .iter()
        .map(|p| {
            let speaking = if p.is_speaking { "*" } else { " " };
            let mic = if p.mic_enabled { "mic" } else { "---" };
            let cam = if p.cam_enabled { "cam" } else { "---" };
            let admin = if p.is_admin { " @" } else { "" };
            let name = if p.display_name.is_empty() {
                p.participant_id.as_str()
            } else {
                p.display_name.as_str()
            };

            let name_style = if p.is_speaking {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            Line::from(vec![
                Span::raw(format!(" {} ", speaking)),
                Span::styled(name.to_string(), name_style),
                Span::styled(admin.to_string(), Style::default().fg(Color::Yellow)),
                Span::styled(
                    format!("  [{}] [{}]", mic, cam),
                    Style::default().fg(Color::Gray),
                ),
            ])
        })
        .collect();

    Paragraph::new(lines).render(inner, buf);
}

/// Render the status bar
fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    // A notice takes the whole bar when present.
    if let Some(ref notice) = app.snapshot.notice {
        let line = Line::from(Span::styled(
            format!(" {} ", notice),
            Style::default().fg(Color::Yellow).bg(Color::DarkGray),
        ));
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let mic = if app.snapshot.devices.microphone_enabled {
        "mic on"
    } else {
        "mic off"
    };
    let cam = if app.snapshot.devices.camera_enabled {
        "cam on"
    } else {
        "cam off"
    };

    let sep_style = Style::default().fg(Color::DarkGray);
    let status_line = Line::from(vec![
        Span::styled(format!(" {} ", mic), Style::default().fg(Color::Cyan)),
        Span::styled("| ", sep_style),
        Span::styled(format!("{} ", cam), Style::default().fg(Color::Cyan)),
        Span::styled("| ", sep_style),
        Span::styled(
            "m: mic  c: cam  h: hang up  q: quit",
            Style::default().fg(Color::Gray),
        ),
    ]);

    Paragraph::new(status_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
