use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::api::RecruitingApi;
use crate::interviews;
use crate::models::{InterviewStatus, OfferStatus, StageType};
use crate::offers;
use crate::screen::{ApplicationScreen, Dialog, LoadState, Severity};

pub fn run_review(api: &dyn RecruitingApi, application_id: &str) -> Result<()> {
    let mut screen = ApplicationScreen::new(api, application_id);
    screen.load();

    match &screen.state {
        LoadState::NotFound(msg) | LoadState::Failed(msg) => {
            println!("{}", msg);
            return Ok(());
        }
        LoadState::Loading | LoadState::Ready => {}
    }

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut screen);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    screen: &mut ApplicationScreen,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select(if screen.available_transitions().is_empty() {
            None
        } else {
            Some(screen.selected_transition)
        });
        terminal.draw(|frame| draw(frame, screen, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            if screen.dialog.is_some() {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Enter => screen.confirm(),
                    KeyCode::Char('n') | KeyCode::Esc => screen.close_dialog(),
                    _ => {}
                }
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => screen.select_next(),
                KeyCode::Up | KeyCode::Char('k') => screen.select_prev(),
                KeyCode::Enter | KeyCode::Char('m') => screen.open_transition_dialog(),
                KeyCode::Char('a') => screen.open_offer_dialog(true),
                KeyCode::Char('x') => screen.open_offer_dialog(false),
                KeyCode::Char('c') => screen.open_cancel_interview_dialog(),
                KeyCode::Char('r') => screen.reload(),
                _ => {}
            }
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, screen: &ApplicationScreen, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
        .split(frame.area());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[0]);

    // Left panel: moves available from the current stage
    let items: Vec<ListItem> = screen
        .available_transitions()
        .iter()
        .map(|t| {
            let to = screen.stage_name(&t.to_stage_key);
            ListItem::new(format!("{} -> {}", screen.stage_name(&t.from_stage_key), to))
        })
        .collect();

    let title = match screen.current_stage() {
        Some(stage) => format!(" Move from {} ", stage.name),
        None => " Move ".to_string(),
    };
    let list = if items.is_empty() {
        List::new(vec![ListItem::new("(terminal stage)")])
    } else {
        List::new(items)
    }
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: application detail
    let detail = Paragraph::new(build_detail(screen))
        .block(Block::default().borders(Borders::ALL).title(" Application "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, chunks[1]);

    if let Some(toast) = screen.last_toast() {
        let color = match toast.severity {
            Severity::Success => Color::Green,
            Severity::Warning => Color::Yellow,
            Severity::Error => Color::Red,
        };
        let line = Paragraph::new(format!(" {}", toast.message)).style(Style::default().fg(color));
        frame.render_widget(line, rows[1]);
    }

    let help = Paragraph::new(
        " j/k:select  enter:move  a:accept offer  x:reject offer  c:cancel interview  r:reload  q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[2]);

    if let Some(dialog) = &screen.dialog {
        draw_dialog(frame, screen, dialog);
    }
}

fn draw_dialog(frame: &mut Frame, screen: &ApplicationScreen, dialog: &Dialog) {
    let question = match dialog {
        Dialog::ConfirmTransition { to_stage_key } => {
            format!("Move application to {}?", screen.stage_name(to_stage_key))
        }
        Dialog::RespondToOffer { offer_id, accept } => {
            let verb = if *accept { "Accept" } else { "Reject" };
            format!("{} candidate offer #{}?", verb, offer_id)
        }
        Dialog::CancelInterview { interview_id } => {
            format!("Cancel interview #{}?", interview_id)
        }
    };

    let area = centered(frame.area(), 50, 5);
    frame.render_widget(Clear, area);
    let body = Paragraph::new(vec![
        Line::from(question),
        Line::from(""),
        Line::from(Span::styled("y: confirm   n: back", Style::default().fg(Color::DarkGray))),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Confirm "));
    frame.render_widget(body, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn build_detail<'a>(screen: &'a ApplicationScreen) -> Text<'a> {
    let Some(app) = screen.application.as_ref() else {
        return Text::raw("Loading...");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        format!("Application #{} - candidate {}", app.id, app.candidate_id),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("Applied: {}  (v{})", app.applied_date, app.version)));

    if let Some(stage) = screen.current_stage() {
        let stage_style = match stage.stage_type {
            StageType::Offer => Style::default().fg(Color::Yellow),
            StageType::Hired => Style::default().fg(Color::Green),
            StageType::Rejected => Style::default().fg(Color::Red),
            _ => Style::default().fg(Color::Cyan),
        };
        lines.push(Line::from(Span::styled(
            format!("Stage: {} [{}]  Status: {}", stage.name, stage.stage_type, app.status),
            stage_style,
        )));
    }
    lines.push(Line::from(""));

    // Interviews
    lines.push(Line::from(Span::styled(
        format!("Interviews ({})", app.interviews.len()),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for interview in &app.interviews {
        let marker = if interviews::can_modify(interview) { "*" } else { " " };
        let place = interview
            .format
            .location()
            .or(interview.format.meeting_link())
            .unwrap_or("");
        let status_style = match interview.status {
            InterviewStatus::Completed => Style::default().fg(Color::Green),
            InterviewStatus::Cancelled => Style::default().fg(Color::DarkGray),
            _ => Style::default(),
        };
        lines.push(Line::from(Span::styled(
            format!(
                " {} #{} {} {} ({}, {}m) {} {}",
                marker,
                interview.id,
                interview.scheduled_date.format("%Y-%m-%d %H:%M"),
                interview.interviewer_name,
                interview.format.kind(),
                interview.duration,
                interview.status.as_str(),
                place
            ),
            status_style,
        )));
        if let Some(feedback) = &interview.feedback {
            lines.push(Line::from(format!(
                "     {}/5 {}",
                feedback.rating, feedback.recommendation
            )));
            for line in textwrap::fill(&feedback.comments, 60).lines() {
                lines.push(Line::from(format!("     {}", line)));
            }
        }
    }
    lines.push(Line::from(""));

    // Offers, newest first
    lines.push(Line::from(Span::styled(
        format!("Offers ({})", app.offers.len()),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for (idx, offer) in screen.offers_newest_first().into_iter().enumerate() {
        let from = if offer.is_offered_by_candidate { "candidate" } else { "us" };
        let marker = if offers::can_respond(offer, idx) { "!" } else { " " };
        let style = match offer.status {
            OfferStatus::Accepted => Style::default().fg(Color::Green),
            OfferStatus::Pending => Style::default().fg(Color::Yellow),
            _ => Style::default().fg(Color::DarkGray),
        };
        lines.push(Line::from(Span::styled(
            format!(
                " {} #{} {:.0} {} from {} - {}",
                marker,
                offer.id,
                offer.salary,
                offer.currency,
                from,
                offer.status.as_str()
            ),
            style,
        )));
    }
    lines.push(Line::from(""));

    // History
    lines.push(Line::from(Span::styled(
        "History",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for entry in app.status_history.iter().rev() {
        lines.push(Line::from(format!(
            "  {} {}",
            entry.changed_at.format("%Y-%m-%d %H:%M"),
            entry.reason
        )));
    }

    Text::from(lines)
}
