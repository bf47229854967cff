//! Ratatui drawing for the install progress screens.

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap};
use ratatui::Frame;

use crate::screen::{Screen, View};

pub fn draw(frame: &mut Frame<'_>, screen: &Screen) {
    frame.render_widget(Clear, frame.area());
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    draw_header(frame, screen, layout[0]);
    if screen.log_view {
        draw_full_log(frame, screen, layout[1]);
    } else {
        match screen.view {
            View::Waiting => draw_waiting(frame, layout[1]),
            View::Progress => draw_progress(frame, screen, layout[1]),
        }
    }
    draw_footer(frame, screen, layout[2]);
}

fn draw_header(frame: &mut Frame<'_>, screen: &Screen, area: Rect) {
    let title = Paragraph::new(Text::from(vec![
        Line::from(Span::styled(
            screen.title.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(screen.excerpt.clone()),
    ]))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(title, area);
}

fn draw_waiting(frame: &mut Frame<'_>, area: Rect) {
    let hint = Paragraph::new(Line::from(vec![
        Span::raw("Press "),
        Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" to view installation progress."),
    ]))
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });
    frame.render_widget(hint, area);
}

fn draw_progress(frame: &mut Frame<'_>, screen: &Screen, area: Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5)])
        .split(area);

    let gauge_color = match &screen.status {
        Some(status) if status.is_error => Color::Red,
        _ if screen.completion.is_some() => Color::Green,
        _ => Color::Yellow,
    };
    let gauge = Gauge::default()
        .block(Block::default().title("Progress").borders(Borders::ALL))
        .gauge_style(Style::default().fg(gauge_color))
        .ratio(screen.progress_ratio());
    frame.render_widget(gauge, layout[0]);

    let (title, style) = match &screen.status {
        Some(status) if status.is_error => (
            status.text.as_str(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Some(status) => (
            status.text.as_str(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        None => ("", Style::default()),
    };
    let block = Block::default()
        .title(Span::styled(format!(" {title} "), style))
        .borders(Borders::ALL);
    let logs = render_log_tail(screen, layout[1]);
    frame.render_widget(Paragraph::new(logs).block(block), layout[1]);
}

fn draw_full_log(frame: &mut Frame<'_>, screen: &Screen, area: Rect) {
    let block = Block::default()
        .title(" Raw installer log ")
        .borders(Borders::ALL);
    let logs = render_log_tail(screen, area);
    frame.render_widget(Paragraph::new(logs).block(block), area);
}

fn draw_footer(frame: &mut Frame<'_>, screen: &Screen, area: Rect) {
    let mut keys = Vec::new();
    match (screen.view, screen.log_view) {
        (_, true) => push_key(&mut keys, "L", "close log"),
        (View::Waiting, false) => {
            push_key(&mut keys, "Enter", "show progress");
            push_key(&mut keys, "L", "full log");
        }
        (View::Progress, false) => push_key(&mut keys, "L", "full log"),
    }
    if let Some(completion) = screen.completion {
        if completion.reboot {
            push_key(&mut keys, "R", "reboot now");
        }
        if completion.exit_to_shell {
            push_key(&mut keys, "Q", "exit to shell");
        }
    }

    let footer = Paragraph::new(Text::from(vec![
        Line::from(truncate_to_width(
            &screen.footer,
            area.width.saturating_sub(2) as usize,
        )),
        Line::from(keys),
    ]))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, area);
}

fn push_key(spans: &mut Vec<Span<'static>>, key: &'static str, action: &'static str) {
    if !spans.is_empty() {
        spans.push(Span::raw("  "));
    }
    spans.push(Span::styled(
        key,
        Style::default().add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::raw(format!(" = {action}")));
}

/// Wrapped log lines that fit in `area`, newest at the bottom.
fn render_log_tail(screen: &Screen, area: Rect) -> Text<'static> {
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    let lines: Vec<&str> = screen.log_lines().collect();
    let mut out: Vec<Line<'static>> = Vec::new();
    for line in lines.iter().rev() {
        if out.len() >= inner_height {
            break;
        }
        for wrapped in wrap_line(line, inner_width).into_iter().rev() {
            out.push(Line::from(truncate_to_width(&wrapped, inner_width)));
        }
    }
    out.reverse();
    let overflow = out.len().saturating_sub(inner_height);
    Text::from(out.split_off(overflow))
}

fn wrap_line(line: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![String::new()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let sanitized = line.replace('\t', " ");

    for word in sanitized.split_whitespace() {
        let word_width = word.chars().count();
        if word_width > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.extend(break_long_word(word, width));
            continue;
        }

        let next_len = if current.is_empty() {
            word_width
        } else {
            current.chars().count() + 1 + word_width
        };
        if next_len > width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

// Counts chars, not terminal columns; wide glyphs may still misalign.
fn break_long_word(word: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(width.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width <= 3 {
        return text.chars().take(width).collect();
    }
    let mut out: String = text.chars().take(width - 3).collect();
    out.push_str("...");
    out
}
