use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Line as CanvasLine, Rectangle};
use ratatui::widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table};
use ratatui::Frame;

use super::app::{App, AudioStatus, PaneArea, View, CANVAS_HEIGHT, CANVAS_WIDTH};
use crate::format::{format_duration, format_time};
use crate::lyrics::DisplayEntry;
use crate::waveform::{envelope_trace, playhead};

const ACCENT: Color = Color::Cyan;
const DIM: Color = Color::DarkGray;
const WAVE_COLOR: Color = Color::Blue;
const LINE_COLOR: Color = Color::Green;
const BACKUP_COLOR: Color = Color::Magenta;
const SELECTED_COLOR: Color = Color::Yellow;
const PLAYHEAD_COLOR: Color = Color::Red;
const REJECTION_COLOR: Color = Color::LightRed;
const ERROR_COLOR: Color = Color::Red;
const PROGRESS_COLOR: Color = Color::Yellow;

pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Header
            Constraint::Length(12), // Waveform
            Constraint::Min(5),     // Lyrics + meters
            Constraint::Length(1),  // Status
            Constraint::Length(1),  // Footer
        ])
        .split(frame.area());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(28)])
        .split(chunks[2]);

    render_header(frame, app, chunks[0]);
    render_waveform(frame, app, chunks[1]);
    render_lyrics(frame, app, body[0]);
    render_meters(frame, app, body[1]);
    render_status(frame, app, chunks[3]);
    render_footer(frame, app, chunks[4]);

    // Overlays
    match app.view {
        View::About => render_about_overlay(frame, app),
        View::ConfirmDelete => render_confirm_overlay(frame, "Delete the selected line?"),
        View::ConfirmReset => render_confirm_overlay(frame, "Discard all edits?"),
        View::EditText => render_edit_overlay(frame, app),
        View::Main => {}
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let unsaved = if app.has_unsaved_edits() { " [unsaved]" } else { "" };
    let text = vec![Line::from(vec![
        Span::styled("Song: ", Style::default().fg(DIM)),
        Span::styled(
            app.title(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(unsaved, Style::default().fg(PROGRESS_COLOR)),
        Span::raw("  "),
        Span::styled("File: ", Style::default().fg(DIM)),
        Span::styled(app.song_path.display().to_string(), Style::default().fg(DIM)),
    ])];

    let block = Block::default()
        .title(Span::styled(
            " Karaoke Editor ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));

    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_waveform(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = match &app.audio_status {
        AudioStatus::None => " No audio ".to_string(),
        AudioStatus::Loading(pct) => format!(" Loading audio {:>3}% ", (pct * 100.0) as u32),
        AudioStatus::Ready => format!(" Waveform {} ", format_duration(app.waveform.duration())),
        AudioStatus::Error(msg) => format!(" Audio error: {} ", msg),
    };
    let title_color = match app.audio_status {
        AudioStatus::Error(_) => ERROR_COLOR,
        AudioStatus::Loading(_) => PROGRESS_COLOR,
        _ => DIM,
    };
    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(title_color)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));

    let inner = block.inner(area);
    app.waveform_area = PaneArea {
        x: inner.x,
        y: inner.y,
        width: inner.width,
        height: inner.height,
    };

    // Geometry works top-down; the canvas y axis points up.
    let flip = |y: f64| CANVAS_HEIGHT - y;
    let trace = app
        .waveform
        .envelope()
        .map(|e| envelope_trace(e, CANVAS_WIDTH as usize, CANVAS_HEIGHT))
        .unwrap_or_default();
    let rects = app.lyric_rects();
    let selected = app.selected_line();
    let marker = playhead(app.position, app.waveform.duration(), CANVAS_WIDTH, CANVAS_HEIGHT);

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, CANVAS_WIDTH])
        .y_bounds([0.0, CANVAS_HEIGHT])
        .paint(move |ctx| {
            for col in &trace {
                ctx.draw(&CanvasLine {
                    x1: col.x,
                    y1: flip(col.top),
                    x2: col.x,
                    y2: flip(col.bottom),
                    color: WAVE_COLOR,
                });
            }
            ctx.layer();

            for rect in &rects {
                let color = if Some(rect.line) == selected {
                    SELECTED_COLOR
                } else if rect.backup {
                    BACKUP_COLOR
                } else {
                    LINE_COLOR
                };
                ctx.draw(&Rectangle {
                    x: rect.x,
                    y: flip(rect.y + rect.height),
                    width: rect.width,
                    height: rect.height,
                    color,
                });
            }

            if let Some(p) = marker {
                ctx.draw(&CanvasLine {
                    x1: p.x,
                    y1: 0.0,
                    x2: p.x,
                    y2: p.height,
                    color: PLAYHEAD_COLOR,
                });
                for y in [0.0, p.height] {
                    ctx.draw(&CanvasLine {
                        x1: p.x - p.tick,
                        y1: y,
                        x2: p.x + p.tick,
                        y2: y,
                        color: PLAYHEAD_COLOR,
                    });
                }
            }
        });

    frame.render_widget(canvas, area);
}

fn render_lyrics(frame: &mut Frame, app: &mut App, area: Rect) {
    // 2 for borders, 1 for header
    let inner_height = area.height.saturating_sub(3) as usize;
    app.visible_rows = inner_height;

    let entries = app.entries();
    let total = entries.len();
    let scroll_info = if total > inner_height {
        format!(
            " [{}-{}/{}] ",
            app.scroll_offset + 1,
            (app.scroll_offset + inner_height).min(total),
            total
        )
    } else {
        String::new()
    };

    let header = Row::new(vec![
        Cell::from("#").style(Style::default().fg(DIM)),
        Cell::from("Start").style(Style::default().fg(DIM)),
        Cell::from("End").style(Style::default().fg(DIM)),
        Cell::from("").style(Style::default().fg(DIM)),
        Cell::from("Text").style(Style::default().fg(DIM)),
    ])
    .height(1);

    let end = (app.scroll_offset + inner_height).min(total);
    let start = app.scroll_offset.min(end);
    let rows: Vec<Row> = entries[start..end]
        .iter()
        .enumerate()
        .map(|(vi, entry)| {
            let style = if start + vi == app.selected {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            match *entry {
                DisplayEntry::Line(i) => {
                    let line = &app.editor.lines()[i];
                    let mut flags = String::new();
                    if line.backup {
                        flags.push('B');
                    }
                    if line.disabled {
                        flags.push('D');
                    }
                    let text_style = if line.disabled {
                        Style::default().fg(DIM).add_modifier(Modifier::CROSSED_OUT)
                    } else if line.backup {
                        Style::default().fg(BACKUP_COLOR)
                    } else {
                        Style::default()
                    };
                    Row::new(vec![
                        Cell::from(format!("{}", i + 1)),
                        Cell::from(format_time(line.start)),
                        Cell::from(format_time(line.end)),
                        Cell::from(flags).style(Style::default().fg(BACKUP_COLOR)),
                        Cell::from(line.text.clone()).style(text_style),
                    ])
                    .style(style)
                }
                DisplayEntry::Rejection(r) => {
                    let rejection = &app.editor.rejections()[r];
                    let retention = rejection
                        .retention_rate
                        .map(|v| format!("{:.0}%", v * 100.0))
                        .unwrap_or_else(|| "Unknown".to_string());
                    Row::new(vec![
                        Cell::from(""),
                        Cell::from("\u{21b3}").style(Style::default().fg(REJECTION_COLOR)),
                        Cell::from(retention).style(Style::default().fg(REJECTION_COLOR)),
                        Cell::from("x").style(Style::default().fg(REJECTION_COLOR)),
                        Cell::from(format!(
                            "\"{}\" \u{2192} \"{}\"",
                            rejection.old_text, rejection.new_text
                        ))
                        .style(Style::default().fg(REJECTION_COLOR)),
                    ])
                    .style(style)
                }
            }
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(2),
        Constraint::Min(20),
    ];

    let block = Block::default()
        .title(Span::styled(scroll_info, Style::default().fg(DIM)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));

    frame.render_widget(Table::new(rows, widths).header(header).block(block), area);
}

fn render_meters(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.is_playing() { " Live " } else { " Meters " };
    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(DIM)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let bands = app.bands;
    let meters = [
        ("Energy", bands.energy),
        ("Bass", bands.bass),
        ("Mid", bands.mid),
        ("Treble", bands.treble),
        ("Bright", bands.centroid),
    ];
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(meters.iter().map(|_| Constraint::Length(1)).chain([Constraint::Min(0)]))
        .split(inner);

    for (i, (label, value)) in meters.iter().enumerate() {
        let ratio = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(ACCENT))
            .ratio(ratio as f64)
            .label(format!("{:<6} {:>3}%", label, (value * 100.0) as u32));
        frame.render_widget(gauge, rows[i]);
    }

    if let Some(pos) = app.position {
        let clock = Paragraph::new(format_time(pos))
            .style(Style::default().fg(PLAYHEAD_COLOR))
            .alignment(Alignment::Center);
        frame.render_widget(clock, rows[meters.len()]);
    }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let text = app.status.as_deref().unwrap_or("");
    frame.render_widget(Paragraph::new(text).style(Style::default().fg(PROGRESS_COLOR)), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let keys = match app.view {
        View::Main => "[a]dd [n]ew [d]el [x]rej [b]ackup [D]isable [ ] { } [e]dit [space] [s]ave [r]eset [L]oad [?] [q]uit",
        View::ConfirmDelete | View::ConfirmReset => "[y] confirm  [n/Esc] cancel",
        View::EditText => "[Enter] apply  [Esc] cancel",
        View::About => "[Esc] close",
    };
    let footer = Paragraph::new(keys)
        .style(Style::default().fg(DIM))
        .alignment(Alignment::Center);
    frame.render_widget(footer, area);
}

fn render_about_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect(46, 11, frame.area());
    let output = app
        .settings
        .audio
        .output_device
        .as_deref()
        .unwrap_or("system default");
    frame.render_widget(Clear, area);

    let text = vec![
        Line::from(Span::styled(
            "kaiedit",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Version {}", env!("CARGO_PKG_VERSION"))),
        Line::from(""),
        Line::from("Karaoke lyric timing editor."),
        Line::from("Click a lyric on the waveform to select it."),
        Line::from(format!("Output: {}", output)),
        Line::from(""),
        Line::from(Span::styled("[Esc] close", Style::default().fg(DIM))),
    ];

    let block = Block::default()
        .title(" About ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));

    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center).block(block), area);
}

fn render_confirm_overlay(frame: &mut Frame, question: &str) {
    let area = centered_rect(40, 5, frame.area());
    frame.render_widget(Clear, area);

    let text = vec![
        Line::from(question.to_string()),
        Line::from(""),
        Line::from(Span::styled("[y] yes  [n] no", Style::default().fg(DIM))),
    ];
    let block = Block::default()
        .title(" Confirm ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ERROR_COLOR));

    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center).block(block), area);
}

fn render_edit_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect(60, 3, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Edit text ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT));
    let text = Line::from(vec![
        Span::raw(app.edit_buffer.as_str()),
        Span::styled("\u{2588}", Style::default().fg(ACCENT)),
    ]);
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}
