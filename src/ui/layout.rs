use crate::app::App;
use edgeprobe::engine::TestPhase;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

// Color Palette - Elegant & Minimal
const ACCENT: Color = Color::Rgb(100, 149, 237); // Cornflower blue
const SUCCESS: Color = Color::Rgb(134, 194, 156); // Soft green
const SUCCESS_DIM: Color = Color::Rgb(80, 120, 90);
const WARN: Color = Color::Rgb(220, 180, 130); // Soft amber
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(9),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, chunks[0], app);

    let panels =
        Layout::horizontal([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)]).split(chunks[1]);
    draw_download_panel(frame, panels[0], app);
    draw_latency_panel(frame, panels[1], app);

    draw_log(frame, chunks[2], app);
    draw_help(frame, chunks[3], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(14),
    ])
    .split(inner);

    let title = Paragraph::new("edgeprobe")
        .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD));
    frame.render_widget(title, chunks[0]);

    let (status, color) = match app.phase {
        TestPhase::Idle if app.running => ("Checking server...", WARN),
        TestPhase::Idle => ("Ready", TEXT_MUTED),
        TestPhase::Ping => ("Measuring latency...", WARN),
        TestPhase::Download => ("Measuring download...", SUCCESS),
        TestPhase::Complete => ("Complete", ACCENT),
    };
    let status_text = Paragraph::new(status)
        .style(Style::default().fg(color))
        .alignment(Alignment::Center);
    frame.render_widget(status_text, chunks[1]);

    frame.render_widget(
        Paragraph::new(phase_line(app.phase)).alignment(Alignment::Right),
        chunks[2],
    );
}

fn phase_line(phase: TestPhase) -> Line<'static> {
    let segments = [(TestPhase::Ping, "ping"), (TestPhase::Download, "down")];

    let mut spans = Vec::new();
    for (i, (p, label)) in segments.iter().enumerate() {
        let is_active = phase == *p;
        let is_done = match phase {
            TestPhase::Download => *p == TestPhase::Ping,
            TestPhase::Complete => true,
            _ => false,
        };

        let style = if is_active {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if is_done {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };
        spans.push(Span::styled(*label, style));

        if i < segments.len() - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }

    Line::from(spans)
}

fn draw_download_panel(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(" Download ", Style::default().fg(TEXT_SECONDARY)));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    let speed = app
        .result
        .as_ref()
        .map(|r| r.download.median)
        .filter(|&mbps| mbps > 0.0)
        .unwrap_or(app.current_mbps);
    frame.render_widget(
        Paragraph::new(format_speed(speed))
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        chunks[0],
    );

    draw_progress_bar(frame, chunks[1], app.download_progress);

    if !app.rate_samples.is_empty() {
        draw_sparkline(frame, chunks[2], &app.rate_samples, SUCCESS);
    }
}

fn draw_latency_panel(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(" Latency ", Style::default().fg(TEXT_SECONDARY)));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    let latency = app
        .result
        .as_ref()
        .map(|r| r.ping.median)
        .filter(|&ms| ms > 0.0)
        .or_else(|| app.ping_samples.last().copied());
    let value = match latency {
        Some(ms) => format!("{ms:.0} ms"),
        None => "—".to_string(),
    };
    frame.render_widget(
        Paragraph::new(value)
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        chunks[0],
    );

    let detail = if let Some(result) = &app.result {
        format!(
            "mean {:.1} · peak {:.1}",
            result.ping.mean, result.ping.peak
        )
    } else if app.ping_total > 0 {
        format!("probe {}/{}", app.ping_index, app.ping_total)
    } else {
        "—".to_string()
    };
    frame.render_widget(
        Paragraph::new(detail)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        chunks[1],
    );

    if !app.ping_samples.is_empty() {
        draw_sparkline(frame, chunks[2], &app.ping_samples, WARN);
    }
}

fn draw_log(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(" Log ", Style::default().fg(TEXT_SECONDARY)));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let visible = inner.height as usize;
    let skip = app.log_lines.len().saturating_sub(visible);
    let lines: Vec<Line> = app.log_lines[skip..]
        .iter()
        .map(|line| {
            let style = if line.starts_with('>') || line.starts_with("===") {
                Style::default().fg(TEXT_SECONDARY)
            } else {
                Style::default().fg(TEXT_MUTED)
            };
            Line::from(Span::styled(line.clone(), style))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio * width as f64) as usize).min(width);
    let empty = width.saturating_sub(filled);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(SUCCESS)),
        Span::styled("━".repeat(empty), Style::default().fg(SUCCESS_DIM)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_sparkline(frame: &mut Frame, area: Rect, data: &[f64], color: Color) {
    if data.is_empty() || area.width < 4 || area.height < 2 {
        return;
    }

    let min_val = data.iter().copied().fold(f64::MAX, f64::min);
    let max_val = data.iter().copied().fold(f64::MIN, f64::max);
    let range = (max_val - min_val).max(1.0);

    let points: Vec<(f64, f64)> = data.iter().enumerate().map(|(i, &v)| (i as f64, v)).collect();

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, data.len() as f64]))
        .y_axis(Axis::default().bounds([min_val - range * 0.1, max_val + range * 0.1]));

    frame.render_widget(chart, area);
}

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.1} Gbps", mbps / 1000.0)
    } else if mbps >= 1.0 {
        format!("{:.1} Mbps", mbps)
    } else if mbps > 0.0 {
        format!("{:.0} Kbps", mbps * 1000.0)
    } else {
        "—".to_string()
    }
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.running {
        "esc cancel · q quit"
    } else {
        "enter start · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}
