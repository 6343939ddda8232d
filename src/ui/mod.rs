use std::sync::OnceLock;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::{App, Popup, Section};
use crate::backend::{Category, Direction as LogDirection};
use crate::config::ThemeOverrides;
use crate::dispatch::MessageKind;
use crate::status;
use crate::theme::Theme;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Resolve colours once, before the first frame
pub fn init_theme(overrides: Option<&ThemeOverrides>) {
    let _ = THEME.set(Theme::load(overrides));
}

fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::default)
}

fn accent() -> Color { theme().accent }
fn online() -> Color { theme().online }
fn offline() -> Color { theme().offline }
fn error() -> Color { theme().error }
fn loading() -> Color { theme().loading }
fn text() -> Color { theme().text }
fn text_dim() -> Color { theme().text_dim }
fn bg_selected() -> Color { theme().bg_selected }
fn inactive() -> Color { theme().inactive }
fn header() -> Color { theme().header }

/// Bordered panel, highlighted when active; `detail` follows the title
fn panel_block(app: &App, section: Section, detail: &str) -> Block<'static> {
    let is_active = app.section == section;
    let border_color = if is_active { accent() } else { inactive() };
    let title_style = if is_active {
        Style::default().fg(accent()).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(inactive())
    };

    Block::default()
        .title(Span::styled(format!(" {}{} ", section.title(), detail), title_style))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
}

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();

    let mut constraints = vec![
        Constraint::Length(1), // Connectivity
        Constraint::Length(3), // Slot buttons
        Constraint::Length(2), // Message + last action
    ];
    let mut panels = Vec::new();
    for section in &app.sections {
        let height = match section {
            Section::Slots => continue,
            Section::Connection => Constraint::Length(7),
            Section::Monitor => Constraint::Min(6),
            Section::Devices => Constraint::Length((app.devices.len() as u16 + 5).clamp(6, 10)),
            Section::Debug => Constraint::Length(8),
        };
        constraints.push(height);
        panels.push(*section);
    }
    // Without the monitor the last panel stretches
    if !app.has_panel(Section::Monitor) {
        constraints.push(Constraint::Min(0));
    }
    constraints.push(Constraint::Length(1)); // Footer

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    draw_connectivity(f, app, chunks[0]);
    draw_slots(f, app, chunks[1]);
    draw_message(f, app, chunks[2]);
    for (i, section) in panels.iter().enumerate() {
        let area = chunks[3 + i];
        match section {
            Section::Connection => draw_connection(f, app, area),
            Section::Monitor => draw_monitor(f, app, area),
            Section::Devices => draw_devices(f, app, area),
            Section::Debug => draw_debug(f, app, area),
            Section::Slots => {}
        }
    }
    draw_footer(f, app, chunks[chunks.len() - 1]);

    match app.popup {
        Popup::None => {}
        Popup::SlotNames => draw_names_popup(f, app),
        Popup::Help => draw_help_popup(f, app),
    }
}

fn draw_connectivity(f: &mut Frame, app: &App, area: Rect) {
    let (dot, color) = if app.indicator.online {
        ("●", online())
    } else {
        ("○", offline())
    };

    let mut spans = vec![
        Span::styled(format!("{} ", dot), Style::default().fg(color)),
        Span::styled(app.indicator.text.clone(), Style::default().fg(color)),
    ];
    if let Some(report) = &app.status {
        spans.push(Span::styled(" │ ", Style::default().fg(text_dim())));
        spans.push(Span::styled(status::link_label(report), Style::default().fg(text())));
    }
    if let Some(mode) = &app.current_mode {
        spans.push(Span::styled(" │ mode: ", Style::default().fg(text_dim())));
        spans.push(Span::styled(mode.clone(), Style::default().fg(text())));
    }

    f.render_widget(Paragraph::new(Line::from(spans)).alignment(Alignment::Center), area);
}

fn draw_slots(f: &mut Frame, app: &App, area: Rect) {
    let block = panel_block(app, Section::Slots, "");
    let is_active = app.section == Section::Slots;

    let mut spans = Vec::new();
    for slot in 1..=app.slots.count() {
        let disabled = app.slots.is_disabled(slot);
        let selected = is_active && slot == app.selected_slot;
        let mut style = if disabled {
            Style::default().fg(inactive())
        } else {
            Style::default().fg(text())
        };
        if selected {
            style = style.bg(bg_selected()).add_modifier(Modifier::BOLD);
        }
        let label = if disabled {
            format!(" {} {}… ", slot, app.slot_label(slot))
        } else {
            format!(" {} {} ", slot, app.slot_label(slot))
        };
        spans.push(Span::styled("[", Style::default().fg(text_dim())));
        spans.push(Span::styled(label, style));
        spans.push(Span::styled("] ", Style::default().fg(text_dim())));
    }

    let row = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(block);
    f.render_widget(row, area);
}

fn draw_message(f: &mut Frame, app: &App, area: Rect) {
    let message = app.messages.current();
    let color = match message.kind {
        MessageKind::Info => text(),
        MessageKind::Loading => loading(),
        MessageKind::Success => online(),
        MessageKind::Error => error(),
    };

    let mut lines = vec![Line::from(Span::styled(
        message.text.clone(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];
    if let Some(last) = &app.last_action {
        lines.push(Line::from(Span::styled(
            format!("Last action: {}", last),
            Style::default().fg(text_dim()),
        )));
    }

    f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
}

fn draw_connection(f: &mut Frame, app: &App, area: Rect) {
    let block = panel_block(app, Section::Connection, "");

    let serial_color = if app.serial.connected { online() } else { offline() };
    let serial_text = if app.connecting {
        "Connecting...".to_string()
    } else if app.disconnecting {
        "Disconnecting...".to_string()
    } else {
        app.serial.text()
    };

    let wifi_text = app
        .status
        .as_ref()
        .map(status::wifi_summary)
        .unwrap_or_else(|| "Checking...".to_string());

    let port_text = if app.scanning {
        "Scanning...".to_string()
    } else {
        match app.selected_port.and_then(|i| app.ports.get(i)) {
            Some(port) => port.display(),
            None if app.ports.is_empty() => "No ports scanned".to_string(),
            None => format!("Select a port... ({} found)", app.ports.len()),
        }
    };

    let lines = vec![
        Line::from(vec![
            Span::styled("  USB Serial  ", Style::default().fg(header())),
            Span::styled(serial_text, Style::default().fg(serial_color)),
        ]),
        Line::from(vec![
            Span::styled("  WiFi        ", Style::default().fg(header())),
            Span::styled(wifi_text, Style::default().fg(text())),
        ]),
        Line::from(vec![
            Span::styled("  Port        ", Style::default().fg(header())),
            Span::styled(port_text, Style::default().fg(text())),
        ]),
        Line::from(vec![
            Span::styled("  Device      ", Style::default().fg(header())),
            Span::styled(
                status::active_device_label(app.active_device.as_deref()),
                Style::default().fg(text()),
            ),
        ]),
    ];

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_monitor(f: &mut Frame, app: &App, area: Rect) {
    let state = if app.monitoring { "● running" } else { "○ stopped" };
    let mut detail = format!(" {} ({} messages)", state, app.log_view.total_entries());
    if app.log_view.scroll_back() > 0 {
        detail.push_str(&format!(
            " ↑{} of {}",
            app.log_view.scroll_back(),
            app.log_view.len()
        ));
    }
    let block = panel_block(app, Section::Monitor, &detail);

    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = match app.log_view.placeholder() {
        Some(placeholder) if app.log_view.is_empty() => vec![Line::from(Span::styled(
            format!("  {}", placeholder),
            Style::default().fg(text_dim()),
        ))],
        _ => app
            .log_view
            .visible(height)
            .map(|line| {
                let color = match line.category {
                    _ if line.direction_kind == LogDirection::Sent => loading(),
                    Category::Error => error(),
                    Category::Success => online(),
                    Category::Vend => accent(),
                    Category::Discovery => loading(),
                    _ => text(),
                };
                Line::from(vec![
                    Span::styled(format!("[{}] ", line.timestamp), Style::default().fg(text_dim())),
                    Span::styled(format!("{} {} ", line.icon, line.direction), Style::default().fg(color)),
                    Span::styled(
                        format!("{}{}: ", line.device_icon, line.device_id),
                        Style::default().fg(header()),
                    ),
                    Span::styled(line.message.clone(), Style::default().fg(color)),
                ])
            })
            .collect(),
    };

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_devices(f: &mut Frame, app: &App, area: Rect) {
    let block = panel_block(app, Section::Devices, "");
    let is_active = app.section == Section::Devices;

    if app.devices.is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "  No ESP32 devices detected",
            Style::default().fg(text_dim()),
        )))
        .block(block);
        f.render_widget(empty, area);
        return;
    }

    let header_row = Row::new(vec![
        Span::styled("", Style::default().fg(header())),
        Span::styled("Device", Style::default().fg(header())),
        Span::styled("Info", Style::default().fg(header())),
        Span::styled("Status", Style::default().fg(header())),
    ]);

    let rows: Vec<Row> = app
        .devices
        .iter()
        .enumerate()
        .map(|(i, device)| {
            let is_current = app.active_device.as_deref() == Some(device.device_id.as_str())
                || app.selected_device.as_deref() == Some(device.device_id.as_str());
            let marker = if is_current { "▶" } else { " " };
            let (status_text, status_color) = if device.connected {
                ("Online", online())
            } else {
                ("Offline", offline())
            };
            let name_color = if device.connected { text() } else { inactive() };

            let row = Row::new(vec![
                Span::styled(marker, Style::default().fg(accent())),
                Span::styled(
                    format!("{} {}", device.badge(), device.display_name()),
                    Style::default().fg(name_color),
                ),
                Span::styled(device.info(), Style::default().fg(text_dim())),
                Span::styled(status_text, Style::default().fg(status_color)),
            ]);
            if is_active && i == app.device_row {
                row.style(Style::default().bg(bg_selected()))
            } else {
                row
            }
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Percentage(40),
            Constraint::Percentage(35),
            Constraint::Length(8),
        ],
    )
    .header(header_row)
    .block(block);

    f.render_widget(table, area);
}

fn draw_debug(f: &mut Frame, app: &App, area: Rect) {
    let block = panel_block(app, Section::Debug, "");
    let height = area.height.saturating_sub(2) as usize;

    let lines: Vec<Line> = app
        .debug
        .lines()
        .rev()
        .take(height)
        .rev()
        .map(|line| Line::styled(line.clone(), Style::default().fg(text_dim())))
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn hint<'a>(key: &'a str, label: &'a str) -> [Span<'a>; 2] {
    [
        Span::styled(key, Style::default().fg(accent())),
        Span::styled(format!(" {}  ", label), Style::default().fg(text_dim())),
    ]
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let keys: &[(&str, &str)] = match app.section {
        Section::Slots => &[("1-9", "vend"), ("←/→", "select"), ("Enter", "vend"), ("n", "names")],
        Section::Connection => &[("s", "scan"), ("↑/↓", "port"), ("c", "connect"), ("x", "disconnect")],
        Section::Monitor => &[("m", "start"), ("x", "stop"), ("C", "clear"), ("t", "test data"), ("T", "test cmds")],
        Section::Devices => &[("↑/↓", "move"), ("Enter", "select"), ("a", "auto"), ("r", "refresh")],
        Section::Debug => &[("s", "serial"), ("d", "devices"), ("v", "history")],
    };

    let mut spans: Vec<Span> = keys.iter().flat_map(|(k, l)| hint(k, l)).collect();
    spans.extend(hint("Tab", "panel"));
    spans.extend(hint("?", "help"));
    spans.extend(hint("q", "quit"));

    f.render_widget(Paragraph::new(Line::from(spans)).alignment(Alignment::Center), area);
}

fn draw_names_popup(f: &mut Frame, app: &App) {
    let area = f.area();
    let rows = app.name_inputs.len() as u16;
    let popup_area = centered_rect(if area.width < 80 { 90 } else { 50 }, 100, area);
    let popup_area = Rect {
        y: popup_area.y + popup_area.height.saturating_sub(rows + 4) / 2,
        height: (rows + 4).min(popup_area.height),
        ..popup_area
    };

    f.render_widget(Clear, popup_area);

    let mut lines: Vec<Line> = app
        .name_inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let slot = i as u8 + 1;
            let focused = i == app.name_field;
            let value = if input.is_empty() && !focused {
                Span::styled(format!("Slot {}", slot), Style::default().fg(inactive()))
            } else if focused {
                Span::styled(format!("{}_", input), Style::default().fg(text()).bg(bg_selected()))
            } else {
                Span::styled(input.clone(), Style::default().fg(text()))
            };
            Line::from(vec![
                Span::styled(
                    format!("  Slot {}: ", slot),
                    Style::default().fg(if focused { accent() } else { header() }),
                ),
                value,
            ])
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("Enter", Style::default().fg(online()).add_modifier(Modifier::BOLD)),
        Span::styled(" save  ", Style::default().fg(text_dim())),
        Span::styled("Tab", Style::default().fg(accent())),
        Span::styled(" next  ", Style::default().fg(text_dim())),
        Span::styled("Esc", Style::default().fg(error())),
        Span::styled(" cancel", Style::default().fg(text_dim())),
    ]).alignment(Alignment::Center));

    let popup = Paragraph::new(lines).block(
        Block::default()
            .title(Span::styled(" Slot Names ", Style::default().fg(accent())))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(accent())),
    );
    f.render_widget(popup, popup_area);
}

fn help_section(title: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("═══ {} ═══", title),
        Style::default().fg(header()).add_modifier(Modifier::BOLD),
    ))
}

fn help_key(key: &str, what: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), Style::default().fg(accent())),
        Span::raw(what.to_string()),
    ])
}

fn draw_help_popup(f: &mut Frame, app: &App) {
    let area = f.area();
    let popup_area = centered_rect(
        if area.width < 80 { 95 } else { 70 },
        if area.height < 40 { 95 } else { 85 },
        area,
    );

    f.render_widget(Clear, popup_area);

    let mut help_text = vec![
        help_section("Vending"),
        help_key("1-9", "Vend from that slot"),
        help_key("←/→ Enter", "Pick a slot and vend"),
        help_key("n", "Edit slot names"),
        help_key("Tab", "Next panel"),
        Line::from(""),
    ];
    if app.has_panel(Section::Connection) {
        help_text.extend([
            help_section("Connection"),
            help_key("s", "Scan serial ports"),
            help_key("↑/↓", "Choose a port (ports in use are skipped)"),
            help_key("c / x", "Connect / disconnect USB serial"),
            Line::from(""),
        ]);
    }
    if app.has_panel(Section::Monitor) {
        help_text.extend([
            help_section("Monitor"),
            help_key("m / x", "Start / stop the communication monitor"),
            help_key("C", "Clear the backend log"),
            help_key("t", "Add test entries"),
            help_key("T", "Send test vends to slots 1-3"),
            Line::from(""),
        ]);
    }
    if app.has_panel(Section::Devices) {
        help_text.extend([
            help_section("Devices"),
            help_key("Enter", "Use the highlighted device (online only)"),
            help_key("a", "Auto-select (Serial first, then WiFi)"),
            help_key("r", "Refresh the list"),
            Line::from(""),
        ]);
    }
    if app.has_panel(Section::Debug) {
        help_text.extend([
            help_section("Debug"),
            help_key("s", "Test serial connection"),
            help_key("d", "Check all devices"),
            help_key("v", "View command history"),
            Line::from(""),
        ]);
    }
    help_text.push(Line::from(vec![
        Span::styled("  Backend: ", Style::default().fg(text_dim())),
        Span::styled(app.config.backend_url.clone(), Style::default().fg(text())),
    ]));
    help_text.push(Line::from(vec![
        Span::styled("  Press ", Style::default().fg(text_dim())),
        Span::styled("?", Style::default().fg(accent())),
        Span::styled("/", Style::default().fg(text_dim())),
        Span::styled("Esc", Style::default().fg(accent())),
        Span::styled(" to close", Style::default().fg(text_dim())),
    ]));

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(Span::styled(" vendpanel Help ", Style::default().fg(accent())))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent())),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
