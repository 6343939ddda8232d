mod app;
mod backend;
mod config;
mod debug;
mod dispatch;
mod event;
mod monitor;
mod poll;
mod status;
mod theme;
mod ui;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self as term, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, Popup};
use backend::http::HttpBackend;
use backend::Backend;
use config::prefs::PrefStore;
use config::AppConfig;
use dispatch::VendReport;
use status::Indicator;

const LOG_FILE: &str = "vendpanel.log";

#[derive(Parser, Debug)]
#[command(name = "vendpanel")]
#[command(author = "Sean Fournier")]
#[command(version = "0.1.0")]
#[command(about = "Terminal control panel for an ESP32 vending machine backend")]
struct Args {
    /// Backend base URL (overrides the config file)
    #[arg(short, long)]
    url: Option<String>,

    /// Output ESP32 connectivity as JSON
    #[arg(short, long)]
    status: bool,

    /// Vend once from a slot and exit
    #[arg(short, long, value_name = "SLOT")]
    vend: Option<u8>,

    /// List known ESP32 devices
    #[arg(short, long)]
    devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let one_shot = args.status || args.vend.is_some() || args.devices;
    init_logging(!one_shot);

    let mut config = AppConfig::load()?;
    if let Some(url) = args.url {
        config.backend_url = url;
    }
    let backend = HttpBackend::new(&config.backend_url, config.request_timeout())?;

    // Handle CLI-only commands
    if args.status {
        return print_status(&backend).await;
    }

    if let Some(slot) = args.vend {
        return vend_once(&backend, &config, slot).await;
    }

    if args.devices {
        return print_devices(&backend).await;
    }

    run_tui(config, backend).await
}

/// One-shots log to stderr. The TUI owns the terminal, so it logs to
/// `vendpanel.log` in the config directory instead.
fn init_logging(tui: bool) {
    let writer = if tui {
        match AppConfig::config_dir().and_then(|dir| open_log_file(&dir)) {
            Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
            // Nowhere safe to write while the screen is in use
            Err(_) => BoxMakeWriter::new(io::sink),
        }
    } else {
        BoxMakeWriter::new(io::stderr)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(!tui))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Append to `vendpanel.log` under `dir`, creating it on first use
fn open_log_file(dir: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?)
}

async fn print_status(backend: &HttpBackend) -> Result<()> {
    let output = match backend.status().await {
        Ok(report) => {
            let indicator = Indicator::from_report(&report);
            serde_json::json!({
                "text": indicator.text,
                "online": indicator.online,
                "class": if indicator.online { "online" } else { "offline" },
                "link": status::link_label(&report),
                "serial": status::SerialLink::from_report(&report).text(),
                "wifi": status::wifi_summary(&report),
                "online_devices": report.online_devices,
                "total_devices": report.device_count(),
            })
        }
        Err(e) => {
            tracing::warn!("Status check against {} failed: {}", backend.base_url(), e);
            let indicator = Indicator::check_failed();
            serde_json::json!({
                "text": indicator.text,
                "online": false,
                "class": if e.is_transport() { "unreachable" } else { "error" },
                "error": e.to_string(),
            })
        }
    };

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

async fn vend_once(backend: &HttpBackend, config: &AppConfig, slot: u8) -> Result<()> {
    if !(1..=config.slots).contains(&slot) {
        anyhow::bail!("Slot must be between 1 and {}", config.slots);
    }

    let result = backend.vend(slot).await;
    let at = chrono::Local::now().format("%H:%M:%S").to_string();
    let report = VendReport::new(slot, &result, &at);

    println!("{}", report.message);
    if let Err(e) = notify("vendpanel", &report.message) {
        tracing::warn!("Could not send notification: {}", e);
    }

    result?;
    Ok(())
}

async fn print_devices(backend: &HttpBackend) -> Result<()> {
    let listing = backend.device_list().await?;

    if listing.devices.is_empty() {
        println!("No ESP32 devices detected");
    }
    for device in &listing.devices {
        let marker = if listing.active_device.as_deref() == Some(device.device_id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<8} {:<28} {}",
            marker,
            device.badge(),
            device.display_name(),
            device.info()
        );
    }
    println!("{}", status::active_device_label(listing.active_device.as_deref()));
    Ok(())
}

async fn run_tui(config: AppConfig, backend: HttpBackend) -> Result<()> {
    ui::init_theme(config.theme.as_ref());
    let prefs = PrefStore::open_default()?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;

    let mut app = App::new(config, prefs, Arc::new(backend));
    app.start_polling();

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;
    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        // Short blocking poll; background tasks need the runtime between frames
        let ready = tokio::task::block_in_place(|| term::poll(std::time::Duration::from_millis(100)))?;
        if ready {
            if let Event::Key(key) = term::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') if app.popup == Popup::None => return Ok(()),
                        KeyCode::Char('c') if key.modifiers.contains(term::KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        _ => {
                            if let Err(e) = app.handle_key(key) {
                                tracing::warn!("Key handling failed: {}", e);
                            }
                        }
                    }
                }
            }
        }

        app.drain_updates();
        app.tick();
        tokio::task::yield_now().await;
    }
}

fn notify(summary: &str, body: &str) -> Result<()> {
    notify_rust::Notification::new()
        .summary(summary)
        .body(body)
        .icon("vending-machine")
        .show()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_appends_across_sessions() {
        let dir = tempfile::tempdir().unwrap();

        writeln!(open_log_file(dir.path()).unwrap(), "first session").unwrap();
        writeln!(open_log_file(dir.path()).unwrap(), "second session").unwrap();

        let content = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        assert_eq!(content, "first session\nsecond session\n");
    }

    #[test]
    fn test_log_file_needs_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_log_file(&dir.path().join("missing")).is_err());
    }
}
