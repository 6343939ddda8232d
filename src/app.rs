use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::backend::{Backend, BackendError, Device, SerialPort, StatusReport};
use crate::config::prefs::{default_label, PrefStore, SlotNames};
use crate::config::AppConfig;
use crate::debug::{self, DebugLog};
use crate::dispatch::{self, Command, CommandResult, MessageBox, MessageKind, Refusal, SlotControls, VendReport};
use crate::event::Update;
use crate::monitor::LogView;
use crate::poll::{PollResult, PollTask, Scheduler};
use crate::status::{Indicator, SerialLink};

/// Slots exercised by "send test commands"
const TEST_COMMAND_SLOTS: [u8; 3] = [1, 2, 3];
const TEST_COMMAND_GAP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Slots,
    Connection,
    Monitor,
    Devices,
    Debug,
}

impl Section {
    pub fn title(&self) -> &'static str {
        match self {
            Section::Slots => "Slots",
            Section::Connection => "Connection",
            Section::Monitor => "Monitor",
            Section::Devices => "Devices",
            Section::Debug => "Debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    None,
    SlotNames,
    Help,
}

pub struct App {
    pub config: AppConfig,
    pub section: Section,
    pub sections: Vec<Section>,
    pub popup: Popup,

    // Slot buttons
    pub slots: SlotControls,
    pub selected_slot: u8,
    pub slot_labels: Vec<String>,

    // Names editor (one input per slot)
    pub name_inputs: Vec<String>,
    pub name_field: usize,
    prefs: PrefStore,

    // Message line + last action
    pub messages: MessageBox,
    pub last_action: Option<String>,

    // Polled status
    pub indicator: Indicator,
    pub status: Option<StatusReport>,
    pub serial: SerialLink,
    pub current_mode: Option<String>,

    // Connection management
    pub ports: Vec<SerialPort>,
    pub selected_port: Option<usize>,
    pub scanning: bool,
    pub connecting: bool,
    pub disconnecting: bool,

    // Communication monitor
    pub log_view: LogView,
    pub monitoring: bool,
    pub sending_tests: bool,

    // Device selection
    pub devices: Vec<Device>,
    pub device_row: usize,
    pub selected_device: Option<String>,
    pub active_device: Option<String>,

    pub debug: DebugLog,

    backend: Arc<dyn Backend>,
    scheduler: Scheduler,
    tx: UnboundedSender<Update>,
    rx: UnboundedReceiver<Update>,
}

fn clock() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Message text for a failed command: backend rejections and transport
/// failures read differently
fn failure(err: &BackendError, rejected: impl FnOnce(&str) -> String, transport: &str) -> String {
    match err {
        BackendError::Rejected { message, .. } => rejected(message),
        BackendError::Transport(reason) => format!("❌ {}: {}", transport, reason),
    }
}

impl App {
    pub fn new(config: AppConfig, prefs: PrefStore, backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(Arc::clone(&backend), tx.clone());

        let mut sections = vec![Section::Slots];
        if config.panels.connection {
            sections.push(Section::Connection);
        }
        if config.panels.monitor {
            sections.push(Section::Monitor);
        }
        if config.panels.devices {
            sections.push(Section::Devices);
        }
        if config.panels.debug {
            sections.push(Section::Debug);
        }

        let slot_count = config.slots;
        let mut app = Self {
            section: Section::Slots,
            sections,
            popup: Popup::None,

            slots: SlotControls::new(slot_count),
            selected_slot: 1,
            slot_labels: (1..=slot_count).map(default_label).collect(),

            name_inputs: vec![String::new(); slot_count as usize],
            name_field: 0,
            prefs,

            messages: MessageBox::new(config.success_revert()),
            last_action: None,

            indicator: Indicator::checking(),
            status: None,
            serial: SerialLink::default(),
            current_mode: None,

            ports: Vec::new(),
            selected_port: None,
            scanning: false,
            connecting: false,
            disconnecting: false,

            log_view: LogView::new(config.log_window),
            monitoring: false,
            sending_tests: false,

            devices: Vec::new(),
            device_row: 0,
            selected_device: None,
            active_device: None,

            debug: DebugLog::default(),

            backend,
            scheduler,
            tx,
            rx,
            config,
        };

        app.load_slot_names();
        app
    }

    /// Kick off the background polls for every enabled panel
    pub fn start_polling(&mut self) {
        let intervals = self.config.intervals.clone();
        self.scheduler.start(PollTask::Status, intervals.status());
        if self.config.panels.connection {
            self.scheduler
                .start(PollTask::CommunicationMode, intervals.mode());
        }
        if self.config.panels.devices {
            self.scheduler.start(PollTask::DeviceList, intervals.devices());
        }
        tracing::info!("Polling {}", self.config.backend_url);
    }

    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }

    pub fn slot_label(&self, slot: u8) -> &str {
        self.slot_labels
            .get(slot as usize - 1)
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn has_panel(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }

    // ---------------------------------------------------------------------
    // Slot names
    // ---------------------------------------------------------------------

    fn load_slot_names(&mut self) {
        let names = self.prefs.load();
        self.apply_slot_names(&names);
    }

    fn apply_slot_names(&mut self, names: &SlotNames) {
        for slot in 1..=self.slots.count() {
            let idx = slot as usize - 1;
            match names.get(&slot) {
                Some(name) => {
                    self.slot_labels[idx] = name.clone();
                    self.name_inputs[idx] = name.clone();
                }
                None => {
                    self.slot_labels[idx] = default_label(slot);
                    self.name_inputs[idx].clear();
                }
            }
        }
    }

    /// Apply the names editor to the buttons and persist it
    pub fn save_slot_names(&mut self) {
        let requested: SlotNames = self
            .name_inputs
            .iter()
            .enumerate()
            .map(|(idx, name)| (idx as u8 + 1, name.clone()))
            .collect();

        match self.prefs.save(&requested) {
            Ok(saved) => {
                tracing::info!("Saved slot names to {}", self.prefs.path().display());
                self.apply_slot_names(&saved);
                self.messages.set("✅ Slot names updated!", MessageKind::Success);
                self.debug.push(format!(
                    "Slot names updated: {}",
                    serde_json::to_string(&saved).unwrap_or_default()
                ));
            }
            Err(e) => {
                // Labels still change for this session
                let cleaned: SlotNames = requested
                    .into_iter()
                    .filter(|(_, name)| !name.trim().is_empty())
                    .map(|(slot, name)| (slot, name.trim().to_string()))
                    .collect();
                self.apply_slot_names(&cleaned);
                tracing::warn!("Could not save slot names: {}", e);
                self.messages
                    .set(format!("❌ Could not save slot names: {}", e), MessageKind::Error);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    fn spawn(&self, command: Command) {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = dispatch::execute(backend.as_ref(), command).await;
            let _ = tx.send(Update::Command(result));
        });
    }

    /// Vend from a slot: disable its button, send one request. The button
    /// comes back when the result arrives, whatever it is.
    pub fn vend(&mut self, slot: u8) {
        if let Err(refusal) = self.slots.acquire(slot) {
            tracing::debug!("Vend not sent: {}", refusal);
            if let Refusal::UnknownSlot(_) = refusal {
                self.messages.set(format!("❌ {}", refusal), MessageKind::Error);
            }
            return;
        }

        self.messages.set(
            format!("🔄 Sending vend command for slot {}...", slot),
            MessageKind::Loading,
        );
        self.spawn(Command::Vend(slot));
    }

    pub fn scan_ports(&mut self) {
        if self.scanning {
            return;
        }
        self.scanning = true;
        self.spawn(Command::ScanPorts);
    }

    pub fn connect_serial(&mut self) {
        let Some(port) = self.selected_port.and_then(|i| self.ports.get(i)).map(|p| p.device.clone()) else {
            self.messages.set("❌ Please select a port first", MessageKind::Error);
            return;
        };
        if self.connecting || !self.serial.can_connect(true) {
            return;
        }
        self.connecting = true;
        self.spawn(Command::ConnectSerial(port));
    }

    pub fn disconnect_serial(&mut self) {
        if self.disconnecting || !self.serial.can_disconnect() {
            return;
        }
        self.disconnecting = true;
        self.spawn(Command::DisconnectSerial);
    }

    pub fn start_monitoring(&mut self) {
        if self.monitoring {
            return;
        }
        if !self
            .scheduler
            .start(PollTask::CommunicationLog, self.config.intervals.log())
        {
            return;
        }
        self.monitoring = true;
        self.log_view.begin();
        self.messages
            .set("✅ ESP32 communication monitor started", MessageKind::Success);
    }

    pub fn stop_monitoring(&mut self) {
        if !self.monitoring {
            return;
        }
        self.scheduler.stop(PollTask::CommunicationLog);
        self.monitoring = false;
        self.messages
            .set("🛑 ESP32 communication monitor stopped", MessageKind::Info);
    }

    pub fn clear_log(&mut self) {
        self.spawn(Command::ClearLog);
    }

    pub fn add_test_data(&mut self) {
        self.spawn(Command::AddTestData);
    }

    pub fn send_test_commands(&mut self) {
        if self.sending_tests {
            return;
        }
        self.sending_tests = true;
        self.messages
            .set("🧪 Sending test commands to ESP32...", MessageKind::Info);
        self.spawn(Command::SendTestCommands {
            slots: TEST_COMMAND_SLOTS.to_vec(),
            gap: TEST_COMMAND_GAP,
        });
    }

    pub fn refresh_devices(&mut self) {
        self.scheduler.poll_now(PollTask::DeviceList);
    }

    /// Only connected devices can be picked
    pub fn select_device(&mut self, device_id: &str) {
        let connected = self
            .devices
            .iter()
            .any(|d| d.device_id == device_id && d.connected);
        if !connected {
            return;
        }
        self.spawn(Command::SelectDevice(device_id.to_string()));
    }

    pub fn auto_select_device(&mut self) {
        self.spawn(Command::AutoSelectDevice);
    }

    pub fn test_serial(&mut self) {
        self.debug.push("Testing serial connection...");
        self.spawn(Command::TestSerial);
    }

    pub fn check_devices(&mut self) {
        self.debug.push("Checking all ESP32 devices...");
        self.spawn(Command::CheckDevices);
    }

    pub fn view_history(&mut self) {
        self.debug.push("Fetching command history...");
        self.spawn(Command::ViewHistory);
    }

    // ---------------------------------------------------------------------
    // Reconciliation
    // ---------------------------------------------------------------------

    /// Apply everything background tasks have delivered so far
    pub fn drain_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.rx.try_recv() {
            self.apply(update);
            applied += 1;
        }
        applied
    }

    pub fn apply(&mut self, update: Update) {
        match update {
            Update::Poll(result) => self.apply_poll(result),
            Update::Command(result) => self.apply_command(result),
        }
    }

    fn apply_poll(&mut self, result: PollResult) {
        let task = result.task();
        match result {
            PollResult::Status(Ok(report)) => {
                self.indicator = Indicator::from_report(&report);
                self.serial = SerialLink::from_report(&report);
                self.status = Some(report);
            }
            PollResult::Status(Err(e)) => {
                tracing::warn!("Could not check ESP32 status: {}", e);
                self.indicator = Indicator::check_failed();
            }
            PollResult::CommunicationMode(Ok(mode)) => {
                self.current_mode = Some(mode.current_mode.unwrap_or_else(|| "Unknown".to_string()));
            }
            PollResult::DeviceList(Ok(listing)) => {
                self.devices = listing.devices;
                self.active_device = listing.active_device;
                if self.device_row >= self.devices.len() {
                    self.device_row = self.devices.len().saturating_sub(1);
                }
            }
            PollResult::CommunicationLog(Ok(snapshot)) => {
                // A response already in flight when the monitor stopped
                if !self.monitoring {
                    return;
                }
                self.log_view.reconcile(&snapshot);
            }
            PollResult::CommunicationMode(Err(e))
            | PollResult::DeviceList(Err(e))
            | PollResult::CommunicationLog(Err(e)) => {
                tracing::warn!("Could not refresh {}: {}", task.name(), e);
            }
        }
    }

    fn apply_command(&mut self, result: CommandResult) {
        match result {
            CommandResult::Vend { slot, result } => {
                self.slots.release(slot);
                let report = VendReport::new(slot, &result, &clock());
                match &result {
                    Ok(_) => tracing::info!("Vend slot {}: {}", slot, report.message),
                    Err(e) => tracing::warn!("Vend slot {} failed: {}", slot, e),
                }
                self.messages.set(report.message, report.kind);
                self.last_action = Some(report.last_action);
                self.debug.push(report.debug);
            }
            CommandResult::PortsScanned(result) => {
                self.scanning = false;
                match result {
                    Ok(scan) => {
                        self.messages.set(
                            format!("✅ Found {} serial ports", scan.ports.len()),
                            MessageKind::Success,
                        );
                        self.ports = scan.ports;
                        self.selected_port = None;
                    }
                    Err(e) => self.messages.set(
                        format!("❌ Error scanning ports: {}", e),
                        MessageKind::Error,
                    ),
                }
            }
            CommandResult::SerialConnected { port, result } => {
                self.connecting = false;
                match result {
                    Ok(ack) => {
                        self.messages.set(format!("✅ {}", ack.message), MessageKind::Success);
                        self.serial = SerialLink {
                            connected: true,
                            port: Some(port),
                        };
                        self.scheduler.poll_now(PollTask::Status);
                    }
                    Err(e) => self.messages.set(
                        failure(&e, |m| format!("❌ {}", m), "Connection error"),
                        MessageKind::Error,
                    ),
                }
            }
            CommandResult::SerialDisconnected(result) => {
                self.disconnecting = false;
                match result {
                    Ok(ack) => {
                        self.messages.set(format!("✅ {}", ack.message), MessageKind::Success);
                        self.serial = SerialLink::default();
                        self.scheduler.poll_now(PollTask::Status);
                    }
                    Err(e) => self.messages.set(
                        failure(&e, |m| format!("❌ Error: {}", m), "Disconnect error"),
                        MessageKind::Error,
                    ),
                }
            }
            CommandResult::LogCleared(result) => match result {
                Ok(()) => {
                    self.log_view.clear();
                    self.messages
                        .set("✅ Communication log cleared", MessageKind::Success);
                }
                Err(e) => self.messages.set(
                    failure(&e, |_| "❌ Failed to clear log".to_string(), "Error clearing log"),
                    MessageKind::Error,
                ),
            },
            CommandResult::TestDataAdded(result) => match result {
                Ok(receipt) => {
                    self.messages.set(
                        format!("✅ Added {} test entries to log", receipt.entries_added),
                        MessageKind::Success,
                    );
                    if !self.monitoring {
                        self.messages
                            .set("💡 Start monitor to see the test entries", MessageKind::Info);
                    }
                }
                Err(e) => self.messages.set(
                    failure(&e, |_| "❌ Failed to add test data".to_string(), "Error adding test data"),
                    MessageKind::Error,
                ),
            },
            CommandResult::TestCommandsFinished(outcomes) => {
                self.sending_tests = false;
                for (slot, result) in outcomes {
                    self.debug.push(match result {
                        Ok(receipt) => format!("✅ Test slot {}: {}", slot, receipt.message),
                        Err(e @ BackendError::Rejected { .. }) => {
                            format!("❌ Test slot {} failed: {}", slot, e)
                        }
                        Err(e) => format!("❌ Test slot {} error: {}", slot, e),
                    });
                }
                self.messages
                    .set("✅ Test commands completed", MessageKind::Success);
            }
            CommandResult::DeviceSelected { device_id, result } => match result {
                Ok(()) => {
                    self.messages.set(
                        format!("✅ Selected device: {}", device_id),
                        MessageKind::Success,
                    );
                    self.selected_device = Some(device_id.clone());
                    self.active_device = Some(device_id);
                    self.scheduler.poll_now(PollTask::DeviceList);
                }
                Err(e) => self.messages.set(
                    failure(&e, |m| format!("❌ Failed to select device: {}", m), "Error selecting device"),
                    MessageKind::Error,
                ),
            },
            CommandResult::AutoSelected(result) => match result {
                Ok(selection) => {
                    self.messages
                        .set(format!("✅ {}", selection.message), MessageKind::Success);
                    self.selected_device = selection.active_device.clone();
                    self.active_device = selection.active_device;
                    self.scheduler.poll_now(PollTask::DeviceList);
                }
                Err(e) => self.messages.set(
                    failure(&e, |m| format!("❌ Auto-select failed: {}", m), "Error with auto-select"),
                    MessageKind::Error,
                ),
            },
            CommandResult::SerialTested(result) => match result {
                Ok(report) => self.debug.extend(debug::serial_test_lines(&report)),
                Err(e) => self.debug.push(format!("❌ Serial test failed: {}", e)),
            },
            CommandResult::DevicesChecked(result) => match result {
                Ok(inventory) => self.debug.extend(debug::device_check_lines(&inventory)),
                Err(e) => self.debug.push(format!("❌ Device check failed: {}", e)),
            },
            CommandResult::HistoryFetched(result) => match result {
                Ok(history) => self.debug.extend(debug::history_lines(&history)),
                Err(e) => self.debug.push(format!("❌ History fetch failed: {}", e)),
            },
        }
    }

    /// Timer housekeeping, called every loop iteration
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        self.messages.tick(now);
    }

    // ---------------------------------------------------------------------
    // Input
    // ---------------------------------------------------------------------

    pub fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        // Handle popups first
        match self.popup {
            Popup::SlotNames => return self.handle_names_key(key),
            Popup::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Enter | KeyCode::Char('q')) {
                    self.popup = Popup::None;
                }
                return Ok(());
            }
            Popup::None => {}
        }

        // Number keys vend from anywhere
        if let KeyCode::Char(c @ '1'..='9') = key.code {
            let slot = c as u8 - b'0';
            if self.slots.exists(slot) {
                self.vend(slot);
                return Ok(());
            }
        }

        match key.code {
            KeyCode::Tab => self.cycle_section(1),
            KeyCode::BackTab => self.cycle_section(-1),
            KeyCode::Char('?') => self.popup = Popup::Help,
            _ => match self.section {
                Section::Slots => self.handle_slots_key(key),
                Section::Connection => self.handle_connection_key(key),
                Section::Monitor => self.handle_monitor_key(key),
                Section::Devices => self.handle_devices_key(key),
                Section::Debug => self.handle_debug_key(key),
            },
        }
        Ok(())
    }

    fn cycle_section(&mut self, step: isize) {
        let len = self.sections.len() as isize;
        let current = self
            .sections
            .iter()
            .position(|s| *s == self.section)
            .unwrap_or(0) as isize;
        let next = (current + step).rem_euclid(len) as usize;
        self.section = self.sections[next];
    }

    fn handle_slots_key(&mut self, key: KeyEvent) {
        let count = self.slots.count();
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => {
                self.selected_slot = if self.selected_slot <= 1 { count } else { self.selected_slot - 1 };
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.selected_slot = if self.selected_slot >= count { 1 } else { self.selected_slot + 1 };
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.vend(self.selected_slot),
            KeyCode::Char('n') => {
                self.name_field = 0;
                self.popup = Popup::SlotNames;
            }
            _ => {}
        }
    }

    fn handle_names_key(&mut self, key: KeyEvent) -> Result<()> {
        let fields = self.name_inputs.len();
        match key.code {
            KeyCode::Esc => {
                // Discard edits
                self.load_slot_names();
                self.popup = Popup::None;
            }
            KeyCode::Tab | KeyCode::Down => self.name_field = (self.name_field + 1) % fields,
            KeyCode::BackTab | KeyCode::Up => {
                self.name_field = self.name_field.checked_sub(1).unwrap_or(fields - 1);
            }
            KeyCode::Enter => {
                self.save_slot_names();
                self.popup = Popup::None;
            }
            KeyCode::Backspace => {
                if let Some(input) = self.name_inputs.get_mut(self.name_field) {
                    input.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(input) = self.name_inputs.get_mut(self.name_field) {
                    input.push(c);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_connection_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('s') => self.scan_ports(),
            KeyCode::Down | KeyCode::Char('j') => self.move_port(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_port(-1),
            KeyCode::Char('c') | KeyCode::Enter => self.connect_serial(),
            KeyCode::Char('x') => self.disconnect_serial(),
            _ => {}
        }
    }

    /// Step through the scanned ports, skipping ones in use
    fn move_port(&mut self, step: isize) {
        let len = self.ports.len() as isize;
        if len == 0 {
            return;
        }
        let mut idx = match self.selected_port {
            Some(i) => i as isize,
            None if step > 0 => -1,
            None => len,
        };
        for _ in 0..len {
            idx = (idx + step).rem_euclid(len);
            if self.ports[idx as usize].available {
                self.selected_port = Some(idx as usize);
                return;
            }
        }
    }

    fn handle_monitor_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('m') => self.start_monitoring(),
            KeyCode::Char('x') => self.stop_monitoring(),
            KeyCode::Char('C') => self.clear_log(),
            KeyCode::Char('t') => self.add_test_data(),
            KeyCode::Char('T') => self.send_test_commands(),
            KeyCode::Up | KeyCode::Char('k') => self.log_view.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.log_view.scroll_down(1),
            KeyCode::PageUp => self.log_view.scroll_up(10),
            KeyCode::PageDown => self.log_view.scroll_down(10),
            _ => {}
        }
    }

    fn handle_devices_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                if !self.devices.is_empty() {
                    self.device_row = (self.device_row + 1) % self.devices.len();
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if !self.devices.is_empty() {
                    self.device_row = self.device_row.checked_sub(1).unwrap_or(self.devices.len() - 1);
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(device) = self.devices.get(self.device_row) {
                    let id = device.device_id.clone();
                    self.select_device(&id);
                }
            }
            KeyCode::Char('a') => self.auto_select_device(),
            KeyCode::Char('r') => self.refresh_devices(),
            _ => {}
        }
    }

    fn handle_debug_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('s') => self.test_serial(),
            KeyCode::Char('d') => self.check_devices(),
            KeyCode::Char('v') => self.view_history(),
            _ => {}
        }
    }

    /// Wait for the next background result and apply it
    #[cfg(test)]
    async fn settle(&mut self) {
        let update = self.rx.recv().await.expect("update channel closed");
        self.apply(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{unreachable, FakeBackend};
    use crate::backend::*;
    use crate::config::prefs::SLOT_NAMES_FILE;
    use crate::dispatch::READY_MESSAGE;
    use crossterm::event::KeyModifiers;

    struct Harness {
        _dir: tempfile::TempDir,
        backend: Arc<FakeBackend>,
        app: App,
    }

    fn harness() -> Harness {
        harness_with(AppConfig::default(), None)
    }

    fn harness_with(config: AppConfig, saved_names: Option<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SLOT_NAMES_FILE);
        if let Some(content) = saved_names {
            std::fs::write(&path, content).unwrap();
        }
        let backend = Arc::new(FakeBackend::new());
        let app = App::new(config, PrefStore::at(path), backend.clone());
        Harness {
            _dir: dir,
            backend,
            app,
        }
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn code(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn devices() -> Vec<Device> {
        vec![
            Device {
                device_id: "serial_/dev/ttyUSB0".to_string(),
                kind: DeviceKind::Serial,
                connected: true,
                port: Some("/dev/ttyUSB0".to_string()),
                ip_address: None,
            },
            Device {
                device_id: "esp32_lobby".to_string(),
                kind: DeviceKind::Wifi,
                connected: false,
                port: None,
                ip_address: Some("10.0.0.9".to_string()),
            },
        ]
    }

    #[tokio::test]
    async fn test_number_keys_vend_once_and_reenable() {
        let mut h = harness();
        for slot in 1..=5u8 {
            h.app.handle_key(key((b'0' + slot) as char)).unwrap();
            assert!(h.app.slots.is_disabled(slot));
            h.app.settle().await;
            assert!(!h.app.slots.is_disabled(slot));
            assert_eq!(h.backend.count(&format!("POST /vend/{}", slot)), 1);
        }
    }

    #[tokio::test]
    async fn test_button_path_vends_selected_slot() {
        let mut h = harness();
        h.app.handle_key(code(KeyCode::Right)).unwrap();
        h.app.handle_key(code(KeyCode::Enter)).unwrap();
        h.app.settle().await;

        assert_eq!(h.backend.calls(), vec!["POST /vend/2"]);
    }

    #[tokio::test]
    async fn test_slot_reenabled_after_failures() {
        let mut h = harness();

        h.backend.set_vend(Err(unreachable()));
        h.app.vend(1);
        h.app.settle().await;
        assert!(!h.app.slots.is_disabled(1));
        assert_eq!(h.app.messages.current().text, "❌ Connection error: backend unreachable");
        assert!(h.app.last_action.as_deref().unwrap().starts_with("Connection error for slot 1 at "));

        h.backend.set_vend(Err(BackendError::Rejected {
            status: 500,
            message: "Internal server error".to_string(),
        }));
        h.app.vend(2);
        h.app.settle().await;
        assert!(!h.app.slots.is_disabled(2));
        assert_eq!(h.app.messages.current().text, "❌ Error: Internal server error");
    }

    #[tokio::test]
    async fn test_same_slot_double_press_is_refused() {
        let mut h = harness();

        h.app.handle_key(key('3')).unwrap();
        h.app.handle_key(key('3')).unwrap();
        h.app.settle().await;
        tokio::task::yield_now().await;

        assert_eq!(h.app.drain_updates(), 0);
        assert_eq!(h.backend.count("POST /vend/3"), 1);

        // Re-enabled, so the next press goes through
        h.app.handle_key(key('3')).unwrap();
        h.app.settle().await;
        assert_eq!(h.backend.count("POST /vend/3"), 2);
    }

    #[tokio::test]
    async fn test_success_reverts_error_persists() {
        let mut h = harness();
        h.backend.set_vend(Ok(VendReceipt {
            message: "Successfully sent vend command for slot 1 (simulated)".to_string(),
            communication: Some("simulation".to_string()),
        }));

        h.app.vend(1);
        h.app.settle().await;
        let shown = h.app.messages.current().clone();
        assert_eq!(shown.kind, MessageKind::Success);
        assert_eq!(
            shown.text,
            "✅ Successfully sent vend command for slot 1 (simulated) (🖥️ simulation)"
        );

        h.app.tick_at(shown.since + Duration::from_secs(3));
        assert_eq!(h.app.messages.current().text, READY_MESSAGE);

        h.backend.set_vend(Err(BackendError::Rejected {
            status: 400,
            message: "Invalid slot".to_string(),
        }));
        h.app.vend(1);
        h.app.settle().await;
        let shown = h.app.messages.current().clone();
        h.app.tick_at(shown.since + Duration::from_secs(60));
        assert_eq!(h.app.messages.current().text, "❌ Error: Invalid slot");
    }

    #[tokio::test]
    async fn test_status_failure_only_flips_indicator() {
        let mut h = harness();
        h.app.apply(Update::Poll(PollResult::Status(Ok(StatusReport {
            esp32_serial: Some("connected".to_string()),
            online_devices: 1,
            ..StatusReport::default()
        }))));
        h.app.apply(Update::Poll(PollResult::DeviceList(Ok(DeviceListing {
            devices: devices(),
            active_device: None,
        }))));
        assert!(h.app.indicator.online);

        h.app.apply(Update::Poll(PollResult::Status(Err(unreachable()))));
        h.app.apply(Update::Poll(PollResult::DeviceList(Err(unreachable()))));

        assert_eq!(h.app.indicator, Indicator::check_failed());
        assert!(h.app.serial.connected);
        assert_eq!(h.app.devices.len(), 2);
    }

    #[tokio::test]
    async fn test_device_list_replaces_previous() {
        let mut h = harness();
        h.app.apply(Update::Poll(PollResult::DeviceList(Ok(DeviceListing {
            devices: devices(),
            active_device: Some("serial_/dev/ttyUSB0".to_string()),
        }))));
        h.app.device_row = 1;

        h.app.apply(Update::Poll(PollResult::DeviceList(Ok(DeviceListing {
            devices: devices()[..1].to_vec(),
            active_device: None,
        }))));

        assert_eq!(h.app.devices.len(), 1);
        assert_eq!(h.app.device_row, 0);
        assert!(h.app.active_device.is_none());
    }

    #[tokio::test]
    async fn test_monitor_start_stop_idempotent() {
        let mut h = harness();

        h.app.start_monitoring();
        h.app.start_monitoring();
        assert!(h.app.monitoring);
        assert!(h.app.log_view.placeholder().is_none());

        h.app.stop_monitoring();
        h.app.stop_monitoring();
        assert!(!h.app.monitoring);
        assert_eq!(h.app.messages.current().text, "🛑 ESP32 communication monitor stopped");
    }

    #[tokio::test]
    async fn test_log_updates_dropped_while_stopped() {
        let mut h = harness();
        let snapshot = LogSnapshot {
            log_entries: vec![LogEntry::default(); 3],
            total_entries: 3,
        };

        h.app.apply(Update::Poll(PollResult::CommunicationLog(Ok(snapshot.clone()))));
        assert!(h.app.log_view.is_empty());

        h.app.start_monitoring();
        h.app.apply(Update::Poll(PollResult::CommunicationLog(Ok(snapshot))));
        assert_eq!(h.app.log_view.len(), 3);
        h.app.stop_monitoring();
    }

    #[tokio::test]
    async fn test_clear_log_resets_view() {
        let mut h = harness();
        h.app.start_monitoring();
        h.app.apply(Update::Poll(PollResult::CommunicationLog(Ok(LogSnapshot {
            log_entries: vec![LogEntry::default(); 5],
            total_entries: 5,
        }))));
        h.app.stop_monitoring();

        h.app.clear_log();
        h.app.settle().await;

        assert!(h.app.log_view.is_empty());
        assert_eq!(h.app.log_view.last_count(), 0);
        assert_eq!(h.app.messages.current().text, "✅ Communication log cleared");
    }

    #[tokio::test]
    async fn test_test_data_hint_when_not_monitoring() {
        let mut h = harness();
        h.app.add_test_data();
        h.app.settle().await;

        assert_eq!(
            h.app.messages.current().text,
            "💡 Start monitor to see the test entries"
        );
    }

    #[tokio::test]
    async fn test_select_device_refreshes_on_success_only() {
        let mut h = harness();
        let listing = DeviceListing {
            devices: devices(),
            active_device: None,
        };
        *h.backend.listing.lock().unwrap() = Some(Ok(listing.clone()));
        h.app.apply(Update::Poll(PollResult::DeviceList(Ok(listing))));

        h.app.select_device("serial_/dev/ttyUSB0");
        h.app.settle().await;
        assert_eq!(h.app.active_device.as_deref(), Some("serial_/dev/ttyUSB0"));
        assert_eq!(h.app.selected_device.as_deref(), Some("serial_/dev/ttyUSB0"));
        // The refresh poll lands next
        h.app.settle().await;
        assert_eq!(h.backend.count("GET /esp32/devices/list"), 1);

        *h.backend.select.lock().unwrap() = Some(Err(BackendError::Rejected {
            status: 404,
            message: "Device not found".to_string(),
        }));
        h.app.select_device("serial_/dev/ttyUSB0");
        h.app.settle().await;
        tokio::task::yield_now().await;
        assert_eq!(h.app.messages.current().text, "❌ Failed to select device: Device not found");
        assert_eq!(h.backend.count("GET /esp32/devices/list"), 1);
    }

    #[tokio::test]
    async fn test_disconnected_device_not_selectable() {
        let mut h = harness();
        h.app.apply(Update::Poll(PollResult::DeviceList(Ok(DeviceListing {
            devices: devices(),
            active_device: None,
        }))));

        h.app.select_device("esp32_lobby");
        tokio::task::yield_now().await;

        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_auto_select_failure_keeps_selection() {
        let mut h = harness();
        h.app.active_device = Some("esp32_lobby".to_string());
        *h.backend.auto_select.lock().unwrap() = Some(Err(unreachable()));

        h.app.auto_select_device();
        h.app.settle().await;

        assert_eq!(h.app.active_device.as_deref(), Some("esp32_lobby"));
        assert_eq!(
            h.app.messages.current().text,
            "❌ Error with auto-select: backend unreachable"
        );
    }

    #[tokio::test]
    async fn test_connect_requires_port() {
        let mut h = harness();
        h.app.connect_serial();
        assert_eq!(h.app.messages.current().text, "❌ Please select a port first");

        h.app.apply(Update::Command(CommandResult::PortsScanned(Ok(PortScan {
            ports: vec![
                SerialPort {
                    device: "/dev/ttyS0".to_string(),
                    description: "busy".to_string(),
                    likely_esp32: false,
                    available: false,
                },
                SerialPort {
                    device: "/dev/ttyUSB0".to_string(),
                    description: "CP2102".to_string(),
                    likely_esp32: true,
                    available: true,
                },
            ],
        }))));
        assert_eq!(h.app.messages.current().text, "✅ Found 2 serial ports");

        // The in-use port is skipped
        h.app.move_port(1);
        assert_eq!(h.app.selected_port, Some(1));

        h.app.connect_serial();
        h.app.settle().await;
        assert!(h.app.serial.connected);
        assert_eq!(h.app.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert!(h.backend.calls().contains(&"POST /esp32/serial/connect /dev/ttyUSB0".to_string()));
        // Status is re-polled once the link is up
        h.app.settle().await;
        assert_eq!(h.backend.count("GET /status"), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_keeps_link_down() {
        let mut h = harness();
        h.app.ports = vec![SerialPort {
            device: "/dev/ttyUSB0".to_string(),
            description: "CP2102".to_string(),
            likely_esp32: true,
            available: true,
        }];
        h.app.selected_port = Some(0);
        *h.backend.connect.lock().unwrap() = Some(Err(BackendError::Rejected {
            status: 500,
            message: "Failed to connect to /dev/ttyUSB0".to_string(),
        }));

        h.app.connect_serial();
        h.app.settle().await;
        tokio::task::yield_now().await;

        assert!(!h.app.serial.connected);
        assert!(!h.app.connecting);
        assert_eq!(h.app.messages.current().text, "❌ Failed to connect to /dev/ttyUSB0");
        assert_eq!(h.backend.count("GET /status"), 0);
    }

    #[tokio::test]
    async fn test_disconnect_success_and_errors() {
        let mut h = harness();
        let linked = SerialLink {
            connected: true,
            port: Some("/dev/ttyUSB0".to_string()),
        };

        h.app.serial = linked.clone();
        h.app.disconnect_serial();
        h.app.settle().await;
        assert!(!h.app.serial.connected);
        assert!(!h.app.disconnecting);
        assert_eq!(h.app.messages.current().text, "✅ Disconnected from ESP32");
        h.app.settle().await;
        assert_eq!(h.backend.count("GET /status"), 1);

        h.app.serial = linked.clone();
        *h.backend.disconnect.lock().unwrap() = Some(Err(BackendError::Rejected {
            status: 500,
            message: "No serial connection".to_string(),
        }));
        h.app.disconnect_serial();
        h.app.settle().await;
        assert!(h.app.serial.connected);
        assert_eq!(h.app.messages.current().text, "❌ Error: No serial connection");

        *h.backend.disconnect.lock().unwrap() = Some(Err(unreachable()));
        h.app.disconnect_serial();
        h.app.settle().await;
        tokio::task::yield_now().await;
        assert!(h.app.serial.connected);
        assert_eq!(
            h.app.messages.current().text,
            "❌ Disconnect error: backend unreachable"
        );
        assert_eq!(h.backend.count("GET /status"), 1);
    }

    #[tokio::test]
    async fn test_disconnect_needs_live_link() {
        let mut h = harness();
        h.app.disconnect_serial();
        tokio::task::yield_now().await;
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scan_failure_clears_scanning() {
        let mut h = harness();
        *h.backend.scan.lock().unwrap() = Some(Err(unreachable()));

        h.app.scan_ports();
        assert!(h.app.scanning);
        h.app.settle().await;

        assert!(!h.app.scanning);
        assert!(h.app.ports.is_empty());
        assert_eq!(
            h.app.messages.current().text,
            "❌ Error scanning ports: backend unreachable"
        );
    }

    #[tokio::test]
    async fn test_auto_select_success_refreshes_devices() {
        let mut h = harness();
        *h.backend.auto_select.lock().unwrap() = Some(Ok(AutoSelection {
            message: "Auto-selected device: serial_/dev/ttyUSB0".to_string(),
            active_device: Some("serial_/dev/ttyUSB0".to_string()),
        }));
        *h.backend.listing.lock().unwrap() = Some(Ok(DeviceListing {
            devices: devices(),
            active_device: Some("serial_/dev/ttyUSB0".to_string()),
        }));

        h.app.auto_select_device();
        h.app.settle().await;
        assert_eq!(h.app.selected_device.as_deref(), Some("serial_/dev/ttyUSB0"));
        assert_eq!(h.app.active_device.as_deref(), Some("serial_/dev/ttyUSB0"));
        assert_eq!(
            h.app.messages.current().text,
            "✅ Auto-selected device: serial_/dev/ttyUSB0"
        );

        h.app.settle().await;
        assert_eq!(h.backend.count("GET /esp32/devices/list"), 1);
        assert_eq!(h.app.devices.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_test_commands_reports_each_slot() {
        let mut h = harness();
        h.backend.set_vend(Ok(VendReceipt {
            message: "Vend command sent".to_string(),
            communication: None,
        }));

        h.app.send_test_commands();
        assert!(h.app.sending_tests);
        // A second press while running is ignored
        h.app.send_test_commands();
        h.app.settle().await;

        assert!(!h.app.sending_tests);
        assert_eq!(h.app.messages.current().text, "✅ Test commands completed");
        for slot in TEST_COMMAND_SLOTS {
            assert_eq!(h.backend.count(&format!("POST /vend/{}", slot)), 1);
        }
        let lines: Vec<&str> = h.app.debug.lines().map(String::as_str).collect();
        for slot in TEST_COMMAND_SLOTS {
            let expected = format!("✅ Test slot {}: Vend command sent", slot);
            assert!(lines.iter().any(|l| l.ends_with(&expected)), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_monitor_renders_polled_log() {
        let mut h = harness();
        let entry = |message: &str| LogEntry {
            direction: Direction::Received,
            message: message.to_string(),
            ..LogEntry::default()
        };
        h.backend.set_log(Ok(LogSnapshot {
            log_entries: vec![entry("boot"), entry("ready"), entry("vend ok")],
            total_entries: 3,
        }));

        h.app.start_monitoring();
        h.app.settle().await;
        h.app.stop_monitoring();

        assert_eq!(h.app.log_view.len(), 3);
        assert!(h.backend.count("GET /esp32/communication/log") >= 1);
    }

    #[tokio::test]
    async fn test_names_editor_saves_and_reloads() {
        let mut h = harness();
        h.app.handle_key(key('n')).unwrap();
        assert_eq!(h.app.popup, Popup::SlotNames);

        // Second field
        h.app.handle_key(code(KeyCode::Tab)).unwrap();
        for c in " Soda ".chars() {
            h.app.handle_key(key(c)).unwrap();
        }
        h.app.handle_key(code(KeyCode::Enter)).unwrap();

        assert_eq!(h.app.popup, Popup::None);
        assert_eq!(h.app.slot_label(2), "Soda");
        assert_eq!(h.app.slot_label(1), "Slot 1");
        assert_eq!(h.app.messages.current().text, "✅ Slot names updated!");
        // Typing digits in the editor must not vend
        assert!(h.backend.calls().is_empty());

        // Fresh session on the same file
        let path = h.app.prefs.path().to_path_buf();
        let fresh = App::new(AppConfig::default(), PrefStore::at(path), h.backend.clone());
        assert_eq!(fresh.name_inputs[1], "Soda");
        for idx in [0, 2, 3, 4] {
            assert!(fresh.name_inputs[idx].is_empty());
            assert_eq!(fresh.slot_labels[idx], format!("Slot {}", idx + 1));
        }
    }

    #[tokio::test]
    async fn test_invalid_saved_names_fall_back_to_defaults() {
        let h = harness_with(AppConfig::default(), Some("{{{"));
        for slot in 1..=5 {
            assert_eq!(h.app.slot_label(slot), format!("Slot {}", slot));
        }
    }

    #[tokio::test]
    async fn test_out_of_range_saved_names_ignored() {
        let config = AppConfig {
            slots: 3,
            ..AppConfig::default()
        };
        let h = harness_with(config, Some(r#"{"1": "Cola", "5": "Gum"}"#));
        assert_eq!(h.app.slot_labels, vec!["Cola", "Slot 2", "Slot 3"]);
    }

    #[tokio::test]
    async fn test_sections_follow_panels() {
        let mut config = AppConfig::default();
        config.panels.monitor = false;
        config.panels.debug = true;
        let mut h = harness_with(config, None);

        assert_eq!(
            h.app.sections,
            vec![Section::Slots, Section::Connection, Section::Devices, Section::Debug]
        );
        h.app.handle_key(code(KeyCode::BackTab)).unwrap();
        assert_eq!(h.app.section, Section::Debug);
        h.app.handle_key(code(KeyCode::Tab)).unwrap();
        assert_eq!(h.app.section, Section::Slots);
    }

    #[tokio::test]
    async fn test_debug_checks_write_output() {
        let mut h = harness_with(
            AppConfig {
                panels: crate::config::Panels {
                    debug: true,
                    ..Default::default()
                },
                ..AppConfig::default()
            },
            None,
        );

        h.app.view_history();
        h.app.settle().await;

        let lines: Vec<&String> = h.app.debug.lines().collect();
        assert!(lines[0].ends_with("Fetching command history..."));
        assert!(lines.last().unwrap().ends_with("No commands in history"));
    }
}
