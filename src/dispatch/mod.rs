//! User-triggered backend commands: what gets sent, and how each outcome
//! is reported back to the panel.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::backend::*;

pub const READY_MESSAGE: &str = "Ready to vend";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub kind: MessageKind,
    pub since: Instant,
}

/// The main message line. Success messages revert to "Ready to vend" after
/// a delay; errors stay until something replaces them.
#[derive(Debug, Clone)]
pub struct MessageBox {
    current: Message,
    revert_after: Duration,
}

impl MessageBox {
    pub fn new(revert_after: Duration) -> Self {
        Self {
            current: Message {
                text: READY_MESSAGE.to_string(),
                kind: MessageKind::Info,
                since: Instant::now(),
            },
            revert_after,
        }
    }

    pub fn current(&self) -> &Message {
        &self.current
    }

    pub fn set(&mut self, text: impl Into<String>, kind: MessageKind) {
        self.set_at(text, kind, Instant::now());
    }

    pub fn set_at(&mut self, text: impl Into<String>, kind: MessageKind, now: Instant) {
        self.current = Message {
            text: text.into(),
            kind,
            since: now,
        };
    }

    /// Revert an expired success message. Only the message currently shown
    /// can expire, so a newer error is never wiped by an older success.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.current.kind == MessageKind::Success
            && now.saturating_duration_since(self.current.since) >= self.revert_after
        {
            self.set_at(READY_MESSAGE, MessageKind::Info, now);
            return true;
        }
        false
    }
}

/// Why a vend wasn't sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("No slot {0}")]
    UnknownSlot(u8),
    #[error("Slot {0} is already vending")]
    InFlight(u8),
}

/// Enabled/disabled state of the slot buttons
#[derive(Debug, Clone)]
pub struct SlotControls {
    slots: u8,
    in_flight: BTreeSet<u8>,
}

impl SlotControls {
    pub fn new(slots: u8) -> Self {
        Self {
            slots,
            in_flight: BTreeSet::new(),
        }
    }

    pub fn count(&self) -> u8 {
        self.slots
    }

    pub fn exists(&self, slot: u8) -> bool {
        (1..=self.slots).contains(&slot)
    }

    pub fn is_disabled(&self, slot: u8) -> bool {
        self.in_flight.contains(&slot)
    }

    /// Disable the slot for the duration of a request
    pub fn acquire(&mut self, slot: u8) -> Result<(), Refusal> {
        if !self.exists(slot) {
            return Err(Refusal::UnknownSlot(slot));
        }
        if !self.in_flight.insert(slot) {
            return Err(Refusal::InFlight(slot));
        }
        Ok(())
    }

    pub fn release(&mut self, slot: u8) {
        self.in_flight.remove(&slot);
    }
}

/// A single backend operation started by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Vend(u8),
    ScanPorts,
    ConnectSerial(String),
    DisconnectSerial,
    ClearLog,
    AddTestData,
    /// Vend each slot in turn, pausing `gap` after each success except the last
    SendTestCommands { slots: Vec<u8>, gap: Duration },
    SelectDevice(String),
    AutoSelectDevice,
    TestSerial,
    CheckDevices,
    ViewHistory,
}

#[derive(Debug, Clone)]
pub enum CommandResult {
    Vend { slot: u8, result: BackendResult<VendReceipt> },
    PortsScanned(BackendResult<PortScan>),
    SerialConnected { port: String, result: BackendResult<Ack> },
    SerialDisconnected(BackendResult<Ack>),
    LogCleared(BackendResult<()>),
    TestDataAdded(BackendResult<TestDataReceipt>),
    TestCommandsFinished(Vec<(u8, BackendResult<VendReceipt>)>),
    DeviceSelected { device_id: String, result: BackendResult<()> },
    AutoSelected(BackendResult<AutoSelection>),
    SerialTested(BackendResult<StatusReport>),
    DevicesChecked(BackendResult<DeviceInventory>),
    HistoryFetched(BackendResult<CommandHistory>),
}

/// Run one command to completion. Every outcome, including transport
/// failure, comes back as a `CommandResult`.
pub async fn execute(backend: &dyn Backend, command: Command) -> CommandResult {
    match command {
        Command::Vend(slot) => {
            tracing::debug!("Sending vend for slot {}", slot);
            CommandResult::Vend {
                slot,
                result: backend.vend(slot).await,
            }
        }
        Command::ScanPorts => CommandResult::PortsScanned(backend.scan_serial_ports().await),
        Command::ConnectSerial(port) => {
            let result = backend.connect_serial(&port).await;
            CommandResult::SerialConnected { port, result }
        }
        Command::DisconnectSerial => {
            CommandResult::SerialDisconnected(backend.disconnect_serial().await)
        }
        Command::ClearLog => CommandResult::LogCleared(backend.clear_communication_log().await),
        Command::AddTestData => CommandResult::TestDataAdded(backend.add_test_entries().await),
        Command::SendTestCommands { slots, gap } => {
            let mut outcomes = Vec::with_capacity(slots.len());
            let last = slots.len().saturating_sub(1);
            for (i, slot) in slots.into_iter().enumerate() {
                let result = backend.vend(slot).await;
                let pause = match &result {
                    Ok(receipt) => {
                        tracing::info!("Test slot {}: {}", slot, receipt.message);
                        i < last
                    }
                    Err(e) => {
                        tracing::warn!("Test slot {} failed: {}", slot, e);
                        false
                    }
                };
                outcomes.push((slot, result));
                if pause {
                    tokio::time::sleep(gap).await;
                }
            }
            CommandResult::TestCommandsFinished(outcomes)
        }
        Command::SelectDevice(device_id) => {
            let result = backend.select_device(&device_id).await;
            CommandResult::DeviceSelected { device_id, result }
        }
        Command::AutoSelectDevice => CommandResult::AutoSelected(backend.auto_select_device().await),
        Command::TestSerial => CommandResult::SerialTested(backend.status().await),
        Command::CheckDevices => CommandResult::DevicesChecked(backend.devices().await),
        Command::ViewHistory => CommandResult::HistoryFetched(backend.command_history().await),
    }
}

/// How a finished vend is shown: message line, "last action", debug echo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendReport {
    pub message: String,
    pub kind: MessageKind,
    pub last_action: String,
    pub debug: String,
}

pub fn link_icon(communication: &str) -> &'static str {
    match communication {
        "serial" => "🔌",
        "wifi" => "📡",
        _ => "🖥️",
    }
}

impl VendReport {
    pub fn new(slot: u8, result: &BackendResult<VendReceipt>, at: &str) -> Self {
        match result {
            Ok(receipt) => match receipt.communication.as_deref() {
                Some(link) => Self {
                    message: format!("✅ {} ({} {})", receipt.message, link_icon(link), link),
                    kind: MessageKind::Success,
                    last_action: format!("Slot {} vended via {} at {}", slot, link, at),
                    debug: format!("VEND SUCCESS: Slot {} via {}", slot, link),
                },
                None => Self {
                    message: format!("✅ {}", receipt.message),
                    kind: MessageKind::Success,
                    last_action: format!("Slot {} vended successfully at {}", slot, at),
                    debug: format!("VEND SUCCESS: Slot {}", slot),
                },
            },
            Err(BackendError::Rejected { message, .. }) => Self {
                message: format!("❌ Error: {}", message),
                kind: MessageKind::Error,
                last_action: format!("Failed to vend slot {} at {}", slot, at),
                debug: format!("VEND ERROR: Slot {} - {}", slot, message),
            },
            Err(BackendError::Transport(reason)) => Self {
                message: format!("❌ Connection error: {}", reason),
                kind: MessageKind::Error,
                last_action: format!("Connection error for slot {} at {}", slot, at),
                debug: format!("CONNECTION ERROR: {}", reason),
            },
        }
    }
}
