//! JSON bodies exchanged with the vending backend.
//!
//! Every field is optional on the wire: the backend has shipped several
//! variants and older ones omit fields freely, so decoding falls back to
//! defaults instead of failing the whole poll.

use serde::{Deserialize, Serialize};

/// `POST /vend/{slot}` success body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendReceipt {
    #[serde(default)]
    pub message: String,
    /// "serial", "wifi", "simulation", ...
    #[serde(default)]
    pub communication: Option<String>,
}

/// `GET /status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub esp32_serial: Option<String>,
    #[serde(default)]
    pub esp32_wifi_devices: u32,
    #[serde(default)]
    pub online_devices: u32,
    #[serde(default)]
    pub esp32_devices: Option<u32>,
    /// Older servers report the registered count under this name
    #[serde(default)]
    pub total_devices: Option<u32>,
    #[serde(default)]
    pub communication_modes: Option<CommunicationModes>,
}

impl StatusReport {
    pub fn serial_connected(&self) -> bool {
        self.esp32_serial.as_deref() == Some("connected")
    }

    /// Registered devices, whichever key the server used
    pub fn device_count(&self) -> u32 {
        self.esp32_devices.or(self.total_devices).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunicationModes {
    #[serde(default)]
    pub serial: Option<SerialMode>,
}

/// Newer backends report `{status, port}`, the Pi build reports a bare string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SerialMode {
    Detailed {
        #[serde(default)]
        status: String,
        #[serde(default)]
        port: Option<String>,
    },
    Summary(String),
}

impl SerialMode {
    pub fn is_connected(&self) -> bool {
        match self {
            SerialMode::Detailed { status, .. } => status == "connected",
            SerialMode::Summary(s) => s == "connected",
        }
    }

    pub fn port(&self) -> Option<&str> {
        match self {
            SerialMode::Detailed { port, .. } => port.as_deref(),
            SerialMode::Summary(_) => None,
        }
    }
}

/// `GET /esp32/devices`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInventory {
    #[serde(default)]
    pub serial_devices: Vec<SerialDevice>,
    #[serde(default)]
    pub wifi_devices: Vec<WifiDevice>,
    #[serde(default)]
    pub total_devices: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerialDevice {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub connected: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiDevice {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub status: String,
}

/// `GET /esp32/commands/history`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandHistory {
    #[serde(default)]
    pub commands: Vec<CommandRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRecord {
    /// ISO-8601, as written by the backend
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub slot: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub device_id: String,
}

/// `GET /esp32/communication/mode`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeReport {
    #[serde(default)]
    pub current_mode: Option<String>,
}

/// `GET /esp32/serial/scan`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortScan {
    #[serde(default)]
    pub ports: Vec<SerialPort>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerialPort {
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub likely_esp32: bool,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

impl SerialPort {
    /// Option text shown in the port picker
    pub fn display(&self) -> String {
        let mut text = format!("{} - {}", self.device, self.description);
        if self.likely_esp32 {
            text.push_str(" (likely ESP32)");
        }
        if !self.available {
            text.push_str(" [IN USE - close other programs]");
        }
        text
    }
}

/// Generic `{message}` acknowledgement (serial connect/disconnect, log clear)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: String,
}

/// `POST /esp32/communication/test`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestDataReceipt {
    #[serde(default)]
    pub entries_added: u32,
}

/// `GET /esp32/communication/log`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSnapshot {
    #[serde(default)]
    pub log_entries: Vec<LogEntry>,
    #[serde(default)]
    pub total_entries: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    #[serde(default)]
    pub direction: Direction,
    #[serde(default, rename = "type")]
    pub category: Category,
    #[serde(default)]
    pub formatted_time: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_type: DeviceKind,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Vend,
    Status,
    Error,
    Success,
    Discovery,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Serial,
    Wifi,
    #[default]
    #[serde(other)]
    Unknown,
}

/// `GET /esp32/devices/list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceListing {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub active_device: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    #[serde(default)]
    pub device_id: String,
    #[serde(default, rename = "type")]
    pub kind: DeviceKind,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl Device {
    pub fn display_name(&self) -> String {
        match self.kind {
            DeviceKind::Serial => format!("Serial {}", self.port.as_deref().unwrap_or("?")),
            _ => format!("WiFi {}", self.device_id),
        }
    }

    /// Address plus connection state, e.g. `192.168.1.40 - Connected`
    pub fn info(&self) -> String {
        let address = match self.kind {
            DeviceKind::Serial => self.port.clone().unwrap_or_default(),
            _ => self.ip_address.clone().unwrap_or_else(|| "No IP".to_string()),
        };
        let state = if self.connected { "Connected" } else { "Disconnected" };
        format!("{} - {}", address, state)
    }

    pub fn badge(&self) -> &'static str {
        match self.kind {
            DeviceKind::Serial => "SERIAL",
            DeviceKind::Wifi => "WIFI",
            DeviceKind::Unknown => "UNKNOWN",
        }
    }
}

/// `POST /esp32/devices/auto-select`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoSelection {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub active_device: Option<String>,
}

/// Error body: the backend uses `message` on some routes and `error` on others
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn text(self) -> Option<String> {
        self.message.or(self.error).filter(|s| !s.is_empty())
    }
}
