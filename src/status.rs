//! Turning polled backend state into indicator text.

use crate::backend::StatusReport;

/// The top-level ESP32 connectivity indicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub online: bool,
    pub text: String,
}

impl Indicator {
    pub fn checking() -> Self {
        Self {
            online: false,
            text: "ESP32: Checking...".to_string(),
        }
    }

    pub fn from_report(report: &StatusReport) -> Self {
        if report.online_devices > 0 {
            Self {
                online: true,
                text: format!("ESP32: {} device(s) connected", report.online_devices),
            }
        } else if report.device_count() > 0 {
            Self {
                online: false,
                text: format!("ESP32: {} device(s) registered (offline)", report.device_count()),
            }
        } else {
            Self {
                online: false,
                text: "ESP32: No devices connected (simulation mode)".to_string(),
            }
        }
    }

    /// Shown when `/status` itself failed
    pub fn check_failed() -> Self {
        Self {
            online: false,
            text: "ESP32: Connection check failed".to_string(),
        }
    }
}

/// Serial connection state as shown in the connection panel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialLink {
    pub connected: bool,
    pub port: Option<String>,
}

impl SerialLink {
    pub fn from_report(report: &StatusReport) -> Self {
        let mode = report
            .communication_modes
            .as_ref()
            .and_then(|modes| modes.serial.as_ref());
        match mode {
            Some(mode) => Self {
                connected: mode.is_connected(),
                port: mode.port().map(str::to_string),
            },
            None => Self {
                connected: report.serial_connected(),
                port: None,
            },
        }
    }

    pub fn text(&self) -> String {
        if self.connected {
            format!("Connected to {}", self.port.as_deref().unwrap_or("unknown port"))
        } else {
            "Not connected".to_string()
        }
    }

    pub fn can_connect(&self, port_selected: bool) -> bool {
        !self.connected && port_selected
    }

    pub fn can_disconnect(&self) -> bool {
        self.connected
    }
}

pub fn wifi_summary(report: &StatusReport) -> String {
    if report.esp32_wifi_devices > 0 {
        format!("{} WiFi device(s) connected", report.esp32_wifi_devices)
    } else {
        "No WiFi devices detected".to_string()
    }
}

/// Which links the backend can currently use
pub fn link_label(report: &StatusReport) -> &'static str {
    let serial = report.serial_connected();
    let wifi = report.esp32_wifi_devices > 0;
    match (serial, wifi) {
        (true, true) => "Hybrid (USB + WiFi)",
        (true, false) => "USB Serial",
        (false, true) => "WiFi Network",
        (false, false) => "Simulation Mode",
    }
}

pub fn active_device_label(active: Option<&str>) -> String {
    match active {
        Some(id) => {
            let kind = if id.starts_with("serial_") { "Serial" } else { "WiFi" };
            let name = id.replace("serial_", "").replace("wifi_", "");
            format!("🎯 {}: {}", kind, name)
        }
        None => "Auto-select (priority: Serial → WiFi)".to_string(),
    }
}
