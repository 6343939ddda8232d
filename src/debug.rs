//! Debug output panel: a short, timestamped scratch log plus the text of
//! the diagnostic checks.

use std::collections::VecDeque;

use crate::backend::{CommandHistory, DeviceInventory, StatusReport};

pub const DEBUG_LINES: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct DebugLog {
    lines: VecDeque<String>,
}

impl DebugLog {
    pub fn push(&mut self, message: impl AsRef<str>) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.push_stamped(&stamp.to_string(), message.as_ref());
    }

    fn push_stamped(&mut self, stamp: &str, message: &str) {
        tracing::debug!("DEBUG: {}", message);
        self.lines.push_back(format!("[{}] {}", stamp, message));
        while self.lines.len() > DEBUG_LINES {
            self.lines.pop_front();
        }
    }

    pub fn extend<I, S>(&mut self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for message in messages {
            self.push(message);
        }
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &String> + ExactSizeIterator {
        self.lines.iter()
    }
}

pub fn serial_test_lines(report: &StatusReport) -> Vec<String> {
    if report.serial_connected() {
        let port = report
            .communication_modes
            .as_ref()
            .and_then(|m| m.serial.as_ref())
            .and_then(|s| s.port())
            .unwrap_or("unknown");
        vec![
            "✅ Serial connection: ACTIVE".to_string(),
            format!("   Port: {}", port),
        ]
    } else {
        vec![
            "❌ Serial connection: INACTIVE".to_string(),
            "   Check USB cable and ESP32 connection".to_string(),
        ]
    }
}

pub fn device_check_lines(inventory: &DeviceInventory) -> Vec<String> {
    let mut lines = vec![format!("Serial devices: {}", inventory.serial_devices.len())];
    for device in &inventory.serial_devices {
        lines.push(format!(
            "  {}: {} ({})",
            device.kind,
            device.port,
            if device.connected { "connected" } else { "disconnected" }
        ));
    }
    lines.push(format!("WiFi devices: {}", inventory.wifi_devices.len()));
    for device in &inventory.wifi_devices {
        lines.push(format!(
            "  {}: {} ({})",
            device.device_id,
            device.ip_address.as_deref().unwrap_or("no ip"),
            device.status
        ));
    }
    lines.push(format!("Total devices: {}", inventory.total_devices));
    lines
}

pub fn history_lines(history: &CommandHistory) -> Vec<String> {
    let mut lines = vec![format!(
        "Command history (last {} commands):",
        history.commands.len()
    )];
    if history.commands.is_empty() {
        lines.push("  No commands in history".to_string());
    }
    for cmd in &history.commands {
        lines.push(format!(
            "  [{}] Slot {} -> {} ({})",
            clock_time(&cmd.timestamp),
            cmd.slot,
            cmd.status,
            cmd.device_id
        ));
    }
    lines
}

/// `2024-05-01T14:03:22.123456` → `14:03:22`; anything unparsable is shown as-is
fn clock_time(timestamp: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| t.format("%H:%M:%S").to_string())
        .or_else(|_| {
            chrono::DateTime::parse_from_rfc3339(timestamp)
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        })
        .unwrap_or_else(|_| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandRecord, SerialDevice, WifiDevice};

    #[test]
    fn test_debug_log_is_bounded() {
        let mut log = DebugLog::default();
        for i in 0..60 {
            log.push_stamped("10:00:00", &format!("line {}", i));
        }

        assert_eq!(log.lines().len(), DEBUG_LINES);
        assert_eq!(log.lines().next().unwrap(), "[10:00:00] line 10");
        assert_eq!(log.lines().last().unwrap(), "[10:00:00] line 59");
    }

    #[test]
    fn test_serial_test_inactive() {
        let lines = serial_test_lines(&StatusReport::default());
        assert_eq!(lines[0], "❌ Serial connection: INACTIVE");
    }

    #[test]
    fn test_device_check_lines() {
        let inventory = DeviceInventory {
            serial_devices: vec![SerialDevice {
                kind: "serial".to_string(),
                port: "COM3".to_string(),
                connected: true,
            }],
            wifi_devices: vec![WifiDevice {
                device_id: "esp32_a".to_string(),
                ip_address: Some("10.0.0.7".to_string()),
                status: "online".to_string(),
            }],
            total_devices: 2,
        };

        assert_eq!(
            device_check_lines(&inventory),
            vec![
                "Serial devices: 1",
                "  serial: COM3 (connected)",
                "WiFi devices: 1",
                "  esp32_a: 10.0.0.7 (online)",
                "Total devices: 2",
            ]
        );
    }

    #[test]
    fn test_history_lines() {
        let empty = history_lines(&CommandHistory::default());
        assert_eq!(empty, vec!["Command history (last 0 commands):", "  No commands in history"]);

        let history = CommandHistory {
            commands: vec![CommandRecord {
                timestamp: "2024-05-01T14:03:22.123456".to_string(),
                slot: 2,
                status: "sent".to_string(),
                device_id: "esp32_a".to_string(),
            }],
        };
        assert_eq!(history_lines(&history)[1], "  [14:03:22] Slot 2 -> sent (esp32_a)");
    }

    #[test]
    fn test_clock_time_passthrough() {
        assert_eq!(clock_time("yesterday"), "yesterday");
    }
}
