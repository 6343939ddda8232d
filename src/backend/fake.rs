//! In-memory backend for tests: canned responses plus a call log.

use async_trait::async_trait;
use std::sync::Mutex;

use super::types::*;
use super::{Backend, BackendError, BackendResult};

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<String>>,
    pub vend: Mutex<Option<BackendResult<VendReceipt>>>,
    pub status: Mutex<Option<BackendResult<StatusReport>>>,
    pub log: Mutex<Option<BackendResult<LogSnapshot>>>,
    pub listing: Mutex<Option<BackendResult<DeviceListing>>>,
    pub select: Mutex<Option<BackendResult<()>>>,
    pub auto_select: Mutex<Option<BackendResult<AutoSelection>>>,
    pub scan: Mutex<Option<BackendResult<PortScan>>>,
    pub connect: Mutex<Option<BackendResult<Ack>>>,
    pub disconnect: Mutex<Option<BackendResult<Ack>>>,
    pub history: Mutex<Option<BackendResult<CommandHistory>>>,
    pub inventory: Mutex<Option<BackendResult<DeviceInventory>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_vend(&self, result: BackendResult<VendReceipt>) {
        *self.vend.lock().unwrap() = Some(result);
    }

    pub fn set_status(&self, result: BackendResult<StatusReport>) {
        *self.status.lock().unwrap() = Some(result);
    }

    pub fn set_log(&self, result: BackendResult<LogSnapshot>) {
        *self.log.lock().unwrap() = Some(result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

fn canned<T: Clone + Default>(slot: &Mutex<Option<BackendResult<T>>>) -> BackendResult<T> {
    slot.lock().unwrap().clone().unwrap_or_else(|| Ok(T::default()))
}

pub fn unreachable() -> BackendError {
    BackendError::Transport("backend unreachable".to_string())
}

#[async_trait]
impl Backend for FakeBackend {
    async fn vend(&self, slot: u8) -> BackendResult<VendReceipt> {
        self.record(format!("POST /vend/{}", slot));
        canned(&self.vend)
    }

    async fn status(&self) -> BackendResult<StatusReport> {
        self.record("GET /status");
        canned(&self.status)
    }

    async fn devices(&self) -> BackendResult<DeviceInventory> {
        self.record("GET /esp32/devices");
        canned(&self.inventory)
    }

    async fn command_history(&self) -> BackendResult<CommandHistory> {
        self.record("GET /esp32/commands/history");
        canned(&self.history)
    }

    async fn communication_mode(&self) -> BackendResult<ModeReport> {
        self.record("GET /esp32/communication/mode");
        Ok(ModeReport {
            current_mode: Some("serial".to_string()),
        })
    }

    async fn scan_serial_ports(&self) -> BackendResult<PortScan> {
        self.record("GET /esp32/serial/scan");
        canned(&self.scan)
    }

    async fn connect_serial(&self, port: &str) -> BackendResult<Ack> {
        self.record(format!("POST /esp32/serial/connect {}", port));
        self.connect.lock().unwrap().clone().unwrap_or_else(|| {
            Ok(Ack {
                message: format!("Connected to ESP32 on {}", port),
            })
        })
    }

    async fn disconnect_serial(&self) -> BackendResult<Ack> {
        self.record("POST /esp32/serial/disconnect");
        self.disconnect.lock().unwrap().clone().unwrap_or_else(|| {
            Ok(Ack {
                message: "Disconnected from ESP32".to_string(),
            })
        })
    }

    async fn communication_log(&self) -> BackendResult<LogSnapshot> {
        self.record("GET /esp32/communication/log");
        canned(&self.log)
    }

    async fn clear_communication_log(&self) -> BackendResult<()> {
        self.record("POST /esp32/communication/log/clear");
        Ok(())
    }

    async fn add_test_entries(&self) -> BackendResult<TestDataReceipt> {
        self.record("POST /esp32/communication/test");
        Ok(TestDataReceipt { entries_added: 7 })
    }

    async fn device_list(&self) -> BackendResult<DeviceListing> {
        self.record("GET /esp32/devices/list");
        canned(&self.listing)
    }

    async fn select_device(&self, device_id: &str) -> BackendResult<()> {
        self.record(format!("POST /esp32/devices/select {}", device_id));
        canned(&self.select)
    }

    async fn auto_select_device(&self) -> BackendResult<AutoSelection> {
        self.record("POST /esp32/devices/auto-select");
        canned(&self.auto_select)
    }
}
