pub mod http;
pub mod types;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;

pub use types::*;

/// Failure of a single backend request
///
/// Both kinds end up as a user-visible message; nothing retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Non-2xx response; `message` is taken from the body's `message`/`error`
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Network failure, timeout, or a body that isn't the JSON we expect
    #[error("{0}")]
    Transport(String),
}

impl BackendError {
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Transport(_))
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Everything the panel asks of the vending server
///
/// One method per endpoint. Implementations must be cheap to share: poll
/// tasks and command tasks each hold an `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn vend(&self, slot: u8) -> BackendResult<VendReceipt>;
    async fn status(&self) -> BackendResult<StatusReport>;
    async fn devices(&self) -> BackendResult<DeviceInventory>;
    async fn command_history(&self) -> BackendResult<CommandHistory>;
    async fn communication_mode(&self) -> BackendResult<ModeReport>;
    async fn scan_serial_ports(&self) -> BackendResult<PortScan>;
    async fn connect_serial(&self, port: &str) -> BackendResult<Ack>;
    async fn disconnect_serial(&self) -> BackendResult<Ack>;
    async fn communication_log(&self) -> BackendResult<LogSnapshot>;
    async fn clear_communication_log(&self) -> BackendResult<()>;
    async fn add_test_entries(&self) -> BackendResult<TestDataReceipt>;
    async fn device_list(&self) -> BackendResult<DeviceListing>;
    async fn select_device(&self, device_id: &str) -> BackendResult<()>;
    async fn auto_select_device(&self) -> BackendResult<AutoSelection>;
}
