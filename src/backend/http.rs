use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::*;
use super::{Backend, BackendError, BackendResult};

/// `Backend` over HTTP/JSON against the vending server
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        self.send(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> BackendResult<T> {
        self.send(Method::POST, path, body).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> BackendResult<T> {
        let bytes = self.exchange(method, path, body).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Transport(format!("Invalid response from {}: {}", path, e)))
    }

    /// Perform the request; a non-2xx status becomes `Rejected`
    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> BackendResult<Vec<u8>> {
        let mut request = self.client.request(method.clone(), self.url(path));
        request = match body {
            Some(json) => request.json(&json),
            // POST routes expect a JSON content type even without a body
            None if method == Method::POST => request.header("Content-Type", "application/json"),
            None => request,
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;

        if !status.is_success() {
            return Err(rejected(status, &bytes));
        }

        tracing::trace!("{} {} -> {}", method, path, status);
        Ok(bytes.to_vec())
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "backend unreachable".to_string()
    } else {
        e.to_string()
    };
    BackendError::Transport(reason)
}

fn rejected(status: StatusCode, body: &[u8]) -> BackendError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::text)
        .unwrap_or_else(|| format!("HTTP {}", status));
    BackendError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn vend(&self, slot: u8) -> BackendResult<VendReceipt> {
        self.post(&format!("/vend/{}", slot), None).await
    }

    async fn status(&self) -> BackendResult<StatusReport> {
        self.get("/status").await
    }

    async fn devices(&self) -> BackendResult<DeviceInventory> {
        self.get("/esp32/devices").await
    }

    async fn command_history(&self) -> BackendResult<CommandHistory> {
        self.get("/esp32/commands/history").await
    }

    async fn communication_mode(&self) -> BackendResult<ModeReport> {
        self.get("/esp32/communication/mode").await
    }

    async fn scan_serial_ports(&self) -> BackendResult<PortScan> {
        self.get("/esp32/serial/scan").await
    }

    async fn connect_serial(&self, port: &str) -> BackendResult<Ack> {
        self.post("/esp32/serial/connect", Some(serde_json::json!({ "port": port })))
            .await
    }

    async fn disconnect_serial(&self) -> BackendResult<Ack> {
        self.post("/esp32/serial/disconnect", None).await
    }

    async fn communication_log(&self) -> BackendResult<LogSnapshot> {
        self.get("/esp32/communication/log").await
    }

    async fn clear_communication_log(&self) -> BackendResult<()> {
        // Any 2xx counts; the body is not needed
        self.exchange(Method::POST, "/esp32/communication/log/clear", None)
            .await
            .map(|_| ())
    }

    async fn add_test_entries(&self) -> BackendResult<TestDataReceipt> {
        self.post("/esp32/communication/test", None).await
    }

    async fn device_list(&self) -> BackendResult<DeviceListing> {
        self.get("/esp32/devices/list").await
    }

    async fn select_device(&self, device_id: &str) -> BackendResult<()> {
        self.exchange(
            Method::POST,
            "/esp32/devices/select",
            Some(serde_json::json!({ "device_id": device_id })),
        )
        .await
        .map(|_| ())
    }

    async fn auto_select_device(&self) -> BackendResult<AutoSelection> {
        self.post("/esp32/devices/auto-select", None).await
    }
}
