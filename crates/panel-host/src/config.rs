//! Host configuration.
//!
//! Paths and device parameters come from environment variables (overridable
//! on the command line); the obs-websocket endpoint is provisioned through
//! the key/value store, the same way `AT+SETCONF` provisions it on the
//! device.

use std::path::PathBuf;

use panel_protocol::KeyValueStore;

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Root of the partition served to `AT+PUTFILE` and friends.
    pub storage_dir: PathBuf,
    /// JSON file backing the key/value store.
    pub nvs_file: PathBuf,
    /// Value reported by `AT+GETBUFS`.
    pub uart_buffer_size: usize,
    /// Value reported by `AT+GETFWVER`.
    pub firmware_version: String,
}

impl HostConfig {
    /// Build the configuration from environment variables.
    ///
    /// | Variable                 | Default                                 | Description                 |
    /// |--------------------------|-----------------------------------------|-----------------------------|
    /// | `PANEL_STORAGE_DIR`      | `<data-local-dir>/obs-panel/data`       | File-transfer partition     |
    /// | `PANEL_NVS_FILE`         | `<data-local-dir>/obs-panel/nvs.json`   | Key/value store file        |
    /// | `PANEL_UART_BUF_SIZE`    | `1024`                                  | Reported UART buffer size   |
    /// | `PANEL_FIRMWARE_VERSION` | crate version                           | Reported firmware version   |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_root = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("obs-panel");

        let storage_dir = lookup("PANEL_STORAGE_DIR")
            .map_or_else(|| data_root.join("data"), PathBuf::from);
        let nvs_file = lookup("PANEL_NVS_FILE")
            .map_or_else(|| data_root.join("nvs.json"), PathBuf::from);
        let uart_buffer_size = lookup("PANEL_UART_BUF_SIZE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);
        let firmware_version = lookup("PANEL_FIRMWARE_VERSION")
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        Self {
            storage_dir,
            nvs_file,
            uart_buffer_size,
            firmware_version,
        }
    }
}

/// obs-websocket connection parameters, read from the `websocket` namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsSettings {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Request path.
    pub path: String,
    /// Pre-shared authentication password, empty when unused.
    pub password: String,
}

impl ObsSettings {
    /// Namespace holding the connection keys.
    pub const NAMESPACE: &'static str = "websocket";

    /// Read the settings, falling back to `ws://localhost:4455/`.
    ///
    /// | Key        | Type   | Default     |
    /// |------------|--------|-------------|
    /// | `host`     | string | `localhost` |
    /// | `port`     | U16    | `4455`      |
    /// | `path`     | string | `/`         |
    /// | `password` | string | empty       |
    pub fn from_store(store: &dyn KeyValueStore) -> Self {
        let port = store
            .get_item(Self::NAMESPACE, "port")
            .and_then(|value| value.as_u64())
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(4455);

        Self {
            host: store.get_string(Self::NAMESPACE, "host", "localhost"),
            port,
            path: store.get_string(Self::NAMESPACE, "path", "/"),
            password: store.get_string(Self::NAMESPACE, "password", ""),
        }
    }

    /// `ws://host:port/path`.
    pub fn url(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("ws://{}:{}/{path}", self.host, self.port)
    }
}
