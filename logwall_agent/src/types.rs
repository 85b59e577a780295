//! Data types sent to the client over WebSocket.
//! Keep this module minimal and stable: it defines the wire format.

use serde::{Deserialize, Serialize};

/// Rendered in place of a value whose source was unavailable.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

/// Point-in-time host sample. `None` fields had no source this tick; the
/// matching `display` string reads "N/A".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ts_unix_ms: i64,
    pub hostname: String,
    pub cpu_percent: Option<f32>,
    pub mem_used: Option<u64>,
    pub mem_total: Option<u64>,
    pub mem_percent: Option<f32>,
    pub disk_used: Option<u64>,
    pub disk_total: Option<u64>,
    pub disk_percent: Option<f32>,
    // cumulative since boot
    pub net_rx_total: Option<u64>,
    pub net_tx_total: Option<u64>,
    // bytes per second against the previous sample
    pub rx_rate: f64,
    pub tx_rate: f64,
    pub uptime_secs: Option<u64>,
    pub display: MetricsDisplay,
}

/// Human-readable renderings of [`MetricsSnapshot`] fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsDisplay {
    pub cpu: String,
    pub mem_used: String,
    pub mem_total: String,
    pub disk_used: String,
    pub disk_total: String,
    pub net_rx: String,
    pub net_tx: String,
    pub rx_rate: String,
    pub tx_rate: String,
    pub uptime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRow {
    pub pid: u32,
    pub name: String,
    pub user: String,
    pub cpu_percent: f32,
    pub mem_bytes: u64,
    pub mem: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRow {
    pub protocol: Protocol,
    pub local: String,
    pub remote: String,
    pub pid: Option<u32>,
    pub process: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRow {
    pub protocol: Protocol,
    pub local: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub process: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStatus {
    pub process: String,
    pub port: Option<u16>,
    pub active: bool,
    pub listeners: Vec<PortRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub ts_unix_ms: i64,
    pub processes: Vec<ProcessRow>,
    pub connections: Vec<ConnectionRow>,
    pub ports: Vec<PortRow>,
    pub tunnel: TunnelStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitPayload {
    pub logs: Vec<LogChunk>,
    pub stats: MetricsSnapshot,
    pub tables: TableSnapshot,
}

/// Everything pushed to subscribers, encoded as
/// `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    Init(InitPayload),
    LogUpdate(LogChunk),
    Stats(MetricsSnapshot),
    Tables(TableSnapshot),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::LogUpdate(_) => "log_update",
            Self::Stats(_) => "stats",
            Self::Tables(_) => "tables",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_update_wire_shape() {
        let ev = Event::LogUpdate(LogChunk {
            filename: "core.20240101.log".into(),
            content: "hello\n".into(),
        });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "log_update");
        assert_eq!(v["data"]["filename"], "core.20240101.log");
        assert_eq!(v["data"]["content"], "hello\n");
        assert_eq!(ev.name(), "log_update");
    }

    #[test]
    fn protocol_is_lowercase() {
        assert_eq!(serde_json::to_string(&Protocol::Tcp6).unwrap(), "\"tcp6\"");
    }
}
