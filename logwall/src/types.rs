//! Types that mirror the agent's JSON events. Only the fields the follower
//! prints are declared; everything else is ignored.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogChunk {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct StatsDisplay {
    pub cpu: String,
    pub mem_used: String,
    pub mem_total: String,
    pub disk_used: String,
    pub disk_total: String,
    pub rx_rate: String,
    pub tx_rate: String,
    pub uptime: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Stats {
    pub ts_unix_ms: i64,
    pub hostname: String,
    pub display: StatsDisplay,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Listener {
    pub protocol: String,
    pub local: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Tunnel {
    pub process: String,
    pub port: Option<u16>,
    pub active: bool,
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Tables {
    pub tunnel: Tunnel,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Init {
    pub logs: Vec<LogChunk>,
    pub stats: Stats,
    pub tables: Tables,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    Init(Init),
    LogUpdate(LogChunk),
    Stats(Stats),
    Tables(Tables),
}
