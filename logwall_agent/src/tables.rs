//! Ranked tables: top processes, live connections, open ports, and the
//! tunnel listener status.

use std::collections::{HashMap, HashSet};

use crate::probe::{present, HostProbe, InetSocket, SocketState};
use crate::sampler::human_bytes;
use crate::types::{
    ConnectionRow, PortRow, ProcessRow, Protocol, TableSnapshot, TunnelStatus, NOT_AVAILABLE,
};

#[derive(Debug, Clone)]
pub struct TableConfig {
    pub top_n: usize,
    pub tunnel_process: String,
    pub tunnel_port: Option<u16>,
}

pub struct TableBuilder {
    probe: Box<dyn HostProbe>,
    cfg: TableConfig,
}

impl TableBuilder {
    pub fn new(probe: Box<dyn HostProbe>, cfg: TableConfig) -> Self {
        Self { probe, cfg }
    }

    pub fn build(&mut self) -> TableSnapshot {
        let probe = self.probe.as_mut();
        let n = self.cfg.top_n;
        let processes = top_processes(probe, n);
        let mut names = NameCache::default();
        let connections = live_connections(probe, &mut names, n);
        let ports = open_ports(probe, &mut names, n);
        let tunnel = tunnel_status(probe, &mut names, &self.cfg);
        TableSnapshot {
            ts_unix_ms: chrono::Utc::now().timestamp_millis(),
            processes,
            connections,
            ports,
            tunnel,
        }
    }
}

/// Snapshot with every table empty, for when no build could run.
pub fn empty_snapshot(cfg: &TableConfig) -> TableSnapshot {
    TableSnapshot {
        ts_unix_ms: chrono::Utc::now().timestamp_millis(),
        processes: Vec::new(),
        connections: Vec::new(),
        ports: Vec::new(),
        tunnel: TunnelStatus {
            process: cfg.tunnel_process.clone(),
            port: cfg.tunnel_port,
            active: false,
            listeners: Vec::new(),
        },
    }
}

/// Per-build pid -> process name lookups.
#[derive(Debug, Default)]
pub struct NameCache {
    names: HashMap<u32, Option<String>>,
    pub lookups: usize,
}

impl NameCache {
    pub fn resolve(&mut self, probe: &dyn HostProbe, pid: Option<u32>) -> String {
        let Some(pid) = pid else {
            return NOT_AVAILABLE.to_string();
        };
        let lookups = &mut self.lookups;
        self.names
            .entry(pid)
            .or_insert_with(|| {
                *lookups += 1;
                probe.process_name(pid)
            })
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Busiest processes first; equal CPU keeps enumeration order.
pub fn top_processes(probe: &mut dyn HostProbe, n: usize) -> Vec<ProcessRow> {
    let mut rows: Vec<ProcessRow> = present(probe.processes())
        .map(|p| ProcessRow {
            pid: p.pid,
            name: p.name,
            user: p.user.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            cpu_percent: p.cpu_percent,
            mem: human_bytes(p.mem_bytes),
            mem_bytes: p.mem_bytes,
        })
        .collect();
    rows.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    rows.truncate(n);
    rows
}

fn sockets_in(probe: &mut dyn HostProbe, state: SocketState) -> Vec<InetSocket> {
    present(probe.sockets()).filter(|s| s.state == state).collect()
}

/// Established connections in capture order.
pub fn live_connections(
    probe: &mut dyn HostProbe,
    names: &mut NameCache,
    n: usize,
) -> Vec<ConnectionRow> {
    let socks = sockets_in(probe, SocketState::Established);
    socks
        .into_iter()
        .take(n)
        .map(|s| ConnectionRow {
            protocol: s.protocol,
            local: s.local.to_string(),
            remote: s.remote.to_string(),
            pid: s.pid,
            process: names.resolve(probe, s.pid),
        })
        .collect()
}

/// Listening sockets, one row per (protocol, local address, pid).
pub fn open_ports(probe: &mut dyn HostProbe, names: &mut NameCache, n: usize) -> Vec<PortRow> {
    let socks = sockets_in(probe, SocketState::Listen);
    let mut rows = dedup_listeners(socks);
    rows.truncate(n);
    rows.into_iter()
        .map(|s| port_row(s, names.resolve(probe, s.pid)))
        .collect()
}

/// Listeners owned by the tunnel process. Enumerated on its own so the name
/// filter sees every listener, not just the ones that survived the port cap.
pub fn tunnel_status(
    probe: &mut dyn HostProbe,
    names: &mut NameCache,
    cfg: &TableConfig,
) -> TunnelStatus {
    let needle = cfg.tunnel_process.to_lowercase();
    let socks = sockets_in(probe, SocketState::Listen);
    let mut listeners: Vec<PortRow> = dedup_listeners(socks)
        .into_iter()
        .map(|s| port_row(s, names.resolve(probe, s.pid)))
        .filter(|r| !needle.is_empty() && r.process.to_lowercase().contains(&needle))
        .collect();
    listeners.sort_by_key(|r| r.port);

    let active = match cfg.tunnel_port {
        Some(port) => listeners.iter().any(|r| r.port == port),
        None => !listeners.is_empty(),
    };
    listeners.truncate(cfg.top_n);

    TunnelStatus {
        process: cfg.tunnel_process.clone(),
        port: cfg.tunnel_port,
        active,
        listeners,
    }
}

#[derive(Debug, Clone, Copy)]
struct Listener {
    protocol: Protocol,
    local: std::net::SocketAddr,
    pid: Option<u32>,
}

fn dedup_listeners(socks: Vec<InetSocket>) -> Vec<Listener> {
    let mut seen = HashSet::new();
    socks
        .into_iter()
        .filter(|s| seen.insert((s.protocol, s.local, s.pid)))
        .map(|s| Listener {
            protocol: s.protocol,
            local: s.local,
            pid: s.pid,
        })
        .collect()
}

fn port_row(s: Listener, process: String) -> PortRow {
    PortRow {
        protocol: s.protocol,
        local: s.local.to_string(),
        port: s.local.port(),
        pid: s.pid,
        process,
    }
}
