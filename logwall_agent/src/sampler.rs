//! Host metrics sampling using sysinfo.
//!
//! A sample is a point reading of CPU, memory, root disk and cumulative
//! network counters. Rates come from the counter delta against the previous
//! sample over the configured poll interval.

use std::path::Path;

use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::config::MIN_POLL_SECS;
use crate::types::{MetricsDisplay, MetricsSnapshot, NOT_AVAILABLE};

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Raw readings for one sample. `None` means the source had nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostReadings {
    pub hostname: String,
    pub cpu_percent: Option<f32>,
    pub mem_used: Option<u64>,
    pub mem_total: Option<u64>,
    pub disk_used: Option<u64>,
    pub disk_total: Option<u64>,
    pub net_rx: Option<u64>,
    pub net_tx: Option<u64>,
    pub uptime_secs: Option<u64>,
}

pub struct MetricsSampler {
    sys: System,
    networks: Networks,
    disks: Disks,
    hostname: String,
    window_secs: f64,
}

impl MetricsSampler {
    /// `window_secs` is the poll interval, used as the rate denominator.
    pub fn new(window_secs: f64) -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh_kind);
        // Baseline for the first cpu_usage delta.
        sys.refresh_cpu_usage();
        Self {
            sys,
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".into()),
            window_secs,
        }
    }

    pub fn sample(&mut self, previous: Option<&MetricsSnapshot>) -> MetricsSnapshot {
        let readings = self.read_host();
        assemble(readings, previous, self.window_secs)
    }

    fn read_host(&mut self) -> HostReadings {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        let cpu_percent = (!self.sys.cpus().is_empty()).then(|| self.sys.global_cpu_usage());
        let mem_total = Some(self.sys.total_memory()).filter(|t| *t > 0);
        let mem_used = mem_total.map(|t| t.saturating_sub(self.sys.available_memory()));

        self.disks.refresh(true);
        let root = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| self.disks.list().first());
        let disk_total = root.map(|d| d.total_space()).filter(|t| *t > 0);
        let disk_used = root
            .filter(|_| disk_total.is_some())
            .map(|d| d.total_space().saturating_sub(d.available_space()));

        // One refresh, then both sums come from the same reading.
        self.networks.refresh(true);
        let (net_rx, net_tx) = if self.networks.list().is_empty() {
            (None, None)
        } else {
            let (rx, tx) = self.networks.list().iter().fold((0u64, 0u64), |(rx, tx), (_, d)| {
                (
                    rx.saturating_add(d.total_received()),
                    tx.saturating_add(d.total_transmitted()),
                )
            });
            (Some(rx), Some(tx))
        };

        HostReadings {
            hostname: self.hostname.clone(),
            cpu_percent,
            mem_used,
            mem_total,
            disk_used,
            disk_total,
            net_rx,
            net_tx,
            uptime_secs: Some(System::uptime()).filter(|u| *u > 0),
        }
    }
}

/// Build a snapshot from readings, deriving rates against `previous`.
pub fn assemble(
    r: HostReadings,
    previous: Option<&MetricsSnapshot>,
    window_secs: f64,
) -> MetricsSnapshot {
    let rx_rate = counter_rate(previous.and_then(|p| p.net_rx_total), r.net_rx, window_secs);
    let tx_rate = counter_rate(previous.and_then(|p| p.net_tx_total), r.net_tx, window_secs);

    let display = MetricsDisplay {
        cpu: or_na(r.cpu_percent.map(|c| format!("{c:.1}%"))),
        mem_used: or_na(r.mem_used.map(human_bytes)),
        mem_total: or_na(r.mem_total.map(human_bytes)),
        disk_used: or_na(r.disk_used.map(human_bytes)),
        disk_total: or_na(r.disk_total.map(human_bytes)),
        net_rx: or_na(r.net_rx.map(human_bytes)),
        net_tx: or_na(r.net_tx.map(human_bytes)),
        rx_rate: human_rate(rx_rate),
        tx_rate: human_rate(tx_rate),
        uptime: or_na(r.uptime_secs.map(human_uptime)),
    };

    MetricsSnapshot {
        ts_unix_ms: chrono::Utc::now().timestamp_millis(),
        hostname: r.hostname,
        cpu_percent: r.cpu_percent,
        mem_used: r.mem_used,
        mem_total: r.mem_total,
        mem_percent: percent(r.mem_used, r.mem_total),
        disk_used: r.disk_used,
        disk_total: r.disk_total,
        disk_percent: percent(r.disk_used, r.disk_total),
        net_rx_total: r.net_rx,
        net_tx_total: r.net_tx,
        rx_rate,
        tx_rate,
        uptime_secs: r.uptime_secs,
        display,
    }
}

fn counter_rate(prev: Option<u64>, cur: Option<u64>, window_secs: f64) -> f64 {
    match (prev, cur) {
        (Some(p), Some(c)) => rate(p, c, window_secs),
        _ => 0.0,
    }
}

/// Bytes per second between two cumulative counter readings. A counter that
/// went backwards (interface reset) reads as zero.
pub fn rate(prev: u64, cur: u64, elapsed_secs: f64) -> f64 {
    cur.saturating_sub(prev) as f64 / elapsed_secs.max(MIN_POLL_SECS)
}

pub fn percent(used: Option<u64>, total: Option<u64>) -> Option<f32> {
    match (used, total) {
        (Some(u), Some(t)) if t > 0 => Some((u as f64 / t as f64 * 100.0) as f32),
        _ => None,
    }
}

pub fn human_bytes(b: u64) -> String {
    let mut v = b as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{b}B")
    } else {
        format!("{v:.1}{}", UNITS[unit])
    }
}

pub fn human_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", human_bytes(bytes_per_sec.max(0.0).round() as u64))
}

pub fn human_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let h = (secs % 86_400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if days > 0 {
        format!("{days}d {h:02}:{m:02}:{s:02}")
    } else {
        format!("{h:02}:{m:02}:{s:02}")
    }
}

fn or_na(v: Option<String>) -> String {
    v.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
