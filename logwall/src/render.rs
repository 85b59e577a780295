//! Turns agent events into terminal text, `tail -f` style.

use chrono::{Local, TimeZone};

use crate::types::{Event, LogChunk, Stats, Tables};

#[derive(Debug, Default)]
pub struct Follower {
    show_stats: bool,
    // file whose header was printed last
    current: Option<String>,
    started: bool,
    tunnel: Option<bool>,
}

impl Follower {
    pub fn new(show_stats: bool) -> Self {
        Self {
            show_stats,
            ..Self::default()
        }
    }

    /// Text to print for `event`; empty when nothing should be shown.
    pub fn render(&mut self, event: &Event) -> String {
        match event {
            Event::Init(init) => {
                let mut out = String::new();
                for chunk in &init.logs {
                    // init always shows every file, even one already current
                    self.current = None;
                    out.push_str(&self.chunk(chunk));
                }
                if self.show_stats {
                    out.push_str(&stats_line(&init.stats));
                    out.push_str(&self.tunnel_line(&init.tables));
                }
                out
            }
            Event::LogUpdate(chunk) => self.chunk(chunk),
            Event::Stats(s) if self.show_stats => stats_line(s),
            Event::Tables(t) if self.show_stats => self.tunnel_line(t),
            Event::Stats(_) | Event::Tables(_) => String::new(),
        }
    }

    fn chunk(&mut self, chunk: &LogChunk) -> String {
        let mut out = String::new();
        if self.current.as_deref() != Some(chunk.filename.as_str()) {
            if self.started {
                out.push('\n');
            }
            out.push_str(&format!("==> {} <==\n", chunk.filename));
            self.current = Some(chunk.filename.clone());
        }
        self.started = true;
        out.push_str(&chunk.content);
        out
    }

    // Only printed when the state flips.
    fn tunnel_line(&mut self, t: &Tables) -> String {
        let tunnel = &t.tunnel;
        if self.tunnel == Some(tunnel.active) {
            return String::new();
        }
        self.tunnel = Some(tunnel.active);
        let ports: Vec<String> = tunnel.listeners.iter().map(|l| l.port.to_string()).collect();
        format!(
            "[tunnel] {} {} (ports: {})\n",
            tunnel.process,
            if tunnel.active { "UP" } else { "DOWN" },
            if ports.is_empty() { "none".into() } else { ports.join(",") }
        )
    }
}

pub fn stats_line(s: &Stats) -> String {
    let d = &s.display;
    let ts = Local
        .timestamp_millis_opt(s.ts_unix_ms)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    format!(
        "[{ts}] {} cpu {} mem {}/{} disk {}/{} rx {} tx {} up {}\n",
        s.hostname, d.cpu, d.mem_used, d.mem_total, d.disk_used, d.disk_total, d.rx_rate, d.tx_rate, d.uptime
    )
}
