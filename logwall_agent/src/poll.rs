//! Background poller: tails the current log files, samples host metrics and
//! rebuilds the tables on a fixed period, publishing each result.
//!
//! The three phases of a tick run in order and are isolated from each other:
//! a failed phase is logged and the rest of the tick (and every later tick)
//! still runs.

use std::mem;
use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace, trace_span, warn, Instrument};

use crate::selector;
use crate::state::AppState;
use crate::tail::TailTracker;
use crate::types::{LogChunk, MetricsSnapshot};

/// What a single tick produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub files: usize,
    pub log_updates: usize,
    pub stats: bool,
    pub tables: bool,
}

pub struct Poller {
    state: AppState,
    tracker: TailTracker,
    prev: Option<MetricsSnapshot>,
}

impl Poller {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            tracker: TailTracker::new(),
            prev: None,
        }
    }

    pub fn tracker(&self) -> &TailTracker {
        &self.tracker
    }

    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let (files, chunks) = self.tail_phase().await;
        report.files = files.len();
        report.log_updates = chunks.len();
        self.state
            .hub
            .publish_logs(files, self.tracker.cursors(), chunks)
            .await;

        if let Some(stats) = self.state.sample_metrics(self.prev.clone()).await {
            self.state.hub.publish_stats(stats.clone()).await;
            self.prev = Some(stats);
            report.stats = true;
        }

        if let Some(tables) = self.state.build_tables().await {
            self.state.hub.publish_tables(tables).await;
            report.tables = true;
        }

        trace!(?report, "tick done");
        report
    }

    // Blocking reads run off the runtime; the tracker travels with them.
    async fn tail_phase(&mut self) -> (Vec<PathBuf>, Vec<LogChunk>) {
        let dir = self.state.config.log_dir.clone();
        let prefixes = self.state.config.prefixes.clone();
        let mut tracker = mem::take(&mut self.tracker);
        let res = tokio::task::spawn_blocking(move || {
            let out = tail_files(&mut tracker, &dir, &prefixes);
            (tracker, out)
        })
        .await;
        match res {
            Ok((tracker, out)) => {
                self.tracker = tracker;
                out
            }
            Err(e) => {
                // cursors are lost; every file is picked up fresh next tick
                warn!("tail task failed: {e}");
                let starts = self.state.hub.start_offsets();
                starts.retain(&[]);
                self.tracker = TailTracker::with_starts(starts);
                (Vec::new(), Vec::new())
            }
        }
    }

    /// Tick forever at `period`. A slow tick delays the next one instead of
    /// bunching ticks up.
    pub async fn run(mut self, period: Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().instrument(trace_span!("poll_tick")).await;
        }
    }
}

fn tail_files(
    tracker: &mut TailTracker,
    dir: &std::path::Path,
    prefixes: &[String],
) -> (Vec<PathBuf>, Vec<LogChunk>) {
    let resolved = match selector::resolve_prefixed(dir, prefixes) {
        Ok(r) => r,
        Err(e) => {
            // keep cursors; the directory may come back
            warn!("log selection failed: {e}");
            return (Vec::new(), Vec::new());
        }
    };
    let live: Vec<&str> = resolved.iter().map(|(p, _)| p.as_str()).collect();
    tracker.retain_prefixes(&live);
    let paths: Vec<PathBuf> = resolved.iter().map(|(_, p)| p.clone()).collect();
    tracker.starts().retain(&paths);

    let mut chunks = Vec::new();
    for (prefix, path) in &resolved {
        if let Some(delta) = tracker.poll(prefix, path) {
            debug!(file = %delta.file_name(), bytes = delta.bytes.len(), truncated = delta.truncated, "log delta");
            chunks.push(LogChunk {
                filename: delta.file_name(),
                content: delta.text(),
            });
        }
    }
    let files = resolved.into_iter().map(|(_, p)| p).collect();
    (files, chunks)
}

pub fn spawn_poller(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(Poller::new(state).run(period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, Settings};
    use crate::tables::tests::FakeProbe;
    use crate::types::Event;
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    fn state_in(dir: &std::path::Path) -> AppState {
        let mut cfg = AgentConfig::new(Settings::default());
        cfg.log_dir = dir.to_path_buf();
        AppState::with_probe(cfg, Box::<FakeProbe>::default())
    }

    fn append(path: &std::path::Path, s: &str) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(s.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn first_tick_tracks_then_appends_flow() {
        let td = tempfile::tempdir().unwrap();
        let log = td.path().join("network.20240101.log");
        fs::write(&log, "old\n").unwrap();
        let st = state_in(td.path());
        let mut sub = st.hub.subscribe(true, "test").await.unwrap();
        let mut poller = Poller::new(st.clone());

        let r = poller.tick().await;
        assert_eq!(r.files, 1);
        assert_eq!(r.log_updates, 0);
        assert!(r.stats && r.tables);
        assert_eq!(poller.tracker().get("network.").unwrap().offset, 4);

        append(&log, "new\n");
        let r = poller.tick().await;
        assert_eq!(r.log_updates, 1);

        let mut updates = Vec::new();
        while let Ok(frame) = sub.rx.try_recv() {
            if let Event::LogUpdate(c) = serde_json::from_str::<Event>(&frame).unwrap() {
                updates.push(c.content);
            }
        }
        assert_eq!(updates, vec!["new\n".to_string()]);
        assert_eq!(st.hub.cursors().await.get(&log), Some(&8));
    }

    #[tokio::test]
    async fn init_before_first_tick_leaves_no_gap() {
        let td = tempfile::tempdir().unwrap();
        let log = td.path().join("core.20240101.log");
        fs::write(&log, "a\n").unwrap();
        let st = state_in(td.path());
        let mut sub = st.hub.subscribe(true, "early").await.unwrap();

        let init = st.init_payload(&sub.basis).await;
        assert_eq!(init.logs[0].content, "a\n");

        append(&log, "b\n");
        let mut poller = Poller::new(st.clone());
        poller.tick().await;
        poller.tick().await;

        let mut updates = Vec::new();
        while let Ok(frame) = sub.rx.try_recv() {
            if let Event::LogUpdate(c) = serde_json::from_str::<Event>(&frame).unwrap() {
                updates.push(c.content);
            }
        }
        assert_eq!(updates, vec!["b\n".to_string()]);

        // a later subscriber still starts at the same byte
        let late = st.hub.subscribe(true, "late").await.unwrap();
        assert_eq!(late.basis.cursors.get(&log), Some(&4));
    }

    #[tokio::test]
    async fn rotation_switches_file() {
        let td = tempfile::tempdir().unwrap();
        fs::write(td.path().join("core.20240101.log"), "a\n").unwrap();
        let st = state_in(td.path());
        let mut poller = Poller::new(st);
        poller.tick().await;

        let next = td.path().join("core.20240102.log");
        fs::write(&next, "fresh\n").unwrap();
        let r = poller.tick().await;
        assert_eq!(r.log_updates, 0);
        assert_eq!(poller.tracker().get("core.").unwrap().path, next);
    }

    #[tokio::test]
    async fn panicking_table_phase_spares_the_rest() {
        let td = tempfile::tempdir().unwrap();
        let log = td.path().join("core.20240101.log");
        fs::write(&log, "a\n").unwrap();
        let mut cfg = AgentConfig::new(Settings::default());
        cfg.log_dir = td.path().to_path_buf();
        let probe = FakeProbe {
            panic_on_sockets: true,
            ..FakeProbe::default()
        };
        let st = AppState::with_probe(cfg, Box::new(probe));
        let mut poller = Poller::new(st.clone());

        let r = poller.tick().await;
        assert!(r.stats);
        assert!(!r.tables);

        append(&log, "b\n");
        let r = poller.tick().await;
        assert_eq!(r.log_updates, 1);
        assert!(st.hub.latest_stats().await.is_some());
    }

    #[tokio::test]
    async fn missing_dir_keeps_other_phases() {
        let td = tempfile::tempdir().unwrap();
        let st = state_in(&td.path().join("absent"));
        let mut poller = Poller::new(st.clone());
        let r = poller.tick().await;
        assert_eq!(r.files, 0);
        assert!(r.stats);
        assert!(r.tables);
        assert!(st.hub.latest_stats().await.is_some());
    }
}
