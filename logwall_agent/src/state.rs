//! Shared agent state handed to every handler and to the poller.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::broadcast::{Broadcaster, InitBasis};
use crate::config::AgentConfig;
use crate::probe::{HostProbe, SystemProbe};
use crate::sampler::{assemble, HostReadings, MetricsSampler};
use crate::selector;
use crate::session::SessionGate;
use crate::tables::{empty_snapshot, TableBuilder};
use crate::types::{InitPayload, MetricsSnapshot, TableSnapshot};

pub type SharedSampler = Arc<Mutex<MetricsSampler>>;
pub type SharedTables = Arc<Mutex<TableBuilder>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgentConfig>,
    pub gate: Arc<SessionGate>,
    pub hub: Arc<Broadcaster>,
    // sysinfo handles; only touched from blocking tasks
    pub sampler: SharedSampler,
    pub tables: SharedTables,
}

impl AppState {
    pub fn new(config: AgentConfig) -> Self {
        Self::with_probe(config, Box::new(SystemProbe::new()))
    }

    /// Same as [`AppState::new`] with a caller-supplied table probe.
    pub fn with_probe(config: AgentConfig, probe: Box<dyn HostProbe>) -> Self {
        let sampler = MetricsSampler::new(config.settings.poll_period().as_secs_f64());
        let tables = TableBuilder::new(probe, config.table_config());
        Self {
            gate: Arc::new(SessionGate::new(config.settings.password.clone())),
            hub: Arc::new(Broadcaster::new()),
            sampler: Arc::new(Mutex::new(sampler)),
            tables: Arc::new(Mutex::new(tables)),
            config: Arc::new(config),
        }
    }

    /// One metrics sample off the async runtime. `None` if the sampler
    /// task failed.
    pub async fn sample_metrics(&self, previous: Option<MetricsSnapshot>) -> Option<MetricsSnapshot> {
        let sampler = self.sampler.clone();
        let res = tokio::task::spawn_blocking(move || {
            let mut s = sampler.blocking_lock();
            s.sample(previous.as_ref())
        })
        .await;
        match res {
            Ok(snap) => Some(snap),
            Err(e) => {
                warn!("metrics sample task failed: {e}");
                None
            }
        }
    }

    pub async fn build_tables(&self) -> Option<TableSnapshot> {
        let tables = self.tables.clone();
        match tokio::task::spawn_blocking(move || tables.blocking_lock().build()).await {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("table build task failed: {e}");
                None
            }
        }
    }

    /// Files to show in a snapshot: what the poller last published, or a
    /// fresh resolve when it has not run yet.
    pub fn current_files(&self, basis: &InitBasis) -> Vec<PathBuf> {
        if let Some(files) = &basis.files {
            return files.clone();
        }
        selector::resolve(&self.config.log_dir, &self.config.prefixes).unwrap_or_else(|e| {
            warn!("cannot list log dir: {e}");
            Vec::new()
        })
    }

    /// Full-state snapshot for a new subscriber.
    pub async fn init_payload(&self, basis: &InitBasis) -> InitPayload {
        let files = self.current_files(basis);
        let lines = self.config.tail_lines;
        let b = basis.clone();
        let logs = tokio::task::spawn_blocking(move || b.logs(&files, lines))
            .await
            .unwrap_or_else(|e| {
                warn!("init tail task failed: {e}");
                Vec::new()
            });

        let stats = match &basis.stats {
            Some(s) => s.clone(),
            None => match self.sample_metrics(None).await {
                Some(s) => s,
                None => unavailable_metrics(),
            },
        };
        let tables = match &basis.tables {
            Some(t) => t.clone(),
            None => match self.build_tables().await {
                Some(t) => t,
                None => empty_snapshot(&self.config.table_config()),
            },
        };
        InitPayload { logs, stats, tables }
    }
}

fn unavailable_metrics() -> MetricsSnapshot {
    let readings = HostReadings {
        hostname: "unknown".into(),
        ..HostReadings::default()
    };
    assemble(readings, None, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::tables::tests::FakeProbe;
    use crate::types::NOT_AVAILABLE;
    use std::fs;

    fn state_in(dir: &std::path::Path) -> AppState {
        let mut cfg = AgentConfig::new(Settings::default());
        cfg.log_dir = dir.to_path_buf();
        cfg.tail_lines = 2;
        AppState::with_probe(cfg, Box::<FakeProbe>::default())
    }

    #[tokio::test]
    async fn init_before_first_tick_resolves_and_samples() {
        let td = tempfile::tempdir().unwrap();
        fs::write(td.path().join("core.20240101.log"), "a\nb\nc\n").unwrap();
        let st = state_in(td.path());

        let init = st.init_payload(&InitBasis::default()).await;
        assert_eq!(init.logs.len(), 1);
        assert_eq!(init.logs[0].filename, "core.20240101.log");
        assert_eq!(init.logs[0].content, "b\nc\n");
        assert!(init.tables.processes.is_empty());
        assert_eq!(init.tables.tunnel.process, "waterwall");
    }

    #[tokio::test]
    async fn init_prefers_published_state() {
        let td = tempfile::tempdir().unwrap();
        let st = state_in(td.path());
        let stats = unavailable_metrics();
        let basis = InitBasis {
            files: Some(Vec::new()),
            stats: Some(stats.clone()),
            ..InitBasis::default()
        };
        let init = st.init_payload(&basis).await;
        assert!(init.logs.is_empty());
        assert_eq!(init.stats, stats);
        assert_eq!(init.stats.display.cpu, NOT_AVAILABLE);
    }
}
