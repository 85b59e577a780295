//! Fan-out of events to connected subscribers.
//!
//! Every event is serialized once and pushed through a bounded
//! [`broadcast`] channel as shared JSON text. The latest published state
//! (selected files, tail cursors, stats, tables) sits behind one lock that
//! publishing holds while it sends, and subscribing holds while it registers,
//! so a new subscriber's snapshot and its first received event never overlap
//! or leave a gap. Files the poller has not tracked yet are bounded through
//! the shared [`StartOffsets`] table instead.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::tail::{file_name, tail_lines, StartOffsets};
use crate::types::{Event, LogChunk, MetricsSnapshot, TableSnapshot};

/// Events a subscriber may fall behind by before it is dropped.
pub const BROADCAST_CAPACITY: usize = 256;

/// One serialized event.
pub type Frame = Arc<str>;

#[derive(Debug, Default)]
struct Latest {
    // None until the first tail phase ran
    files: Option<Vec<PathBuf>>,
    cursors: HashMap<PathBuf, u64>,
    stats: Option<MetricsSnapshot>,
    tables: Option<TableSnapshot>,
}

#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    pub peer: String,
    pub connected_at: DateTime<Utc>,
}

type Registry = Arc<Mutex<HashMap<u64, SubscriberInfo>>>;

pub struct Broadcaster {
    tx: broadcast::Sender<Frame>,
    latest: RwLock<Latest>,
    subscribers: Registry,
    next_id: AtomicU64,
    starts: Arc<StartOffsets>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            latest: RwLock::new(Latest::default()),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            starts: Arc::new(StartOffsets::new()),
        }
    }

    /// Start offsets shared with the poller's tracker.
    pub fn start_offsets(&self) -> Arc<StartOffsets> {
        self.starts.clone()
    }

    /// Record the tail phase outcome and push one `log_update` per chunk.
    pub async fn publish_logs(
        &self,
        files: Vec<PathBuf>,
        cursors: HashMap<PathBuf, u64>,
        chunks: Vec<LogChunk>,
    ) -> usize {
        let mut latest = self.latest.write().await;
        latest.files = Some(files);
        latest.cursors = cursors;
        chunks
            .into_iter()
            .map(|c| self.send(&Event::LogUpdate(c)))
            .sum()
    }

    pub async fn publish_stats(&self, stats: MetricsSnapshot) -> usize {
        let mut latest = self.latest.write().await;
        let n = self.send(&Event::Stats(stats.clone()));
        latest.stats = Some(stats);
        n
    }

    pub async fn publish_tables(&self, tables: TableSnapshot) -> usize {
        let mut latest = self.latest.write().await;
        let n = self.send(&Event::Tables(tables.clone()));
        latest.tables = Some(tables);
        n
    }

    pub async fn latest_stats(&self) -> Option<MetricsSnapshot> {
        self.latest.read().await.stats.clone()
    }

    /// Copy of the published tail cursors.
    pub async fn cursors(&self) -> HashMap<PathBuf, u64> {
        self.latest.read().await.cursors.clone()
    }

    // Receivers that got the frame; 0 with nobody connected.
    fn send(&self, event: &Event) -> usize {
        match encode(event) {
            Some(frame) => self.tx.send(frame).unwrap_or(0),
            None => 0,
        }
    }

    /// Register a subscriber. Unauthorized callers get `None` and are never
    /// attached to the channel.
    pub async fn subscribe(&self, authorized: bool, peer: impl Into<String>) -> Option<Subscription> {
        if !authorized {
            return None;
        }
        let latest = self.latest.read().await;
        let rx = self.tx.subscribe();
        let basis = InitBasis {
            files: latest.files.clone(),
            cursors: latest.cursors.clone(),
            stats: latest.stats.clone(),
            tables: latest.tables.clone(),
            starts: Some(self.starts.clone()),
        };
        drop(latest);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = peer.into();
        let count = {
            let mut reg = lock(&self.subscribers);
            reg.insert(
                id,
                SubscriberInfo {
                    peer: peer.clone(),
                    connected_at: Utc::now(),
                },
            );
            reg.len()
        };
        info!(id, %peer, subscribers = count, "subscriber connected");

        Some(Subscription {
            id,
            rx,
            basis,
            _guard: SubscriberGuard {
                id,
                registry: self.subscribers.clone(),
            },
        })
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    pub fn subscribers(&self) -> Vec<(u64, SubscriberInfo)> {
        let mut v: Vec<_> = lock(&self.subscribers)
            .iter()
            .map(|(id, info)| (*id, info.clone()))
            .collect();
        v.sort_by_key(|(id, _)| *id);
        v
    }
}

fn lock(reg: &Mutex<HashMap<u64, SubscriberInfo>>) -> std::sync::MutexGuard<'_, HashMap<u64, SubscriberInfo>> {
    reg.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn encode(event: &Event) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(js) => Some(Arc::from(js)),
        Err(e) => {
            warn!(event = event.name(), "failed to serialize event: {e}");
            None
        }
    }
}

/// An accepted subscriber: its receiver plus the state it starts from.
pub struct Subscription {
    pub id: u64,
    pub rx: broadcast::Receiver<Frame>,
    pub basis: InitBasis,
    _guard: SubscriberGuard,
}

/// Removes the registry entry however the connection ends.
struct SubscriberGuard {
    id: u64,
    registry: Registry,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let left = {
            let mut reg = lock(&self.registry);
            reg.remove(&self.id);
            reg.len()
        };
        debug!(id = self.id, subscribers = left, "subscriber disconnected");
    }
}

/// State captured at subscribe time, consistent with the receiver.
#[derive(Debug, Clone, Default)]
pub struct InitBasis {
    pub files: Option<Vec<PathBuf>>,
    pub cursors: HashMap<PathBuf, u64>,
    pub stats: Option<MetricsSnapshot>,
    pub tables: Option<TableSnapshot>,
    pub starts: Option<Arc<StartOffsets>>,
}

impl InitBasis {
    /// Last `lines` lines of each file, read no further than the captured
    /// cursor so later `log_update`s continue exactly where this ends.
    /// Files without a cursor are read up to their claimed start offset, or
    /// to their current end when no start table is attached.
    pub fn logs(&self, files: &[PathBuf], lines: usize) -> Vec<LogChunk> {
        files
            .iter()
            .map(|p| LogChunk {
                filename: file_name(p),
                content: self.tail_of(p, lines),
            })
            .collect()
    }

    fn tail_of(&self, path: &Path, lines: usize) -> String {
        self.bounded_tail(path, lines).unwrap_or_else(|e| {
            warn!(path = %path.display(), "init tail failed: {e}");
            format!("[error reading {}: {e}]\n", file_name(path))
        })
    }

    fn bounded_tail(&self, path: &Path, lines: usize) -> io::Result<String> {
        let upto = match (self.cursors.get(path), &self.starts) {
            (Some(cursor), _) => Some(*cursor),
            (None, Some(starts)) => Some(starts.claim(path, fs::metadata(path)?.len())),
            (None, None) => None,
        };
        tail_lines(path, lines, upto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn chunk(name: &str, content: &str) -> LogChunk {
        LogChunk {
            filename: name.into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn unauthorized_gets_nothing() {
        let hub = Broadcaster::new();
        assert!(hub.subscribe(false, "x").await.is_none());
        assert_eq!(hub.subscriber_count(), 0);
        // nobody is attached, so nothing was delivered
        let n = hub
            .publish_logs(vec![], HashMap::new(), vec![chunk("a", "b")])
            .await;
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_frames() {
        let hub = Broadcaster::new();
        let mut a = hub.subscribe(true, "a").await.unwrap();
        let mut b = hub.subscribe(true, "b").await.unwrap();
        assert_eq!(hub.subscriber_count(), 2);

        let n = hub
            .publish_logs(vec![], HashMap::new(), vec![chunk("core.log", "hi\n")])
            .await;
        assert_eq!(n, 2);

        for sub in [&mut a, &mut b] {
            let frame = sub.rx.recv().await.unwrap();
            let ev: Event = serde_json::from_str(&frame).unwrap();
            assert_eq!(ev, Event::LogUpdate(chunk("core.log", "hi\n")));
        }
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let hub = Broadcaster::new();
        let a = hub.subscribe(true, "a").await.unwrap();
        let b = hub.subscribe(true, "b").await.unwrap();
        assert_ne!(a.id, b.id);
        drop(a);
        let left = hub.subscribers();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].1.peer, "b");
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn basis_reflects_published_state() {
        let hub = Broadcaster::new();
        let before = hub.subscribe(true, "early").await.unwrap();
        assert!(before.basis.files.is_none());

        let p = PathBuf::from("/tmp/core.1.log");
        hub.publish_logs(vec![p.clone()], [(p.clone(), 42)].into_iter().collect(), vec![])
            .await;
        let after = hub.subscribe(true, "late").await.unwrap();
        assert_eq!(after.basis.files, Some(vec![p.clone()]));
        assert_eq!(after.basis.cursors.get(&p), Some(&42));
        assert_eq!(hub.cursors().await.get(&p), Some(&42));
    }

    #[test]
    fn init_logs_stop_at_cursor() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("core.20240101.log");
        fs::write(&p, b"1\n2\n3\nlate\n").unwrap();

        let basis = InitBasis {
            cursors: [(p.clone(), 6)].into_iter().collect(),
            ..InitBasis::default()
        };
        let logs = basis.logs(&[p.clone()], 2);
        assert_eq!(logs, vec![chunk("core.20240101.log", "2\n3\n")]);

        let missing = td.path().join("gone.log");
        let logs = InitBasis::default().logs(&[missing], 5);
        assert!(logs[0].content.starts_with("[error reading gone.log:"));
    }
}
