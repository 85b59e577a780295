//! Append-only tail tracking for the current file of each prefix.
//!
//! The tracker is owned by the poll loop and is the only writer of the
//! offset table. Other tasks see offsets through [`TailTracker::cursors`],
//! which returns a copy.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

/// Backward scan block size for [`tail_lines`].
const TAIL_BLOCK: usize = 8 * 1024;

/// Cursor state for one file. `offset <= size` after every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub prefix: String,
    pub size: u64,
    pub offset: u64,
}

impl WatchedFile {
    fn new(prefix: &str, path: &Path, size: u64, start: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            prefix: prefix.to_string(),
            size,
            offset: start.min(size),
        }
    }
}

/// First live byte of each file not yet tracked, agreed between the poller
/// and `init` snapshots. Whichever looks at a new file first fixes the
/// offset at that file's size; the other side reuses it.
#[derive(Debug, Default)]
pub struct StartOffsets {
    inner: Mutex<HashMap<PathBuf, u64>>,
}

impl StartOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// The agreed start for `path`, fixing it at `size` if unset.
    pub fn claim(&self, path: &Path, size: u64) -> u64 {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *map.entry(path.to_path_buf()).or_insert(size)
    }

    pub fn get(&self, path: &Path) -> Option<u64> {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(path).copied()
    }

    /// Forget files that are no longer selected.
    pub fn retain(&self, live: &[PathBuf]) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|p, _| live.contains(p));
    }
}

/// Bytes appended to a file since the previous successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    /// Set when the file shrank and the delta restarts at byte 0.
    pub truncated: bool,
}

impl Delta {
    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug, Default)]
pub struct TailTracker {
    // prefix -> the file currently tracked for it
    files: HashMap<String, WatchedFile>,
    starts: Arc<StartOffsets>,
}

impl TailTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker whose new files start where `starts` says.
    pub fn with_starts(starts: Arc<StartOffsets>) -> Self {
        Self {
            files: HashMap::new(),
            starts,
        }
    }

    pub fn starts(&self) -> &Arc<StartOffsets> {
        &self.starts
    }

    /// Check `path` (the current file for `prefix`) and return whatever was
    /// appended since the last call.
    ///
    /// The first sighting of a path starts the cursor at its agreed start
    /// offset (its current size unless an `init` snapshot fixed it earlier),
    /// so existing history is never replayed. A different path for a known
    /// prefix is a rotation and replaces the old cursor. If the file shrank
    /// the cursor restarts at 0 and the whole file is returned. I/O failures
    /// are logged and leave the cursor untouched.
    pub fn poll(&mut self, prefix: &str, path: &Path) -> Option<Delta> {
        let size = match path.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!(path = %path.display(), "stat failed: {e}");
                return None;
            }
        };

        let known = self.files.get(prefix).map(|w| w.path.clone());
        if known.as_deref() != Some(path) {
            if let Some(from) = &known {
                info!(prefix, from = %from.display(), to = %path.display(), "log rotated");
            }
            let start = self.starts.claim(path, size);
            debug!(prefix, path = %path.display(), size, start, "tracking new file");
            self.files
                .insert(prefix.to_string(), WatchedFile::new(prefix, path, size, start));
        }
        let watched = self.files.get_mut(prefix)?;

        watched.size = size;
        if size == watched.offset {
            return None;
        }
        let truncated = size < watched.offset;
        let start = if truncated {
            debug!(path = %path.display(), size, offset = watched.offset, "file shrank, rereading");
            0
        } else {
            watched.offset
        };

        match read_range(path, start, size) {
            Ok(bytes) => {
                watched.offset = start + bytes.len() as u64;
                if bytes.is_empty() {
                    return None;
                }
                Some(Delta {
                    path: path.to_path_buf(),
                    bytes,
                    truncated,
                })
            }
            Err(e) => {
                warn!(path = %path.display(), "tail read failed: {e}");
                None
            }
        }
    }

    /// Drop cursors for prefixes that no longer resolve to any file.
    pub fn retain_prefixes<S: AsRef<str>>(&mut self, live: &[S]) {
        self.files
            .retain(|prefix, _| live.iter().any(|l| l.as_ref() == prefix));
    }

    pub fn get(&self, prefix: &str) -> Option<&WatchedFile> {
        self.files.get(prefix)
    }

    /// Copy of the offset table keyed by path.
    pub fn cursors(&self) -> HashMap<PathBuf, u64> {
        self.files
            .values()
            .map(|w| (w.path.clone(), w.offset))
            .collect()
    }
}

/// Read `[start, end)` of `path`. Stops early if the file got shorter.
fn read_range(path: &Path, start: u64, end: u64) -> io::Result<Vec<u8>> {
    let mut f = File::open(path)?;
    read_range_from(&mut f, start, end)
}

fn read_range_from(f: &mut File, start: u64, end: u64) -> io::Result<Vec<u8>> {
    f.seek(SeekFrom::Start(start))?;
    let len = end.saturating_sub(start);
    let mut out = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    f.take(len).read_to_end(&mut out)?;
    Ok(out)
}

/// Last `lines` lines of `path`, looking no further than byte `upto` (the
/// whole file when `None`). Reads backwards in blocks, so cost is bounded by
/// the size of the returned text rather than the file.
pub fn tail_lines(path: &Path, lines: usize, upto: Option<u64>) -> io::Result<String> {
    let mut f = File::open(path)?;
    let len = f.metadata()?.len();
    let end = upto.map_or(len, |u| u.min(len));
    if lines == 0 || end == 0 {
        return Ok(String::new());
    }
    let start = line_start(&mut f, end, lines)?;
    let bytes = read_range_from(&mut f, start, end)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Offset where the last `lines` lines before `end` begin. A newline at
/// `end - 1` closes the final line rather than opening an empty one.
fn line_start(f: &mut File, end: u64, lines: usize) -> io::Result<u64> {
    let mut buf = vec![0u8; TAIL_BLOCK];
    let mut seen = 0usize;
    let mut hi = end - 1;
    while hi > 0 {
        let lo = hi.saturating_sub(TAIL_BLOCK as u64);
        let n = (hi - lo) as usize;
        f.seek(SeekFrom::Start(lo))?;
        f.read_exact(&mut buf[..n])?;
        for (i, b) in buf[..n].iter().enumerate().rev() {
            if *b == b'\n' {
                seen += 1;
                if seen == lines {
                    return Ok(lo + i as u64 + 1);
                }
            }
        }
        hi = lo;
    }
    Ok(0)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
