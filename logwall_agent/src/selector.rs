//! Picks the current log file for each configured prefix.
//!
//! Rotated files carry an 8-digit date somewhere in their name
//! (`network.20240315.log`); the newest date wins. Files without a date
//! rank as `00000000`, so they only win when nothing dated exists.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

const UNDATED: &str = "00000000";

/// First run of 8 consecutive ASCII digits in `name`, if any.
pub fn date_key(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    let mut run = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            run += 1;
            if run == 8 {
                // all ASCII, so byte offsets are char boundaries
                return name.get(i + 1 - 8..=i);
            }
        } else {
            run = 0;
        }
    }
    None
}

/// Resolve one current file per prefix, in prefix order. Prefixes with no
/// matching file are omitted.
pub fn resolve<S: AsRef<str>>(dir: &Path, prefixes: &[S]) -> Result<Vec<PathBuf>> {
    Ok(resolve_prefixed(dir, prefixes)?
        .into_iter()
        .map(|(_, path)| path)
        .collect())
}

/// Like [`resolve`], paired with the prefix each file was picked for.
pub fn resolve_prefixed<S: AsRef<str>>(
    dir: &Path,
    prefixes: &[S],
) -> Result<Vec<(String, PathBuf)>> {
    let names = list_files(dir)?;
    Ok(prefixes
        .iter()
        .filter_map(|p| {
            let p = p.as_ref();
            pick_latest(&names, p).map(|name| (p.to_string(), dir.join(name)))
        })
        .collect())
}

/// Newest entry for `prefix`; equal dates fall back to the greater file name.
pub fn pick_latest<'a>(names: &'a [String], prefix: &str) -> Option<&'a str> {
    names
        .iter()
        .filter(|n| n.starts_with(prefix))
        .max_by(|a, b| {
            let ka = date_key(a).unwrap_or(UNDATED);
            let kb = date_key(b).unwrap_or(UNDATED);
            ka.cmp(kb).then_with(|| a.cmp(b))
        })
        .map(String::as_str)
}

fn list_files(dir: &Path) -> Result<Vec<String>> {
    let rd = fs::read_dir(dir).map_err(|e| AgentError::io("read_dir", dir, e))?;
    let mut names = Vec::new();
    for entry in rd.flatten() {
        // follows symlinks, so a linked log counts as a file
        let is_file = fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        // Non-UTF-8 names cannot match a configured prefix anyway.
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}
