//! Agent configuration: the four-line settings file, `LOGWALL_*` environment
//! knobs, and command-line overrides.
//!
//! The settings file holds, one per line: listen port, poll interval in
//! seconds, shared password, debug flag. A missing file is created with the
//! defaults; blank or malformed lines keep their default and log a warning.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{AgentError, Result};
use crate::tables::TableConfig;

pub const DEFAULT_PORT: u16 = 8989;
pub const DEFAULT_POLL_SECS: f64 = 0.3;
pub const DEFAULT_PASSWORD: &str = "changeme";
pub const DEFAULT_SETTINGS_FILE: &str = "logwall.conf";

// Floor for the poll period; also the rate window floor in the sampler.
pub const MIN_POLL_SECS: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub poll_interval: f64,
    pub password: String,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_SECS,
            password: DEFAULT_PASSWORD.to_string(),
            debug: true,
        }
    }
}

impl Settings {
    /// Load from `path`, creating it with defaults when absent.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let s = Self::default();
                if let Err(e) = s.save(path) {
                    warn!("could not write {}: {e}", path.display());
                }
                Ok(s)
            }
            Err(e) => Err(AgentError::io("read", path, e)),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut s = Self::default();
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let line = |i: usize| lines.get(i).copied().filter(|l| !l.is_empty());

        if let Some(v) = line(0) {
            match v.parse::<u16>() {
                Ok(p) => s.port = p,
                Err(e) => warn!(value = v, "bad port in settings, keeping {}: {e}", s.port),
            }
        }
        if let Some(v) = line(1) {
            match v.parse::<f64>() {
                Ok(f) if f.is_finite() && f > 0.0 => s.poll_interval = f,
                Ok(_) => warn!(value = v, "poll interval must be positive, keeping {}", s.poll_interval),
                Err(e) => warn!(value = v, "bad poll interval in settings, keeping {}: {e}", s.poll_interval),
            }
        }
        if let Some(v) = line(2) {
            s.password = v.to_string();
        }
        if let Some(v) = line(3) {
            s.debug = parse_flag(v);
        }
        s
    }

    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n",
            self.port,
            self.poll_interval,
            self.password,
            u8::from(self.debug)
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AgentError::io("create_dir", parent, e))?;
        }
        fs::write(path, self.render()).map_err(|e| AgentError::io("write", path, e))
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval.max(MIN_POLL_SECS))
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Everything the agent needs at runtime.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub settings: Settings,
    pub log_dir: PathBuf,
    pub prefixes: Vec<String>,
    /// Lines per file in the `init` snapshot.
    pub tail_lines: usize,
    /// Row cap for every table.
    pub top_n: usize,
    /// Substring matched (case-insensitively) against listener process names.
    pub tunnel_process: String,
    pub tunnel_port: Option<u16>,
}

impl AgentConfig {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            log_dir: PathBuf::from("log"),
            prefixes: vec!["network.".into(), "core.".into(), "internal.".into()],
            tail_lines: 300,
            top_n: 15,
            tunnel_process: "waterwall".into(),
            tunnel_port: None,
        }
    }

    pub fn from_env(settings: Settings) -> Self {
        Self::from_lookup(settings, |k| std::env::var(k).ok())
    }

    /// Apply `LOGWALL_*` overrides through `lookup`.
    pub fn from_lookup<F>(settings: Settings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut c = Self::new(settings);
        if let Some(v) = lookup("LOGWALL_LOG_DIR").filter(|v| !v.is_empty()) {
            c.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LOGWALL_PREFIXES") {
            let list: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            if list.is_empty() {
                warn!("LOGWALL_PREFIXES is empty, keeping defaults");
            } else {
                c.prefixes = list;
            }
        }
        c.tail_lines = env_parse(&lookup, "LOGWALL_TAIL_LINES", c.tail_lines);
        c.top_n = env_parse(&lookup, "LOGWALL_TOP_N", c.top_n);
        if let Some(v) = lookup("LOGWALL_TUNNEL_PROCESS").filter(|v| !v.trim().is_empty()) {
            c.tunnel_process = v.trim().to_string();
        }
        if lookup("LOGWALL_TUNNEL_PORT").is_some() {
            c.tunnel_port = Some(env_parse(&lookup, "LOGWALL_TUNNEL_PORT", 0u16)).filter(|p| *p != 0);
        }
        c
    }

    pub fn table_config(&self) -> TableConfig {
        TableConfig {
            top_n: self.top_n,
            tunnel_process: self.tunnel_process.clone(),
            tunnel_port: self.tunnel_port,
        }
    }

    /// Fold command-line overrides in.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(p) = args.port {
            self.settings.port = p;
        }
        if let Some(d) = &args.log_dir {
            self.log_dir = d.clone();
        }
    }
}

fn env_parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %v, "malformed value, using {default}");
            default
        }),
        None => default,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub help: bool,
}

pub const USAGE: &str =
    "Usage: logwall_agent [--port PORT|-p PORT] [--config FILE|-c FILE] [--log-dir DIR|-d DIR]";

impl CliArgs {
    /// Parse `args` (program name first). Unknown arguments are an error.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> std::result::Result<Self, String> {
        let mut it = args.into_iter();
        let _ = it.next(); // program name
        let mut out = Self::default();
        while let Some(a) = it.next() {
            match a.as_str() {
                "-h" | "--help" => out.help = true,
                "--port" | "-p" => out.port = Some(parse_port(it.next())?),
                "--config" | "-c" => out.config = Some(required(&a, it.next())?.into()),
                "--log-dir" | "-d" => out.log_dir = Some(required(&a, it.next())?.into()),
                _ if a.starts_with("--port=") => {
                    out.port = Some(parse_port(a.split_once('=').map(|(_, v)| v.to_string()))?);
                }
                _ if a.starts_with("--config=") => {
                    if let Some((_, v)) = a.split_once('=') {
                        out.config = Some(v.into());
                    }
                }
                _ if a.starts_with("--log-dir=") => {
                    if let Some((_, v)) = a.split_once('=') {
                        out.log_dir = Some(v.into());
                    }
                }
                _ => return Err(format!("unexpected argument '{a}'\n{USAGE}")),
            }
        }
        Ok(out)
    }
}

fn required(flag: &str, v: Option<String>) -> std::result::Result<String, String> {
    v.filter(|s| !s.is_empty())
        .ok_or_else(|| format!("{flag} needs a value\n{USAGE}"))
}

fn parse_port(v: Option<String>) -> std::result::Result<u16, String> {
    let v = required("--port", v)?;
    v.parse::<u16>()
        .map_err(|e| format!("invalid port '{v}': {e}\n{USAGE}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("conf").join(DEFAULT_SETTINGS_FILE);
        let s = Settings::load_or_create(&path).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "8989\n0.3\nchangeme\n1\n");
    }

    #[test]
    fn blank_and_missing_lines_fall_back() {
        let s = Settings::parse("9000\n\nsecret\n");
        assert_eq!(s.port, 9000);
        assert_eq!(s.poll_interval, DEFAULT_POLL_SECS);
        assert_eq!(s.password, "secret");
        assert!(s.debug);
    }

    #[test]
    fn malformed_values_keep_defaults_per_field() {
        let s = Settings::parse("eighty\n-1\n pw \nno\n");
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.poll_interval, DEFAULT_POLL_SECS);
        assert_eq!(s.password, "pw");
        assert!(!s.debug);

        let s = Settings::parse("1\n2.5\nx\nYES\n");
        assert_eq!(s.port, 1);
        assert_eq!(s.poll_interval, 2.5);
        assert!(s.debug);
    }

    #[test]
    fn poll_period_has_floor() {
        let s = Settings {
            poll_interval: 0.001,
            ..Settings::default()
        };
        assert_eq!(s.poll_period(), Duration::from_millis(100));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LOGWALL_LOG_DIR", "/var/log/ww"),
            ("LOGWALL_PREFIXES", "a., b.,,"),
            ("LOGWALL_TAIL_LINES", "50"),
            ("LOGWALL_TOP_N", "many"),
            ("LOGWALL_TUNNEL_PROCESS", "Tunnel"),
            ("LOGWALL_TUNNEL_PORT", "443"),
        ]
        .into_iter()
        .collect();
        let c = AgentConfig::from_lookup(Settings::default(), |k| {
            env.get(k).map(|v| v.to_string())
        });
        assert_eq!(c.log_dir, PathBuf::from("/var/log/ww"));
        assert_eq!(c.prefixes, vec!["a.", "b."]);
        assert_eq!(c.tail_lines, 50);
        assert_eq!(c.top_n, 15);
        assert_eq!(c.tunnel_process, "Tunnel");
        assert_eq!(c.tunnel_port, Some(443));
    }

    #[test]
    fn cli_overrides_settings() {
        let args = CliArgs::parse(
            ["agent", "-p", "9100", "--log-dir=/tmp/l", "-c", "x.conf"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        let mut c = AgentConfig::new(Settings::default());
        c.apply_cli(&args);
        assert_eq!(c.settings.port, 9100);
        assert_eq!(c.log_dir, PathBuf::from("/tmp/l"));
        assert_eq!(args.config, Some(PathBuf::from("x.conf")));
    }

    #[test]
    fn cli_rejects_unknown_and_bad_port() {
        let parse = |v: &[&str]| CliArgs::parse(v.iter().map(|s| s.to_string()));
        assert!(parse(&["agent", "--bogus"]).is_err());
        assert!(parse(&["agent", "--port", "70000"]).is_err());
        assert!(parse(&["agent", "--port"]).is_err());
        assert!(parse(&["agent", "-h"]).unwrap().help);
    }
}
