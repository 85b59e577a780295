//! Host enumeration seam: processes and inet sockets.
//!
//! Enumeration is best effort. Each item is a `Result` so a process that
//! exits mid-walk, or a table line we cannot read, costs one row and not the
//! whole table. [`present`] collapses a sequence to the rows that made it.

use std::net::SocketAddr;

use sysinfo::{
    Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind, Users,
};
use tracing::trace;

use crate::types::Protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Established,
    Listen,
    /// Connectionless sockets have no state.
    None,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InetSocket {
    pub protocol: Protocol,
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub state: SocketState,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    pub cpu_percent: f32,
    pub mem_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("process {0} exited during enumeration")]
    Vanished(u32),
    #[cfg(target_os = "linux")]
    #[error("procfs read failed: {0}")]
    Procfs(#[from] procfs::ProcError),
}

pub type ProbeItems<'a, T> = Box<dyn Iterator<Item = Result<T, ProbeError>> + 'a>;

pub trait HostProbe: Send {
    fn processes(&mut self) -> ProbeItems<'_, ProcessSample>;
    fn sockets(&mut self) -> ProbeItems<'_, InetSocket>;
    fn process_name(&self, pid: u32) -> Option<String>;
}

/// Keep the `Ok` items, tracing what was skipped.
pub fn present<T>(items: impl Iterator<Item = Result<T, ProbeError>>) -> impl Iterator<Item = T> {
    items.filter_map(|r| match r {
        Ok(v) => Some(v),
        Err(e) => {
            trace!("skipped: {e}");
            None
        }
    })
}

/// sysinfo for processes, procfs for sockets.
pub struct SystemProbe {
    sys: System,
    users: Users,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        // Prime per-process CPU counters so the first table is not all zeros.
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        Self {
            sys,
            users: Users::new_with_refreshed_list(),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_user(UpdateKind::OnlyIfNotSet)
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SystemProbe {
    fn processes(&mut self) -> ProbeItems<'_, ProcessSample> {
        self.sys
            .refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        self.sys.refresh_cpu_usage();
        // Per-process usage is per core; normalize to the whole machine.
        let n_cpus = self.sys.cpus().len().max(1) as f32;
        let users = &self.users;
        Box::new(self.sys.processes().values().map(move |p| {
            let pid = p.pid().as_u32();
            if matches!(p.status(), ProcessStatus::Dead | ProcessStatus::Zombie) {
                return Err(ProbeError::Vanished(pid));
            }
            Ok(ProcessSample {
                pid,
                name: p.name().to_string_lossy().into_owned(),
                user: p
                    .user_id()
                    .and_then(|uid| users.get_user_by_id(uid))
                    .map(|u| u.name().to_string()),
                cpu_percent: (p.cpu_usage() / n_cpus).clamp(0.0, 100.0),
                mem_bytes: p.memory(),
            })
        }))
    }

    fn sockets(&mut self) -> ProbeItems<'_, InetSocket> {
        Box::new(inet_sockets().into_iter())
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.sys
            .process(Pid::from_u32(pid))
            .map(|p| p.name().to_string_lossy().into_owned())
    }
}

#[cfg(target_os = "linux")]
fn inet_sockets() -> Vec<Result<InetSocket, ProbeError>> {
    crate::procnet::read_sockets()
}

// no socket tables off Linux
#[cfg(not(target_os = "linux"))]
fn inet_sockets() -> Vec<Result<InetSocket, ProbeError>> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_drops_errors() {
        let items = vec![
            Ok(1),
            Err(ProbeError::Vanished(7)),
            Ok(2),
            Err(ProbeError::Vanished(8)),
        ];
        let got: Vec<i32> = present(items.into_iter()).collect();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn system_probe_sees_this_process() {
        let mut probe = SystemProbe::new();
        let me = std::process::id();
        let found = present(probe.processes()).any(|p| p.pid == me);
        assert!(found);
        assert!(probe.process_name(me).is_some());
    }
}
