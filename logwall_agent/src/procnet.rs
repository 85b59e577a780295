//! Inet sockets from `/proc/net/{tcp,tcp6,udp,udp6}` via `procfs`, with
//! owners found by walking each process's fd table.

use std::collections::HashMap;

use procfs::net::{TcpNetEntry, TcpState, UdpNetEntry};
use procfs::process::FDTarget;
use procfs::ProcResult;
use tracing::trace;

use crate::probe::{InetSocket, ProbeError, SocketState};
use crate::types::Protocol;

fn tcp_state(state: &TcpState) -> SocketState {
    match state {
        TcpState::Established => SocketState::Established,
        TcpState::Listen => SocketState::Listen,
        _ => SocketState::Other,
    }
}

/// TCP table rows paired with their socket inodes.
pub fn tcp_sockets(entries: &[TcpNetEntry], protocol: Protocol) -> Vec<(InetSocket, u64)> {
    entries
        .iter()
        .map(|e| {
            let sock = InetSocket {
                protocol,
                local: e.local_address,
                remote: e.remote_address,
                state: tcp_state(&e.state),
                pid: None,
            };
            (sock, e.inode)
        })
        .collect()
}

/// UDP rows; connectionless, so they never carry a state.
pub fn udp_sockets(entries: &[UdpNetEntry], protocol: Protocol) -> Vec<(InetSocket, u64)> {
    entries
        .iter()
        .map(|e| {
            let sock = InetSocket {
                protocol,
                local: e.local_address,
                remote: e.remote_address,
                state: SocketState::None,
                pid: None,
            };
            (sock, e.inode)
        })
        .collect()
}

/// Map socket inodes to owning pids. Processes we may not inspect are
/// skipped.
pub fn inode_owners() -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let procs = match procfs::process::all_processes() {
        Ok(p) => p,
        Err(e) => {
            trace!("cannot list processes: {e}");
            return owners;
        }
    };
    for proc in procs.flatten() {
        let Ok(pid) = u32::try_from(proc.pid()) else {
            continue;
        };
        let Ok(fds) = proc.fd() else {
            continue;
        };
        for fd in fds.flatten() {
            if let FDTarget::Socket(inode) = fd.target {
                owners.entry(inode).or_insert(pid);
            }
        }
    }
    owners
}

/// Read every table and attach owners. An unreadable table is reported as
/// one error item.
pub fn read_sockets() -> Vec<Result<InetSocket, ProbeError>> {
    let owners = inode_owners();
    let tables: [ProcResult<Vec<(InetSocket, u64)>>; 4] = [
        procfs::net::tcp().map(|t| tcp_sockets(&t, Protocol::Tcp)),
        procfs::net::tcp6().map(|t| tcp_sockets(&t, Protocol::Tcp6)),
        procfs::net::udp().map(|t| udp_sockets(&t, Protocol::Udp)),
        procfs::net::udp6().map(|t| udp_sockets(&t, Protocol::Udp6)),
    ];
    let mut out = Vec::new();
    for table in tables {
        match table {
            Ok(rows) => out.extend(rows.into_iter().map(|(mut sock, inode)| {
                sock.pid = owners.get(&inode).copied();
                Ok(sock)
            })),
            Err(e) => out.push(Err(ProbeError::from(e))),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use procfs::net::{TcpNetEntries, UdpNetEntries};
    use procfs::FromBufReadSI;

    const TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 4242 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 0100007F:D431 01 00000000:00000000 00:00000000 00000000  1000        0 4243 1 0000000000000000 20 4 30 10 -1
   2: 0100007F:1F91 0100007F:D432 06 00000000:00000000 00:00000000 00000000  1000        0 0 3 0000000000000000
";

    const UDP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
   5: 00000000:0035 00000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 99 2 0000000000000000 0
";

    #[cfg(target_endian = "little")]
    #[test]
    fn maps_tcp_rows() {
        let TcpNetEntries(entries) = TcpNetEntries::from_buf_read(TCP.as_bytes(), procfs::current_system_info()).unwrap();
        let rows = tcp_sockets(&entries, Protocol::Tcp);
        assert_eq!(rows.len(), 3);

        let (listen, inode) = &rows[0];
        assert_eq!(listen.local, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(listen.state, SocketState::Listen);
        assert_eq!(*inode, 4242);

        let (est, _) = &rows[1];
        assert_eq!(est.state, SocketState::Established);
        assert_eq!(est.remote, "127.0.0.1:54321".parse().unwrap());

        // TIME_WAIT
        assert_eq!(rows[2].0.state, SocketState::Other);
    }

    #[test]
    fn udp_has_no_listen_state() {
        let UdpNetEntries(entries) = UdpNetEntries::from_buf_read(UDP.as_bytes(), procfs::current_system_info()).unwrap();
        let rows = udp_sockets(&entries, Protocol::Udp);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.state, SocketState::None);
        assert_eq!(rows[0].0.local.port(), 53);
        assert_eq!(rows[0].1, 99);
    }

    #[test]
    fn garbled_table_is_an_error() {
        let text = "header\n   0: garbage\n";
        let err = TcpNetEntries::from_buf_read(text.as_bytes(), procfs::current_system_info()).unwrap_err();
        assert!(matches!(ProbeError::from(err), ProbeError::Procfs(_)));
    }

    #[test]
    fn own_listener_is_found_with_owner() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let me = std::process::id();

        let found = read_sockets()
            .into_iter()
            .flatten()
            .find(|s| s.state == SocketState::Listen && s.local.port() == port)
            .unwrap();
        assert_eq!(found.protocol, Protocol::Tcp);
        assert_eq!(found.pid, Some(me));
    }
}
