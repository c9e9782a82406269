//! Locating the Antigravity language server and a port that answers.
//!
//! The language server is started with its credentials on the command line:
//!
//! ```text
//! language_server_linux_x64 --extension_server_port 41523 --csrf_token 0f1e...-9a8b
//! ```
//!
//! Discovery filters the process table for both flags, pulls the token out, then
//! probes each listening port of the process until one accepts an authenticated
//! request.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::client::{Transport, ping};
use crate::error::DiscoveryError;
use crate::models::{Connection, ProcessHandle, ProcessRecord};
use crate::ports::ProcessInspector;

pub const PORT_FLAG: &str = "--extension_server_port";
pub const TOKEN_FLAG: &str = "--csrf_token";

static PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--extension_server_port[=\s]+(\d+)").unwrap());
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)--csrf_token[=\s]+([a-f0-9-]+)").unwrap());

/// Extract credentials from a single process, if it is a language server.
///
/// Both flags must be present and the token must match the hex-with-dashes
/// pattern. A missing or unparseable port value yields 0.
pub fn parse_process(record: &ProcessRecord) -> Option<ProcessHandle> {
    let cmdline = record.cmdline.as_str();
    if cmdline.is_empty() || !cmdline.contains(PORT_FLAG) || !cmdline.contains(TOKEN_FLAG) {
        return None;
    }

    let csrf_token = TOKEN_RE.captures(cmdline)?.get(1)?.as_str().to_string();
    let extension_port = PORT_RE
        .captures(cmdline)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .unwrap_or(0);

    Some(ProcessHandle {
        pid: record.pid,
        extension_port,
        csrf_token,
    })
}

/// All language server processes visible to `inspector`.
pub fn find_language_servers(inspector: &dyn ProcessInspector) -> Vec<ProcessHandle> {
    let mut handles: Vec<ProcessHandle> = inspector
        .processes()
        .iter()
        .filter_map(|record| {
            let handle = parse_process(record)?;
            tracing::debug!(pid = record.pid, name = %record.name, "language server process");
            Some(handle)
        })
        .collect();
    handles.sort_by_key(|h| h.pid);
    tracing::debug!(count = handles.len(), "language server processes");
    handles
}

/// First port, in ascending order, that answers the probe.
pub fn find_working_port(
    transport: &dyn Transport,
    ports: &[u16],
    csrf_token: &str,
) -> Option<u16> {
    let mut sorted = ports.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.into_iter().find(|&port| {
        let ok = ping(transport, port, csrf_token);
        tracing::debug!(port, ok, "probe");
        ok
    })
}

/// Discover a language server and a working port.
///
/// Handles are tried in PID order; the error describes the last one tried.
pub fn connect(
    inspector: &dyn ProcessInspector,
    transport: &dyn Transport,
) -> Result<Connection, DiscoveryError> {
    let handles = find_language_servers(inspector);
    let mut last_err = DiscoveryError::NoProcess;

    for handle in handles {
        let ports = inspector.listening_ports(handle.pid);
        if ports.is_empty() {
            last_err = DiscoveryError::NoListeningPorts { pid: handle.pid };
            continue;
        }
        match find_working_port(transport, &ports, &handle.csrf_token) {
            Some(port) => {
                tracing::info!(pid = handle.pid, port, "connected to language server");
                return Ok(Connection {
                    pid: handle.pid,
                    port,
                    extension_port: handle.extension_port,
                    csrf_token: handle.csrf_token,
                });
            }
            None => {
                last_err = DiscoveryError::NoWorkingPort {
                    pid: handle.pid,
                    ports,
                };
            }
        }
    }

    Err(last_err)
}
